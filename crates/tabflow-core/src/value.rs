//! Logical cell types and owned cell values.
//!
//! A cell holds one of six logical types. The seventh tag [`CellType::Null`]
//! marks a column whose type has not been assigned yet; actual null cells are
//! tracked by the batch's null bitmap, not by the type system.

use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

/// Days between 0001-01-01 (chrono's day 1) and 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    /// Column type not assigned yet.
    Null,
    Bool,
    Int64,
    Float64,
    #[serde(rename = "string")]
    Str,
    /// Days since 1970-01-01, signed 32-bit.
    Date,
    /// Seconds since the Unix epoch, signed 64-bit.
    Timestamp,
}

impl CellType {
    pub fn name(&self) -> &'static str {
        match self {
            CellType::Null => "null",
            CellType::Bool => "bool",
            CellType::Int64 => "int64",
            CellType::Float64 => "float64",
            CellType::Str => "string",
            CellType::Date => "date",
            CellType::Timestamp => "timestamp",
        }
    }

    /// Parse a type name as written in plan args (`cast`, schema configs).
    pub fn parse_name(name: &str) -> Option<CellType> {
        match name.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Some(CellType::Bool),
            "int" | "int64" | "integer" => Some(CellType::Int64),
            "float" | "float64" | "double" => Some(CellType::Float64),
            "string" | "str" | "text" => Some(CellType::Str),
            "date" => Some(CellType::Date),
            "timestamp" | "datetime" => Some(CellType::Timestamp),
            _ => None,
        }
    }

    /// Types with a numeric interpretation (everything except STRING).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            CellType::Bool
                | CellType::Int64
                | CellType::Float64
                | CellType::Date
                | CellType::Timestamp
        )
    }
}

/// An owned cell value, as produced by getters, the expression oracle and
/// aggregate accumulators.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(i32),
    Timestamp(i64),
}

impl Value {
    pub fn cell_type(&self) -> CellType {
        match self {
            Value::Null => CellType::Null,
            Value::Bool(_) => CellType::Bool,
            Value::Int(_) => CellType::Int64,
            Value::Float(_) => CellType::Float64,
            Value::Str(_) => CellType::Str,
            Value::Date(_) => CellType::Date,
            Value::Timestamp(_) => CellType::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view; STRING and NULL have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Date(v) => Some(*v as f64),
            Value::Timestamp(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Render the value the way the CSV encoder writes cells.
    ///
    /// NULL renders as the empty string.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => format_float(*v),
            Value::Str(s) => s.clone(),
            Value::Date(d) => format_date(*d),
            Value::Timestamp(t) => format_timestamp(*t),
        }
    }
}

/// Render a FLOAT64 cell; whole numbers drop the fraction.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else {
        format!("{v}")
    }
}

/// Render a DATE cell as `YYYY-MM-DD`.
pub fn format_date(days: i32) -> String {
    match NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_CE_DAYS) {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => String::new(),
    }
}

/// Render a TIMESTAMP cell as `YYYY-MM-DDTHH:MM:SSZ` (UTC).
pub fn format_timestamp(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(t) => t.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        None => String::new(),
    }
}

/// Parse a strict `YYYY-MM-DD` form into days since 1970-01-01.
pub fn parse_date(text: &str) -> Option<i32> {
    let d = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    Some(d.num_days_from_ce() - UNIX_EPOCH_CE_DAYS)
}

/// Parse a strict `YYYY-MM-DDTHH:MM:SS[Z]` form into Unix seconds.
pub fn parse_timestamp(text: &str) -> Option<i64> {
    let bare = text.strip_suffix('Z').unwrap_or(text);
    let t = chrono::NaiveDateTime::parse_from_str(bare, "%Y-%m-%dT%H:%M:%S").ok()?;
    Some(t.and_utc().timestamp())
}

/// Widen a column type so it also admits `observed`.
///
/// STRING > FLOAT64 > INT64 for numbers, TIMESTAMP > DATE for calendar
/// values; any other mix falls back to STRING.
pub fn widen(current: CellType, observed: CellType) -> CellType {
    use CellType::*;
    match (current, observed) {
        (Null, t) | (t, Null) => t,
        (a, b) if a == b => a,
        (Int64, Float64) | (Float64, Int64) => Float64,
        (Date, Timestamp) | (Timestamp, Date) => Timestamp,
        _ => Str,
    }
}

/// Convert a value to a target column type along the widening lattice.
///
/// INT64 widens to FLOAT64, DATE to TIMESTAMP (midnight UTC), anything
/// renders into STRING; a conversion outside the lattice yields NULL.
pub fn coerce(v: &Value, ty: CellType) -> Value {
    if v.is_null() {
        return Value::Null;
    }
    if v.cell_type() == ty {
        return v.clone();
    }
    match ty {
        CellType::Str => Value::Str(v.render()),
        CellType::Float64 => match v {
            Value::Int(i) => Value::Float(*i as f64),
            _ => Value::Null,
        },
        CellType::Timestamp => match v {
            Value::Date(d) => Value::Timestamp(*d as i64 * 86_400),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

/// Calendar field extraction for the `datetime` operator.
pub fn datetime_part(ty: CellType, raw: i64, part: &str) -> Option<i64> {
    let dt = match ty {
        CellType::Date => DateTime::from_timestamp(raw * 86_400, 0)?,
        CellType::Timestamp => DateTime::from_timestamp(raw, 0)?,
        _ => return None,
    };
    let v = match part {
        "year" => dt.year() as i64,
        "month" => dt.month() as i64,
        "day" => dt.day() as i64,
        "hour" => dt.hour() as i64,
        "minute" => dt.minute() as i64,
        "second" => dt.second() as i64,
        "weekday" => dt.weekday().num_days_from_monday() as i64,
        _ => return None,
    };
    Some(v)
}

/// Truncate a timestamp (Unix seconds) to a calendar unit, UTC.
pub fn truncate_timestamp(secs: i64, unit: &str) -> Option<i64> {
    let dt = DateTime::from_timestamp(secs, 0)?;
    let d = dt.date_naive();
    let t = match unit {
        "minute" => d.and_hms_opt(dt.hour(), dt.minute(), 0)?,
        "hour" => d.and_hms_opt(dt.hour(), 0, 0)?,
        "day" => d.and_hms_opt(0, 0, 0)?,
        "month" => d.with_day(1)?.and_hms_opt(0, 0, 0)?,
        "year" => d.with_day(1)?.with_month(1)?.and_hms_opt(0, 0, 0)?,
        _ => return None,
    };
    Some(t.and_utc().timestamp())
}

/// Truncate a DATE (days since epoch) to a calendar unit.
pub fn truncate_date(days: i32, unit: &str) -> Option<i32> {
    match unit {
        "day" | "hour" | "minute" => Some(days),
        "month" | "year" => {
            let d = NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_CE_DAYS)?;
            let d = if unit == "year" {
                d.with_day(1)?.with_month(1)?
            } else {
                d.with_day(1)?
            };
            Some(d.num_days_from_ce() - UNIX_EPOCH_CE_DAYS)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_round_trip() {
        let days = parse_date("2024-03-15").unwrap();
        assert_eq!(format_date(days), "2024-03-15");
        assert_eq!(parse_date("1970-01-01"), Some(0));
        assert_eq!(parse_date("1969-12-31"), Some(-1));
    }

    #[test]
    fn timestamp_round_trip() {
        let secs = parse_timestamp("2024-03-15T10:30:00Z").unwrap();
        assert_eq!(format_timestamp(secs), "2024-03-15T10:30:00Z");
        assert_eq!(parse_timestamp("1970-01-01T00:00:00"), Some(0));
    }

    #[test]
    fn malformed_dates_rejected() {
        assert_eq!(parse_date("2024-3-15x"), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_timestamp("2024-03-15"), None);
    }

    #[test]
    fn float_rendering_drops_whole_fraction() {
        assert_eq!(format_float(11.0), "11");
        assert_eq!(format_float(2.5), "2.5");
    }

    #[test]
    fn datetime_parts() {
        let secs = parse_timestamp("2024-03-15T10:30:45Z").unwrap();
        assert_eq!(datetime_part(CellType::Timestamp, secs, "year"), Some(2024));
        assert_eq!(datetime_part(CellType::Timestamp, secs, "month"), Some(3));
        assert_eq!(datetime_part(CellType::Timestamp, secs, "hour"), Some(10));
        // 2024-03-15 is a Friday
        assert_eq!(datetime_part(CellType::Timestamp, secs, "weekday"), Some(4));
    }

    #[test]
    fn truncation() {
        let secs = parse_timestamp("2024-03-15T10:30:45Z").unwrap();
        assert_eq!(
            format_timestamp(truncate_timestamp(secs, "hour").unwrap()),
            "2024-03-15T10:00:00Z"
        );
        assert_eq!(
            format_timestamp(truncate_timestamp(secs, "month").unwrap()),
            "2024-03-01T00:00:00Z"
        );
        let days = parse_date("2024-03-15").unwrap();
        assert_eq!(format_date(truncate_date(days, "year").unwrap()), "2024-01-01");
    }

    #[test]
    fn type_names_parse_both_ways() {
        for ty in [
            CellType::Bool,
            CellType::Int64,
            CellType::Float64,
            CellType::Str,
            CellType::Date,
            CellType::Timestamp,
        ] {
            assert_eq!(CellType::parse_name(ty.name()), Some(ty));
        }
        assert_eq!(CellType::parse_name("uuid"), None);
    }
}
