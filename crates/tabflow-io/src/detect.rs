//! Cell type autodetection shared by the CSV decoder.
//!
//! Detection is resolved per column over the rows buffered for one batch and
//! only ever widens across batches: STRING > FLOAT64 > INT64 for numbers,
//! TIMESTAMP > DATE for calendar values, and any other mix falls back to
//! STRING.

use tabflow_core::value::{parse_date, parse_timestamp};
use tabflow_core::{CellType, Value};

pub use tabflow_core::value::widen;

fn all_digits(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(|b| b.is_ascii_digit())
}

/// Strict ISO-8601 date shape: `YYYY-MM-DD`.
fn is_date(text: &str) -> bool {
    let b = text.as_bytes();
    b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && all_digits(&b[0..4])
        && all_digits(&b[5..7])
        && all_digits(&b[8..10])
        && parse_date(text).is_some()
}

/// Strict ISO-8601 timestamp shape: `YYYY-MM-DDTHH:MM:SS` with optional `Z`.
fn is_timestamp(text: &str) -> bool {
    let bare = text.strip_suffix('Z').unwrap_or(text);
    let b = bare.as_bytes();
    b.len() == 19
        && b[10] == b'T'
        && b[13] == b':'
        && b[16] == b':'
        && is_date(&bare[0..10])
        && all_digits(&b[11..13])
        && all_digits(&b[14..16])
        && all_digits(&b[17..19])
        && parse_timestamp(text).is_some()
}

fn is_int(text: &str) -> bool {
    let bare = text.strip_prefix(['+', '-']).unwrap_or(text);
    all_digits(bare.as_bytes()) && text.parse::<i64>().is_ok()
}

fn is_float(text: &str) -> bool {
    text.bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
        && text.bytes().any(|b| b.is_ascii_digit())
        && text.parse::<f64>().is_ok()
}

/// Detect the narrowest type a single cell's text fits.
pub fn sniff(text: &str) -> CellType {
    if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
        CellType::Bool
    } else if is_date(text) {
        CellType::Date
    } else if is_timestamp(text) {
        CellType::Timestamp
    } else if is_int(text) {
        CellType::Int64
    } else if is_float(text) {
        CellType::Float64
    } else {
        CellType::Str
    }
}

/// Parse a cell's text under the column type the batch settled on.
///
/// Values the widened type cannot represent become NULL.
pub fn parse_as(ty: CellType, text: &str) -> Value {
    match ty {
        CellType::Bool => {
            if text.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if text.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                Value::Null
            }
        }
        CellType::Int64 => text.parse().map(Value::Int).unwrap_or(Value::Null),
        CellType::Float64 => text.parse().map(Value::Float).unwrap_or(Value::Null),
        CellType::Date => parse_date(text).map(Value::Date).unwrap_or(Value::Null),
        CellType::Timestamp => parse_timestamp(text)
            .map(Value::Timestamp)
            .or_else(|| parse_date(text).map(|d| Value::Timestamp(d as i64 * 86_400)))
            .map_or(Value::Null, |v| v),
        CellType::Str | CellType::Null => Value::Str(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffing() {
        assert_eq!(sniff("true"), CellType::Bool);
        assert_eq!(sniff("FALSE"), CellType::Bool);
        assert_eq!(sniff("42"), CellType::Int64);
        assert_eq!(sniff("-7"), CellType::Int64);
        assert_eq!(sniff("2.5"), CellType::Float64);
        assert_eq!(sniff("1e6"), CellType::Float64);
        assert_eq!(sniff("2024-03-15"), CellType::Date);
        assert_eq!(sniff("2024-03-15T10:30:00Z"), CellType::Timestamp);
        assert_eq!(sniff("2024-03-15T10:30:00"), CellType::Timestamp);
        assert_eq!(sniff("hello"), CellType::Str);
        assert_eq!(sniff("2024-13-45"), CellType::Str);
        assert_eq!(sniff("12 monkeys"), CellType::Str);
    }

    #[test]
    fn widening_lattice() {
        use CellType::*;
        assert_eq!(widen(Null, Int64), Int64);
        assert_eq!(widen(Int64, Float64), Float64);
        assert_eq!(widen(Float64, Int64), Float64);
        assert_eq!(widen(Date, Timestamp), Timestamp);
        assert_eq!(widen(Int64, Str), Str);
        assert_eq!(widen(Bool, Int64), Str);
        assert_eq!(widen(Date, Int64), Str);
    }

    #[test]
    fn parse_under_widened_type() {
        assert_eq!(parse_as(CellType::Float64, "42"), Value::Float(42.0));
        assert_eq!(
            parse_as(CellType::Timestamp, "2024-03-15"),
            Value::Timestamp(parse_date_days("2024-03-15") * 86_400)
        );
        assert_eq!(parse_as(CellType::Int64, "oops"), Value::Null);
    }

    fn parse_date_days(s: &str) -> i64 {
        tabflow_core::value::parse_date(s).unwrap() as i64
    }
}
