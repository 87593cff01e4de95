//! Streaming projections: derived columns, type casts, encodings and
//! calendar helpers. Each op emits one output batch per input batch.

use crate::expr::Expr;
use crate::util::{extend_batch, Lcg};
use anyhow::Result;
use std::collections::HashMap;
use tabflow_core::value::{
    coerce, datetime_part, parse_date, parse_timestamp, truncate_date, truncate_timestamp, widen,
};
use tabflow_core::{Batch, CellType, SideChannels, Transform, Value};

/// Append columns computed by the expression oracle.
///
/// A derived column's type is settled per batch from the evaluated values,
/// the same widening the decoders use.
pub struct DeriveOp {
    columns: Vec<(String, Expr)>,
}

impl DeriveOp {
    pub fn new(columns: Vec<(String, Expr)>) -> Self {
        Self { columns }
    }
}

impl Transform for DeriveOp {
    fn name(&self) -> &'static str {
        "derive"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut derived: Vec<(String, CellType, Vec<Value>)> = Vec::new();
        for (name, expr) in &self.columns {
            let values: Vec<Value> = (0..input.n_rows())
                .map(|r| expr.eval_value(&input, r))
                .collect();
            let mut ty = CellType::Null;
            for v in &values {
                ty = widen(ty, v.cell_type());
            }
            if ty == CellType::Null {
                ty = CellType::Str;
            }
            derived.push((name.clone(), ty, values));
        }
        let extra: Vec<(String, CellType)> = derived
            .iter()
            .map(|(name, ty, _)| (name.clone(), *ty))
            .collect();
        let mut out = extend_batch(&input, &extra);
        let base = input.n_cols();
        for (i, (_, ty, values)) in derived.iter().enumerate() {
            for (r, v) in values.iter().enumerate() {
                out.set_value(r, base + i, &coerce(v, *ty));
            }
        }
        Ok(Some(out))
    }
}

/// Convert a value to an explicitly requested cell type.
///
/// Unlike the widening coercion, casts may narrow; un-representable values
/// become null.
pub fn cast_value(v: &Value, ty: CellType) -> Value {
    if v.is_null() {
        return Value::Null;
    }
    if v.cell_type() == ty {
        return v.clone();
    }
    match ty {
        CellType::Str => Value::Str(v.render()),
        CellType::Int64 => match v {
            Value::Bool(b) => Value::Int(*b as i64),
            Value::Float(f) if f.is_finite() => Value::Int(*f as i64),
            Value::Str(s) => s.trim().parse().map(Value::Int).unwrap_or(Value::Null),
            Value::Date(d) => Value::Int(*d as i64),
            Value::Timestamp(t) => Value::Int(*t),
            _ => Value::Null,
        },
        CellType::Float64 => match v {
            Value::Str(s) => s.trim().parse().map(Value::Float).unwrap_or(Value::Null),
            _ => v.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        CellType::Bool => match v {
            Value::Int(i) => Value::Bool(*i != 0),
            Value::Float(f) => Value::Bool(*f != 0.0),
            Value::Str(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
            Value::Str(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
            _ => Value::Null,
        },
        CellType::Date => match v {
            Value::Str(s) => parse_date(s).map(Value::Date).unwrap_or(Value::Null),
            Value::Timestamp(t) => Value::Date(t.div_euclid(86_400) as i32),
            Value::Int(i) => i32::try_from(*i).map(Value::Date).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        CellType::Timestamp => match v {
            Value::Str(s) => parse_timestamp(s)
                .or_else(|| parse_date(s).map(|d| d as i64 * 86_400))
                .map(Value::Timestamp)
                .unwrap_or(Value::Null),
            Value::Date(d) => Value::Timestamp(*d as i64 * 86_400),
            Value::Int(i) => Value::Timestamp(*i),
            _ => Value::Null,
        },
        CellType::Null => Value::Null,
    }
}

/// Convert columns to explicitly requested types.
pub struct CastOp {
    mapping: Vec<(String, CellType)>,
}

impl CastOp {
    pub fn new(mapping: Vec<(String, CellType)>) -> Self {
        Self { mapping }
    }
}

impl Transform for CastOp {
    fn name(&self) -> &'static str {
        "cast"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut schema = input.schema();
        for (name, ty) in &self.mapping {
            if let Some(c) = schema.col_index(name) {
                schema.cols[c].1 = *ty;
            }
        }
        let mut out = Batch::from_schema(&schema, input.n_rows().max(1));
        for r in 0..input.n_rows() {
            for c in 0..input.n_cols() {
                let v = cast_value(&input.value(r, c), schema.cols[c].1);
                out.set_value(r, c, &v);
            }
        }
        out.set_row_count(input.n_rows());
        Ok(Some(out))
    }
}

/// Append a DJB2 hash of the selected columns as `_hash`.
pub struct HashOp {
    columns: Option<Vec<String>>,
}

impl HashOp {
    pub fn new(columns: Option<Vec<String>>) -> Self {
        Self { columns }
    }
}

impl Transform for HashOp {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let cols: Vec<usize> = match &self.columns {
            Some(names) => names.iter().filter_map(|n| input.col_index(n)).collect(),
            None => (0..input.n_cols()).collect(),
        };
        let mut out = extend_batch(&input, &[("_hash".to_string(), CellType::Int64)]);
        let hash_col = input.n_cols();
        for r in 0..input.n_rows() {
            let mut h: u64 = 5381;
            for &c in &cols {
                for b in input.render_cell(r, c).bytes() {
                    h = h.wrapping_mul(33).wrapping_add(b as u64);
                }
                h = h.wrapping_mul(33).wrapping_add(0x1f);
            }
            out.set_int(r, hash_col, h as i64);
        }
        Ok(Some(out))
    }
}

/// Assign the index of the half-open interval `[b_i, b_{i+1})`.
pub struct BinOp {
    column: String,
    boundaries: Vec<f64>,
}

impl BinOp {
    pub fn new(column: String, boundaries: Vec<f64>) -> Self {
        Self { column, boundaries }
    }
}

impl Transform for BinOp {
    fn name(&self) -> &'static str {
        "bin"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let result = format!("{}_bin", self.column);
        let mut out = extend_batch(&input, &[(result, CellType::Int64)]);
        let bin_col = input.n_cols();
        if let Some(c) = input.col_index(&self.column) {
            for r in 0..input.n_rows() {
                let Some(v) = input.numeric(r, c) else {
                    continue;
                };
                let idx = self
                    .boundaries
                    .windows(2)
                    .position(|w| v >= w[0] && v < w[1]);
                if let Some(idx) = idx {
                    out.set_int(r, bin_col, idx as i64);
                }
            }
        }
        Ok(Some(out))
    }
}

/// Deterministic train/test assignment via a seeded per-row coin.
pub struct SplitDataOp {
    ratio: f64,
    result: String,
    lcg: Lcg,
}

impl SplitDataOp {
    pub fn new(ratio: f64, result: String, seed: u64) -> Self {
        Self {
            ratio,
            result,
            lcg: Lcg::new(seed),
        }
    }
}

impl Transform for SplitDataOp {
    fn name(&self) -> &'static str {
        "split_data"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut out = extend_batch(&input, &[(self.result.clone(), CellType::Str)]);
        let col = input.n_cols();
        for r in 0..input.n_rows() {
            let label = if self.lcg.next_f64() < self.ratio {
                "train"
            } else {
                "test"
            };
            out.set_str(r, col, label);
        }
        Ok(Some(out))
    }
}

/// Min-max scaling with explicit bounds; the column becomes FLOAT64.
pub struct NormalizeOp {
    column: String,
    min: f64,
    max: f64,
}

impl NormalizeOp {
    pub fn new(column: String, min: f64, max: f64) -> Self {
        Self { column, min, max }
    }
}

impl Transform for NormalizeOp {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut schema = input.schema();
        let Some(c) = schema.col_index(&self.column) else {
            return Ok(Some(input));
        };
        schema.cols[c].1 = CellType::Float64;
        let span = self.max - self.min;
        let mut out = Batch::from_schema(&schema, input.n_rows().max(1));
        for r in 0..input.n_rows() {
            for col in 0..input.n_cols() {
                if col == c {
                    if let Some(v) = input.numeric(r, col) {
                        if span > 0.0 {
                            out.set_float(r, col, (v - self.min) / span);
                        }
                    }
                } else {
                    let v = input.value(r, col);
                    out.set_value(r, col, &v);
                }
            }
        }
        out.set_row_count(input.n_rows());
        Ok(Some(out))
    }
}

/// One 0/1 INT64 column per listed category value.
pub struct OnehotOp {
    column: String,
    values: Vec<String>,
}

impl OnehotOp {
    pub fn new(column: String, values: Vec<String>) -> Self {
        Self { column, values }
    }
}

impl Transform for OnehotOp {
    fn name(&self) -> &'static str {
        "onehot"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let extra: Vec<(String, CellType)> = self
            .values
            .iter()
            .map(|v| (format!("{}_{v}", self.column), CellType::Int64))
            .collect();
        let mut out = extend_batch(&input, &extra);
        let base = input.n_cols();
        let src = input.col_index(&self.column);
        for r in 0..input.n_rows() {
            let rendered = src.map(|c| input.render_cell(r, c));
            for (i, value) in self.values.iter().enumerate() {
                let hit = rendered.as_deref() == Some(value.as_str());
                out.set_int(r, base + i, hit as i64);
            }
        }
        Ok(Some(out))
    }
}

/// INT64 codes in order of first appearance.
pub struct LabelEncodeOp {
    column: String,
    result: String,
    codes: HashMap<String, i64>,
}

impl LabelEncodeOp {
    pub fn new(column: String, result: String) -> Self {
        Self {
            column,
            result,
            codes: HashMap::new(),
        }
    }
}

impl Transform for LabelEncodeOp {
    fn name(&self) -> &'static str {
        "label_encode"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut out = extend_batch(&input, &[(self.result.clone(), CellType::Int64)]);
        let dst = input.n_cols();
        if let Some(c) = input.col_index(&self.column) {
            for r in 0..input.n_rows() {
                if input.is_null(r, c) {
                    continue;
                }
                let key = input.render_cell(r, c);
                let next = self.codes.len() as i64;
                let code = *self.codes.entry(key).or_insert(next);
                out.set_int(r, dst, code);
            }
        }
        Ok(Some(out))
    }
}

/// Linear interpolation of null FLOAT64 runs; the last value of the previous
/// batch anchors a run that starts at a batch boundary.
pub struct InterpolateOp {
    columns: Option<Vec<String>>,
    last: HashMap<String, f64>,
}

impl InterpolateOp {
    pub fn new(columns: Option<Vec<String>>) -> Self {
        Self {
            columns,
            last: HashMap::new(),
        }
    }
}

impl Transform for InterpolateOp {
    fn name(&self) -> &'static str {
        "interpolate"
    }

    fn process(&mut self, mut input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let cols: Vec<usize> = match &self.columns {
            Some(names) => names.iter().filter_map(|n| input.col_index(n)).collect(),
            None => (0..input.n_cols()).collect(),
        };
        for c in cols {
            if input.col_type(c) != CellType::Float64 {
                continue;
            }
            let name = input.col_name(c).to_string();
            let mut left: Option<f64> = self.last.get(&name).copied();
            let mut run_start: Option<usize> = None;
            for r in 0..input.n_rows() {
                match input.get_float(r, c) {
                    Some(v) => {
                        if let (Some(start), Some(anchor)) = (run_start, left) {
                            let gap = (r - start + 1) as f64;
                            for (k, fill_row) in (start..r).enumerate() {
                                let t = (k + 1) as f64 / gap;
                                input.set_float(fill_row, c, anchor + (v - anchor) * t);
                            }
                        }
                        run_start = None;
                        left = Some(v);
                    }
                    None => {
                        if run_start.is_none() {
                            run_start = Some(r);
                        }
                    }
                }
            }
            if let Some(v) = left {
                self.last.insert(name, v);
            }
        }
        Ok(Some(input))
    }
}

/// Extract a calendar field into an INT64 column.
pub struct DatetimeOp {
    column: String,
    part: String,
    result: String,
}

impl DatetimeOp {
    pub fn new(column: String, part: String, result: String) -> Self {
        Self {
            column,
            part,
            result,
        }
    }
}

impl Transform for DatetimeOp {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut out = extend_batch(&input, &[(self.result.clone(), CellType::Int64)]);
        let dst = input.n_cols();
        if let Some(c) = input.col_index(&self.column) {
            let ty = input.col_type(c);
            for r in 0..input.n_rows() {
                let raw = match ty {
                    CellType::Date => input.get_date(r, c).map(|d| d as i64),
                    CellType::Timestamp => input.get_timestamp(r, c),
                    _ => None,
                };
                if let Some(raw) = raw {
                    if let Some(v) = datetime_part(ty, raw, &self.part) {
                        out.set_int(r, dst, v);
                    }
                }
            }
        }
        Ok(Some(out))
    }
}

/// Truncate DATE / TIMESTAMP cells to a calendar unit, in place.
pub struct DateTruncOp {
    column: String,
    unit: String,
}

impl DateTruncOp {
    pub fn new(column: String, unit: String) -> Self {
        Self { column, unit }
    }
}

impl Transform for DateTruncOp {
    fn name(&self) -> &'static str {
        "date_trunc"
    }

    fn process(&mut self, mut input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let Some(c) = input.col_index(&self.column) else {
            return Ok(Some(input));
        };
        match input.col_type(c) {
            CellType::Date => {
                for r in 0..input.n_rows() {
                    if let Some(d) = input.get_date(r, c) {
                        match truncate_date(d, &self.unit) {
                            Some(t) => input.set_date(r, c, t),
                            None => input.set_null(r, c),
                        }
                    }
                }
            }
            CellType::Timestamp => {
                for r in 0..input.n_rows() {
                    if let Some(t) = input.get_timestamp(r, c) {
                        match truncate_timestamp(t, &self.unit) {
                            Some(t) => input.set_timestamp(r, c, t),
                            None => input.set_null(r, c),
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(Some(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabflow_core::value::format_timestamp;

    fn side() -> SideChannels {
        SideChannels::new()
    }

    fn nums() -> Batch {
        let mut b = Batch::new(2, 8);
        b.set_schema(0, "name", CellType::Str);
        b.set_schema(1, "x", CellType::Int64);
        for (r, (name, x)) in [("a", 1), ("b", 5), ("c", 10)].iter().enumerate() {
            b.set_str(r, 0, name);
            b.set_int(r, 1, *x);
        }
        b.set_row_count(3);
        b
    }

    #[test]
    fn derive_appends_typed_columns() {
        let mut op = DeriveOp::new(vec![
            ("double".to_string(), Expr::parse("col(x) * 2").unwrap()),
            ("tag".to_string(), Expr::parse("col(name) + '!'").unwrap()),
        ]);
        let out = op.process(nums(), &mut side()).unwrap().unwrap();
        assert_eq!(out.n_cols(), 4);
        assert_eq!(out.col_type(2), CellType::Int64);
        assert_eq!(out.get_int(2, 2), Some(20));
        assert_eq!(out.get_str(0, 3), Some("a!"));
    }

    #[test]
    fn cast_string_to_date_and_back() {
        let mut b = Batch::new(1, 4);
        b.set_schema(0, "d", CellType::Str);
        b.set_str(0, 0, "2024-03-15");
        b.set_str(1, 0, "not a date");
        b.set_row_count(2);

        let mut op = CastOp::new(vec![("d".to_string(), CellType::Date)]);
        let out = op.process(b, &mut side()).unwrap().unwrap();
        assert_eq!(out.col_type(0), CellType::Date);
        assert_eq!(out.render_cell(0, 0), "2024-03-15");
        assert!(out.is_null(1, 0));
    }

    #[test]
    fn cast_date_to_timestamp_is_midnight_utc() {
        let days = parse_date("2024-03-15").unwrap();
        let v = cast_value(&Value::Date(days), CellType::Timestamp);
        assert_eq!(v, Value::Timestamp(days as i64 * 86_400));
        assert_eq!(format_timestamp(days as i64 * 86_400), "2024-03-15T00:00:00Z");
    }

    #[test]
    fn hash_is_stable_and_sensitive() {
        let mut op = HashOp::new(None);
        let out = op.process(nums(), &mut side()).unwrap().unwrap();
        assert_eq!(out.col_name(2), "_hash");
        let h0 = out.get_int(0, 2).unwrap();
        let h1 = out.get_int(1, 2).unwrap();
        assert_ne!(h0, h1);

        let mut op2 = HashOp::new(None);
        let again = op2.process(nums(), &mut side()).unwrap().unwrap();
        assert_eq!(again.get_int(0, 2), Some(h0));
    }

    #[test]
    fn bin_assigns_interval_indexes() {
        let mut op = BinOp::new("x".into(), vec![0.0, 4.0, 8.0, 12.0]);
        let out = op.process(nums(), &mut side()).unwrap().unwrap();
        assert_eq!(out.get_int(0, 2), Some(0));
        assert_eq!(out.get_int(1, 2), Some(1));
        assert_eq!(out.get_int(2, 2), Some(2));
    }

    #[test]
    fn bin_out_of_range_is_null() {
        let mut op = BinOp::new("x".into(), vec![100.0, 200.0]);
        let out = op.process(nums(), &mut side()).unwrap().unwrap();
        assert!(out.is_null(0, 2));
    }

    #[test]
    fn split_data_is_deterministic() {
        let mut a = SplitDataOp::new(0.8, "split".into(), 42);
        let mut b = SplitDataOp::new(0.8, "split".into(), 42);
        let out_a = a.process(nums(), &mut side()).unwrap().unwrap();
        let out_b = b.process(nums(), &mut side()).unwrap().unwrap();
        for r in 0..3 {
            assert_eq!(out_a.get_str(r, 2), out_b.get_str(r, 2));
            assert!(matches!(out_a.get_str(r, 2), Some("train") | Some("test")));
        }
    }

    #[test]
    fn normalize_scales_into_unit_interval() {
        let mut op = NormalizeOp::new("x".into(), 0.0, 10.0);
        let out = op.process(nums(), &mut side()).unwrap().unwrap();
        assert_eq!(out.col_type(1), CellType::Float64);
        assert_eq!(out.get_float(0, 1), Some(0.1));
        assert_eq!(out.get_float(2, 1), Some(1.0));
    }

    #[test]
    fn onehot_explicit_categories() {
        let mut op = OnehotOp::new("name".into(), vec!["a".into(), "c".into()]);
        let out = op.process(nums(), &mut side()).unwrap().unwrap();
        assert_eq!(out.col_name(2), "name_a");
        assert_eq!(out.get_int(0, 2), Some(1));
        assert_eq!(out.get_int(1, 2), Some(0));
        assert_eq!(out.get_int(2, 3), Some(1));
    }

    #[test]
    fn label_encode_first_appearance_order() {
        let mut op = LabelEncodeOp::new("name".into(), "name_code".into());
        let out = op.process(nums(), &mut side()).unwrap().unwrap();
        assert_eq!(out.get_int(0, 2), Some(0));
        assert_eq!(out.get_int(1, 2), Some(1));
        assert_eq!(out.get_int(2, 2), Some(2));

        // codes persist across batches
        let out2 = op.process(nums(), &mut side()).unwrap().unwrap();
        assert_eq!(out2.get_int(0, 2), Some(0));
    }

    #[test]
    fn interpolate_fills_interior_runs() {
        let mut b = Batch::new(1, 8);
        b.set_schema(0, "v", CellType::Float64);
        b.set_float(0, 0, 1.0);
        b.set_float(3, 0, 4.0);
        b.set_row_count(5); // rows 1,2 null inside, row 4 trailing null

        let mut op = InterpolateOp::new(None);
        let out = op.process(b, &mut side()).unwrap().unwrap();
        assert_eq!(out.get_float(1, 0), Some(2.0));
        assert_eq!(out.get_float(2, 0), Some(3.0));
        assert!(out.is_null(4, 0)); // no right anchor
    }

    #[test]
    fn datetime_extracts_parts() {
        let mut b = Batch::new(1, 4);
        b.set_schema(0, "d", CellType::Date);
        b.set_date(0, 0, parse_date("2024-03-15").unwrap());
        b.set_row_count(1);

        let mut op = DatetimeOp::new("d".into(), "month".into(), "d_month".into());
        let out = op.process(b, &mut side()).unwrap().unwrap();
        assert_eq!(out.get_int(0, 1), Some(3));
    }

    #[test]
    fn date_trunc_to_month() {
        let mut b = Batch::new(1, 4);
        b.set_schema(0, "t", CellType::Timestamp);
        b.set_timestamp(0, 0, parse_timestamp("2024-03-15T10:30:45Z").unwrap());
        b.set_row_count(1);

        let mut op = DateTruncOp::new("t".into(), "month".into());
        let out = op.process(b, &mut side()).unwrap().unwrap();
        assert_eq!(out.render_cell(0, 0), "2024-03-01T00:00:00Z");
    }
}
