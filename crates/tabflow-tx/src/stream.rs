//! Row-by-row streaming operators: predicate filters, row windows over the
//! stream head, column projection and per-cell rewrites.

use crate::expr::Expr;
use crate::project::cast_value;
use anyhow::Result;
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use tabflow_core::value::coerce;
use tabflow_core::{Batch, CellType, SideChannels, Transform, Value};

/// Keep rows the oracle accepts; rows where evaluation fails are dropped.
pub struct FilterOp {
    expr: Expr,
}

impl FilterOp {
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }
}

impl Transform for FilterOp {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut out = Batch::from_schema(&input.schema(), input.n_rows().max(1));
        for r in 0..input.n_rows() {
            if self.expr.eval_bool(&input, r) {
                out.append_row_from(&input, r);
            }
        }
        Ok(Some(out))
    }
}

/// Like `filter`, but each rejected row leaves a descriptor on ERRORS.
pub struct ValidateOp {
    expr: Expr,
    row_no: u64,
}

impl ValidateOp {
    pub fn new(expr: Expr) -> Self {
        Self { expr, row_no: 0 }
    }
}

impl Transform for ValidateOp {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn process(&mut self, input: Batch, side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut out = Batch::from_schema(&input.schema(), input.n_rows().max(1));
        for r in 0..input.n_rows() {
            self.row_no += 1;
            if self.expr.eval_bool(&input, r) {
                out.append_row_from(&input, r);
            } else {
                side.error_line(&json!({
                    "op": "validate",
                    "row": self.row_no,
                    "expr": self.expr.text(),
                }));
            }
        }
        Ok(Some(out))
    }
}

/// Substring or regex match over the rendered row text.
pub struct GrepOp {
    pattern: String,
    regex: Option<Regex>,
    column: Option<String>,
    invert: bool,
}

impl GrepOp {
    pub fn new(pattern: String, regex: Option<Regex>, column: Option<String>, invert: bool) -> Self {
        Self {
            pattern,
            regex,
            column,
            invert,
        }
    }

    fn cell_matches(&self, text: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(text),
            None => text.contains(&self.pattern),
        }
    }

    fn row_matches(&self, batch: &Batch, row: usize) -> bool {
        let cols: Vec<usize> = match &self.column {
            Some(name) => batch.col_index(name).into_iter().collect(),
            None => (0..batch.n_cols()).collect(),
        };
        cols.iter()
            .any(|&c| self.cell_matches(&batch.render_cell(row, c)))
    }
}

impl Transform for GrepOp {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut out = Batch::from_schema(&input.schema(), input.n_rows().max(1));
        for r in 0..input.n_rows() {
            if self.row_matches(&input, r) != self.invert {
                out.append_row_from(&input, r);
            }
        }
        Ok(Some(out))
    }
}

/// Emit the first `n` rows, then drop every remaining batch.
pub struct HeadOp {
    n: usize,
    seen: usize,
}

impl HeadOp {
    pub fn new(n: usize) -> Self {
        Self { n, seen: 0 }
    }
}

impl Transform for HeadOp {
    fn name(&self) -> &'static str {
        "head"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if self.seen >= self.n {
            return Ok(None);
        }
        let remaining = self.n - self.seen;
        if input.n_rows() <= remaining {
            self.seen += input.n_rows();
            return Ok(Some(input));
        }
        let mut out = Batch::from_schema(&input.schema(), remaining.max(1));
        for r in 0..remaining {
            out.append_row_from(&input, r);
        }
        self.seen = self.n;
        Ok(Some(out))
    }
}

/// Discard the first `n` rows, then pass everything through unchanged.
pub struct SkipOp {
    n: usize,
    seen: usize,
}

impl SkipOp {
    pub fn new(n: usize) -> Self {
        Self { n, seen: 0 }
    }
}

impl Transform for SkipOp {
    fn name(&self) -> &'static str {
        "skip"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if self.seen >= self.n {
            return Ok(Some(input));
        }
        let to_skip = self.n - self.seen;
        if input.n_rows() <= to_skip {
            self.seen += input.n_rows();
            return Ok(None);
        }
        let mut out = Batch::from_schema(&input.schema(), input.n_rows() - to_skip);
        for r in to_skip..input.n_rows() {
            out.append_row_from(&input, r);
        }
        self.seen = self.n;
        Ok(Some(out))
    }
}

/// Reorder and drop columns; names missing from a batch are ignored.
pub struct SelectOp {
    columns: Vec<String>,
}

impl SelectOp {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }
}

impl Transform for SelectOp {
    fn name(&self) -> &'static str {
        "select"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let picked: Vec<usize> = self
            .columns
            .iter()
            .filter_map(|name| input.col_index(name))
            .collect();
        let mut out = Batch::new(picked.len(), input.n_rows().max(1));
        for (dst, &src) in picked.iter().enumerate() {
            out.set_schema(dst, input.col_name(src), input.col_type(src));
        }
        for r in 0..input.n_rows() {
            for (dst, &src) in picked.iter().enumerate() {
                let v = input.value(r, src);
                out.set_value(r, dst, &v);
            }
        }
        out.set_row_count(input.n_rows());
        Ok(Some(out))
    }
}

/// Apply a per-name mapping; unlisted columns pass unchanged.
pub struct RenameOp {
    mapping: HashMap<String, String>,
}

impl RenameOp {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }
}

impl Transform for RenameOp {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn process(&mut self, mut input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        for c in 0..input.n_cols() {
            if let Some(new) = self.mapping.get(input.col_name(c)) {
                let new = new.clone();
                input.set_col_name(c, &new);
            }
        }
        Ok(Some(input))
    }
}

/// Strip ASCII whitespace from string cells.
pub struct TrimOp {
    columns: Option<Vec<String>>,
}

impl TrimOp {
    pub fn new(columns: Option<Vec<String>>) -> Self {
        Self { columns }
    }
}

fn selected_cols(batch: &Batch, columns: &Option<Vec<String>>) -> Vec<usize> {
    match columns {
        Some(names) => names.iter().filter_map(|n| batch.col_index(n)).collect(),
        None => (0..batch.n_cols()).collect(),
    }
}

impl Transform for TrimOp {
    fn name(&self) -> &'static str {
        "trim"
    }

    fn process(&mut self, mut input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        for c in selected_cols(&input, &self.columns) {
            if input.col_type(c) != CellType::Str {
                continue;
            }
            for r in 0..input.n_rows() {
                let trimmed = input
                    .get_str(r, c)
                    .filter(|s| s.trim_matches([' ', '\t', '\r', '\n']) != *s)
                    .map(|s| s.trim_matches([' ', '\t', '\r', '\n']).to_string());
                if let Some(t) = trimmed {
                    input.set_str(r, c, &t);
                }
            }
        }
        Ok(Some(input))
    }
}

/// Replace null cells with a per-column constant.
pub struct FillNullOp {
    mapping: Vec<(String, Value)>,
}

impl FillNullOp {
    pub fn new(mapping: Vec<(String, Value)>) -> Self {
        Self { mapping }
    }
}

impl Transform for FillNullOp {
    fn name(&self) -> &'static str {
        "fill_null"
    }

    fn process(&mut self, mut input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        for (name, value) in &self.mapping {
            let Some(c) = input.col_index(name) else {
                continue;
            };
            let fill = cast_value(value, input.col_type(c));
            if fill.is_null() {
                continue;
            }
            for r in 0..input.n_rows() {
                if input.is_null(r, c) {
                    input.set_value(r, c, &fill);
                }
            }
        }
        Ok(Some(input))
    }
}

/// Carry the last non-null value down each column, across batches.
pub struct FillDownOp {
    columns: Option<Vec<String>>,
    last: HashMap<String, Value>,
}

impl FillDownOp {
    pub fn new(columns: Option<Vec<String>>) -> Self {
        Self {
            columns,
            last: HashMap::new(),
        }
    }
}

impl Transform for FillDownOp {
    fn name(&self) -> &'static str {
        "fill_down"
    }

    fn process(&mut self, mut input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        for c in selected_cols(&input, &self.columns) {
            let name = input.col_name(c).to_string();
            for r in 0..input.n_rows() {
                if input.is_null(r, c) {
                    if let Some(v) = self.last.get(&name) {
                        let v = coerce(v, input.col_type(c));
                        input.set_value(r, c, &v);
                    }
                } else {
                    self.last.insert(name.clone(), input.value(r, c));
                }
            }
        }
        Ok(Some(input))
    }
}

/// Clamp numeric values into `[min, max]`.
pub struct ClipOp {
    column: String,
    min: Option<f64>,
    max: Option<f64>,
}

impl ClipOp {
    pub fn new(column: String, min: Option<f64>, max: Option<f64>) -> Self {
        Self { column, min, max }
    }
}

impl Transform for ClipOp {
    fn name(&self) -> &'static str {
        "clip"
    }

    fn process(&mut self, mut input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let Some(c) = input.col_index(&self.column) else {
            return Ok(Some(input));
        };
        for r in 0..input.n_rows() {
            let Some(v) = input.numeric(r, c) else {
                continue;
            };
            let mut clamped = v;
            if let Some(min) = self.min {
                clamped = clamped.max(min);
            }
            if let Some(max) = self.max {
                clamped = clamped.min(max);
            }
            if clamped != v {
                match input.col_type(c) {
                    CellType::Int64 => input.set_int(r, c, clamped as i64),
                    CellType::Float64 => input.set_float(r, c, clamped),
                    _ => {}
                }
            }
        }
        Ok(Some(input))
    }
}

/// Substring or regex substitution over one string column.
pub struct ReplaceOp {
    column: String,
    pattern: String,
    replacement: String,
    regex: Option<Regex>,
}

impl ReplaceOp {
    pub fn new(
        column: String,
        pattern: String,
        replacement: String,
        regex: Option<Regex>,
    ) -> Self {
        Self {
            column,
            pattern,
            replacement,
            regex,
        }
    }
}

impl Transform for ReplaceOp {
    fn name(&self) -> &'static str {
        "replace"
    }

    fn process(&mut self, mut input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let Some(c) = input.col_index(&self.column) else {
            return Ok(Some(input));
        };
        if input.col_type(c) != CellType::Str {
            return Ok(Some(input));
        }
        for r in 0..input.n_rows() {
            let replaced = input.get_str(r, c).map(|s| match &self.regex {
                Some(re) => re.replace_all(s, self.replacement.as_str()).into_owned(),
                None => s.replace(&self.pattern, &self.replacement),
            });
            if let Some(s) = replaced {
                input.set_str(r, c, &s);
            }
        }
        Ok(Some(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Batch {
        let mut b = Batch::new(2, 8);
        b.set_schema(0, "name", CellType::Str);
        b.set_schema(1, "age", CellType::Int64);
        for (r, (name, age)) in [("Alice", 30), ("Bob", 25), ("Charlie", 35)]
            .iter()
            .enumerate()
        {
            b.set_str(r, 0, name);
            b.set_int(r, 1, *age);
        }
        b.set_row_count(3);
        b
    }

    fn side() -> SideChannels {
        SideChannels::new()
    }

    #[test]
    fn filter_keeps_matching_rows() {
        let mut op = FilterOp::new(Expr::parse("col(age) > 27").unwrap());
        let out = op.process(people(), &mut side()).unwrap().unwrap();
        assert_eq!(out.n_rows(), 2);
        assert_eq!(out.get_str(0, 0), Some("Alice"));
        assert_eq!(out.get_str(1, 0), Some("Charlie"));
    }

    #[test]
    fn validate_reports_failures() {
        let mut s = side();
        let mut op = ValidateOp::new(Expr::parse("col(age) < 32").unwrap());
        let out = op.process(people(), &mut s).unwrap().unwrap();
        assert_eq!(out.n_rows(), 2);
        let errors = String::from_utf8(s.errors.take_all()).unwrap();
        assert!(errors.contains("\"row\":3"));
    }

    #[test]
    fn head_stops_after_n_total() {
        let mut op = HeadOp::new(4);
        let out1 = op.process(people(), &mut side()).unwrap().unwrap();
        assert_eq!(out1.n_rows(), 3);
        let out2 = op.process(people(), &mut side()).unwrap().unwrap();
        assert_eq!(out2.n_rows(), 1);
        assert!(op.process(people(), &mut side()).unwrap().is_none());
    }

    #[test]
    fn skip_discards_then_passes() {
        let mut op = SkipOp::new(4);
        assert!(op.process(people(), &mut side()).unwrap().is_none());
        let out = op.process(people(), &mut side()).unwrap().unwrap();
        assert_eq!(out.n_rows(), 2);
        assert_eq!(out.get_str(0, 0), Some("Bob"));
    }

    #[test]
    fn select_reorders_and_drops() {
        let mut op = SelectOp::new(vec!["age".into(), "name".into()]);
        let out = op.process(people(), &mut side()).unwrap().unwrap();
        assert_eq!(out.n_cols(), 2);
        assert_eq!(out.col_name(0), "age");
        assert_eq!(out.get_int(0, 0), Some(30));
        assert_eq!(out.get_str(0, 1), Some("Alice"));
    }

    #[test]
    fn select_is_idempotent() {
        let cols = vec!["name".into()];
        let mut op1 = SelectOp::new(cols.clone());
        let once = op1.process(people(), &mut side()).unwrap().unwrap();
        let mut op2 = SelectOp::new(cols);
        let twice = op2.process(once, &mut side()).unwrap().unwrap();
        assert_eq!(twice.n_cols(), 1);
        assert_eq!(twice.get_str(2, 0), Some("Charlie"));
    }

    #[test]
    fn rename_maps_listed_columns() {
        let mut mapping = HashMap::new();
        mapping.insert("name".to_string(), "who".to_string());
        let mut op = RenameOp::new(mapping);
        let out = op.process(people(), &mut side()).unwrap().unwrap();
        assert_eq!(out.col_name(0), "who");
        assert_eq!(out.col_name(1), "age");
    }

    #[test]
    fn grep_substring_and_invert() {
        let mut op = GrepOp::new("li".into(), None, None, false);
        let out = op.process(people(), &mut side()).unwrap().unwrap();
        assert_eq!(out.n_rows(), 2); // Alice, Charlie

        let mut inv = GrepOp::new("li".into(), None, None, true);
        let out = inv.process(people(), &mut side()).unwrap().unwrap();
        assert_eq!(out.n_rows(), 1);
        assert_eq!(out.get_str(0, 0), Some("Bob"));
    }

    #[test]
    fn trim_is_idempotent() {
        let mut b = Batch::new(1, 4);
        b.set_schema(0, "v", CellType::Str);
        b.set_str(0, 0, "  padded\t");
        b.set_row_count(1);

        let mut op = TrimOp::new(None);
        let out = op.process(b, &mut side()).unwrap().unwrap();
        assert_eq!(out.get_str(0, 0), Some("padded"));
        let mut op2 = TrimOp::new(None);
        let out = op2.process(out, &mut side()).unwrap().unwrap();
        assert_eq!(out.get_str(0, 0), Some("padded"));
    }

    #[test]
    fn fill_null_and_fill_down() {
        let mut b = Batch::new(1, 8);
        b.set_schema(0, "x", CellType::Int64);
        b.set_int(0, 0, 1);
        b.set_row_count(3); // rows 1 and 2 null

        let mut down = FillDownOp::new(None);
        let out = down.process(b, &mut side()).unwrap().unwrap();
        assert_eq!(out.get_int(1, 0), Some(1));
        assert_eq!(out.get_int(2, 0), Some(1));

        let mut b2 = Batch::new(1, 4);
        b2.set_schema(0, "x", CellType::Int64);
        b2.set_row_count(1);
        let mut fill = FillNullOp::new(vec![("x".to_string(), Value::Int(9))]);
        let out = fill.process(b2, &mut side()).unwrap().unwrap();
        assert_eq!(out.get_int(0, 0), Some(9));
    }

    #[test]
    fn fill_down_carries_across_batches() {
        let mut down = FillDownOp::new(None);
        let mut first = Batch::new(1, 4);
        first.set_schema(0, "x", CellType::Int64);
        first.set_int(0, 0, 7);
        first.set_row_count(1);
        down.process(first, &mut side()).unwrap();

        let mut second = Batch::new(1, 4);
        second.set_schema(0, "x", CellType::Int64);
        second.set_row_count(2);
        let out = down.process(second, &mut side()).unwrap().unwrap();
        assert_eq!(out.get_int(0, 0), Some(7));
        assert_eq!(out.get_int(1, 0), Some(7));
    }

    #[test]
    fn clip_clamps_numeric() {
        let mut op = ClipOp::new("age".into(), Some(26.0), Some(32.0));
        let out = op.process(people(), &mut side()).unwrap().unwrap();
        assert_eq!(out.get_int(0, 1), Some(30));
        assert_eq!(out.get_int(1, 1), Some(26));
        assert_eq!(out.get_int(2, 1), Some(32));
    }

    #[test]
    fn replace_substring_and_regex() {
        let mut op = ReplaceOp::new("name".into(), "li".into(), "LI".into(), None);
        let out = op.process(people(), &mut side()).unwrap().unwrap();
        assert_eq!(out.get_str(0, 0), Some("ALIce"));

        let re = Regex::new("^B").unwrap();
        let mut op = ReplaceOp::new("name".into(), String::new(), "R".into(), Some(re));
        let out = op.process(out, &mut side()).unwrap().unwrap();
        assert_eq!(out.get_str(1, 0), Some("Rob"));
    }
}
