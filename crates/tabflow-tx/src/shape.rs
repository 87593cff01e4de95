//! Row-shape transforms: explode (one row → many), split (one column →
//! several) and unpivot (wide → long).

use anyhow::Result;
use tabflow_core::{Batch, CellType, Schema, SideChannels, Transform, Value};

/// Split a string cell and emit one output row per token.
pub struct ExplodeOp {
    column: String,
    delimiter: String,
}

impl ExplodeOp {
    pub fn new(column: String, delimiter: String) -> Self {
        Self { column, delimiter }
    }
}

impl Transform for ExplodeOp {
    fn name(&self) -> &'static str {
        "explode"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let Some(c) = input.col_index(&self.column) else {
            return Ok(Some(input));
        };
        let mut out = Batch::from_schema(&input.schema(), input.n_rows().max(1));
        for r in 0..input.n_rows() {
            match input.get_str(r, c) {
                Some(cell) => {
                    let tokens: Vec<String> =
                        cell.split(self.delimiter.as_str()).map(str::to_string).collect();
                    for token in tokens {
                        let dst = out.append_row_from(&input, r);
                        out.set_str(dst, c, &token);
                    }
                }
                None => {
                    out.append_row_from(&input, r);
                }
            }
        }
        Ok(Some(out))
    }
}

/// Split one column into several named columns.
pub struct SplitOp {
    column: String,
    names: Vec<String>,
    delimiter: String,
}

impl SplitOp {
    pub fn new(column: String, names: Vec<String>, delimiter: String) -> Self {
        Self {
            column,
            names,
            delimiter,
        }
    }
}

impl Transform for SplitOp {
    fn name(&self) -> &'static str {
        "split"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let Some(src) = input.col_index(&self.column) else {
            return Ok(Some(input));
        };
        let kept: Vec<usize> = (0..input.n_cols()).filter(|&c| c != src).collect();
        let mut cols: Vec<(String, CellType)> = kept
            .iter()
            .map(|&c| (input.col_name(c).to_string(), input.col_type(c)))
            .collect();
        for name in &self.names {
            cols.push((name.clone(), CellType::Str));
        }
        let schema = Schema::of(cols);
        let mut out = Batch::from_schema(&schema, input.n_rows().max(1));
        for r in 0..input.n_rows() {
            for (dst, &c) in kept.iter().enumerate() {
                let v = input.value(r, c);
                out.set_value(r, dst, &v);
            }
            if let Some(cell) = input.get_str(r, src) {
                let mut tokens = cell.split(self.delimiter.as_str());
                for (i, _) in self.names.iter().enumerate() {
                    if let Some(token) = tokens.next() {
                        out.set_str(r, kept.len() + i, token);
                    }
                }
            }
        }
        out.set_row_count(input.n_rows());
        Ok(Some(out))
    }
}

/// Melt the listed columns into `(name, value)` pairs.
pub struct UnpivotOp {
    columns: Vec<String>,
}

impl UnpivotOp {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }
}

impl Transform for UnpivotOp {
    fn name(&self) -> &'static str {
        "unpivot"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let melted: Vec<usize> = self
            .columns
            .iter()
            .filter_map(|n| input.col_index(n))
            .collect();
        let kept: Vec<usize> = (0..input.n_cols())
            .filter(|c| !melted.contains(c))
            .collect();
        let mut cols: Vec<(String, CellType)> = kept
            .iter()
            .map(|&c| (input.col_name(c).to_string(), input.col_type(c)))
            .collect();
        cols.push(("name".to_string(), CellType::Str));
        cols.push(("value".to_string(), CellType::Str));
        let schema = Schema::of(cols);

        let mut out = Batch::from_schema(&schema, (input.n_rows() * melted.len()).max(1));
        let mut dst = 0;
        for r in 0..input.n_rows() {
            for &m in &melted {
                out.ensure_capacity(dst + 1);
                for (i, &c) in kept.iter().enumerate() {
                    let v = input.value(r, c);
                    out.set_value(dst, i, &v);
                }
                out.set_str(dst, kept.len(), input.col_name(m));
                match input.value(r, m) {
                    Value::Null => {}
                    v => out.set_str(dst, kept.len() + 1, &v.render()),
                }
                dst += 1;
            }
        }
        out.set_row_count(dst);
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side() -> SideChannels {
        SideChannels::new()
    }

    #[test]
    fn explode_multiplies_rows() {
        let mut b = Batch::new(2, 4);
        b.set_schema(0, "id", CellType::Int64);
        b.set_schema(1, "tags", CellType::Str);
        b.set_int(0, 0, 1);
        b.set_str(0, 1, "a,b,c");
        b.set_int(1, 0, 2);
        b.set_row_count(2); // second row's tags is null

        let mut op = ExplodeOp::new("tags".into(), ",".into());
        let out = op.process(b, &mut side()).unwrap().unwrap();
        assert_eq!(out.n_rows(), 4);
        assert_eq!(out.get_str(0, 1), Some("a"));
        assert_eq!(out.get_str(2, 1), Some("c"));
        assert_eq!(out.get_int(2, 0), Some(1));
        assert!(out.is_null(3, 1));
    }

    #[test]
    fn split_into_named_columns() {
        let mut b = Batch::new(1, 4);
        b.set_schema(0, "full", CellType::Str);
        b.set_str(0, 0, "Jane Doe");
        b.set_str(1, 0, "Cher");
        b.set_row_count(2);

        let mut op = SplitOp::new(
            "full".into(),
            vec!["first".into(), "last".into()],
            " ".into(),
        );
        let out = op.process(b, &mut side()).unwrap().unwrap();
        assert_eq!(out.n_cols(), 2);
        assert_eq!(out.col_name(0), "first");
        assert_eq!(out.get_str(0, 0), Some("Jane"));
        assert_eq!(out.get_str(0, 1), Some("Doe"));
        assert_eq!(out.get_str(1, 0), Some("Cher"));
        assert!(out.is_null(1, 1));
    }

    #[test]
    fn unpivot_melts_wide_to_long() {
        let mut b = Batch::new(3, 4);
        b.set_schema(0, "id", CellType::Int64);
        b.set_schema(1, "q1", CellType::Int64);
        b.set_schema(2, "q2", CellType::Int64);
        b.set_int(0, 0, 7);
        b.set_int(0, 1, 10);
        b.set_int(0, 2, 20);
        b.set_row_count(1);

        let mut op = UnpivotOp::new(vec!["q1".into(), "q2".into()]);
        let out = op.process(b, &mut side()).unwrap().unwrap();
        assert_eq!(out.n_rows(), 2);
        assert_eq!(out.col_name(1), "name");
        assert_eq!(out.get_str(0, 1), Some("q1"));
        assert_eq!(out.get_str(0, 2), Some("10"));
        assert_eq!(out.get_str(1, 1), Some("q2"));
        assert_eq!(out.get_int(0, 0), Some(7));
    }
}
