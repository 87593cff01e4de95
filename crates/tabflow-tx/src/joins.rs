//! File-backed aggregates: hash join against a side CSV and row stacking.
//!
//! Both buffer the primary input and read the second file on flush, through
//! the full CSV decoder so quoting and type autodetection behave exactly like
//! the pipeline's own input.

use crate::util::{batch_from_rows, tuple_key, Collector};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tabflow_core::{Batch, CellType, Decode, FlowError, Schema, SideChannels, Transform, Value};
use tabflow_io::csv::{CsvDecoder, DEFAULT_BATCH_ROWS};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinHow {
    Inner,
    Left,
}

impl JoinHow {
    pub fn parse(name: &str) -> Option<JoinHow> {
        match name {
            "inner" => Some(JoinHow::Inner),
            "left" => Some(JoinHow::Left),
            _ => None,
        }
    }
}

/// Decode an entire CSV file into one collector.
fn read_csv_file(path: &str, side: &mut SideChannels) -> Result<Collector> {
    let bytes = std::fs::read(path).with_context(|| format!("read {path}"))?;
    let mut decoder = CsvDecoder::new(b',', true, false, DEFAULT_BATCH_ROWS);
    let mut collected = Collector::new();
    for batch in decoder.push(&bytes, side)? {
        collected.absorb(&batch);
    }
    if let Some(batch) = decoder.flush(side)? {
        collected.absorb(&batch);
    }
    info!(path, rows = collected.n_rows(), "side file decoded");
    Ok(collected)
}

/// Parse the `on` argument: one shared name, or `lhs=rhs`.
pub fn parse_on(on: &str) -> (String, String) {
    match on.split_once('=') {
        Some((l, r)) => (l.trim().to_string(), r.trim().to_string()),
        None => (on.trim().to_string(), on.trim().to_string()),
    }
}

/// Hash join against a CSV file read on flush.
pub struct JoinOp {
    file: String,
    left_on: String,
    right_on: String,
    how: JoinHow,
    left: Collector,
}

impl JoinOp {
    pub fn new(file: String, on: &str, how: JoinHow) -> Self {
        let (left_on, right_on) = parse_on(on);
        Self {
            file,
            left_on,
            right_on,
            how,
            left: Collector::new(),
        }
    }
}

impl Transform for JoinOp {
    fn name(&self) -> &'static str {
        "join"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        self.left.absorb(&input);
        Ok(None)
    }

    fn flush(&mut self, side: &mut SideChannels) -> Result<Option<Batch>> {
        let left = std::mem::take(&mut self.left);
        let Some(left_schema) = left.schema.clone() else {
            return Ok(None);
        };
        let right = read_csv_file(&self.file, side)?;
        let right_schema = right.schema.clone().unwrap_or_else(Schema::unknown);

        let left_key = left_schema
            .col_index(&self.left_on)
            .ok_or_else(|| FlowError::BadArg {
                op: "join".to_string(),
                msg: format!("left side has no column `{}`", self.left_on),
            })?;
        let right_key = right_schema
            .col_index(&self.right_on)
            .ok_or_else(|| FlowError::BadArg {
                op: "join".to_string(),
                msg: format!("`{}` has no column `{}`", self.file, self.right_on),
            })?;

        // build side: key -> right row indexes, first-seen order preserved
        let mut build: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, row) in right.rows.iter().enumerate() {
            let key = tuple_key(std::slice::from_ref(&row[right_key]));
            build.entry(key).or_default().push(i);
        }

        let carried: Vec<usize> = (0..right_schema.n_cols())
            .filter(|&c| c != right_key)
            .collect();
        let mut cols = left_schema.cols.clone();
        for &c in &carried {
            cols.push(right_schema.cols[c].clone());
        }
        let schema = Schema::of(cols);

        let mut rows: Vec<Vec<Value>> = Vec::new();
        for lrow in &left.rows {
            let key = tuple_key(std::slice::from_ref(&lrow[left_key]));
            match build.get(&key) {
                Some(matches) => {
                    for &ri in matches {
                        let mut row = lrow.clone();
                        for &c in &carried {
                            row.push(right.rows[ri][c].clone());
                        }
                        rows.push(row);
                    }
                }
                None if self.how == JoinHow::Left => {
                    let mut row = lrow.clone();
                    row.resize(schema.n_cols(), Value::Null);
                    rows.push(row);
                }
                None => {}
            }
        }
        Ok(Some(batch_from_rows(&schema, &rows)))
    }
}

/// Append the rows of a second CSV, aligned to the primary schema by name.
pub struct StackOp {
    file: String,
    tag: Option<String>,
    tag_value: Option<String>,
    primary: Collector,
}

impl StackOp {
    pub fn new(file: String, tag: Option<String>, tag_value: Option<String>) -> Self {
        Self {
            file,
            tag,
            tag_value,
            primary: Collector::new(),
        }
    }
}

impl Transform for StackOp {
    fn name(&self) -> &'static str {
        "stack"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        self.primary.absorb(&input);
        Ok(None)
    }

    fn flush(&mut self, side: &mut SideChannels) -> Result<Option<Batch>> {
        let primary = std::mem::take(&mut self.primary);
        let Some(mut schema) = primary.schema.clone() else {
            return Ok(None);
        };
        let stacked = read_csv_file(&self.file, side)?;
        let stacked_schema = stacked.schema.clone().unwrap_or_else(Schema::unknown);

        // map each primary column to its position in the stacked file
        let source: Vec<Option<usize>> = schema
            .cols
            .iter()
            .map(|(name, _)| stacked_schema.col_index(name))
            .collect();

        let base_cols = schema.n_cols();
        if let Some(tag) = &self.tag {
            schema.cols.push((tag.clone(), CellType::Str));
        }
        let tag_value = self
            .tag_value
            .clone()
            .unwrap_or_else(|| self.file.clone());

        let mut rows: Vec<Vec<Value>> = Vec::new();
        for row in &primary.rows {
            let mut row = row.clone();
            if self.tag.is_some() {
                row.push(Value::Null);
            }
            rows.push(row);
        }
        for srow in &stacked.rows {
            let mut row: Vec<Value> = source
                .iter()
                .map(|src| match src {
                    Some(c) => srow[*c].clone(),
                    None => Value::Null,
                })
                .collect();
            row.truncate(base_cols);
            if self.tag.is_some() {
                row.push(Value::Str(tag_value.clone()));
            }
            rows.push(row);
        }
        Ok(Some(batch_from_rows(&schema, &rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn side() -> SideChannels {
        SideChannels::new()
    }

    fn orders() -> Batch {
        let mut b = Batch::new(2, 4);
        b.set_schema(0, "id", CellType::Int64);
        b.set_schema(1, "amount", CellType::Int64);
        for (r, (id, amount)) in [(1, 100), (2, 200), (3, 300)].iter().enumerate() {
            b.set_int(r, 0, *id);
            b.set_int(r, 1, *amount);
        }
        b.set_row_count(3);
        b
    }

    fn names_file() -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "id,name\n1,Alice\n2,Bob\n").unwrap();
        f
    }

    #[test]
    fn inner_join_drops_unmatched() {
        let file = names_file();
        let mut op = JoinOp::new(
            file.path().to_string_lossy().into_owned(),
            "id",
            JoinHow::Inner,
        );
        op.process(orders(), &mut side()).unwrap();
        let out = op.flush(&mut side()).unwrap().unwrap();
        assert_eq!(out.n_rows(), 2);
        assert_eq!(out.n_cols(), 3);
        assert_eq!(out.col_name(2), "name");
        assert_eq!(out.get_str(0, 2), Some("Alice"));
    }

    #[test]
    fn left_join_keeps_unmatched_with_nulls() {
        let file = names_file();
        let mut op = JoinOp::new(
            file.path().to_string_lossy().into_owned(),
            "id=id",
            JoinHow::Left,
        );
        op.process(orders(), &mut side()).unwrap();
        let out = op.flush(&mut side()).unwrap().unwrap();
        assert_eq!(out.n_rows(), 3);
        assert_eq!(out.get_int(2, 0), Some(3));
        assert!(out.is_null(2, 2));
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut op = JoinOp::new("/no/such/file.csv".into(), "id", JoinHow::Inner);
        op.process(orders(), &mut side()).unwrap();
        assert!(op.flush(&mut side()).is_err());
    }

    #[test]
    fn stack_aligns_by_name_and_tags() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "amount,id,extra\n900,9,x\n").unwrap();

        let mut op = StackOp::new(
            f.path().to_string_lossy().into_owned(),
            Some("source".into()),
            Some("backfill".into()),
        );
        op.process(orders(), &mut side()).unwrap();
        let out = op.flush(&mut side()).unwrap().unwrap();

        assert_eq!(out.n_rows(), 4);
        assert_eq!(out.n_cols(), 3);
        assert!(out.is_null(0, 2)); // primary rows carry no tag
        assert_eq!(out.get_int(3, 0), Some(9));
        assert_eq!(out.get_int(3, 1), Some(900));
        assert_eq!(out.get_str(3, 2), Some("backfill"));
    }

    #[test]
    fn stack_reads_quoted_cells() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "id,amount\n\"4\",\"40,5\"\n").unwrap();

        let mut op = StackOp::new(f.path().to_string_lossy().into_owned(), None, None);
        op.process(orders(), &mut side()).unwrap();
        let out = op.flush(&mut side()).unwrap().unwrap();
        assert_eq!(out.n_rows(), 4);
        assert_eq!(out.get_int(3, 0), Some(4));
    }
}
