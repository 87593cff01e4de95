//! Shared machinery for operators: value ordering, row collection, the
//! deterministic generator behind `sample` and `split_data`.

use std::cmp::Ordering;
use tabflow_core::value::{coerce, widen};
use tabflow_core::{Batch, Schema, Value};

/// Total order over cell values: nulls sort last, numeric types compare
/// numerically, strings compare byte-wise, mixed kinds compare by rendering.
pub fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (None, None) => a.render().as_bytes().cmp(b.render().as_bytes()),
        _ => a.render().as_bytes().cmp(b.render().as_bytes()),
    }
}

/// Render a tuple of values into one dedup/group key.
///
/// A null marker distinct from any rendered text keeps `(null)` and `("")`
/// apart.
pub fn tuple_key(values: &[Value]) -> String {
    let mut key = String::new();
    for v in values {
        if v.is_null() {
            key.push('\u{1}');
        } else {
            key.push_str(&v.render());
        }
        key.push('\u{1f}');
    }
    key
}

/// All cell values of one batch row.
pub fn row_values(batch: &Batch, row: usize) -> Vec<Value> {
    (0..batch.n_cols()).map(|c| batch.value(row, c)).collect()
}

/// Build a batch from owned rows under `schema`, coercing each cell along
/// the widening lattice.
pub fn batch_from_rows(schema: &Schema, rows: &[Vec<Value>]) -> Batch {
    let mut out = Batch::from_schema(schema, rows.len().max(1));
    for (r, row) in rows.iter().enumerate() {
        for (c, (_, ty)) in schema.cols.iter().enumerate() {
            if let Some(v) = row.get(c) {
                out.set_value(r, c, &coerce(v, *ty));
            }
        }
    }
    out.set_row_count(rows.len());
    out
}

/// Full-load row collector used by the aggregate operators.
///
/// The schema is taken from the first batch and column types widen as later
/// batches arrive, so a column the decoder promoted mid-stream still lands in
/// one coherent output batch.
#[derive(Debug, Default)]
pub struct Collector {
    pub schema: Option<Schema>,
    pub rows: Vec<Vec<Value>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn absorb(&mut self, batch: &Batch) {
        match &mut self.schema {
            None => self.schema = Some(batch.schema()),
            Some(schema) => {
                for (c, (_, ty)) in schema.cols.iter_mut().enumerate() {
                    *ty = widen(*ty, batch.col_type(c));
                }
            }
        }
        for r in 0..batch.n_rows() {
            self.rows.push(row_values(batch, r));
        }
    }

    /// Emit everything collected, in the order given by `order` (row
    /// indexes), or arrival order when `order` is `None`.
    pub fn into_batch(self, order: Option<&[usize]>) -> Option<Batch> {
        let schema = self.schema?;
        let rows: Vec<Vec<Value>> = match order {
            Some(idx) => idx
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
            None => self.rows,
        };
        Some(batch_from_rows(&schema, &rows))
    }
}

/// Deterministic linear congruential generator.
///
/// Seeded operators (`sample`, `split_data`) draw from this so runs are
/// reproducible across hosts.
#[derive(Debug, Clone)]
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Lcg(seed.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(1))
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) as u32
    }

    /// Uniform draw in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / (u32::MAX as f64 + 1.0)
    }
}

/// Copy a batch into a wider one with extra trailing columns, all null.
pub fn extend_batch(input: &Batch, extra: &[(String, tabflow_core::CellType)]) -> Batch {
    let mut schema = input.schema();
    schema.cols.extend(extra.iter().cloned());
    let mut out = Batch::from_schema(&schema, input.n_rows().max(1));
    for r in 0..input.n_rows() {
        for c in 0..input.n_cols() {
            let v = input.value(r, c);
            out.set_value(r, c, &v);
        }
    }
    out.set_row_count(input.n_rows());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabflow_core::CellType;

    #[test]
    fn value_ordering() {
        assert_eq!(
            cmp_values(&Value::Int(1), &Value::Float(2.0)),
            Ordering::Less
        );
        assert_eq!(
            cmp_values(&Value::Str("a".into()), &Value::Str("b".into())),
            Ordering::Less
        );
        assert_eq!(cmp_values(&Value::Null, &Value::Int(0)), Ordering::Greater);
        assert_eq!(cmp_values(&Value::Int(0), &Value::Null), Ordering::Less);
    }

    #[test]
    fn tuple_key_separates_null_and_empty() {
        assert_ne!(
            tuple_key(&[Value::Null]),
            tuple_key(&[Value::Str(String::new())])
        );
        assert_ne!(
            tuple_key(&[Value::Str("a,b".into()), Value::Str("c".into())]),
            tuple_key(&[Value::Str("a".into()), Value::Str("b,c".into())])
        );
    }

    #[test]
    fn lcg_is_deterministic() {
        let mut a = Lcg::new(42);
        let mut b = Lcg::new(42);
        for _ in 0..10 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
        let draw = Lcg::new(1).next_f64();
        assert!((0.0..1.0).contains(&draw));
    }

    #[test]
    fn collector_widens_across_batches() {
        let mut ints = Batch::new(1, 4);
        ints.set_schema(0, "x", CellType::Int64);
        ints.set_int(0, 0, 1);
        ints.set_row_count(1);

        let mut floats = Batch::new(1, 4);
        floats.set_schema(0, "x", CellType::Float64);
        floats.set_float(0, 0, 2.5);
        floats.set_row_count(1);

        let mut col = Collector::new();
        col.absorb(&ints);
        col.absorb(&floats);
        let out = col.into_batch(None).unwrap();
        assert_eq!(out.col_type(0), CellType::Float64);
        assert_eq!(out.get_float(0, 0), Some(1.0));
        assert_eq!(out.get_float(1, 0), Some(2.5));
    }
}
