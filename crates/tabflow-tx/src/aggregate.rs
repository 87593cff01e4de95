//! Aggregate operators: absorb every row during `process`, emit exactly once
//! on `flush`. The bounded ones (tail, top, sample) cap their buffer as they
//! go; the rest hold the full input.

use crate::util::{batch_from_rows, cmp_values, row_values, tuple_key, Collector, Lcg};
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use tabflow_core::{Batch, CellType, Schema, SideChannels, Transform, Value};

/// Sliding tail: the last `n` rows of the stream.
pub struct TailOp {
    n: usize,
    schema: Option<Schema>,
    rows: VecDeque<Vec<Value>>,
}

impl TailOp {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            schema: None,
            rows: VecDeque::new(),
        }
    }
}

impl Transform for TailOp {
    fn name(&self) -> &'static str {
        "tail"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if self.schema.is_none() {
            self.schema = Some(input.schema());
        }
        for r in 0..input.n_rows() {
            self.rows.push_back(row_values(&input, r));
            if self.rows.len() > self.n {
                self.rows.pop_front();
            }
        }
        Ok(None)
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let Some(schema) = self.schema.take() else {
            return Ok(None);
        };
        let rows: Vec<Vec<Value>> = self.rows.drain(..).collect();
        Ok(Some(batch_from_rows(&schema, &rows)))
    }
}

/// The `n` best rows by one column; ties keep the earliest-seen row.
pub struct TopOp {
    n: usize,
    column: String,
    desc: bool,
    schema: Option<Schema>,
    seq: u64,
    rows: Vec<(Value, u64, Vec<Value>)>,
}

impl TopOp {
    pub fn new(n: usize, column: String, desc: bool) -> Self {
        Self {
            n,
            column,
            desc,
            schema: None,
            seq: 0,
            rows: Vec::new(),
        }
    }

}

fn top_order(a: &(Value, u64, Vec<Value>), b: &(Value, u64, Vec<Value>), desc: bool) -> Ordering {
    let key = if desc {
        cmp_values(&b.0, &a.0)
    } else {
        cmp_values(&a.0, &b.0)
    };
    // nulls always lose, whatever the direction
    let key = match (a.0.is_null(), b.0.is_null()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => key,
    };
    key.then(a.1.cmp(&b.1))
}

impl Transform for TopOp {
    fn name(&self) -> &'static str {
        "top"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if self.schema.is_none() {
            self.schema = Some(input.schema());
        }
        let col = input.col_index(&self.column);
        for r in 0..input.n_rows() {
            let key = col.map(|c| input.value(r, c)).unwrap_or(Value::Null);
            self.rows.push((key, self.seq, row_values(&input, r)));
            self.seq += 1;
        }
        let desc = self.desc;
        self.rows.sort_by(|a, b| top_order(a, b, desc));
        self.rows.truncate(self.n);
        Ok(None)
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let Some(schema) = self.schema.take() else {
            return Ok(None);
        };
        let rows: Vec<Vec<Value>> = self.rows.drain(..).map(|(_, _, row)| row).collect();
        Ok(Some(batch_from_rows(&schema, &rows)))
    }
}

/// Uniform reservoir sample with a deterministic seeded generator.
pub struct SampleOp {
    n: usize,
    schema: Option<Schema>,
    seen: u64,
    lcg: Lcg,
    reservoir: Vec<Vec<Value>>,
}

impl SampleOp {
    pub fn new(n: usize, seed: u64) -> Self {
        Self {
            n,
            schema: None,
            seen: 0,
            lcg: Lcg::new(seed),
            reservoir: Vec::new(),
        }
    }
}

impl Transform for SampleOp {
    fn name(&self) -> &'static str {
        "sample"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if self.schema.is_none() {
            self.schema = Some(input.schema());
        }
        for r in 0..input.n_rows() {
            let row = row_values(&input, r);
            if self.reservoir.len() < self.n {
                self.reservoir.push(row);
            } else if self.n > 0 {
                let j = (self.lcg.next_u32() as u64 % (self.seen + 1)) as usize;
                if j < self.n {
                    self.reservoir[j] = row;
                }
            }
            self.seen += 1;
        }
        Ok(None)
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let Some(schema) = self.schema.take() else {
            return Ok(None);
        };
        let rows = std::mem::take(&mut self.reservoir);
        Ok(Some(batch_from_rows(&schema, &rows)))
    }
}

/// One sort key part: column name and direction.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub name: String,
    pub desc: bool,
}

/// Stable sort on a composite key; nulls sort last either direction.
pub struct SortOp {
    keys: Vec<SortKey>,
    buffer: Collector,
}

impl SortOp {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self {
            keys,
            buffer: Collector::new(),
        }
    }
}

impl Transform for SortOp {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        self.buffer.absorb(&input);
        Ok(None)
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let buffer = std::mem::take(&mut self.buffer);
        let Some(schema) = buffer.schema.clone() else {
            return Ok(None);
        };
        let key_cols: Vec<(Option<usize>, bool)> = self
            .keys
            .iter()
            .map(|k| (schema.col_index(&k.name), k.desc))
            .collect();

        let mut order: Vec<usize> = (0..buffer.rows.len()).collect();
        order.sort_by(|&a, &b| {
            for (col, desc) in &key_cols {
                let Some(c) = col else { continue };
                let va = &buffer.rows[a][*c];
                let vb = &buffer.rows[b][*c];
                let ord = match (va.is_null(), vb.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => {
                        if *desc {
                            cmp_values(vb, va)
                        } else {
                            cmp_values(va, vb)
                        }
                    }
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(buffer.into_batch(Some(&order)))
    }
}

/// Keep the first occurrence of each distinct tuple.
pub struct UniqueOp {
    columns: Option<Vec<String>>,
    seen: HashSet<String>,
    kept: Collector,
}

impl UniqueOp {
    pub fn new(columns: Option<Vec<String>>) -> Self {
        Self {
            columns,
            seen: HashSet::new(),
            kept: Collector::new(),
        }
    }
}

impl Transform for UniqueOp {
    fn name(&self) -> &'static str {
        "unique"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let key_cols: Vec<usize> = match &self.columns {
            Some(names) => names.iter().filter_map(|n| input.col_index(n)).collect(),
            None => (0..input.n_cols()).collect(),
        };
        let mut keep = Batch::from_schema(&input.schema(), input.n_rows().max(1));
        for r in 0..input.n_rows() {
            let key_vals: Vec<Value> = key_cols.iter().map(|&c| input.value(r, c)).collect();
            if self.seen.insert(tuple_key(&key_vals)) {
                keep.append_row_from(&input, r);
            }
        }
        self.kept.absorb(&keep);
        Ok(None)
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let kept = std::mem::take(&mut self.kept);
        Ok(kept.into_batch(None))
    }
}

/// Value/count pairs per column, sorted by count descending then value
/// ascending.
pub struct FrequencyOp {
    columns: Option<Vec<String>>,
    names: Vec<String>,
    counts: Vec<HashMap<String, u64>>,
}

impl FrequencyOp {
    pub fn new(columns: Option<Vec<String>>) -> Self {
        Self {
            columns,
            names: Vec::new(),
            counts: Vec::new(),
        }
    }
}

impl Transform for FrequencyOp {
    fn name(&self) -> &'static str {
        "frequency"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if self.names.is_empty() {
            self.names = match &self.columns {
                Some(names) => names
                    .iter()
                    .filter(|n| input.col_index(n).is_some())
                    .cloned()
                    .collect(),
                None => (0..input.n_cols())
                    .map(|c| input.col_name(c).to_string())
                    .collect(),
            };
            self.counts = vec![HashMap::new(); self.names.len()];
        }
        for (i, name) in self.names.iter().enumerate() {
            let Some(c) = input.col_index(name) else {
                continue;
            };
            for r in 0..input.n_rows() {
                if !input.is_null(r, c) {
                    *self.counts[i].entry(input.render_cell(r, c)).or_insert(0) += 1;
                }
            }
        }
        Ok(None)
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if self.names.is_empty() {
            return Ok(None);
        }
        let schema = Schema::of(vec![
            ("column".to_string(), CellType::Str),
            ("value".to_string(), CellType::Str),
            ("count".to_string(), CellType::Int64),
        ]);
        let mut rows: Vec<Vec<Value>> = Vec::new();
        for (name, counts) in self.names.iter().zip(self.counts.drain(..)) {
            let mut pairs: Vec<(String, u64)> = counts.into_iter().collect();
            pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            for (value, count) in pairs {
                rows.push(vec![
                    Value::Str(name.clone()),
                    Value::Str(value),
                    Value::Int(count as i64),
                ]);
            }
        }
        Ok(Some(batch_from_rows(&schema, &rows)))
    }
}

/// Autocorrelation of one numeric column for lags `0..=max_lag`.
pub struct AcfOp {
    column: String,
    max_lag: usize,
    series: Vec<f64>,
}

impl AcfOp {
    pub fn new(column: String, max_lag: usize) -> Self {
        Self {
            column,
            max_lag,
            series: Vec::new(),
        }
    }
}

impl Transform for AcfOp {
    fn name(&self) -> &'static str {
        "acf"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if let Some(c) = input.col_index(&self.column) {
            for r in 0..input.n_rows() {
                if let Some(v) = input.numeric(r, c) {
                    self.series.push(v);
                }
            }
        }
        Ok(None)
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let schema = Schema::of(vec![
            ("lag".to_string(), CellType::Int64),
            ("acf".to_string(), CellType::Float64),
        ]);
        let n = self.series.len();
        let mean = if n > 0 {
            self.series.iter().sum::<f64>() / n as f64
        } else {
            0.0
        };
        let denom: f64 = self.series.iter().map(|v| (v - mean).powi(2)).sum();
        let mut rows = Vec::new();
        for lag in 0..=self.max_lag {
            let value = if lag >= n || denom == 0.0 {
                Value::Null
            } else {
                let num: f64 = (0..n - lag)
                    .map(|t| (self.series[t] - mean) * (self.series[t + lag] - mean))
                    .sum();
                Value::Float(num / denom)
            };
            rows.push(vec![Value::Int(lag as i64), value]);
        }
        Ok(Some(batch_from_rows(&schema, &rows)))
    }
}
