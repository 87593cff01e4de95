//! Stateful streaming operators. Each carries a running accumulator updated
//! once per row and never reset; state survives batch boundaries.

use crate::util::{batch_from_rows, extend_batch, row_values};
use anyhow::Result;
use std::collections::VecDeque;
use tabflow_core::{Batch, CellType, Schema, SideChannels, Transform, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFunc {
    Sum,
    Avg,
    Min,
    Max,
    Lag,
}

impl StepFunc {
    /// Accepts both the bare and the `running-` prefixed spelling.
    pub fn parse(name: &str) -> Option<StepFunc> {
        match name.strip_prefix("running-").unwrap_or(name) {
            "sum" => Some(StepFunc::Sum),
            "avg" | "mean" => Some(StepFunc::Avg),
            "min" => Some(StepFunc::Min),
            "max" => Some(StepFunc::Max),
            "lag" => Some(StepFunc::Lag),
            _ => None,
        }
    }
}

/// Running aggregate down one column.
pub struct StepOp {
    column: String,
    func: StepFunc,
    result: String,
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
    prev: Option<f64>,
}

impl StepOp {
    pub fn new(column: String, func: StepFunc, result: String) -> Self {
        Self {
            column,
            func,
            result,
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            prev: None,
        }
    }
}

impl Transform for StepOp {
    fn name(&self) -> &'static str {
        "step"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut out = extend_batch(&input, &[(self.result.clone(), CellType::Float64)]);
        let dst = input.n_cols();
        let src = input.col_index(&self.column);
        for r in 0..input.n_rows() {
            let Some(v) = src.and_then(|c| input.numeric(r, c)) else {
                continue;
            };
            let emitted = match self.func {
                StepFunc::Lag => self.prev,
                _ => {
                    self.sum += v;
                    self.count += 1;
                    self.min = self.min.min(v);
                    self.max = self.max.max(v);
                    Some(match self.func {
                        StepFunc::Sum => self.sum,
                        StepFunc::Avg => self.sum / self.count as f64,
                        StepFunc::Min => self.min,
                        StepFunc::Max => self.max,
                        StepFunc::Lag => unreachable!(),
                    })
                }
            };
            if self.func == StepFunc::Lag {
                self.prev = Some(v);
            }
            if let Some(e) = emitted {
                out.set_float(r, dst, e);
            }
        }
        Ok(Some(out))
    }
}

/// Aggregate over a sliding window of the last `size` values.
pub struct WindowOp {
    column: String,
    size: usize,
    func: StepFunc,
    result: String,
    window: VecDeque<f64>,
}

impl WindowOp {
    pub fn new(column: String, size: usize, func: StepFunc, result: String) -> Self {
        Self {
            column,
            size: size.max(1),
            func,
            result,
            window: VecDeque::new(),
        }
    }

    fn aggregate(&self) -> f64 {
        let it = self.window.iter().copied();
        match self.func {
            StepFunc::Sum => it.sum(),
            StepFunc::Avg => it.sum::<f64>() / self.window.len() as f64,
            StepFunc::Min => it.fold(f64::INFINITY, f64::min),
            StepFunc::Max => it.fold(f64::NEG_INFINITY, f64::max),
            StepFunc::Lag => *self.window.front().unwrap_or(&0.0),
        }
    }
}

impl Transform for WindowOp {
    fn name(&self) -> &'static str {
        "window"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut out = extend_batch(&input, &[(self.result.clone(), CellType::Float64)]);
        let dst = input.n_cols();
        let src = input.col_index(&self.column);
        for r in 0..input.n_rows() {
            let Some(v) = src.and_then(|c| input.numeric(r, c)) else {
                continue;
            };
            self.window.push_back(v);
            if self.window.len() > self.size {
                self.window.pop_front();
            }
            out.set_float(r, dst, self.aggregate());
        }
        Ok(Some(out))
    }
}

/// Exponentially weighted moving average.
pub struct EwmaOp {
    column: String,
    alpha: f64,
    result: String,
    state: Option<f64>,
}

impl EwmaOp {
    pub fn new(column: String, alpha: f64, result: String) -> Self {
        Self {
            column,
            alpha,
            result,
            state: None,
        }
    }
}

impl Transform for EwmaOp {
    fn name(&self) -> &'static str {
        "ewma"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut out = extend_batch(&input, &[(self.result.clone(), CellType::Float64)]);
        let dst = input.n_cols();
        let src = input.col_index(&self.column);
        for r in 0..input.n_rows() {
            let Some(v) = src.and_then(|c| input.numeric(r, c)) else {
                continue;
            };
            let e = match self.state {
                Some(prev) => self.alpha * v + (1.0 - self.alpha) * prev,
                None => v,
            };
            self.state = Some(e);
            out.set_float(r, dst, e);
        }
        Ok(Some(out))
    }
}

/// First difference; the first value has no predecessor and stays null.
pub struct DiffOp {
    column: String,
    result: String,
    prev: Option<f64>,
}

impl DiffOp {
    pub fn new(column: String, result: String) -> Self {
        Self {
            column,
            result,
            prev: None,
        }
    }
}

impl Transform for DiffOp {
    fn name(&self) -> &'static str {
        "diff"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut out = extend_batch(&input, &[(self.result.clone(), CellType::Float64)]);
        let dst = input.n_cols();
        let src = input.col_index(&self.column);
        for r in 0..input.n_rows() {
            let Some(v) = src.and_then(|c| input.numeric(r, c)) else {
                continue;
            };
            if let Some(prev) = self.prev {
                out.set_float(r, dst, v - prev);
            }
            self.prev = Some(v);
        }
        Ok(Some(out))
    }
}

/// Value `offset` rows ahead. Rows are held back until their lead value
/// arrives; the held tail flushes with a null lead at end-of-input.
pub struct LeadOp {
    column: String,
    offset: usize,
    result: String,
    schema: Option<Schema>,
    src_col: Option<usize>,
    pending: VecDeque<Vec<Value>>,
}

impl LeadOp {
    pub fn new(column: String, offset: usize, result: String) -> Self {
        Self {
            column,
            offset: offset.max(1),
            result,
            schema: None,
            src_col: None,
            pending: VecDeque::new(),
        }
    }

    fn out_schema(&mut self, input: &Batch) -> Schema {
        if self.schema.is_none() {
            let mut schema = input.schema();
            let src = input.col_index(&self.column);
            let ty = src.map(|c| input.col_type(c)).unwrap_or(CellType::Str);
            schema.cols.push((self.result.clone(), ty));
            self.src_col = src;
            self.schema = Some(schema);
        }
        self.schema.clone().unwrap_or_else(Schema::unknown)
    }

    fn release(&mut self, ready: &mut Vec<Vec<Value>>) {
        while self.pending.len() > self.offset {
            let lead = self
                .src_col
                .and_then(|c| self.pending.get(self.offset).map(|row| row[c].clone()))
                .unwrap_or(Value::Null);
            let mut row = self.pending.pop_front().unwrap_or_default();
            row.push(lead);
            ready.push(row);
        }
    }
}

impl Transform for LeadOp {
    fn name(&self) -> &'static str {
        "lead"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let schema = self.out_schema(&input);
        for r in 0..input.n_rows() {
            self.pending.push_back(row_values(&input, r));
        }
        let mut ready = Vec::new();
        self.release(&mut ready);
        Ok(Some(batch_from_rows(&schema, &ready)))
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let Some(schema) = self.schema.clone() else {
            return Ok(None);
        };
        let mut rows = Vec::new();
        while let Some(mut row) = self.pending.pop_front() {
            let lead = if self.pending.len() >= self.offset {
                self.src_col
                    .map(|c| self.pending[self.offset - 1][c].clone())
                    .unwrap_or(Value::Null)
            } else {
                Value::Null
            };
            row.push(lead);
            rows.push(row);
        }
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch_from_rows(&schema, &rows)))
        }
    }
}

/// Flag rows whose z-score exceeds a threshold, using Welford's online
/// mean/variance.
pub struct AnomalyOp {
    column: String,
    threshold: f64,
    result: String,
    n: u64,
    mean: f64,
    m2: f64,
}

impl AnomalyOp {
    pub fn new(column: String, threshold: f64, result: String) -> Self {
        Self {
            column,
            threshold,
            result,
            n: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }
}

impl Transform for AnomalyOp {
    fn name(&self) -> &'static str {
        "anomaly"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let mut out = extend_batch(&input, &[(self.result.clone(), CellType::Bool)]);
        let dst = input.n_cols();
        let src = input.col_index(&self.column);
        for r in 0..input.n_rows() {
            let Some(v) = src.and_then(|c| input.numeric(r, c)) else {
                continue;
            };
            self.n += 1;
            let delta = v - self.mean;
            self.mean += delta / self.n as f64;
            self.m2 += delta * (v - self.mean);
            let flagged = if self.n >= 2 {
                let var = self.m2 / (self.n - 1) as f64;
                var > 0.0 && ((v - self.mean) / var.sqrt()).abs() > self.threshold
            } else {
                false
            };
            out.set_bool(r, dst, flagged);
        }
        Ok(Some(out))
    }
}
