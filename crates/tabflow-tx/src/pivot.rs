//! Grouped aggregation and wide pivoting.

use crate::util::{batch_from_rows, cmp_values, tuple_key};
use anyhow::Result;
use std::collections::HashMap;
use tabflow_core::{Batch, CellType, Schema, SideChannels, Transform, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    First,
    Last,
}

impl AggFunc {
    pub fn parse(name: &str) -> Option<AggFunc> {
        match name {
            "sum" => Some(AggFunc::Sum),
            "avg" | "mean" => Some(AggFunc::Avg),
            "min" => Some(AggFunc::Min),
            "max" => Some(AggFunc::Max),
            "count" => Some(AggFunc::Count),
            "first" => Some(AggFunc::First),
            "last" => Some(AggFunc::Last),
            _ => None,
        }
    }

    fn result_type(&self, input: CellType) -> CellType {
        match self {
            AggFunc::Count => CellType::Int64,
            AggFunc::Sum | AggFunc::Avg => CellType::Float64,
            _ => input,
        }
    }
}

/// One aggregation the caller asked for.
#[derive(Debug, Clone)]
pub struct AggSpec {
    pub column: String,
    pub func: AggFunc,
    pub result: String,
}

#[derive(Debug, Default, Clone)]
struct Acc {
    count: u64,
    sum: f64,
    num_count: u64,
    min: Option<Value>,
    max: Option<Value>,
    first: Option<Value>,
    last: Option<Value>,
}

impl Acc {
    fn update(&mut self, v: &Value) {
        if v.is_null() {
            return;
        }
        self.count += 1;
        if let Some(n) = v.as_f64() {
            self.sum += n;
            self.num_count += 1;
        }
        if self.min.as_ref().map_or(true, |cur| cmp_values(v, cur).is_lt()) {
            self.min = Some(v.clone());
        }
        if self.max.as_ref().map_or(true, |cur| cmp_values(v, cur).is_gt()) {
            self.max = Some(v.clone());
        }
        if self.first.is_none() {
            self.first = Some(v.clone());
        }
        self.last = Some(v.clone());
    }

    fn finish(&self, func: AggFunc) -> Value {
        match func {
            AggFunc::Count => Value::Int(self.count as i64),
            AggFunc::Sum if self.num_count > 0 => Value::Float(self.sum),
            AggFunc::Avg if self.num_count > 0 => {
                Value::Float(self.sum / self.num_count as f64)
            }
            AggFunc::Min => self.min.clone().unwrap_or(Value::Null),
            AggFunc::Max => self.max.clone().unwrap_or(Value::Null),
            AggFunc::First => self.first.clone().unwrap_or(Value::Null),
            AggFunc::Last => self.last.clone().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// Group rows by a column tuple and aggregate per group, first-seen order.
pub struct GroupAggOp {
    group_by: Vec<String>,
    aggs: Vec<AggSpec>,
    schema: Option<Schema>,
    index: HashMap<String, usize>,
    groups: Vec<(Vec<Value>, Vec<Acc>)>,
}

impl GroupAggOp {
    pub fn new(group_by: Vec<String>, aggs: Vec<AggSpec>) -> Self {
        Self {
            group_by,
            aggs,
            schema: None,
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }
}

impl Transform for GroupAggOp {
    fn name(&self) -> &'static str {
        "group_agg"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if self.schema.is_none() {
            self.schema = Some(input.schema());
        }
        let key_cols: Vec<Option<usize>> =
            self.group_by.iter().map(|n| input.col_index(n)).collect();
        let agg_cols: Vec<Option<usize>> =
            self.aggs.iter().map(|a| input.col_index(&a.column)).collect();
        for r in 0..input.n_rows() {
            let key_vals: Vec<Value> = key_cols
                .iter()
                .map(|c| c.map(|c| input.value(r, c)).unwrap_or(Value::Null))
                .collect();
            let key = tuple_key(&key_vals);
            let idx = match self.index.get(&key) {
                Some(&idx) => idx,
                None => {
                    self.index.insert(key, self.groups.len());
                    self.groups
                        .push((key_vals, vec![Acc::default(); self.aggs.len()]));
                    self.groups.len() - 1
                }
            };
            for (i, col) in agg_cols.iter().enumerate() {
                let v = col.map(|c| input.value(r, c)).unwrap_or(Value::Null);
                self.groups[idx].1[i].update(&v);
            }
        }
        Ok(None)
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let Some(input_schema) = self.schema.take() else {
            return Ok(None);
        };
        let mut cols: Vec<(String, CellType)> = self
            .group_by
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    input_schema.col_type(name).unwrap_or(CellType::Str),
                )
            })
            .collect();
        for agg in &self.aggs {
            let input_ty = input_schema.col_type(&agg.column).unwrap_or(CellType::Str);
            cols.push((agg.result.clone(), agg.func.result_type(input_ty)));
        }
        let schema = Schema::of(cols);

        let groups = std::mem::take(&mut self.groups);
        let rows: Vec<Vec<Value>> = groups
            .into_iter()
            .map(|(mut key_vals, accs)| {
                for (agg, acc) in self.aggs.iter().zip(&accs) {
                    key_vals.push(acc.finish(agg.func));
                }
                key_vals
            })
            .collect();
        Ok(Some(batch_from_rows(&schema, &rows)))
    }
}

/// Distinct values of one column become new columns.
///
/// The pass-through columns form the row key; row and column orders follow
/// first appearance. The count aggregate emits INT64, everything else
/// FLOAT64.
pub struct PivotOp {
    name_column: String,
    value_column: String,
    func: AggFunc,
    schema: Option<Schema>,
    key_cols: Vec<String>,
    row_index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
    col_index: HashMap<String, usize>,
    col_names: Vec<String>,
    cells: HashMap<(usize, usize), Acc>,
}

impl PivotOp {
    pub fn new(name_column: String, value_column: String, func: AggFunc) -> Self {
        Self {
            name_column,
            value_column,
            func,
            schema: None,
            key_cols: Vec::new(),
            row_index: HashMap::new(),
            rows: Vec::new(),
            col_index: HashMap::new(),
            col_names: Vec::new(),
            cells: HashMap::new(),
        }
    }

    fn cell_value(&self, acc: &Acc) -> Value {
        match self.func {
            AggFunc::Count => Value::Int(acc.count as i64),
            func => match acc.finish(func).as_f64() {
                Some(v) => Value::Float(v),
                None => Value::Null,
            },
        }
    }
}

impl Transform for PivotOp {
    fn name(&self) -> &'static str {
        "pivot"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if self.schema.is_none() {
            self.schema = Some(input.schema());
            self.key_cols = (0..input.n_cols())
                .map(|c| input.col_name(c).to_string())
                .filter(|n| *n != self.name_column && *n != self.value_column)
                .collect();
        }
        let key_idx: Vec<Option<usize>> =
            self.key_cols.iter().map(|n| input.col_index(n)).collect();
        let name_col = input.col_index(&self.name_column);
        let value_col = input.col_index(&self.value_column);

        for r in 0..input.n_rows() {
            let key_vals: Vec<Value> = key_idx
                .iter()
                .map(|c| c.map(|c| input.value(r, c)).unwrap_or(Value::Null))
                .collect();
            let key = tuple_key(&key_vals);
            let row = match self.row_index.get(&key) {
                Some(&i) => i,
                None => {
                    self.row_index.insert(key, self.rows.len());
                    self.rows.push(key_vals);
                    self.rows.len() - 1
                }
            };

            let Some(name) = name_col.map(|c| input.render_cell(r, c)) else {
                continue;
            };
            let col = match self.col_index.get(&name) {
                Some(&i) => i,
                None => {
                    self.col_index.insert(name.clone(), self.col_names.len());
                    self.col_names.push(name);
                    self.col_names.len() - 1
                }
            };

            let v = value_col.map(|c| input.value(r, c)).unwrap_or(Value::Null);
            self.cells.entry((row, col)).or_default().update(&v);
        }
        Ok(None)
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        let Some(input_schema) = self.schema.take() else {
            return Ok(None);
        };
        let value_ty = match self.func {
            AggFunc::Count => CellType::Int64,
            _ => CellType::Float64,
        };
        let mut cols: Vec<(String, CellType)> = self
            .key_cols
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    input_schema.col_type(name).unwrap_or(CellType::Str),
                )
            })
            .collect();
        for name in &self.col_names {
            cols.push((name.clone(), value_ty));
        }
        let schema = Schema::of(cols);

        let rows: Vec<Vec<Value>> = self
            .rows
            .iter()
            .enumerate()
            .map(|(r, key_vals)| {
                let mut row = key_vals.clone();
                for c in 0..self.col_names.len() {
                    let v = self
                        .cells
                        .get(&(r, c))
                        .map(|acc| self.cell_value(acc))
                        .unwrap_or(Value::Null);
                    row.push(v);
                }
                row
            })
            .collect();
        Ok(Some(batch_from_rows(&schema, &rows)))
    }
}
