//! The `stats` aggregate: one output row per input column with the requested
//! measures.

use crate::util::{batch_from_rows, cmp_values};
use anyhow::Result;
use std::collections::HashSet;
use tabflow_core::registry::{stat_measure_type, STAT_DEFAULTS, STAT_MEASURES};
use tabflow_core::value::format_float;
use tabflow_core::{Batch, CellType, FlowError, Schema, SideChannels, Transform, Value};

const HIST_BINS: usize = 10;
const SAMPLE_LIMIT: usize = 5;

#[derive(Debug, Default)]
struct ColumnStats {
    name: String,
    count: u64,
    numeric: Vec<f64>,
    distinct: HashSet<String>,
    min: Option<Value>,
    max: Option<Value>,
    sample: Vec<String>,
}

pub struct StatsOp {
    measures: Vec<String>,
    cols: Vec<ColumnStats>,
}

impl StatsOp {
    pub fn new(measures: Option<Vec<String>>) -> Result<Self, FlowError> {
        let measures =
            measures.unwrap_or_else(|| STAT_DEFAULTS.iter().map(|s| s.to_string()).collect());
        for m in &measures {
            if !STAT_MEASURES.contains(&m.as_str()) {
                return Err(FlowError::BadArg {
                    op: "stats".to_string(),
                    msg: format!("unknown measure `{m}`"),
                });
            }
        }
        Ok(Self {
            measures,
            cols: Vec::new(),
        })
    }

    fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
        if sorted.is_empty() {
            return None;
        }
        let rank = ((p / 100.0) * sorted.len() as f64).ceil().max(1.0) as usize - 1;
        sorted.get(rank.min(sorted.len() - 1)).copied()
    }

    fn measure_value(&self, stats: &ColumnStats, measure: &str) -> Value {
        let mut sorted = stats.numeric.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let mean = if n > 0 { sum / n as f64 } else { 0.0 };
        let variance = if n > 1 {
            sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        match measure {
            "count" => Value::Int(stats.count as i64),
            "distinct" => Value::Int(stats.distinct.len() as i64),
            "min" => stats.min.clone().map(|v| Value::Str(v.render())).unwrap_or(Value::Null),
            "max" => stats.max.clone().map(|v| Value::Str(v.render())).unwrap_or(Value::Null),
            "sum" if n > 0 => Value::Float(sum),
            "avg" if n > 0 => Value::Float(mean),
            "variance" if n > 1 => Value::Float(variance),
            "stddev" if n > 1 => Value::Float(variance.sqrt()),
            "median" => Self::percentile(&sorted, 50.0).map(Value::Float).unwrap_or(Value::Null),
            "p25" => Self::percentile(&sorted, 25.0).map(Value::Float).unwrap_or(Value::Null),
            "p75" => Self::percentile(&sorted, 75.0).map(Value::Float).unwrap_or(Value::Null),
            "p90" => Self::percentile(&sorted, 90.0).map(Value::Float).unwrap_or(Value::Null),
            "p99" => Self::percentile(&sorted, 99.0).map(Value::Float).unwrap_or(Value::Null),
            "hist" if n > 0 => Value::Str(Self::histogram(&sorted)),
            "sample" => Value::Str(stats.sample.join(",")),
            _ => Value::Null,
        }
    }

    /// `lo:hi:c1,c2,…` over equal-width bins between min and max.
    fn histogram(sorted: &[f64]) -> String {
        let lo = sorted[0];
        let hi = sorted[sorted.len() - 1];
        let mut bins = [0u64; HIST_BINS];
        let span = hi - lo;
        for &v in sorted {
            let idx = if span == 0.0 {
                0
            } else {
                (((v - lo) / span) * HIST_BINS as f64).min(HIST_BINS as f64 - 1.0) as usize
            };
            bins[idx] += 1;
        }
        let counts: Vec<String> = bins.iter().map(|c| c.to_string()).collect();
        format!("{}:{}:{}", format_float(lo), format_float(hi), counts.join(","))
    }
}

impl Transform for StatsOp {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn process(&mut self, input: Batch, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if self.cols.is_empty() {
            self.cols = (0..input.n_cols())
                .map(|c| ColumnStats {
                    name: input.col_name(c).to_string(),
                    ..Default::default()
                })
                .collect();
        }
        for stats in self.cols.iter_mut() {
            let Some(c) = input.col_index(&stats.name) else {
                continue;
            };
            for r in 0..input.n_rows() {
                if input.is_null(r, c) {
                    continue;
                }
                stats.count += 1;
                let v = input.value(r, c);
                let rendered = v.render();
                if let Some(num) = v.as_f64() {
                    stats.numeric.push(num);
                }
                stats.distinct.insert(rendered.clone());
                if stats.sample.len() < SAMPLE_LIMIT && !stats.sample.contains(&rendered) {
                    stats.sample.push(rendered);
                }
                match &stats.min {
                    Some(cur) if cmp_values(&v, cur).is_lt() => stats.min = Some(v.clone()),
                    None => stats.min = Some(v.clone()),
                    _ => {}
                }
                match &stats.max {
                    Some(cur) if cmp_values(&v, cur).is_gt() => stats.max = Some(v.clone()),
                    None => stats.max = Some(v),
                    _ => {}
                }
            }
        }
        Ok(None)
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if self.cols.is_empty() {
            return Ok(None);
        }
        let mut schema_cols = vec![("column".to_string(), CellType::Str)];
        for m in &self.measures {
            schema_cols.push((m.clone(), stat_measure_type(m)));
        }
        let schema = Schema::of(schema_cols);

        let cols = std::mem::take(&mut self.cols);
        let rows: Vec<Vec<Value>> = cols
            .iter()
            .map(|stats| {
                let mut row = vec![Value::Str(stats.name.clone())];
                for m in &self.measures {
                    row.push(self.measure_value(stats, m));
                }
                row
            })
            .collect();
        Ok(Some(batch_from_rows(&schema, &rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side() -> SideChannels {
        SideChannels::new()
    }

    fn numbers(values: &[i64]) -> Batch {
        let mut b = Batch::new(1, values.len().max(1));
        b.set_schema(0, "x", CellType::Int64);
        for (r, v) in values.iter().enumerate() {
            b.set_int(r, 0, *v);
        }
        b.set_row_count(values.len());
        b
    }

    #[test]
    fn default_measures() {
        let mut op = StatsOp::new(None).unwrap();
        op.process(numbers(&[1, 2, 3, 4]), &mut side()).unwrap();
        let out = op.flush(&mut side()).unwrap().unwrap();
        assert_eq!(out.n_rows(), 1);
        assert_eq!(out.get_str(0, 0), Some("x"));
        let count = out.col_index("count").unwrap();
        assert_eq!(out.get_int(0, count), Some(4));
        let avg = out.col_index("avg").unwrap();
        assert_eq!(out.get_float(0, avg), Some(2.5));
        let min = out.col_index("min").unwrap();
        assert_eq!(out.get_str(0, min), Some("1"));
    }

    #[test]
    fn unknown_measure_rejected() {
        assert!(StatsOp::new(Some(vec!["mode".to_string()])).is_err());
    }

    #[test]
    fn percentiles_and_median() {
        let mut op = StatsOp::new(Some(vec![
            "median".to_string(),
            "p25".to_string(),
            "p99".to_string(),
        ]))
        .unwrap();
        let values: Vec<i64> = (1..=100).collect();
        op.process(numbers(&values), &mut side()).unwrap();
        let out = op.flush(&mut side()).unwrap().unwrap();
        assert_eq!(out.get_float(0, 1), Some(50.0));
        assert_eq!(out.get_float(0, 2), Some(25.0));
        assert_eq!(out.get_float(0, 3), Some(99.0));
    }

    #[test]
    fn distinct_and_sample() {
        let mut op = StatsOp::new(Some(vec!["distinct".to_string(), "sample".to_string()]))
            .unwrap();
        op.process(numbers(&[5, 5, 7, 7, 9]), &mut side()).unwrap();
        let out = op.flush(&mut side()).unwrap().unwrap();
        assert_eq!(out.get_int(0, 1), Some(3));
        assert_eq!(out.get_str(0, 2), Some("5,7,9"));
    }

    #[test]
    fn histogram_renders_bounds_and_bins() {
        let mut op = StatsOp::new(Some(vec!["hist".to_string()])).unwrap();
        let values: Vec<i64> = (0..=10).collect();
        op.process(numbers(&values), &mut side()).unwrap();
        let out = op.flush(&mut side()).unwrap().unwrap();
        let hist = out.get_str(0, 1).unwrap();
        assert!(hist.starts_with("0:10:"));
        assert_eq!(hist.matches(',').count(), 9);
    }

    #[test]
    fn nulls_do_not_count() {
        let mut b = numbers(&[1, 2]);
        b.ensure_capacity(3);
        b.set_row_count(3); // third row null
        let mut op = StatsOp::new(Some(vec!["count".to_string()])).unwrap();
        op.process(b, &mut side()).unwrap();
        let out = op.flush(&mut side()).unwrap().unwrap();
        assert_eq!(out.get_int(0, 1), Some(2));
    }
}
