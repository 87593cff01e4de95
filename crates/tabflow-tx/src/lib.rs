//! # tabflow-tx - Transform Operators
//!
//! The operator set between decoder and encoder: streaming row transforms,
//! stateful windowed operators, and full-load aggregates, plus the expression
//! oracle that `filter`, `validate` and `derive` route rows through.
//!
//! ## Operator Families
//!
//! - **Streaming**: filter, grep, head, skip, select, rename, derive, cast,
//!   trim, fill_null, fill_down, clip, replace, hash, bin, split_data,
//!   normalize, onehot, label_encode, interpolate, datetime, date_trunc,
//!   explode, split, unpivot
//! - **Stateful streaming**: step, window, ewma, diff, lead, anomaly
//! - **Aggregates**: tail, top, sample, sort, unique, stats, frequency,
//!   group_agg, pivot, join, stack, acf
//!
//! [`create_transform`] builds a boxed operator from a validated plan node;
//! argument problems fail the pipeline compile, not the data flow.

pub mod aggregate;
pub mod args;
pub mod expr;
pub mod joins;
pub mod pivot;
pub mod project;
pub mod shape;
pub mod stats;
pub mod stream;
pub mod util;
pub mod windowed;

use aggregate::{AcfOp, FrequencyOp, SampleOp, SortKey, SortOp, TailOp, TopOp, UniqueOp};
use args::{bad, columns_opt, required_f64, required_str, required_usize};
use expr::Expr;
use joins::{JoinHow, JoinOp, StackOp};
use pivot::{AggFunc, AggSpec, GroupAggOp, PivotOp};
use project::{
    BinOp, CastOp, DatetimeOp, DateTruncOp, DeriveOp, HashOp, InterpolateOp, LabelEncodeOp,
    NormalizeOp, OnehotOp, SplitDataOp,
};
use regex::Regex;
use serde_json::Value as Json;
use shape::{ExplodeOp, SplitOp, UnpivotOp};
use stats::StatsOp;
use stream::{
    ClipOp, FillDownOp, FillNullOp, FilterOp, GrepOp, HeadOp, RenameOp, ReplaceOp, SelectOp,
    SkipOp, TrimOp, ValidateOp,
};
use tabflow_core::{CellType, FlowError, PlanNode, Transform, Value};
use windowed::{AnomalyOp, DiffOp, EwmaOp, LeadOp, StepFunc, StepOp, WindowOp};

const DATETIME_PARTS: &[&str] = &["year", "month", "day", "hour", "minute", "second", "weekday"];
const TRUNC_UNITS: &[&str] = &["year", "month", "day", "hour", "minute"];

fn parse_expr(node: &PlanNode, key: &str) -> Result<Expr, FlowError> {
    Expr::parse(&required_str(node, key)?)
}

fn parse_regex(node: &PlanNode, pattern: &str) -> Result<Regex, FlowError> {
    Regex::new(pattern).map_err(|e| bad(node, format!("bad regex `{pattern}`: {e}")))
}

fn sort_keys(node: &PlanNode) -> Result<Vec<SortKey>, FlowError> {
    let Some(items) = node.arg("columns") else {
        return Err(FlowError::MissingArg {
            op: node.op.clone(),
            arg: "columns".to_string(),
        });
    };
    fn key_from_text(text: &str) -> SortKey {
        match text.strip_prefix('-') {
            Some(name) => SortKey {
                name: name.to_string(),
                desc: true,
            },
            None => SortKey {
                name: text.to_string(),
                desc: false,
            },
        }
    }

    let mut keys = Vec::new();
    match items {
        Json::String(s) => keys.extend(
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(key_from_text),
        ),
        Json::Array(items) => {
            for item in items {
                match item {
                    Json::String(s) => keys.push(key_from_text(s)),
                    Json::Object(o) => {
                        let name = o
                            .get("name")
                            .and_then(Json::as_str)
                            .ok_or_else(|| bad(node, "sort column without `name`".into()))?;
                        let desc = o.get("desc").and_then(Json::as_bool).unwrap_or(false);
                        keys.push(SortKey {
                            name: name.to_string(),
                            desc,
                        });
                    }
                    _ => return Err(bad(node, "sort `columns` entries must be strings or objects".into())),
                }
            }
        }
        _ => return Err(bad(node, "`columns` must be an array".into())),
    }
    if keys.is_empty() {
        return Err(FlowError::MissingArg {
            op: node.op.clone(),
            arg: "columns".to_string(),
        });
    }
    Ok(keys)
}

fn json_scalar(v: &Json) -> Value {
    match v {
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        Json::String(s) => Value::Str(s.clone()),
        _ => Value::Null,
    }
}

fn string_mapping(node: &PlanNode, key: &str) -> Result<Vec<(String, String)>, FlowError> {
    let obj = node
        .arg(key)
        .and_then(Json::as_object)
        .ok_or_else(|| FlowError::MissingArg {
            op: node.op.clone(),
            arg: key.to_string(),
        })?;
    obj.iter()
        .map(|(k, v)| {
            v.as_str()
                .map(|s| (k.clone(), s.to_string()))
                .ok_or_else(|| bad(node, format!("`{key}` values must be strings")))
        })
        .collect()
}

/// Build the transform instance for a plan node.
pub fn create_transform(node: &PlanNode) -> Result<Box<dyn Transform>, FlowError> {
    let op: Box<dyn Transform> = match node.op.as_str() {
        "filter" => Box::new(FilterOp::new(parse_expr(node, "expr")?)),
        "validate" => Box::new(ValidateOp::new(parse_expr(node, "expr")?)),
        "grep" => {
            let pattern = required_str(node, "pattern")?;
            let regex = if node.arg_bool("regex").unwrap_or(false) {
                Some(parse_regex(node, &pattern)?)
            } else {
                None
            };
            Box::new(GrepOp::new(
                pattern,
                regex,
                node.arg_str("column").map(str::to_string),
                node.arg_bool("invert").unwrap_or(false),
            ))
        }
        "head" => Box::new(HeadOp::new(required_usize(node, "n")?)),
        "skip" => Box::new(SkipOp::new(required_usize(node, "n")?)),
        "tail" => Box::new(TailOp::new(required_usize(node, "n")?)),
        "top" => Box::new(TopOp::new(
            required_usize(node, "n")?,
            required_str(node, "column")?,
            node.arg_bool("desc").unwrap_or(false),
        )),
        "sample" => Box::new(SampleOp::new(
            required_usize(node, "n")?,
            node.arg_i64("seed").unwrap_or(42) as u64,
        )),
        "sort" => Box::new(SortOp::new(sort_keys(node)?)),
        "unique" | "dedup" => Box::new(UniqueOp::new(columns_opt(node, "columns"))),
        "select" | "reorder" => {
            let columns = node.arg_strings("columns").ok_or_else(|| FlowError::MissingArg {
                op: node.op.clone(),
                arg: "columns".to_string(),
            })?;
            Box::new(SelectOp::new(columns))
        }
        "rename" => Box::new(RenameOp::new(
            string_mapping(node, "mapping")?.into_iter().collect(),
        )),
        "derive" => {
            let items = node
                .arg("columns")
                .and_then(Json::as_array)
                .ok_or_else(|| FlowError::MissingArg {
                    op: node.op.clone(),
                    arg: "columns".to_string(),
                })?;
            let mut columns = Vec::new();
            for item in items {
                let name = item
                    .get("name")
                    .and_then(Json::as_str)
                    .ok_or_else(|| bad(node, "derive column without `name`".into()))?;
                let text = item
                    .get("expr")
                    .and_then(Json::as_str)
                    .ok_or_else(|| bad(node, "derive column without `expr`".into()))?;
                columns.push((name.to_string(), Expr::parse(text)?));
            }
            Box::new(DeriveOp::new(columns))
        }
        "cast" => {
            let mut mapping = Vec::new();
            for (name, ty) in string_mapping(node, "mapping")? {
                let ty = CellType::parse_name(&ty)
                    .ok_or_else(|| bad(node, format!("unknown type `{ty}`")))?;
                mapping.push((name, ty));
            }
            Box::new(CastOp::new(mapping))
        }
        "trim" => Box::new(TrimOp::new(columns_opt(node, "columns"))),
        "fill_null" => {
            let obj = node
                .arg("mapping")
                .and_then(Json::as_object)
                .ok_or_else(|| FlowError::MissingArg {
                    op: node.op.clone(),
                    arg: "mapping".to_string(),
                })?;
            let mapping = obj
                .iter()
                .map(|(k, v)| (k.clone(), json_scalar(v)))
                .collect();
            Box::new(FillNullOp::new(mapping))
        }
        "fill_down" => Box::new(FillDownOp::new(columns_opt(node, "columns"))),
        "clip" => Box::new(ClipOp::new(
            required_str(node, "column")?,
            node.arg_f64("min"),
            node.arg_f64("max"),
        )),
        "replace" => {
            let pattern = required_str(node, "pattern")?;
            let regex = if node.arg_bool("regex").unwrap_or(false) {
                Some(parse_regex(node, &pattern)?)
            } else {
                None
            };
            Box::new(ReplaceOp::new(
                required_str(node, "column")?,
                pattern,
                required_str(node, "replacement")?,
                regex,
            ))
        }
        "hash" => Box::new(HashOp::new(columns_opt(node, "columns"))),
        "bin" => {
            let boundaries: Vec<f64> = match node.arg("boundaries") {
                Some(Json::Array(items)) => items.iter().filter_map(Json::as_f64).collect(),
                Some(Json::String(s)) => s
                    .split(',')
                    .filter_map(|t| t.trim().parse().ok())
                    .collect(),
                _ => Vec::new(),
            };
            if boundaries.len() < 2 {
                return Err(bad(node, "`boundaries` needs at least two numbers".into()));
            }
            if boundaries.windows(2).any(|w| w[0] >= w[1]) {
                return Err(bad(node, "`boundaries` must be strictly increasing".into()));
            }
            Box::new(BinOp::new(required_str(node, "column")?, boundaries))
        }
        "step" => {
            let func = required_str(node, "func")?;
            let func = StepFunc::parse(&func)
                .ok_or_else(|| bad(node, format!("unknown step func `{func}`")))?;
            Box::new(StepOp::new(
                required_str(node, "column")?,
                func,
                required_str(node, "result")?,
            ))
        }
        "window" => {
            let func = required_str(node, "func")?;
            let func = StepFunc::parse(&func)
                .ok_or_else(|| bad(node, format!("unknown window func `{func}`")))?;
            if func == StepFunc::Lag {
                return Err(bad(node, "window does not support `lag`".into()));
            }
            let size = required_usize(node, "size")?;
            if size == 0 {
                return Err(bad(node, "`size` must be at least 1".into()));
            }
            Box::new(WindowOp::new(
                required_str(node, "column")?,
                size,
                func,
                required_str(node, "result")?,
            ))
        }
        "ewma" => {
            let alpha = required_f64(node, "alpha")?;
            if !(0.0..=1.0).contains(&alpha) || alpha == 0.0 {
                return Err(bad(node, format!("`alpha` must be in (0, 1], got {alpha}")));
            }
            Box::new(EwmaOp::new(
                required_str(node, "column")?,
                alpha,
                required_str(node, "result")?,
            ))
        }
        "diff" => {
            let column = required_str(node, "column")?;
            let result = node
                .arg_str("result")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{column}_diff"));
            Box::new(DiffOp::new(column, result))
        }
        "lead" => {
            let column = required_str(node, "column")?;
            let result = node
                .arg_str("result")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{column}_lead"));
            let offset = node.arg_i64("offset").unwrap_or(1);
            if offset < 1 {
                return Err(bad(node, format!("`offset` must be positive, got {offset}")));
            }
            Box::new(LeadOp::new(column, offset as usize, result))
        }
        "anomaly" => {
            let column = required_str(node, "column")?;
            let result = node
                .arg_str("result")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{column}_anomaly"));
            Box::new(AnomalyOp::new(
                column,
                node.arg_f64("threshold").unwrap_or(3.0),
                result,
            ))
        }
        "split_data" => {
            let ratio = node.arg_f64("ratio").unwrap_or(0.8);
            if !(0.0..=1.0).contains(&ratio) {
                return Err(bad(node, format!("`ratio` must be in [0, 1], got {ratio}")));
            }
            Box::new(SplitDataOp::new(
                ratio,
                node.arg_str("result").unwrap_or("split").to_string(),
                node.arg_i64("seed").unwrap_or(42) as u64,
            ))
        }
        "interpolate" => Box::new(InterpolateOp::new(columns_opt(node, "columns"))),
        "normalize" => {
            let min = required_f64(node, "min")?;
            let max = required_f64(node, "max")?;
            if max <= min {
                return Err(bad(node, "`max` must be greater than `min`".into()));
            }
            Box::new(NormalizeOp::new(required_str(node, "column")?, min, max))
        }
        "onehot" => {
            let values = node.arg_strings("values").ok_or_else(|| FlowError::MissingArg {
                op: node.op.clone(),
                arg: "values".to_string(),
            })?;
            Box::new(OnehotOp::new(required_str(node, "column")?, values))
        }
        "label_encode" => {
            let column = required_str(node, "column")?;
            let result = node
                .arg_str("result")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{column}_code"));
            Box::new(LabelEncodeOp::new(column, result))
        }
        "datetime" => {
            let part = required_str(node, "part")?;
            if !DATETIME_PARTS.contains(&part.as_str()) {
                return Err(bad(node, format!("unknown part `{part}`")));
            }
            let column = required_str(node, "column")?;
            let result = node
                .arg_str("result")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{column}_{part}"));
            Box::new(DatetimeOp::new(column, part, result))
        }
        "date_trunc" => {
            let unit = required_str(node, "unit")?;
            if !TRUNC_UNITS.contains(&unit.as_str()) {
                return Err(bad(node, format!("unknown unit `{unit}`")));
            }
            Box::new(DateTruncOp::new(required_str(node, "column")?, unit))
        }
        "explode" => Box::new(ExplodeOp::new(
            required_str(node, "column")?,
            node.arg_str("delimiter").unwrap_or(",").to_string(),
        )),
        "split" => {
            let names = node.arg_strings("names").ok_or_else(|| FlowError::MissingArg {
                op: node.op.clone(),
                arg: "names".to_string(),
            })?;
            Box::new(SplitOp::new(
                required_str(node, "column")?,
                names,
                node.arg_str("delimiter").unwrap_or(",").to_string(),
            ))
        }
        "unpivot" => {
            let columns = node.arg_strings("columns").ok_or_else(|| FlowError::MissingArg {
                op: node.op.clone(),
                arg: "columns".to_string(),
            })?;
            Box::new(UnpivotOp::new(columns))
        }
        "stats" => Box::new(StatsOp::new(node.arg_strings("stats"))?),
        "frequency" => Box::new(FrequencyOp::new(columns_opt(node, "columns"))),
        "group_agg" => {
            let group_by = node.arg_strings("group_by").ok_or_else(|| FlowError::MissingArg {
                op: node.op.clone(),
                arg: "group_by".to_string(),
            })?;
            let items = node
                .arg("aggs")
                .and_then(Json::as_array)
                .ok_or_else(|| FlowError::MissingArg {
                    op: node.op.clone(),
                    arg: "aggs".to_string(),
                })?;
            let mut aggs = Vec::new();
            for item in items {
                let column = item
                    .get("column")
                    .and_then(Json::as_str)
                    .ok_or_else(|| bad(node, "agg without `column`".into()))?;
                let func_name = item
                    .get("func")
                    .and_then(Json::as_str)
                    .ok_or_else(|| bad(node, "agg without `func`".into()))?;
                let func = AggFunc::parse(func_name)
                    .ok_or_else(|| bad(node, format!("unknown agg func `{func_name}`")))?;
                let result = item
                    .get("result")
                    .and_then(Json::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{column}_{func_name}"));
                aggs.push(AggSpec {
                    column: column.to_string(),
                    func,
                    result,
                });
            }
            Box::new(GroupAggOp::new(group_by, aggs))
        }
        "pivot" => {
            let agg = node.arg_str("agg").unwrap_or("first");
            let func = AggFunc::parse(agg)
                .ok_or_else(|| bad(node, format!("unknown pivot agg `{agg}`")))?;
            Box::new(PivotOp::new(
                required_str(node, "name_column")?,
                required_str(node, "value_column")?,
                func,
            ))
        }
        "join" => {
            let how = node.arg_str("how").unwrap_or("inner");
            let how = JoinHow::parse(how)
                .ok_or_else(|| bad(node, format!("unknown join mode `{how}`")))?;
            Box::new(JoinOp::new(
                required_str(node, "file")?,
                &required_str(node, "on")?,
                how,
            ))
        }
        "stack" => Box::new(StackOp::new(
            required_str(node, "file")?,
            node.arg_str("tag").map(str::to_string),
            node.arg_str("tag_value").map(str::to_string),
        )),
        "acf" => {
            let lags = node.arg_i64("lags").unwrap_or(10);
            if lags < 0 {
                return Err(bad(node, format!("`lags` must be non-negative, got {lags}")));
            }
            Box::new(AcfOp::new(required_str(node, "column")?, lags as usize))
        }
        other => return Err(FlowError::UnknownOp(other.to_string())),
    };
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_every_registered_transform() {
        let cases = vec![
            ("filter", json!({"expr": "col(age) > 1"})),
            ("validate", json!({"expr": "col(age) > 1"})),
            ("grep", json!({"pattern": "x"})),
            ("head", json!({"n": 3})),
            ("skip", json!({"n": 3})),
            ("tail", json!({"n": 3})),
            ("top", json!({"n": 3, "column": "age", "desc": true})),
            ("sample", json!({"n": 3})),
            ("sort", json!({"columns": ["-age", "name"]})),
            ("unique", json!({})),
            ("dedup", json!({"columns": ["a"]})),
            ("select", json!({"columns": ["a", "b"]})),
            ("rename", json!({"mapping": {"a": "b"}})),
            ("derive", json!({"columns": [{"name": "d", "expr": "col(a) * 2"}]})),
            ("cast", json!({"mapping": {"a": "float64"}})),
            ("trim", json!({})),
            ("fill_null", json!({"mapping": {"a": 0}})),
            ("fill_down", json!({})),
            ("clip", json!({"column": "a", "min": 0, "max": 1})),
            ("replace", json!({"column": "a", "pattern": "x", "replacement": "y"})),
            ("hash", json!({})),
            ("bin", json!({"column": "a", "boundaries": [0, 1, 2]})),
            ("step", json!({"column": "a", "func": "running-sum", "result": "s"})),
            ("window", json!({"column": "a", "size": 3, "func": "avg", "result": "w"})),
            ("ewma", json!({"column": "a", "alpha": 0.5, "result": "e"})),
            ("diff", json!({"column": "a"})),
            ("lead", json!({"column": "a", "offset": 2})),
            ("anomaly", json!({"column": "a", "threshold": 2.5})),
            ("split_data", json!({})),
            ("interpolate", json!({})),
            ("normalize", json!({"column": "a", "min": 0, "max": 10})),
            ("onehot", json!({"column": "a", "values": ["x", "y"]})),
            ("label_encode", json!({"column": "a"})),
            ("datetime", json!({"column": "a", "part": "year"})),
            ("date_trunc", json!({"column": "a", "unit": "month"})),
            ("explode", json!({"column": "a"})),
            ("split", json!({"column": "a", "names": ["x", "y"]})),
            ("unpivot", json!({"columns": ["a"]})),
            ("stats", json!({})),
            ("frequency", json!({})),
            ("group_agg", json!({"group_by": ["a"], "aggs": [{"column": "b", "func": "sum"}]})),
            ("pivot", json!({"name_column": "k", "value_column": "v", "agg": "sum"})),
            ("join", json!({"file": "x.csv", "on": "id"})),
            ("stack", json!({"file": "x.csv"})),
            ("acf", json!({"column": "a", "lags": 5})),
        ];
        for (op, args) in cases {
            let node = PlanNode::new(op, args);
            let built = create_transform(&node);
            assert!(built.is_ok(), "failed to build `{op}`: {:?}", built.err());
        }
    }

    #[test]
    fn compile_time_failures() {
        let bad_cases = vec![
            ("filter", json!({"expr": "col("})),
            ("replace", json!({"column": "a", "pattern": "(", "replacement": "", "regex": true})),
            ("ewma", json!({"column": "a", "alpha": 2.0, "result": "e"})),
            ("bin", json!({"column": "a", "boundaries": [5]})),
            ("bin", json!({"column": "a", "boundaries": [5, 4]})),
            ("step", json!({"column": "a", "func": "median", "result": "s"})),
            ("datetime", json!({"column": "a", "part": "fortnight"})),
            ("pivot", json!({"name_column": "k", "value_column": "v", "agg": "mode"})),
            ("stats", json!({"stats": ["mode"]})),
            ("split_data", json!({"ratio": 1.5})),
            ("transmogrify", json!({})),
        ];
        for (op, args) in bad_cases {
            let node = PlanNode::new(op, args);
            assert!(create_transform(&node).is_err(), "`{op}` should fail");
        }
    }
}
