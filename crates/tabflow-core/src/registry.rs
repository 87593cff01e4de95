//! Static operator registry.
//!
//! Every op the engine knows is described here: its kind, capability vector,
//! required arguments, and a best-effort schema-inference callback. Lookup is
//! case-sensitive. The table is data; the constructors that turn a plan node
//! into a live operator live with the codec and transform crates.

use crate::caps::Caps;
use crate::plan::PlanNode;
use crate::schema::Schema;
use crate::value::CellType;

/// Where in the plan an op may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Decoder,
    Transform,
    Encoder,
}

/// Registry entry for one op.
pub struct OpEntry {
    pub name: &'static str,
    pub kind: OpKind,
    pub caps: Caps,
    pub required_args: &'static [&'static str],
    pub infer: fn(&PlanNode, &Schema) -> Schema,
}

/// Pure streaming transform.
const PS: Caps = Caps::PURE_STREAMING;
/// Full-load aggregate: buffers all input, no filesystem access.
const AGG: Caps = Caps::BROWSER_SAFE.union(Caps::DETERMINISTIC);
/// Aggregate with a bounded buffer (tail, top, sample).
const AGG_BOUNDED: Caps = AGG.union(Caps::BOUNDED_MEMORY);
/// Aggregate that reads a side file on flush.
const AGG_FS: Caps = Caps::DETERMINISTIC.union(Caps::FS);
/// Streaming with state that grows with distinct values.
const STREAM_DICT: Caps = Caps::STREAMING
    .union(Caps::BROWSER_SAFE)
    .union(Caps::DETERMINISTIC);

fn unknown(_node: &PlanNode, _input: &Schema) -> Schema {
    Schema::unknown()
}

fn passthrough(_node: &PlanNode, input: &Schema) -> Schema {
    input.clone()
}

fn text_lines(_node: &PlanNode, _input: &Schema) -> Schema {
    Schema::of(vec![("_line".to_string(), CellType::Str)])
}

fn append_col(input: &Schema, name: String, ty: CellType) -> Schema {
    if !input.known {
        return Schema::unknown();
    }
    let mut cols = input.cols.clone();
    cols.push((name, ty));
    Schema::of(cols)
}

fn select(node: &PlanNode, input: &Schema) -> Schema {
    if !input.known {
        return Schema::unknown();
    }
    let Some(wanted) = node.arg_strings("columns") else {
        return input.clone();
    };
    Schema::of(
        wanted
            .iter()
            .filter_map(|name| {
                input
                    .col_type(name)
                    .map(|ty| (name.clone(), ty))
            })
            .collect(),
    )
}

fn rename(node: &PlanNode, input: &Schema) -> Schema {
    if !input.known {
        return Schema::unknown();
    }
    let mapping = node.arg("mapping").and_then(|v| v.as_object());
    Schema::of(
        input
            .cols
            .iter()
            .map(|(name, ty)| {
                let new = mapping
                    .and_then(|m| m.get(name))
                    .and_then(|v| v.as_str())
                    .unwrap_or(name);
                (new.to_string(), *ty)
            })
            .collect(),
    )
}

fn derive(node: &PlanNode, input: &Schema) -> Schema {
    if !input.known {
        return Schema::unknown();
    }
    let mut cols = input.cols.clone();
    if let Some(items) = node.arg("columns").and_then(|v| v.as_array()) {
        for item in items {
            if let Some(name) = item.get("name").and_then(|v| v.as_str()) {
                // value type only known once rows flow
                cols.push((name.to_string(), CellType::Null));
            }
        }
    }
    Schema::of(cols)
}

fn cast(node: &PlanNode, input: &Schema) -> Schema {
    if !input.known {
        return Schema::unknown();
    }
    let mapping = node.arg("mapping").and_then(|v| v.as_object());
    Schema::of(
        input
            .cols
            .iter()
            .map(|(name, ty)| {
                let new_ty = mapping
                    .and_then(|m| m.get(name))
                    .and_then(|v| v.as_str())
                    .and_then(CellType::parse_name)
                    .unwrap_or(*ty);
                (name.clone(), new_ty)
            })
            .collect(),
    )
}

fn hash(_node: &PlanNode, input: &Schema) -> Schema {
    append_col(input, "_hash".to_string(), CellType::Int64)
}

fn bin(node: &PlanNode, input: &Schema) -> Schema {
    let col = node.arg_str("column").unwrap_or_default();
    append_col(input, format!("{col}_bin"), CellType::Int64)
}

fn split_data(node: &PlanNode, input: &Schema) -> Schema {
    let result = node.arg_str("result").unwrap_or("split");
    append_col(input, result.to_string(), CellType::Str)
}

fn label_encode(node: &PlanNode, input: &Schema) -> Schema {
    let col = node.arg_str("column").unwrap_or_default();
    let result = node
        .arg_str("result")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{col}_code"));
    append_col(input, result, CellType::Int64)
}

fn onehot(node: &PlanNode, input: &Schema) -> Schema {
    if !input.known {
        return Schema::unknown();
    }
    let col = node.arg_str("column").unwrap_or_default();
    let mut cols = input.cols.clone();
    for value in node.arg_strings("values").unwrap_or_default() {
        cols.push((format!("{col}_{value}"), CellType::Int64));
    }
    Schema::of(cols)
}

fn datetime(node: &PlanNode, input: &Schema) -> Schema {
    let col = node.arg_str("column").unwrap_or_default();
    let part = node.arg_str("part").unwrap_or_default();
    let result = node
        .arg_str("result")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{col}_{part}"));
    append_col(input, result, CellType::Int64)
}

fn normalize(node: &PlanNode, input: &Schema) -> Schema {
    if !input.known {
        return Schema::unknown();
    }
    let col = node.arg_str("column").unwrap_or_default();
    Schema::of(
        input
            .cols
            .iter()
            .map(|(name, ty)| {
                if name == col {
                    (name.clone(), CellType::Float64)
                } else {
                    (name.clone(), *ty)
                }
            })
            .collect(),
    )
}

fn result_float(node: &PlanNode, input: &Schema) -> Schema {
    let result = node.arg_str("result").unwrap_or("result");
    append_col(input, result.to_string(), CellType::Float64)
}

fn diff(node: &PlanNode, input: &Schema) -> Schema {
    let col = node.arg_str("column").unwrap_or_default();
    let result = node
        .arg_str("result")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{col}_diff"));
    append_col(input, result, CellType::Float64)
}

fn lead(node: &PlanNode, input: &Schema) -> Schema {
    let col = node.arg_str("column").unwrap_or_default();
    let result = node
        .arg_str("result")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{col}_lead"));
    let ty = input.col_type(col).unwrap_or(CellType::Null);
    append_col(input, result, ty)
}

fn anomaly(node: &PlanNode, input: &Schema) -> Schema {
    let col = node.arg_str("column").unwrap_or_default();
    let result = node
        .arg_str("result")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{col}_anomaly"));
    append_col(input, result, CellType::Bool)
}

fn split(node: &PlanNode, input: &Schema) -> Schema {
    if !input.known {
        return Schema::unknown();
    }
    let col = node.arg_str("column").unwrap_or_default();
    let mut cols: Vec<(String, CellType)> = input
        .cols
        .iter()
        .filter(|(name, _)| name != col)
        .cloned()
        .collect();
    for name in node.arg_strings("names").unwrap_or_default() {
        cols.push((name, CellType::Str));
    }
    Schema::of(cols)
}

fn unpivot(node: &PlanNode, input: &Schema) -> Schema {
    if !input.known {
        return Schema::unknown();
    }
    let melted = node.arg_strings("columns").unwrap_or_default();
    let mut cols: Vec<(String, CellType)> = input
        .cols
        .iter()
        .filter(|(name, _)| !melted.contains(name))
        .cloned()
        .collect();
    cols.push(("name".to_string(), CellType::Str));
    cols.push(("value".to_string(), CellType::Str));
    Schema::of(cols)
}

/// Measures the `stats` op can compute.
pub const STAT_MEASURES: &[&str] = &[
    "count", "min", "max", "sum", "avg", "stddev", "variance", "median", "p25", "p75", "p90",
    "p99", "distinct", "hist", "sample",
];

/// Default measure set when the `stats` arg is omitted.
pub const STAT_DEFAULTS: &[&str] = &["count", "min", "max", "avg", "stddev"];

/// Output type of one stats measure column.
pub fn stat_measure_type(measure: &str) -> CellType {
    match measure {
        "count" | "distinct" => CellType::Int64,
        "min" | "max" | "hist" | "sample" => CellType::Str,
        _ => CellType::Float64,
    }
}

fn stats(node: &PlanNode, _input: &Schema) -> Schema {
    let measures = node
        .arg_strings("stats")
        .unwrap_or_else(|| STAT_DEFAULTS.iter().map(|s| s.to_string()).collect());
    let mut cols = vec![("column".to_string(), CellType::Str)];
    for m in measures {
        cols.push((m.clone(), stat_measure_type(&m)));
    }
    Schema::of(cols)
}

fn frequency(_node: &PlanNode, _input: &Schema) -> Schema {
    Schema::of(vec![
        ("column".to_string(), CellType::Str),
        ("value".to_string(), CellType::Str),
        ("count".to_string(), CellType::Int64),
    ])
}

fn group_agg(node: &PlanNode, input: &Schema) -> Schema {
    if !input.known {
        return Schema::unknown();
    }
    let mut cols = Vec::new();
    for name in node.arg_strings("group_by").unwrap_or_default() {
        let ty = input.col_type(&name).unwrap_or(CellType::Null);
        cols.push((name, ty));
    }
    if let Some(aggs) = node.arg("aggs").and_then(|v| v.as_array()) {
        for agg in aggs {
            let func = agg.get("func").and_then(|v| v.as_str()).unwrap_or("");
            let column = agg.get("column").and_then(|v| v.as_str()).unwrap_or("");
            let result = agg
                .get("result")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{column}_{func}"));
            let ty = match func {
                "count" => CellType::Int64,
                "sum" | "avg" => CellType::Float64,
                _ => input.col_type(column).unwrap_or(CellType::Null),
            };
            cols.push((result, ty));
        }
    }
    Schema::of(cols)
}

fn acf(_node: &PlanNode, _input: &Schema) -> Schema {
    Schema::of(vec![
        ("lag".to_string(), CellType::Int64),
        ("acf".to_string(), CellType::Float64),
    ])
}

/// The full op table.
pub static OPS: &[OpEntry] = &[
    // decoders
    OpEntry { name: "codec.csv.decode", kind: OpKind::Decoder, caps: PS, required_args: &[], infer: unknown },
    OpEntry { name: "codec.jsonl.decode", kind: OpKind::Decoder, caps: PS, required_args: &[], infer: unknown },
    OpEntry { name: "codec.text.decode", kind: OpKind::Decoder, caps: PS, required_args: &[], infer: text_lines },
    // encoders
    OpEntry { name: "codec.csv.encode", kind: OpKind::Encoder, caps: PS, required_args: &[], infer: passthrough },
    OpEntry { name: "codec.jsonl.encode", kind: OpKind::Encoder, caps: PS, required_args: &[], infer: passthrough },
    OpEntry { name: "codec.text.encode", kind: OpKind::Encoder, caps: PS, required_args: &[], infer: passthrough },
    OpEntry { name: "codec.table.encode", kind: OpKind::Encoder, caps: AGG, required_args: &[], infer: passthrough },
    // streaming transforms
    OpEntry { name: "filter", kind: OpKind::Transform, caps: PS, required_args: &["expr"], infer: passthrough },
    OpEntry { name: "validate", kind: OpKind::Transform, caps: PS, required_args: &["expr"], infer: passthrough },
    OpEntry { name: "grep", kind: OpKind::Transform, caps: PS, required_args: &["pattern"], infer: passthrough },
    OpEntry { name: "head", kind: OpKind::Transform, caps: PS, required_args: &["n"], infer: passthrough },
    OpEntry { name: "skip", kind: OpKind::Transform, caps: PS, required_args: &["n"], infer: passthrough },
    OpEntry { name: "select", kind: OpKind::Transform, caps: PS, required_args: &["columns"], infer: select },
    OpEntry { name: "reorder", kind: OpKind::Transform, caps: PS, required_args: &["columns"], infer: select },
    OpEntry { name: "rename", kind: OpKind::Transform, caps: PS, required_args: &["mapping"], infer: rename },
    OpEntry { name: "derive", kind: OpKind::Transform, caps: PS, required_args: &["columns"], infer: derive },
    OpEntry { name: "cast", kind: OpKind::Transform, caps: PS, required_args: &["mapping"], infer: cast },
    OpEntry { name: "trim", kind: OpKind::Transform, caps: PS, required_args: &[], infer: passthrough },
    OpEntry { name: "fill_null", kind: OpKind::Transform, caps: PS, required_args: &["mapping"], infer: passthrough },
    OpEntry { name: "fill_down", kind: OpKind::Transform, caps: PS, required_args: &[], infer: passthrough },
    OpEntry { name: "clip", kind: OpKind::Transform, caps: PS, required_args: &["column"], infer: passthrough },
    OpEntry { name: "replace", kind: OpKind::Transform, caps: PS, required_args: &["column", "pattern", "replacement"], infer: passthrough },
    OpEntry { name: "hash", kind: OpKind::Transform, caps: PS, required_args: &[], infer: hash },
    OpEntry { name: "bin", kind: OpKind::Transform, caps: PS, required_args: &["column", "boundaries"], infer: bin },
    OpEntry { name: "split_data", kind: OpKind::Transform, caps: PS, required_args: &[], infer: split_data },
    OpEntry { name: "interpolate", kind: OpKind::Transform, caps: PS, required_args: &[], infer: passthrough },
    OpEntry { name: "normalize", kind: OpKind::Transform, caps: PS, required_args: &["column", "min", "max"], infer: normalize },
    OpEntry { name: "onehot", kind: OpKind::Transform, caps: PS, required_args: &["column", "values"], infer: onehot },
    OpEntry { name: "label_encode", kind: OpKind::Transform, caps: STREAM_DICT, required_args: &["column"], infer: label_encode },
    OpEntry { name: "datetime", kind: OpKind::Transform, caps: PS, required_args: &["column", "part"], infer: datetime },
    OpEntry { name: "date_trunc", kind: OpKind::Transform, caps: PS, required_args: &["column", "unit"], infer: passthrough },
    OpEntry { name: "explode", kind: OpKind::Transform, caps: PS, required_args: &["column"], infer: passthrough },
    OpEntry { name: "split", kind: OpKind::Transform, caps: PS, required_args: &["column", "names"], infer: split },
    OpEntry { name: "unpivot", kind: OpKind::Transform, caps: PS, required_args: &["columns"], infer: unpivot },
    // stateful streaming
    OpEntry { name: "step", kind: OpKind::Transform, caps: PS, required_args: &["column", "func", "result"], infer: result_float },
    OpEntry { name: "window", kind: OpKind::Transform, caps: PS, required_args: &["column", "size", "func", "result"], infer: result_float },
    OpEntry { name: "ewma", kind: OpKind::Transform, caps: PS, required_args: &["column", "alpha", "result"], infer: result_float },
    OpEntry { name: "diff", kind: OpKind::Transform, caps: PS, required_args: &["column"], infer: diff },
    OpEntry { name: "lead", kind: OpKind::Transform, caps: PS, required_args: &["column"], infer: lead },
    OpEntry { name: "anomaly", kind: OpKind::Transform, caps: PS, required_args: &["column"], infer: anomaly },
    // aggregates
    OpEntry { name: "tail", kind: OpKind::Transform, caps: AGG_BOUNDED, required_args: &["n"], infer: passthrough },
    OpEntry { name: "top", kind: OpKind::Transform, caps: AGG_BOUNDED, required_args: &["n", "column"], infer: passthrough },
    OpEntry { name: "sample", kind: OpKind::Transform, caps: AGG_BOUNDED, required_args: &["n"], infer: passthrough },
    OpEntry { name: "sort", kind: OpKind::Transform, caps: AGG, required_args: &["columns"], infer: passthrough },
    OpEntry { name: "unique", kind: OpKind::Transform, caps: AGG, required_args: &[], infer: passthrough },
    OpEntry { name: "dedup", kind: OpKind::Transform, caps: AGG, required_args: &[], infer: passthrough },
    OpEntry { name: "stats", kind: OpKind::Transform, caps: AGG, required_args: &[], infer: stats },
    OpEntry { name: "frequency", kind: OpKind::Transform, caps: AGG, required_args: &[], infer: frequency },
    OpEntry { name: "group_agg", kind: OpKind::Transform, caps: AGG, required_args: &["group_by", "aggs"], infer: group_agg },
    OpEntry { name: "pivot", kind: OpKind::Transform, caps: AGG, required_args: &["name_column", "value_column"], infer: unknown },
    OpEntry { name: "join", kind: OpKind::Transform, caps: AGG_FS, required_args: &["file", "on"], infer: unknown },
    OpEntry { name: "stack", kind: OpKind::Transform, caps: AGG_FS, required_args: &["file"], infer: unknown },
    OpEntry { name: "acf", kind: OpKind::Transform, caps: AGG, required_args: &["column"], infer: acf },
];

/// Case-sensitive lookup.
pub fn lookup(name: &str) -> Option<&'static OpEntry> {
    OPS.iter().find(|e| e.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(lookup("filter").is_some());
        assert!(lookup("Filter").is_none());
        assert!(lookup("codec.csv.decode").is_some());
    }

    #[test]
    fn aliases_resolve() {
        assert!(lookup("dedup").is_some());
        assert!(lookup("reorder").is_some());
    }

    #[test]
    fn select_inference_reorders_and_drops() {
        let node = PlanNode::new("select", json!({"columns": ["b", "a"]}));
        let input = Schema::of(vec![
            ("a".to_string(), CellType::Int64),
            ("b".to_string(), CellType::Str),
            ("c".to_string(), CellType::Float64),
        ]);
        let out = select(&node, &input);
        assert_eq!(
            out.cols,
            vec![
                ("b".to_string(), CellType::Str),
                ("a".to_string(), CellType::Int64)
            ]
        );
    }

    #[test]
    fn unknown_input_propagates() {
        let node = PlanNode::new("select", json!({"columns": ["a"]}));
        assert!(!select(&node, &Schema::unknown()).known);
    }

    #[test]
    fn stats_schema_known_without_input() {
        let node = PlanNode::new("stats", json!({}));
        let out = stats(&node, &Schema::unknown());
        assert!(out.known);
        assert_eq!(out.cols[0].0, "column");
        assert!(out.col_index("stddev").is_some());
    }

    #[test]
    fn rename_inference() {
        let node = PlanNode::new("rename", json!({"mapping": {"a": "x"}}));
        let input = Schema::of(vec![
            ("a".to_string(), CellType::Int64),
            ("b".to_string(), CellType::Str),
        ]);
        let out = rename(&node, &input);
        assert_eq!(out.cols[0].0, "x");
        assert_eq!(out.cols[1].0, "b");
    }
}
