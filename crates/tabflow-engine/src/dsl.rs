//! Surface pipe-DSL frontend.
//!
//! `csv | filter "col(age) > 25" | head 10 | csv` compiles to the same plan
//! IR as the JSON recipe format. Stages are separated by `|` outside quotes;
//! the first stage names the decoder, the last the encoder. Tokens are
//! whitespace-separated with single- or double-quoted strings kept whole;
//! `key=value` tokens become named args and each op maps its positional
//! tokens as documented in the op table.

use serde_json::{json, Map, Value as Json};
use tabflow_core::{FlowError, Plan};

/// Split on a separator outside quotes.
fn split_outside_quotes(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) => {
                cur.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c == '\'' || c == '"' => {
                cur.push(c);
                quote = Some(c);
            }
            None if c == sep => {
                parts.push(cur.trim().to_string());
                cur = String::new();
            }
            None => cur.push(c),
        }
    }
    parts.push(cur.trim().to_string());
    parts
}

/// Tokenize one stage; quoted tokens lose their quotes but keep their text.
fn tokenize(stage: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;
    for c in stage.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => cur.push(c),
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c.is_whitespace() => {
                if !cur.is_empty() {
                    tokens.push(std::mem::take(&mut cur));
                }
            }
            None => cur.push(c),
        }
    }
    if !cur.is_empty() {
        tokens.push(cur);
    }
    tokens
}

/// Interpret `key=value` option text as JSON: number, bool, else string.
fn option_value(text: &str) -> Json {
    if let Ok(i) = text.parse::<i64>() {
        return json!(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        return json!(f);
    }
    match text {
        "true" => json!(true),
        "false" => json!(false),
        _ => json!(text),
    }
}

fn codec_op(token: &str, decode: bool) -> Option<&'static str> {
    match (token, decode) {
        ("csv", true) | ("csv.decode", _) => Some("codec.csv.decode"),
        ("csv", false) | ("csv.encode", _) => Some("codec.csv.encode"),
        ("jsonl", true) | ("jsonl.decode", _) => Some("codec.jsonl.decode"),
        ("jsonl", false) | ("jsonl.encode", _) => Some("codec.jsonl.encode"),
        ("text", true) | ("text.decode", _) => Some("codec.text.decode"),
        ("text", false) | ("text.encode", _) => Some("codec.text.encode"),
        ("table", false) => Some("codec.table.encode"),
        _ => None,
    }
}

fn plan_err(msg: String) -> FlowError {
    FlowError::Plan(msg)
}

/// Build one codec node from its stage tokens.
fn codec_stage(tokens: &[String], decode: bool) -> Result<(String, Json), FlowError> {
    let op = codec_op(&tokens[0], decode).ok_or_else(|| {
        plan_err(format!(
            "`{}` is not a codec usable as {}",
            tokens[0],
            if decode { "decoder" } else { "encoder" }
        ))
    })?;
    let mut args = Map::new();
    for token in &tokens[1..] {
        let Some((key, value)) = token.split_once('=') else {
            return Err(plan_err(format!("unexpected codec token `{token}`")));
        };
        args.insert(key.to_string(), option_value(value));
    }
    Ok((op.to_string(), Json::Object(args)))
}

/// Build one transform node from its stage tokens.
fn transform_stage(tokens: &[String]) -> Result<(String, Json), FlowError> {
    let op = tokens[0].as_str();
    let rest = &tokens[1..];
    let mut args = Map::new();

    // ops whose key=value tokens are data (mappings, `on` specs), not options
    let kv_is_data = matches!(op, "rename" | "cast" | "fill_null" | "derive" | "join");

    let mut positional: Vec<&str> = Vec::new();
    for token in rest {
        match token.as_str() {
            "-v" => {
                args.insert("invert".into(), json!(true));
            }
            "-r" | "--regex" => {
                args.insert("regex".into(), json!(true));
            }
            "-rv" | "-vr" => {
                args.insert("invert".into(), json!(true));
                args.insert("regex".into(), json!(true));
            }
            "--left" => {
                args.insert("how".into(), json!("left"));
            }
            "--inner" => {
                args.insert("how".into(), json!("inner"));
            }
            _ if op == "sort" => positional.push(token.as_str()),
            _ => match token.split_once('=') {
                Some((key, value)) if !kv_is_data && !key.is_empty() => {
                    args.insert(key.to_string(), option_value(value));
                }
                _ => positional.push(token.as_str()),
            },
        }
    }

    match op {
        "filter" | "validate" => {
            if let Some(expr) = positional.first() {
                args.insert("expr".into(), json!(expr));
            }
        }
        "grep" => {
            if let Some(pattern) = positional.first() {
                args.insert("pattern".into(), json!(pattern));
            }
        }
        "head" | "skip" | "tail" | "sample" => {
            if let Some(n) = positional.first() {
                args.insert("n".into(), option_value(n));
            }
        }
        "top" => {
            if let Some(n) = positional.first() {
                args.insert("n".into(), option_value(n));
            }
            if let Some(column) = positional.get(1) {
                match column.strip_prefix('-') {
                    Some(name) => {
                        args.insert("column".into(), json!(name));
                        args.insert("desc".into(), json!(true));
                    }
                    None => {
                        args.insert("column".into(), json!(column));
                    }
                }
            }
            if positional.get(2) == Some(&"desc") {
                args.insert("desc".into(), json!(true));
            }
        }
        "sort" => {
            let columns: Vec<&str> = positional
                .iter()
                .flat_map(|t| t.split(','))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            args.insert("columns".into(), json!(columns));
        }
        "unique" | "dedup" | "trim" | "fill_down" | "hash" | "interpolate" | "frequency"
        | "unpivot" | "select" | "reorder" => {
            if !positional.is_empty() {
                let columns: Vec<&str> = positional
                    .iter()
                    .flat_map(|t| t.split(','))
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect();
                args.insert("columns".into(), json!(columns));
            }
        }
        "rename" | "cast" => {
            let mut mapping = Map::new();
            for pair in &positional {
                let Some((from, to)) = pair.split_once('=') else {
                    return Err(plan_err(format!("`{op}` expects old=new pairs, got `{pair}`")));
                };
                mapping.insert(from.to_string(), json!(to));
            }
            args.insert("mapping".into(), Json::Object(mapping));
        }
        "fill_null" => {
            let mut mapping = Map::new();
            for pair in &positional {
                let Some((col, value)) = pair.split_once('=') else {
                    return Err(plan_err(format!(
                        "`fill_null` expects col=value pairs, got `{pair}`"
                    )));
                };
                mapping.insert(col.to_string(), option_value(value));
            }
            args.insert("mapping".into(), Json::Object(mapping));
        }
        "derive" => {
            let mut columns = Vec::new();
            for pair in &positional {
                let Some((name, expr)) = pair.split_once('=') else {
                    return Err(plan_err(format!(
                        "`derive` expects name=expr pairs, got `{pair}`"
                    )));
                };
                columns.push(json!({"name": name, "expr": expr}));
            }
            args.insert("columns".into(), Json::Array(columns));
        }
        "clip" | "label_encode" | "diff" | "acf" | "anomaly" | "lead" => {
            if let Some(column) = positional.first() {
                args.insert("column".into(), json!(column));
            }
            if let Some(extra) = positional.get(1) {
                let key = match op {
                    "acf" => "lags",
                    "anomaly" => "threshold",
                    "lead" => "offset",
                    _ => "result",
                };
                args.insert(key.into(), option_value(extra));
            }
        }
        "replace" => {
            for (i, key) in ["column", "pattern", "replacement"].iter().enumerate() {
                if let Some(v) = positional.get(i) {
                    args.insert((*key).into(), json!(v));
                }
            }
        }
        "bin" => {
            if let Some(column) = positional.first() {
                args.insert("column".into(), json!(column));
            }
            if let Some(bounds) = positional.get(1) {
                args.insert("boundaries".into(), json!(bounds));
            }
        }
        "step" => {
            if let Some(column) = positional.first() {
                args.insert("column".into(), json!(column));
            }
            if let Some(func) = positional.get(1) {
                args.insert("func".into(), json!(func));
                if let Some(column) = positional.first() {
                    let result = positional
                        .get(2)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| format!("{column}_{}", func.trim_start_matches("running-")));
                    args.insert("result".into(), json!(result));
                }
            }
        }
        "window" => {
            if let Some(column) = positional.first() {
                args.insert("column".into(), json!(column));
            }
            if let Some(size) = positional.get(1) {
                args.insert("size".into(), option_value(size));
            }
            if let Some(func) = positional.get(2) {
                args.insert("func".into(), json!(func));
                if let Some(column) = positional.first() {
                    let result = positional
                        .get(3)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| format!("{column}_{func}"));
                    args.insert("result".into(), json!(result));
                }
            }
        }
        "ewma" => {
            if let Some(column) = positional.first() {
                args.insert("column".into(), json!(column));
                let result = positional
                    .get(2)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("{column}_ewma"));
                args.insert("result".into(), json!(result));
            }
            if let Some(alpha) = positional.get(1) {
                args.insert("alpha".into(), option_value(alpha));
            }
        }
        "split_data" => {
            if let Some(ratio) = positional.first() {
                args.insert("ratio".into(), option_value(ratio));
            }
        }
        "normalize" => {
            for (i, key) in ["column", "min", "max"].iter().enumerate() {
                if let Some(v) = positional.get(i) {
                    args.insert((*key).into(), option_value(v));
                }
            }
        }
        "onehot" => {
            if let Some(column) = positional.first() {
                args.insert("column".into(), json!(column));
            }
            if let Some(values) = positional.get(1) {
                args.insert("values".into(), json!(values));
            }
        }
        "datetime" | "date_trunc" => {
            if let Some(column) = positional.first() {
                args.insert("column".into(), json!(column));
            }
            let key = if op == "datetime" { "part" } else { "unit" };
            if let Some(v) = positional.get(1) {
                args.insert(key.into(), json!(v));
            }
            if let Some(result) = positional.get(2) {
                args.insert("result".into(), json!(result));
            }
        }
        "explode" => {
            if let Some(column) = positional.first() {
                args.insert("column".into(), json!(column));
            }
            if let Some(delim) = positional.get(1) {
                args.insert("delimiter".into(), json!(delim));
            }
        }
        "split" => {
            if let Some(column) = positional.first() {
                args.insert("column".into(), json!(column));
            }
            if let Some(names) = positional.get(1) {
                args.insert("names".into(), json!(names));
            }
            if let Some(delim) = positional.get(2) {
                args.insert("delimiter".into(), json!(delim));
            }
        }
        "stats" => {
            if let Some(measures) = positional.first() {
                args.insert("stats".into(), json!(measures));
            }
        }
        "group_agg" => {
            if let Some(group) = positional.first() {
                args.insert("group_by".into(), json!(group));
            }
            let mut aggs = Vec::new();
            for token in positional.iter().skip(1) {
                let parts: Vec<&str> = token.split(':').collect();
                match parts.as_slice() {
                    [func, column] => aggs.push(json!({"func": func, "column": column})),
                    [func, column, result] => {
                        aggs.push(json!({"func": func, "column": column, "result": result}))
                    }
                    _ => {
                        return Err(plan_err(format!(
                            "`group_agg` expects func:column[:result], got `{token}`"
                        )))
                    }
                }
            }
            if !aggs.is_empty() {
                args.insert("aggs".into(), Json::Array(aggs));
            }
        }
        "pivot" => {
            for (i, key) in ["name_column", "value_column", "agg"].iter().enumerate() {
                if let Some(v) = positional.get(i) {
                    args.insert((*key).into(), json!(v));
                }
            }
        }
        "join" => {
            if let Some(file) = positional.first() {
                args.insert("file".into(), json!(file));
            }
            if let Some(on) = positional.get(1) {
                args.insert("on".into(), json!(on));
            }
        }
        "stack" => {
            if let Some(file) = positional.first() {
                args.insert("file".into(), json!(file));
            }
        }
        _ => {
            if !positional.is_empty() {
                return Err(plan_err(format!(
                    "op `{op}` does not take positional arguments: {positional:?}"
                )));
            }
        }
    }

    Ok((op.to_string(), Json::Object(args)))
}

/// Compile a pipe-DSL string into a plan.
pub fn parse(dsl: &str) -> Result<Plan, FlowError> {
    let stages: Vec<Vec<String>> = split_outside_quotes(dsl, '|')
        .iter()
        .map(|s| tokenize(s))
        .collect();
    if stages.len() < 2 || stages.iter().any(|s| s.is_empty()) {
        return Err(plan_err(
            "a pipeline needs at least `decoder | encoder`".into(),
        ));
    }
    let last = stages.len() - 1;
    let mut plan = Plan::new();
    for (i, tokens) in stages.iter().enumerate() {
        let (op, args) = if i == 0 {
            codec_stage(tokens, true)?
        } else if i == last {
            codec_stage(tokens, false)?
        } else {
            transform_stage(tokens)?
        };
        plan.add_node(&op, args);
    }
    Ok(plan)
}
