//! Plan intermediate representation.
//!
//! A plan is a validated, schema-inferred linear sequence of nodes. It is the
//! compile target of both frontends (the pipe DSL and the JSON recipe format)
//! and the input of the pipeline executor. Construction never fails; failures
//! surface from `validate`, which records an error string on the plan the way
//! a frontend can report it verbatim.

use crate::caps::Caps;
use crate::error::FlowError;
use crate::registry::{self, OpKind};
use crate::schema::Schema;
use serde_json::Value as Json;
use tracing::debug;

/// One step of a plan: op name, structured args, inferred schemas, caps.
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub op: String,
    pub args: Json,
    pub input_schema: Schema,
    pub output_schema: Schema,
    pub caps: Caps,
}

impl PlanNode {
    pub fn new(op: &str, args: Json) -> PlanNode {
        PlanNode {
            op: op.to_string(),
            args,
            input_schema: Schema::unknown(),
            output_schema: Schema::unknown(),
            caps: Caps::empty(),
        }
    }

    pub fn arg(&self, key: &str) -> Option<&Json> {
        self.args.get(key)
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key)?.as_str()
    }

    pub fn arg_i64(&self, key: &str) -> Option<i64> {
        let v = self.args.get(key)?;
        v.as_i64().or_else(|| v.as_str()?.trim().parse().ok())
    }

    pub fn arg_f64(&self, key: &str) -> Option<f64> {
        let v = self.args.get(key)?;
        v.as_f64().or_else(|| v.as_str()?.trim().parse().ok())
    }

    pub fn arg_bool(&self, key: &str) -> Option<bool> {
        let v = self.args.get(key)?;
        v.as_bool().or_else(|| match v.as_str()? {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        })
    }

    /// A list argument: a JSON array of strings, or one comma-separated
    /// string as the DSL writes it.
    pub fn arg_strings(&self, key: &str) -> Option<Vec<String>> {
        match self.args.get(key)? {
            Json::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            Json::String(s) => Some(
                s.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Present and non-empty, as required-arg validation defines it.
    pub fn has_arg(&self, key: &str) -> bool {
        match self.args.get(key) {
            None | Some(Json::Null) => false,
            Some(Json::String(s)) => !s.is_empty(),
            Some(Json::Array(a)) => !a.is_empty(),
            Some(Json::Object(o)) => !o.is_empty(),
            Some(_) => true,
        }
    }
}

/// Ordered sequence of plan nodes plus derived metadata.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub nodes: Vec<PlanNode>,
    /// Output schema of the last non-encoder node. Stays unknown for a
    /// minimal decoder+encoder plan whose decoder cannot know its columns at
    /// plan time.
    pub final_schema: Schema,
    pub plan_caps: Caps,
    pub validated: bool,
    pub schema_inferred: bool,
    pub error: Option<String>,
}

impl Plan {
    pub fn new() -> Plan {
        Plan::default()
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Append a node; `args` is owned by the node (deep copy semantics).
    pub fn add_node(&mut self, op: &str, args: Json) {
        self.nodes.push(PlanNode::new(op, args));
        self.validated = false;
        self.schema_inferred = false;
    }

    /// Structural and required-arg validation; on success sets `validated`
    /// and `plan_caps`, on failure records `error` and returns it.
    pub fn validate(&mut self) -> Result<(), FlowError> {
        match self.check() {
            Ok(()) => {
                self.plan_caps = Caps::aggregate(self.nodes.iter().map(|n| n.caps));
                self.validated = true;
                self.error = None;
                debug!(nodes = self.nodes.len(), caps = ?self.plan_caps, "plan validated");
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                self.validated = false;
                Err(e)
            }
        }
    }

    fn check(&mut self) -> Result<(), FlowError> {
        if self.nodes.is_empty() {
            return Err(FlowError::Plan("plan is empty".into()));
        }
        let last = self.nodes.len() - 1;
        for (i, node) in self.nodes.iter_mut().enumerate() {
            let entry = registry::lookup(&node.op)
                .ok_or_else(|| FlowError::UnknownOp(node.op.clone()))?;
            node.caps = entry.caps;
            match entry.kind {
                OpKind::Decoder if i != 0 => {
                    return Err(FlowError::Plan(format!(
                        "decoder `{}` must be the first node",
                        node.op
                    )));
                }
                OpKind::Encoder if i != last => {
                    return Err(FlowError::Plan(format!(
                        "encoder `{}` must be the last node",
                        node.op
                    )));
                }
                _ => {}
            }
            for arg in entry.required_args {
                if !node.has_arg(arg) {
                    return Err(FlowError::MissingArg {
                        op: node.op.clone(),
                        arg: (*arg).to_string(),
                    });
                }
            }
        }
        let first_kind = registry::lookup(&self.nodes[0].op).map(|e| e.kind);
        if first_kind != Some(OpKind::Decoder) {
            return Err(FlowError::Plan("plan must start with a decoder".into()));
        }
        let last_kind = registry::lookup(&self.nodes[last].op).map(|e| e.kind);
        if last_kind != Some(OpKind::Encoder) {
            return Err(FlowError::Plan("plan must end with an encoder".into()));
        }
        if self.nodes.len() < 2 {
            return Err(FlowError::Plan("plan needs a decoder and an encoder".into()));
        }
        Ok(())
    }

    /// Best-effort forward schema propagation. Node 0's input is unknown;
    /// node i's input is node i−1's output.
    pub fn infer_schema(&mut self) {
        let mut current = Schema::unknown();
        let mut final_schema = Schema::unknown();
        for node in &mut self.nodes {
            node.input_schema = current.clone();
            node.output_schema = match registry::lookup(&node.op) {
                Some(entry) => (entry.infer)(node, &current),
                None => Schema::unknown(),
            };
            current = node.output_schema.clone();
            if registry::lookup(&node.op).map(|e| e.kind) != Some(OpKind::Encoder) {
                final_schema = node.output_schema.clone();
            }
        }
        self.final_schema = final_schema;
        self.schema_inferred = true;
    }

    /// Normalized JSON form: `{"steps":[{"op":…,"args":…},…]}`.
    pub fn to_json(&self) -> Json {
        Json::Object(
            [(
                "steps".to_string(),
                Json::Array(
                    self.nodes
                        .iter()
                        .map(|n| {
                            serde_json::json!({
                                "op": n.op,
                                "args": n.args,
                            })
                        })
                        .collect(),
                ),
            )]
            .into_iter()
            .collect(),
        )
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    pub fn from_json(text: &str) -> Result<Plan, FlowError> {
        let doc: Json = serde_json::from_str(text)
            .map_err(|e| FlowError::Plan(format!("bad plan JSON: {e}")))?;
        let steps = doc
            .get("steps")
            .and_then(Json::as_array)
            .ok_or_else(|| FlowError::Plan("plan JSON has no `steps` array".into()))?;
        let mut plan = Plan::new();
        for step in steps {
            let op = step
                .get("op")
                .and_then(Json::as_str)
                .ok_or_else(|| FlowError::Plan("step without `op`".into()))?;
            let args = step.get("args").cloned().unwrap_or_else(|| serde_json::json!({}));
            plan.add_node(op, args);
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn csv_to_csv() -> Plan {
        let mut p = Plan::new();
        p.add_node("codec.csv.decode", json!({}));
        p.add_node("codec.csv.encode", json!({}));
        p
    }

    #[test]
    fn minimal_plan_validates() {
        let mut p = csv_to_csv();
        assert!(p.validate().is_ok());
        assert!(p.validated);
        assert!(p.plan_caps.contains(Caps::STREAMING));
        assert!(p.plan_caps.contains(Caps::BOUNDED_MEMORY));
    }

    #[test]
    fn empty_plan_rejected() {
        let mut p = Plan::new();
        assert!(p.validate().is_err());
        assert!(p.error.is_some());
    }

    #[test]
    fn missing_decoder_rejected() {
        let mut p = Plan::new();
        p.add_node("head", json!({"n": 3}));
        p.add_node("codec.csv.encode", json!({}));
        assert!(p.validate().is_err());
    }

    #[test]
    fn decoder_after_first_rejected() {
        let mut p = Plan::new();
        p.add_node("codec.csv.decode", json!({}));
        p.add_node("codec.jsonl.decode", json!({}));
        p.add_node("codec.csv.encode", json!({}));
        assert!(p.validate().is_err());
    }

    #[test]
    fn unknown_op_rejected() {
        let mut p = Plan::new();
        p.add_node("codec.csv.decode", json!({}));
        p.add_node("transmogrify", json!({}));
        p.add_node("codec.csv.encode", json!({}));
        let err = p.validate().unwrap_err();
        assert!(matches!(err, FlowError::UnknownOp(_)));
    }

    #[test]
    fn required_arg_must_be_nonempty() {
        let mut p = Plan::new();
        p.add_node("codec.csv.decode", json!({}));
        p.add_node("filter", json!({"expr": ""}));
        p.add_node("codec.csv.encode", json!({}));
        let err = p.validate().unwrap_err();
        assert!(matches!(err, FlowError::MissingArg { .. }));
    }

    #[test]
    fn aggregate_op_drops_streaming_cap() {
        let mut p = Plan::new();
        p.add_node("codec.csv.decode", json!({}));
        p.add_node("sort", json!({"columns": ["age"]}));
        p.add_node("codec.csv.encode", json!({}));
        p.validate().unwrap();
        assert!(!p.plan_caps.contains(Caps::STREAMING));
        assert!(p.plan_caps.contains(Caps::DETERMINISTIC));
    }

    #[test]
    fn join_plan_carries_fs_effect() {
        let mut p = Plan::new();
        p.add_node("codec.csv.decode", json!({}));
        p.add_node("join", json!({"file": "right.csv", "on": "id"}));
        p.add_node("codec.csv.encode", json!({}));
        p.validate().unwrap();
        assert!(p.plan_caps.contains(Caps::FS));
        assert!(!p.plan_caps.contains(Caps::BROWSER_SAFE));
    }

    #[test]
    fn minimal_plan_final_schema_stays_unknown() {
        let mut p = csv_to_csv();
        p.validate().unwrap();
        p.infer_schema();
        assert!(!p.final_schema.known);
    }

    #[test]
    fn text_decoder_schema_is_known() {
        let mut p = Plan::new();
        p.add_node("codec.text.decode", json!({}));
        p.add_node("codec.text.encode", json!({}));
        p.validate().unwrap();
        p.infer_schema();
        assert!(p.final_schema.known);
        assert_eq!(p.final_schema.cols[0].0, "_line");
    }

    #[test]
    fn json_round_trip() {
        let mut p = Plan::new();
        p.add_node("codec.csv.decode", json!({}));
        p.add_node("filter", json!({"expr": "col('age') > 25"}));
        p.add_node("head", json!({"n": 10}));
        p.add_node("codec.csv.encode", json!({}));
        let text = p.to_json_string();
        let p2 = Plan::from_json(&text).unwrap();
        assert_eq!(p2.n_nodes(), 4);
        assert_eq!(p2.nodes[1].op, "filter");
        assert_eq!(p2.nodes[1].arg_str("expr"), Some("col('age') > 25"));
        assert_eq!(p2.nodes[2].arg_i64("n"), Some(10));
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(Plan::from_json("not json").is_err());
        assert!(Plan::from_json("{\"steps\": 4}").is_err());
    }
}
