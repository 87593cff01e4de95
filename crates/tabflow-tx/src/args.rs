//! Typed extraction of operator arguments from plan nodes.
//!
//! Constructors run at pipeline compile time; a malformed argument fails the
//! whole compile rather than surfacing mid-stream.

use tabflow_core::{FlowError, PlanNode};

pub fn required_str(node: &PlanNode, key: &str) -> Result<String, FlowError> {
    node.arg_str(key)
        .map(str::to_string)
        .ok_or_else(|| FlowError::MissingArg {
            op: node.op.clone(),
            arg: key.to_string(),
        })
}

pub fn required_usize(node: &PlanNode, key: &str) -> Result<usize, FlowError> {
    let n = node.arg_i64(key).ok_or_else(|| FlowError::MissingArg {
        op: node.op.clone(),
        arg: key.to_string(),
    })?;
    if n < 0 {
        return Err(bad(node, format!("`{key}` must be non-negative, got {n}")));
    }
    Ok(n as usize)
}

pub fn required_f64(node: &PlanNode, key: &str) -> Result<f64, FlowError> {
    node.arg_f64(key).ok_or_else(|| FlowError::MissingArg {
        op: node.op.clone(),
        arg: key.to_string(),
    })
}

/// Optional column list; `None` means "all columns".
pub fn columns_opt(node: &PlanNode, key: &str) -> Option<Vec<String>> {
    node.arg_strings(key).filter(|cols| !cols.is_empty())
}

pub fn bad(node: &PlanNode, msg: String) -> FlowError {
    FlowError::BadArg {
        op: node.op.clone(),
        msg,
    }
}
