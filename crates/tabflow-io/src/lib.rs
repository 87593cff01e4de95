//! # tabflow-io - Byte Codecs
//!
//! Decoder and encoder implementations for the tabflow pipeline boundary:
//!
//! - **CSV**: configurable delimiter, header and repair modes, per-column
//!   type autodetection with widening
//! - **JSON Lines**: one object per line, union-of-keys schema
//! - **Text**: a single `_line` column, one row per line
//! - **Pretty table**: full-load, column-aligned terminal output
//!
//! Decoders are incremental: they accept arbitrary byte chunks and emit a
//! batch whenever enough complete rows are buffered.

pub mod csv;
pub mod detect;
pub mod jsonl;
pub mod table;
pub mod text;

use anyhow::Result;
use tabflow_core::{Decode, Encode, FlowError, PlanNode};

use csv::{CsvDecoder, CsvEncoder, DEFAULT_BATCH_ROWS};
use jsonl::{JsonlDecoder, JsonlEncoder};
use table::{TableEncoder, DEFAULT_MAX_WIDTH};
use text::{TextDecoder, TextEncoder};

/// Resolve a `delimiter` option; `tab` and `\t` name the tab character.
fn delimiter_arg(node: &PlanNode) -> Result<u8, FlowError> {
    let Some(text) = node.arg_str("delimiter") else {
        return Ok(b',');
    };
    match text {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        s if s.len() == 1 => Ok(s.as_bytes()[0]),
        other => Err(FlowError::BadArg {
            op: node.op.clone(),
            msg: format!("delimiter must be a single character, got `{other}`"),
        }),
    }
}

/// Build the decoder instance for a plan node.
pub fn create_decoder(node: &PlanNode) -> Result<Box<dyn Decode>, FlowError> {
    let batch_rows = node
        .arg_i64("batch_rows")
        .map(|n| n.max(1) as usize)
        .unwrap_or(DEFAULT_BATCH_ROWS);
    match node.op.as_str() {
        "codec.csv.decode" => {
            let delimiter = delimiter_arg(node)?;
            let header = node.arg_bool("header").unwrap_or(true);
            let repair = node.arg_bool("repair").unwrap_or(false);
            Ok(Box::new(CsvDecoder::new(delimiter, header, repair, batch_rows)))
        }
        "codec.jsonl.decode" => Ok(Box::new(JsonlDecoder::new(batch_rows))),
        "codec.text.decode" => Ok(Box::new(TextDecoder::new(batch_rows))),
        other => Err(FlowError::UnknownOp(other.to_string())),
    }
}

/// Build the encoder instance for a plan node.
pub fn create_encoder(node: &PlanNode) -> Result<Box<dyn Encode>, FlowError> {
    match node.op.as_str() {
        "codec.csv.encode" => Ok(Box::new(CsvEncoder::new(delimiter_arg(node)?))),
        "codec.jsonl.encode" => Ok(Box::new(JsonlEncoder)),
        "codec.text.encode" => Ok(Box::new(TextEncoder)),
        "codec.table.encode" => {
            let width = node
                .arg_i64("width")
                .map(|n| n.max(3) as usize)
                .unwrap_or(DEFAULT_MAX_WIDTH);
            Ok(Box::new(TableEncoder::new(width)))
        }
        other => Err(FlowError::UnknownOp(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn factories_build_known_codecs() {
        let node = PlanNode::new("codec.csv.decode", json!({"delimiter": "tab"}));
        assert!(create_decoder(&node).is_ok());
        let node = PlanNode::new("codec.table.encode", json!({"width": 20}));
        assert!(create_encoder(&node).is_ok());
    }

    #[test]
    fn factories_reject_unknown_and_bad_args() {
        let node = PlanNode::new("codec.parquet.decode", json!({}));
        assert!(create_decoder(&node).is_err());
        let node = PlanNode::new("codec.csv.decode", json!({"delimiter": "--"}));
        assert!(create_decoder(&node).is_err());
    }
}
