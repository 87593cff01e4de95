//! JSON Lines codec: one object per line.
//!
//! Decoder typing: unquoted numbers become INT64 or FLOAT64, `true`/`false`
//! become BOOL, `null` is a null cell, strings stay STRING, and object or
//! array values become a STRING cell holding their JSON text. Columns are the
//! union of keys in first-seen order; types widen per column the same way the
//! CSV decoder widens.

use crate::detect::widen;
use anyhow::Result;
use serde_json::{json, Map, Value as Json};
use tabflow_core::value::{format_date, format_timestamp};
use tabflow_core::{Batch, ByteBuf, CellType, Decode, Encode, SideChannels, Value};

fn json_cell_type(v: &Json) -> CellType {
    match v {
        Json::Null => CellType::Null,
        Json::Bool(_) => CellType::Bool,
        Json::Number(n) => {
            if n.is_i64() {
                CellType::Int64
            } else {
                CellType::Float64
            }
        }
        Json::String(_) => CellType::Str,
        Json::Array(_) | Json::Object(_) => CellType::Str,
    }
}

fn json_to_value(ty: CellType, v: &Json) -> Value {
    match v {
        Json::Null => Value::Null,
        Json::Bool(b) => match ty {
            CellType::Bool => Value::Bool(*b),
            CellType::Str => Value::Str(b.to_string()),
            _ => Value::Null,
        },
        Json::Number(n) => match ty {
            CellType::Int64 => n.as_i64().map(Value::Int).unwrap_or(Value::Null),
            CellType::Float64 => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            CellType::Str => Value::Str(n.to_string()),
            _ => Value::Null,
        },
        Json::String(s) => match ty {
            CellType::Str => Value::Str(s.clone()),
            _ => Value::Null,
        },
        Json::Array(_) | Json::Object(_) => match ty {
            CellType::Str => Value::Str(v.to_string()),
            _ => Value::Null,
        },
    }
}

pub struct JsonlDecoder {
    batch_rows: usize,
    pending: Vec<u8>,
    names: Vec<String>,
    col_types: Vec<CellType>,
    rows: Vec<Map<String, Json>>,
    line_no: u64,
}

impl JsonlDecoder {
    pub fn new(batch_rows: usize) -> Self {
        Self {
            batch_rows: batch_rows.max(1),
            pending: Vec::new(),
            names: Vec::new(),
            col_types: Vec::new(),
            rows: Vec::new(),
            line_no: 0,
        }
    }

    fn handle_line(&mut self, line: &[u8], side: &mut SideChannels) {
        self.line_no += 1;
        let text = String::from_utf8_lossy(line);
        if text.trim().is_empty() {
            return;
        }
        let parsed: Result<Json, _> = serde_json::from_str(&text);
        let obj = match parsed {
            Ok(Json::Object(obj)) => obj,
            Ok(_) => {
                side.error_line(&json!({
                    "line": self.line_no,
                    "error": "not a JSON object",
                    "raw": text,
                }));
                return;
            }
            Err(e) => {
                side.error_line(&json!({
                    "line": self.line_no,
                    "error": format!("bad JSON: {e}"),
                    "raw": text,
                }));
                return;
            }
        };
        for key in obj.keys() {
            if !self.names.iter().any(|n| n == key) {
                self.names.push(key.clone());
                self.col_types.push(CellType::Null);
            }
        }
        self.rows.push(obj);
    }

    fn build_batch(&mut self) -> Batch {
        let take = self.rows.len().min(self.batch_rows);
        let rows: Vec<Map<String, Json>> = self.rows.drain(..take).collect();

        for row in &rows {
            for (c, name) in self.names.iter().enumerate() {
                if let Some(v) = row.get(name) {
                    let ty = json_cell_type(v);
                    if ty != CellType::Null {
                        self.col_types[c] = widen(self.col_types[c], ty);
                    }
                }
            }
        }

        let mut batch = Batch::new(self.names.len(), rows.len().max(1));
        for (c, name) in self.names.iter().enumerate() {
            let ty = match self.col_types[c] {
                CellType::Null => CellType::Str,
                ty => ty,
            };
            batch.set_schema(c, name, ty);
        }
        for (r, row) in rows.iter().enumerate() {
            for c in 0..batch.n_cols() {
                if let Some(v) = row.get(&self.names[c]) {
                    let cell = json_to_value(batch.col_type(c), v);
                    batch.set_value(r, c, &cell);
                }
            }
        }
        batch.set_row_count(rows.len());
        batch
    }
}

impl Decode for JsonlDecoder {
    fn name(&self) -> &'static str {
        "codec.jsonl.decode"
    }

    fn push(&mut self, input: &[u8], side: &mut SideChannels) -> Result<Vec<Batch>> {
        self.pending.extend_from_slice(input);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.handle_line(&line, side);
        }
        let mut out = Vec::new();
        while self.rows.len() >= self.batch_rows {
            out.push(self.build_batch());
        }
        Ok(out)
    }

    fn flush(&mut self, side: &mut SideChannels) -> Result<Option<Batch>> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.handle_line(&line, side);
        }
        if self.rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.build_batch()))
        }
    }
}

pub struct JsonlEncoder;

fn cell_to_json(batch: &Batch, row: usize, col: usize) -> Json {
    match batch.value(row, col) {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(b),
        Value::Int(v) => Json::from(v),
        Value::Float(v) => serde_json::Number::from_f64(v).map(Json::Number).unwrap_or(Json::Null),
        Value::Str(s) => Json::String(s),
        Value::Date(d) => Json::String(format_date(d)),
        Value::Timestamp(t) => Json::String(format_timestamp(t)),
    }
}

impl Encode for JsonlEncoder {
    fn name(&self) -> &'static str {
        "codec.jsonl.encode"
    }

    fn encode(&mut self, batch: &Batch, out: &mut ByteBuf, _side: &mut SideChannels) -> Result<()> {
        for r in 0..batch.n_rows() {
            let mut obj = Map::new();
            for c in 0..batch.n_cols() {
                obj.insert(batch.col_name(c).to_string(), cell_to_json(batch, r, c));
            }
            out.write_str(&Json::Object(obj).to_string());
            out.write(b"\n");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(dec: &mut JsonlDecoder, input: &str) -> (Vec<Batch>, SideChannels) {
        let mut side = SideChannels::new();
        let mut batches = dec.push(input.as_bytes(), &mut side).unwrap();
        if let Some(b) = dec.flush(&mut side).unwrap() {
            batches.push(b);
        }
        (batches, side)
    }

    #[test]
    fn typed_decode() {
        let mut dec = JsonlDecoder::new(1024);
        let (batches, _) = decode_all(
            &mut dec,
            "{\"name\":\"Alice\",\"age\":30,\"score\":85.5,\"ok\":true}\n{\"name\":\"Bob\",\"age\":25,\"score\":92.0,\"ok\":false}\n",
        );
        let b = &batches[0];
        assert_eq!(b.n_rows(), 2);
        assert_eq!(b.col_type(0), CellType::Str);
        assert_eq!(b.col_type(1), CellType::Int64);
        assert_eq!(b.col_type(2), CellType::Float64);
        assert_eq!(b.col_type(3), CellType::Bool);
        assert_eq!(b.get_bool(1, 3), Some(false));
    }

    #[test]
    fn missing_keys_and_nulls() {
        let mut dec = JsonlDecoder::new(1024);
        let (batches, _) = decode_all(&mut dec, "{\"a\":1}\n{\"a\":null,\"b\":2}\n");
        let b = &batches[0];
        assert_eq!(b.n_cols(), 2);
        assert!(b.is_null(1, 0));
        assert!(b.is_null(0, 1));
        assert_eq!(b.get_int(1, 1), Some(2));
    }

    #[test]
    fn nested_values_become_json_text() {
        let mut dec = JsonlDecoder::new(1024);
        let (batches, _) = decode_all(&mut dec, "{\"v\":{\"x\":1}}\n{\"v\":[1,2]}\n");
        let b = &batches[0];
        assert_eq!(b.col_type(0), CellType::Str);
        assert_eq!(b.get_str(0, 0), Some("{\"x\":1}"));
        assert_eq!(b.get_str(1, 0), Some("[1,2]"));
    }

    #[test]
    fn bad_line_reported_and_dropped() {
        let mut dec = JsonlDecoder::new(1024);
        let (batches, mut side) = decode_all(&mut dec, "{\"a\":1}\nnot json\n{\"a\":2}\n");
        assert_eq!(batches[0].n_rows(), 2);
        let errors = String::from_utf8(side.errors.take_all()).unwrap();
        assert!(errors.contains("bad JSON"));
    }

    #[test]
    fn encode_writes_one_object_per_line() {
        let mut b = Batch::new(2, 4);
        b.set_schema(0, "name", CellType::Str);
        b.set_schema(1, "age", CellType::Int64);
        b.set_str(0, 0, "Alice");
        b.set_int(0, 1, 30);
        b.set_row_count(2); // second row all null
        b.set_str(1, 0, "Bob");

        let mut enc = JsonlEncoder;
        let mut out = ByteBuf::new();
        let mut side = SideChannels::new();
        enc.encode(&b, &mut out, &mut side).unwrap();
        let text = String::from_utf8(out.take_all()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("{\"age\":30,\"name\":\"Alice\"}"));
        assert_eq!(lines.next(), Some("{\"age\":null,\"name\":\"Bob\"}"));
    }
}
