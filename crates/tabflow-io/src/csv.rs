//! CSV decoder and encoder.
//!
//! The decoder consumes arbitrary byte chunks, assembles complete records
//! (newlines inside quoted cells do not terminate a record), buffers rows up
//! to the target batch size, resolves each column's type over the buffered
//! window and emits a typed batch. A malformed row costs one ERRORS line and
//! is dropped; in repair mode short rows are padded with nulls and long rows
//! truncated instead.

use crate::detect::{parse_as, sniff, widen};
use anyhow::Result;
use serde_json::json;
use tabflow_core::{Batch, ByteBuf, CellType, Decode, Encode, SideChannels};
use tracing::debug;

pub const DEFAULT_BATCH_ROWS: usize = 1024;

/// Streaming CSV → batch decoder.
pub struct CsvDecoder {
    delimiter: u8,
    header: bool,
    repair: bool,
    batch_rows: usize,
    pending: Vec<u8>,
    names: Option<Vec<String>>,
    rows: Vec<Vec<Option<String>>>,
    /// Best type seen so far per column; only ever widens across batches.
    col_types: Vec<CellType>,
    line_no: u64,
    emitted_any: bool,
}

impl CsvDecoder {
    pub fn new(delimiter: u8, header: bool, repair: bool, batch_rows: usize) -> Self {
        Self {
            delimiter,
            header,
            repair,
            batch_rows: batch_rows.max(1),
            pending: Vec::new(),
            names: None,
            rows: Vec::new(),
            col_types: Vec::new(),
            line_no: 0,
            emitted_any: false,
        }
    }

    /// Split one complete record into cells.
    ///
    /// A quoted cell may contain the delimiter, quotes doubled, and line
    /// breaks. An unquoted empty cell is null; a quoted empty cell is the
    /// empty string.
    fn split_record(&self, line: &[u8]) -> Vec<Option<String>> {
        let mut cells = Vec::new();
        let mut cur: Vec<u8> = Vec::new();
        let mut was_quoted = false;
        let mut in_quotes = false;
        let mut i = 0;
        while i < line.len() {
            let b = line[i];
            if in_quotes {
                if b == b'"' {
                    if line.get(i + 1) == Some(&b'"') {
                        cur.push(b'"');
                        i += 2;
                        continue;
                    }
                    in_quotes = false;
                } else {
                    cur.push(b);
                }
            } else if b == b'"' && cur.is_empty() && !was_quoted {
                in_quotes = true;
                was_quoted = true;
            } else if b == self.delimiter {
                cells.push(Self::finish_cell(&mut cur, &mut was_quoted));
            } else {
                cur.push(b);
            }
            i += 1;
        }
        cells.push(Self::finish_cell(&mut cur, &mut was_quoted));
        cells
    }

    fn finish_cell(cur: &mut Vec<u8>, was_quoted: &mut bool) -> Option<String> {
        let quoted = std::mem::take(was_quoted);
        let bytes = std::mem::take(cur);
        if bytes.is_empty() && !quoted {
            None
        } else {
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
    }

    fn handle_record(&mut self, line: &[u8], side: &mut SideChannels) {
        self.line_no += 1;
        if line.is_empty() {
            return;
        }
        let cells = self.split_record(line);

        let Some(names) = &self.names else {
            if self.header {
                self.names = Some(
                    cells
                        .iter()
                        .enumerate()
                        .map(|(i, c)| match c {
                            Some(name) if !name.is_empty() => name.clone(),
                            _ => format!("col_{i}"),
                        })
                        .collect(),
                );
            } else {
                self.names = Some((0..cells.len()).map(|i| format!("col_{i}")).collect());
                self.rows.push(cells);
            }
            return;
        };

        let want = names.len();
        let mut cells = cells;
        if cells.len() != want {
            if self.repair {
                cells.resize(want, None);
            } else {
                side.error_line(&json!({
                    "line": self.line_no,
                    "error": format!("expected {want} fields, got {}", cells.len()),
                    "raw": String::from_utf8_lossy(line),
                }));
                return;
            }
        }
        self.rows.push(cells);
    }

    fn build_batch(&mut self) -> Batch {
        let names = self.names.clone().unwrap_or_default();
        let n_cols = names.len();
        self.col_types.resize(n_cols, CellType::Null);

        let take = self.rows.len().min(self.batch_rows);
        let rows: Vec<Vec<Option<String>>> = self.rows.drain(..take).collect();

        for row in &rows {
            for (c, cell) in row.iter().enumerate() {
                if let Some(text) = cell {
                    if !text.is_empty() {
                        self.col_types[c] = widen(self.col_types[c], sniff(text));
                    }
                }
            }
        }

        let mut batch = Batch::new(n_cols, rows.len().max(1));
        for (c, name) in names.iter().enumerate() {
            let ty = match self.col_types[c] {
                CellType::Null => CellType::Str,
                ty => ty,
            };
            batch.set_schema(c, name, ty);
        }
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if let Some(text) = cell {
                    let v = parse_as(batch.col_type(c), text);
                    batch.set_value(r, c, &v);
                }
            }
        }
        batch.set_row_count(rows.len());
        self.emitted_any = true;
        debug!(rows = batch.n_rows(), cols = n_cols, "csv batch decoded");
        batch
    }

    /// Scan buffered input for complete records, honouring quotes.
    fn drain_records(&mut self, side: &mut SideChannels) {
        let pending = std::mem::take(&mut self.pending);
        let mut start = 0;
        let mut in_quotes = false;
        for (i, &b) in pending.iter().enumerate() {
            match b {
                b'"' => in_quotes = !in_quotes,
                b'\n' if !in_quotes => {
                    let mut end = i;
                    if end > start && pending[end - 1] == b'\r' {
                        end -= 1;
                    }
                    let record = pending[start..end].to_vec();
                    self.handle_record(&record, side);
                    start = i + 1;
                }
                _ => {}
            }
        }
        self.pending = pending[start..].to_vec();
    }
}

impl Decode for CsvDecoder {
    fn name(&self) -> &'static str {
        "codec.csv.decode"
    }

    fn push(&mut self, input: &[u8], side: &mut SideChannels) -> Result<Vec<Batch>> {
        self.pending.extend_from_slice(input);
        self.drain_records(side);
        let mut out = Vec::new();
        while self.rows.len() >= self.batch_rows {
            out.push(self.build_batch());
        }
        Ok(out)
    }

    fn flush(&mut self, side: &mut SideChannels) -> Result<Option<Batch>> {
        if !self.pending.is_empty() {
            let mut residual = std::mem::take(&mut self.pending);
            if residual.last() == Some(&b'\r') {
                residual.pop();
            }
            self.handle_record(&residual, side);
        }
        if !self.rows.is_empty() || (!self.emitted_any && self.names.is_some()) {
            // header-only input still yields one empty batch so the encoder
            // can write its header line
            return Ok(Some(self.build_batch()));
        }
        Ok(None)
    }
}

/// Batch → CSV encoder.
pub struct CsvEncoder {
    delimiter: u8,
    wrote_header: bool,
}

impl CsvEncoder {
    pub fn new(delimiter: u8) -> Self {
        Self {
            delimiter,
            wrote_header: false,
        }
    }

    fn write_cell(&self, cell: &str, out: &mut ByteBuf) {
        let delim = self.delimiter as char;
        if cell.contains(delim) || cell.contains('"') || cell.contains('\r') || cell.contains('\n')
        {
            out.write(b"\"");
            out.write_str(&cell.replace('"', "\"\""));
            out.write(b"\"");
        } else {
            out.write_str(cell);
        }
    }

    fn write_row(&self, cells: &[String], out: &mut ByteBuf) {
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                out.write(&[self.delimiter]);
            }
            self.write_cell(cell, out);
        }
        out.write(b"\n");
    }
}

impl Encode for CsvEncoder {
    fn name(&self) -> &'static str {
        "codec.csv.encode"
    }

    fn encode(&mut self, batch: &Batch, out: &mut ByteBuf, _side: &mut SideChannels) -> Result<()> {
        if !self.wrote_header {
            let names: Vec<String> = (0..batch.n_cols())
                .map(|c| batch.col_name(c).to_string())
                .collect();
            self.write_row(&names, out);
            self.wrote_header = true;
        }
        for r in 0..batch.n_rows() {
            let cells: Vec<String> = (0..batch.n_cols())
                .map(|c| batch.render_cell(r, c))
                .collect();
            self.write_row(&cells, out);
        }
        Ok(())
    }
}
