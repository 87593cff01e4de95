//! Line-oriented text codec: a single `_line` STRING column, one row per
//! input line, terminators stripped.

use anyhow::Result;
use tabflow_core::{Batch, ByteBuf, CellType, Decode, Encode, SideChannels};

pub struct TextDecoder {
    batch_rows: usize,
    pending: Vec<u8>,
    lines: Vec<String>,
}

impl TextDecoder {
    pub fn new(batch_rows: usize) -> Self {
        Self {
            batch_rows: batch_rows.max(1),
            pending: Vec::new(),
            lines: Vec::new(),
        }
    }

    fn build_batch(&mut self) -> Batch {
        let take = self.lines.len().min(self.batch_rows);
        let lines: Vec<String> = self.lines.drain(..take).collect();
        let mut batch = Batch::new(1, lines.len().max(1));
        batch.set_schema(0, "_line", CellType::Str);
        for (r, line) in lines.iter().enumerate() {
            batch.set_str(r, 0, line);
        }
        batch.set_row_count(lines.len());
        batch
    }
}

impl Decode for TextDecoder {
    fn name(&self) -> &'static str {
        "codec.text.decode"
    }

    fn push(&mut self, input: &[u8], _side: &mut SideChannels) -> Result<Vec<Batch>> {
        self.pending.extend_from_slice(input);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        let mut out = Vec::new();
        while self.lines.len() >= self.batch_rows {
            out.push(self.build_batch());
        }
        Ok(out)
    }

    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        if !self.pending.is_empty() {
            let mut line = std::mem::take(&mut self.pending);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        if self.lines.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.build_batch()))
        }
    }
}

pub struct TextEncoder;

impl Encode for TextEncoder {
    fn name(&self) -> &'static str {
        "codec.text.encode"
    }

    fn encode(&mut self, batch: &Batch, out: &mut ByteBuf, _side: &mut SideChannels) -> Result<()> {
        let col = batch.col_index("_line").unwrap_or(0);
        for r in 0..batch.n_rows() {
            out.write_str(&batch.render_cell(r, col));
            out.write(b"\n");
        }
        Ok(())
    }
}
