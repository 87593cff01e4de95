//! Pretty-table encoder: accumulates all batches and renders one aligned
//! Markdown-style table on flush. Cell width is capped by the `width`
//! option.

use anyhow::Result;
use tabflow_core::{Batch, ByteBuf, Encode, SideChannels};

pub const DEFAULT_MAX_WIDTH: usize = 32;

pub struct TableEncoder {
    max_width: usize,
    names: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
}

impl TableEncoder {
    pub fn new(max_width: usize) -> Self {
        Self {
            max_width: max_width.max(3),
            names: None,
            rows: Vec::new(),
        }
    }

    fn clip(&self, cell: &str) -> String {
        if cell.chars().count() <= self.max_width {
            cell.to_string()
        } else {
            let mut s: String = cell.chars().take(self.max_width - 1).collect();
            s.push('…');
            s
        }
    }
}

impl Encode for TableEncoder {
    fn name(&self) -> &'static str {
        "codec.table.encode"
    }

    fn encode(&mut self, batch: &Batch, _out: &mut ByteBuf, _side: &mut SideChannels) -> Result<()> {
        if self.names.is_none() {
            self.names = Some(
                (0..batch.n_cols())
                    .map(|c| self.clip(batch.col_name(c)))
                    .collect(),
            );
        }
        for r in 0..batch.n_rows() {
            let row: Vec<String> = (0..batch.n_cols())
                .map(|c| self.clip(&batch.render_cell(r, c)))
                .collect();
            self.rows.push(row);
        }
        Ok(())
    }

    fn flush(&mut self, out: &mut ByteBuf, _side: &mut SideChannels) -> Result<()> {
        let Some(names) = self.names.take() else {
            return Ok(());
        };
        let mut widths: Vec<usize> = names.iter().map(|n| n.chars().count()).collect();
        for row in &self.rows {
            for (c, cell) in row.iter().enumerate() {
                if c < widths.len() {
                    widths[c] = widths[c].max(cell.chars().count());
                }
            }
        }

        let write_row = |out: &mut ByteBuf, cells: &[String]| {
            out.write(b"|");
            for (c, w) in widths.iter().enumerate() {
                let cell = cells.get(c).map(String::as_str).unwrap_or("");
                let pad = w.saturating_sub(cell.chars().count());
                out.write(b" ");
                out.write_str(cell);
                out.write_str(&" ".repeat(pad));
                out.write(b" |");
            }
            out.write(b"\n");
        };

        write_row(out, &names);
        out.write(b"|");
        for w in &widths {
            out.write_str(&format!(" {} |", "-".repeat(*w)));
        }
        out.write(b"\n");
        for row in std::mem::take(&mut self.rows) {
            write_row(out, &row);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabflow_core::CellType;

    #[test]
    fn renders_aligned_table_on_flush() {
        let mut b = Batch::new(2, 4);
        b.set_schema(0, "name", CellType::Str);
        b.set_schema(1, "age", CellType::Int64);
        b.set_str(0, 0, "Alice");
        b.set_int(0, 1, 30);
        b.set_str(1, 0, "Bo");
        b.set_int(1, 1, 7);
        b.set_row_count(2);

        let mut enc = TableEncoder::new(DEFAULT_MAX_WIDTH);
        let mut out = ByteBuf::new();
        let mut side = SideChannels::new();
        enc.encode(&b, &mut out, &mut side).unwrap();
        assert_eq!(out.readable(), 0); // nothing until flush
        enc.flush(&mut out, &mut side).unwrap();

        let text = String::from_utf8(out.take_all()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "| name  | age |");
        assert_eq!(lines[1], "| ----- | --- |");
        assert_eq!(lines[2], "| Alice | 30  |");
        assert_eq!(lines[3], "| Bo    | 7   |");
    }

    #[test]
    fn long_cells_are_clipped() {
        let mut b = Batch::new(1, 4);
        b.set_schema(0, "v", CellType::Str);
        b.set_str(0, 0, "abcdefghij");
        b.set_row_count(1);

        let mut enc = TableEncoder::new(5);
        let mut out = ByteBuf::new();
        let mut side = SideChannels::new();
        enc.encode(&b, &mut out, &mut side).unwrap();
        enc.flush(&mut out, &mut side).unwrap();
        let text = String::from_utf8(out.take_all()).unwrap();
        assert!(text.contains("abcd…"));
        assert!(!text.contains("abcdef"));
    }
}
