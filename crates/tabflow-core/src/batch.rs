//! Columnar batch: typed columns, per-cell null tracking, arena-owned strings.
//!
//! A batch is a row-oriented logical table stored column by column. Each
//! column carries a primitive array (or interned string indexes), a 1-byte
//! per-row null bitmap, and a name interned into the batch's own arena.
//! Writing a value clears the null bit; `set_null` sets it. Setters silently
//! no-op on a type mismatch or an out-of-range row, mirroring the tolerant
//! cell contract the operators rely on.

use crate::arena::{Arena, StrRef};
use crate::schema::Schema;
use crate::value::{CellType, Value};

/// Arena block size used for batch-owned string storage.
const BATCH_BLOCK: usize = 16 * 1024;

/// Row capacity growth starts here.
const MIN_CAPACITY: usize = 16;

#[derive(Debug)]
enum ColData {
    Unset,
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<StrRef>),
    Date(Vec<i32>),
    Timestamp(Vec<i64>),
}

impl ColData {
    fn for_type(ty: CellType, capacity: usize) -> ColData {
        match ty {
            CellType::Null => ColData::Unset,
            CellType::Bool => ColData::Bool(vec![false; capacity]),
            CellType::Int64 => ColData::Int(vec![0; capacity]),
            CellType::Float64 => ColData::Float(vec![0.0; capacity]),
            CellType::Str => ColData::Str(vec![StrRef::EMPTY; capacity]),
            CellType::Date => ColData::Date(vec![0; capacity]),
            CellType::Timestamp => ColData::Timestamp(vec![0; capacity]),
        }
    }

    fn grow(&mut self, capacity: usize) {
        match self {
            ColData::Unset => {}
            ColData::Bool(v) => v.resize(capacity, false),
            ColData::Int(v) => v.resize(capacity, 0),
            ColData::Float(v) => v.resize(capacity, 0.0),
            ColData::Str(v) => v.resize(capacity, StrRef::EMPTY),
            ColData::Date(v) => v.resize(capacity, 0),
            ColData::Timestamp(v) => v.resize(capacity, 0),
        }
    }
}

#[derive(Debug)]
struct Column {
    name: StrRef,
    ty: CellType,
    data: ColData,
    /// One byte per row; 1 = null.
    nulls: Vec<u8>,
}

/// An ordered multiset of rows sharing a schema.
#[derive(Debug)]
pub struct Batch {
    arena: Arena,
    cols: Vec<Column>,
    n_rows: usize,
    capacity: usize,
}

impl Batch {
    /// Reserve `n_cols` schema slots without allocating column storage.
    pub fn new(n_cols: usize, capacity: usize) -> Batch {
        let capacity = capacity.max(1);
        let cols = (0..n_cols)
            .map(|_| Column {
                name: StrRef::EMPTY,
                ty: CellType::Null,
                data: ColData::Unset,
                nulls: Vec::new(),
            })
            .collect();
        Batch {
            arena: Arena::new(BATCH_BLOCK),
            cols,
            n_rows: 0,
            capacity,
        }
    }

    /// Build an empty batch with every column assigned from `schema`.
    pub fn from_schema(schema: &Schema, capacity: usize) -> Batch {
        let mut b = Batch::new(schema.n_cols(), capacity);
        for (i, (name, ty)) in schema.cols.iter().enumerate() {
            b.set_schema(i, name, *ty);
        }
        b
    }

    /// Assign a column's name and type, allocating its storage fully null.
    pub fn set_schema(&mut self, col: usize, name: &str, ty: CellType) {
        if col >= self.cols.len() {
            return;
        }
        let name = self.arena.intern(name);
        let c = &mut self.cols[col];
        c.name = name;
        c.ty = ty;
        c.data = ColData::for_type(ty, self.capacity);
        c.nulls = vec![1; self.capacity];
    }

    pub fn n_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Producer-assigned row count; clamped to capacity.
    pub fn set_row_count(&mut self, n: usize) {
        self.n_rows = n.min(self.capacity);
    }

    /// Grow every column until at least `min_rows` fit, doubling from 16.
    /// Newly reserved rows default to null.
    pub fn ensure_capacity(&mut self, min_rows: usize) {
        if min_rows <= self.capacity {
            return;
        }
        let mut cap = self.capacity.max(MIN_CAPACITY);
        while cap < min_rows {
            cap *= 2;
        }
        for c in &mut self.cols {
            if !matches!(c.data, ColData::Unset) {
                c.data.grow(cap);
                c.nulls.resize(cap, 1);
            }
        }
        self.capacity = cap;
    }

    pub fn col_name(&self, col: usize) -> &str {
        match self.cols.get(col) {
            Some(c) => self.arena.get(c.name),
            None => "",
        }
    }

    pub fn col_type(&self, col: usize) -> CellType {
        self.cols.get(col).map(|c| c.ty).unwrap_or(CellType::Null)
    }

    /// Rename a column in place; storage and cells are untouched.
    pub fn set_col_name(&mut self, col: usize, name: &str) {
        let interned = self.arena.intern(name);
        if let Some(c) = self.cols.get_mut(col) {
            c.name = interned;
        }
    }

    /// Index of the first column with this name.
    pub fn col_index(&self, name: &str) -> Option<usize> {
        (0..self.cols.len()).find(|&i| self.col_name(i) == name)
    }

    pub fn schema(&self) -> Schema {
        Schema::of(
            (0..self.n_cols())
                .map(|i| (self.col_name(i).to_string(), self.col_type(i)))
                .collect(),
        )
    }

    fn writable(&mut self, row: usize, col: usize, ty: CellType) -> bool {
        row < self.capacity && self.cols.get(col).map(|c| c.ty) == Some(ty)
    }

    pub fn set_bool(&mut self, row: usize, col: usize, v: bool) {
        if self.writable(row, col, CellType::Bool) {
            if let ColData::Bool(data) = &mut self.cols[col].data {
                data[row] = v;
                self.cols[col].nulls[row] = 0;
            }
        }
    }

    pub fn set_int(&mut self, row: usize, col: usize, v: i64) {
        if self.writable(row, col, CellType::Int64) {
            if let ColData::Int(data) = &mut self.cols[col].data {
                data[row] = v;
                self.cols[col].nulls[row] = 0;
            }
        }
    }

    pub fn set_float(&mut self, row: usize, col: usize, v: f64) {
        if self.writable(row, col, CellType::Float64) {
            if let ColData::Float(data) = &mut self.cols[col].data {
                data[row] = v;
                self.cols[col].nulls[row] = 0;
            }
        }
    }

    pub fn set_str(&mut self, row: usize, col: usize, v: &str) {
        if self.writable(row, col, CellType::Str) {
            let r = self.arena.intern(v);
            if let ColData::Str(data) = &mut self.cols[col].data {
                data[row] = r;
                self.cols[col].nulls[row] = 0;
            }
        }
    }

    pub fn set_date(&mut self, row: usize, col: usize, days: i32) {
        if self.writable(row, col, CellType::Date) {
            if let ColData::Date(data) = &mut self.cols[col].data {
                data[row] = days;
                self.cols[col].nulls[row] = 0;
            }
        }
    }

    pub fn set_timestamp(&mut self, row: usize, col: usize, secs: i64) {
        if self.writable(row, col, CellType::Timestamp) {
            if let ColData::Timestamp(data) = &mut self.cols[col].data {
                data[row] = secs;
                self.cols[col].nulls[row] = 0;
            }
        }
    }

    pub fn set_null(&mut self, row: usize, col: usize) {
        if row < self.capacity {
            if let Some(c) = self.cols.get_mut(col) {
                if !c.nulls.is_empty() {
                    c.nulls[row] = 1;
                }
            }
        }
    }

    /// Write an owned value, dispatching on its type. NULL sets the null bit.
    pub fn set_value(&mut self, row: usize, col: usize, v: &Value) {
        match v {
            Value::Null => self.set_null(row, col),
            Value::Bool(b) => self.set_bool(row, col, *b),
            Value::Int(i) => self.set_int(row, col, *i),
            Value::Float(f) => self.set_float(row, col, *f),
            Value::Str(s) => self.set_str(row, col, s),
            Value::Date(d) => self.set_date(row, col, *d),
            Value::Timestamp(t) => self.set_timestamp(row, col, *t),
        }
    }

    pub fn is_null(&self, row: usize, col: usize) -> bool {
        match self.cols.get(col) {
            Some(c) => c.nulls.get(row).copied().unwrap_or(1) == 1,
            None => true,
        }
    }

    pub fn get_bool(&self, row: usize, col: usize) -> Option<bool> {
        let c = self.cols.get(col)?;
        if c.nulls.get(row).copied()? == 1 {
            return None;
        }
        match &c.data {
            ColData::Bool(v) => v.get(row).copied(),
            _ => None,
        }
    }

    pub fn get_int(&self, row: usize, col: usize) -> Option<i64> {
        let c = self.cols.get(col)?;
        if c.nulls.get(row).copied()? == 1 {
            return None;
        }
        match &c.data {
            ColData::Int(v) => v.get(row).copied(),
            _ => None,
        }
    }

    pub fn get_float(&self, row: usize, col: usize) -> Option<f64> {
        let c = self.cols.get(col)?;
        if c.nulls.get(row).copied()? == 1 {
            return None;
        }
        match &c.data {
            ColData::Float(v) => v.get(row).copied(),
            _ => None,
        }
    }

    pub fn get_str(&self, row: usize, col: usize) -> Option<&str> {
        let c = self.cols.get(col)?;
        if c.nulls.get(row).copied()? == 1 {
            return None;
        }
        match &c.data {
            ColData::Str(v) => v.get(row).map(|r| self.arena.get(*r)),
            _ => None,
        }
    }

    pub fn get_date(&self, row: usize, col: usize) -> Option<i32> {
        let c = self.cols.get(col)?;
        if c.nulls.get(row).copied()? == 1 {
            return None;
        }
        match &c.data {
            ColData::Date(v) => v.get(row).copied(),
            _ => None,
        }
    }

    pub fn get_timestamp(&self, row: usize, col: usize) -> Option<i64> {
        let c = self.cols.get(col)?;
        if c.nulls.get(row).copied()? == 1 {
            return None;
        }
        match &c.data {
            ColData::Timestamp(v) => v.get(row).copied(),
            _ => None,
        }
    }

    /// Owned view of a cell; NULL for null, out-of-range or unset cells.
    pub fn value(&self, row: usize, col: usize) -> Value {
        match self.col_type(col) {
            CellType::Null => Value::Null,
            CellType::Bool => self.get_bool(row, col).map(Value::Bool).unwrap_or(Value::Null),
            CellType::Int64 => self.get_int(row, col).map(Value::Int).unwrap_or(Value::Null),
            CellType::Float64 => self
                .get_float(row, col)
                .map(Value::Float)
                .unwrap_or(Value::Null),
            CellType::Str => self
                .get_str(row, col)
                .map(|s| Value::Str(s.to_string()))
                .unwrap_or(Value::Null),
            CellType::Date => self.get_date(row, col).map(Value::Date).unwrap_or(Value::Null),
            CellType::Timestamp => self
                .get_timestamp(row, col)
                .map(Value::Timestamp)
                .unwrap_or(Value::Null),
        }
    }

    /// Numeric view of a cell; None for NULL and STRING cells.
    pub fn numeric(&self, row: usize, col: usize) -> Option<f64> {
        self.value(row, col).as_f64()
    }

    /// Render a cell the way the CSV encoder writes it.
    pub fn render_cell(&self, row: usize, col: usize) -> String {
        self.value(row, col).render()
    }

    /// Copy one row from `src` with null preservation; string cells are
    /// re-interned into this batch's arena, never aliased.
    ///
    /// Columns are matched by position; a destination cell whose type differs
    /// from the source column is left null.
    pub fn copy_row_from(&mut self, dst_row: usize, src: &Batch, src_row: usize) {
        let n = self.n_cols().min(src.n_cols());
        for col in 0..n {
            let v = src.value(src_row, col);
            match v {
                Value::Null => self.set_null(dst_row, col),
                _ => self.set_value(dst_row, col, &v),
            }
        }
    }

    /// Append a full row copied from `src`, growing capacity as needed.
    /// Returns the destination row index.
    pub fn append_row_from(&mut self, src: &Batch, src_row: usize) -> usize {
        let dst = self.n_rows;
        self.ensure_capacity(dst + 1);
        self.copy_row_from(dst, src, src_row);
        self.n_rows = dst + 1;
        dst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_col_batch() -> Batch {
        let mut b = Batch::new(2, 4);
        b.set_schema(0, "name", CellType::Str);
        b.set_schema(1, "age", CellType::Int64);
        b
    }

    #[test]
    fn cells_start_null_until_written() {
        let mut b = two_col_batch();
        b.set_row_count(2);
        assert!(b.is_null(0, 0));
        assert!(b.is_null(1, 1));

        b.set_str(0, 0, "Alice");
        b.set_int(0, 1, 30);
        assert!(!b.is_null(0, 0));
        assert_eq!(b.get_str(0, 0), Some("Alice"));
        assert_eq!(b.get_int(0, 1), Some(30));
        assert!(b.is_null(1, 0));
    }

    #[test]
    fn set_null_overrides_written_value() {
        let mut b = two_col_batch();
        b.set_row_count(1);
        b.set_int(0, 1, 42);
        assert!(!b.is_null(0, 1));
        b.set_null(0, 1);
        assert!(b.is_null(0, 1));
        assert_eq!(b.get_int(0, 1), None);
    }

    #[test]
    fn type_mismatch_is_silent_noop() {
        let mut b = two_col_batch();
        b.set_row_count(1);
        b.set_int(0, 0, 7); // column 0 is STRING
        assert!(b.is_null(0, 0));
        b.set_str(0, 1, "oops"); // column 1 is INT64
        assert!(b.is_null(0, 1));
    }

    #[test]
    fn out_of_range_row_is_silent_noop() {
        let mut b = two_col_batch();
        b.set_int(99, 1, 1);
        assert_eq!(b.get_int(99, 1), None);
    }

    #[test]
    fn ensure_capacity_preserves_rows_and_nulls_new_ones() {
        let mut b = two_col_batch();
        b.set_row_count(2);
        b.set_str(0, 0, "a");
        b.set_int(1, 1, 9);
        b.ensure_capacity(100);
        assert!(b.capacity() >= 100);
        assert_eq!(b.get_str(0, 0), Some("a"));
        assert_eq!(b.get_int(1, 1), Some(9));
        assert!(b.is_null(50, 0));
    }

    #[test]
    fn copy_row_reinterns_strings() {
        let mut src = two_col_batch();
        src.set_row_count(1);
        src.set_str(0, 0, "Bob");
        src.set_int(0, 1, 25);

        let mut dst = two_col_batch();
        dst.append_row_from(&src, 0);
        drop(src);
        assert_eq!(dst.get_str(0, 0), Some("Bob"));
        assert_eq!(dst.get_int(0, 1), Some(25));
    }

    #[test]
    fn copy_row_preserves_nulls() {
        let mut src = two_col_batch();
        src.set_row_count(1);
        src.set_int(0, 1, 25);

        let mut dst = two_col_batch();
        dst.set_row_count(1);
        dst.set_str(0, 0, "stale");
        dst.copy_row_from(0, &src, 0);
        assert!(dst.is_null(0, 0));
        assert_eq!(dst.get_int(0, 1), Some(25));
    }

    #[test]
    fn col_index_first_match() {
        let b = two_col_batch();
        assert_eq!(b.col_index("age"), Some(1));
        assert_eq!(b.col_index("missing"), None);
    }

    #[test]
    fn schema_round_trip() {
        let b = two_col_batch();
        let s = b.schema();
        assert!(s.known);
        assert_eq!(
            s.cols,
            vec![
                ("name".to_string(), CellType::Str),
                ("age".to_string(), CellType::Int64)
            ]
        );
    }
}
