//! Column schemas, compared by shape.

use crate::value::CellType;
use serde::{Deserialize, Serialize};

/// An ordered sequence of `(name, type)` columns plus a `known` flag.
///
/// Streaming decoders cannot name their columns at plan time, so schema
/// inference propagates `unknown` forward until a shape-preserving operator
/// pins it down. Two schemas are equal when both flags and both column
/// sequences match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub known: bool,
    pub cols: Vec<(String, CellType)>,
}

impl Default for Schema {
    fn default() -> Self {
        Schema::unknown()
    }
}

impl Schema {
    pub fn unknown() -> Self {
        Schema {
            known: false,
            cols: Vec::new(),
        }
    }

    pub fn of(cols: Vec<(String, CellType)>) -> Self {
        Schema { known: true, cols }
    }

    pub fn n_cols(&self) -> usize {
        self.cols.len()
    }

    /// Index of the first column with this name.
    pub fn col_index(&self, name: &str) -> Option<usize> {
        self.cols.iter().position(|(n, _)| n == name)
    }

    pub fn col_type(&self, name: &str) -> Option<CellType> {
        self.cols
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compared_by_shape() {
        let a = Schema::of(vec![
            ("name".into(), CellType::Str),
            ("age".into(), CellType::Int64),
        ]);
        let b = Schema::of(vec![
            ("name".into(), CellType::Str),
            ("age".into(), CellType::Int64),
        ]);
        assert_eq!(a, b);
        assert_ne!(a, Schema::unknown());
    }

    #[test]
    fn first_match_wins() {
        let s = Schema::of(vec![
            ("x".into(), CellType::Int64),
            ("x".into(), CellType::Str),
        ]);
        assert_eq!(s.col_index("x"), Some(0));
        assert_eq!(s.col_type("x"), Some(CellType::Int64));
        assert_eq!(s.col_index("y"), None);
    }
}
