//! Tuple and field value types flowing through the pull interface.
//!
//! Tuples are owned values: a stream hands out a fresh `Tuple` from every
//! `get_next`, so anything retained past that call is already a copy and can
//! never alias the producer's internal storage.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Scalar {
    /// Declared type of the value; `None` for `Null`, which fits any type.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I32(_) => Some(DataType::Int32),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F32(_) => Some(DataType::Float32),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
            Scalar::Bin(_) => Some(DataType::Binary),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Bytes the value occupies in a tuple: the fixed width for numeric
    /// types, the payload length for strings and blobs.
    pub fn byte_len(&self) -> usize {
        match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::I32(_) | Scalar::F32(_) => 4,
            Scalar::I64(_) | Scalar::F64(_) => 8,
            Scalar::Str(s) => s.len(),
            Scalar::Bin(b) => b.len(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("NULL"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::I32(i) => write!(f, "{i}"),
            Scalar::I64(i) => write!(f, "{i}"),
            Scalar::F32(x) => write!(f, "{x}"),
            Scalar::F64(x) => write!(f, "{x}"),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Bin(b) => write!(f, "[binary {} bytes]", b.len()),
        }
    }
}

/// One row: an ordered sequence of typed field values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tuple {
    pub values: Vec<Scalar>,
}

impl Tuple {
    pub fn new(values: Vec<Scalar>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a 1-based column position.
    pub fn get(&self, column: usize) -> Option<&Scalar> {
        column.checked_sub(1).and_then(|idx| self.values.get(idx))
    }

    /// Total byte length of the tuple's field values. This is the unit the
    /// join's memory budget is accounted in.
    pub fn byte_len(&self) -> usize {
        self.values.iter().map(Scalar::byte_len).sum()
    }
}

impl From<Vec<Scalar>> for Tuple {
    fn from(values: Vec<Scalar>) -> Self {
        Self { values }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str(")")
    }
}

/// Build a tuple from a list of values convertible into `Scalar`.
#[macro_export]
macro_rules! tuple {
    ($($v:expr),* $(,)?) => {
        $crate::types::Tuple::new(vec![$($crate::types::Scalar::from($v)),*])
    };
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::I32(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::I64(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::F32(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::F64(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_len_sums_field_widths() {
        let t = crate::tuple![1i32, 2i64, "abc", 1.5f64];
        assert_eq!(t.byte_len(), 4 + 8 + 3 + 8);
        assert_eq!(Tuple::new(vec![Scalar::Null]).byte_len(), 0);
    }

    #[test]
    fn get_is_one_based() {
        let t = crate::tuple![7i32, "x"];
        assert_eq!(t.get(0), None);
        assert_eq!(t.get(1), Some(&Scalar::I32(7)));
        assert_eq!(t.get(2), Some(&Scalar::Str("x".into())));
        assert_eq!(t.to_string(), "(7, x)");
    }

    #[test]
    fn tuple_serde_round_trip_keeps_values_exact() {
        let t = crate::tuple![0.1f64, "é", -3i64];
        let json = serde_json::to_vec(&t).unwrap();
        let back: Tuple = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, t);
    }
}
