//! Join-key comparison: the single place key order is decided.
//!
//! Values are compared by their natural order (integers and floats
//! numerically, strings lexicographically by byte value), then re-oriented for
//! the configured sort direction. Nulls order before every value when
//! ascending and after every value when descending.

use std::cmp::Ordering;

use sortmerge_core::order::SortOrder;
use sortmerge_core::schema::DataType;
use sortmerge_core::types::{Scalar, Tuple};

use crate::traits::OpError;

/// Natural order of two non-null values of the same type; `None` when the
/// types differ or either side is null.
pub fn natural_cmp(a: &Scalar, b: &Scalar) -> Option<Ordering> {
    use Scalar::*;

    Some(match (a, b) {
        (Bool(x), Bool(y)) => x.cmp(y),
        (I32(x), I32(y)) => x.cmp(y),
        (I64(x), I64(y)) => x.cmp(y),
        (F32(x), F32(y)) => float_cmp(x.is_nan(), y.is_nan(), x.partial_cmp(y)),
        (F64(x), F64(y)) => float_cmp(x.is_nan(), y.is_nan(), x.partial_cmp(y)),
        (Str(x), Str(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Bin(x), Bin(y)) => x.cmp(y),
        _ => return None,
    })
}

/// NaN sorts after every number and equal to itself.
fn float_cmp(x_nan: bool, y_nan: bool, partial: Option<Ordering>) -> Ordering {
    match (x_nan, y_nan) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => partial.unwrap_or(Ordering::Equal),
    }
}

/// Three-way comparison of two key fields declared as `data_type`.
///
/// Fails with `TypeMismatch` when the type is not orderable or when either
/// value does not carry the declared type.
pub fn compare_fields(a: &Scalar, b: &Scalar, data_type: DataType) -> Result<Ordering, OpError> {
    if !data_type.is_orderable() {
        return Err(OpError::TypeMismatch(format!(
            "{data_type:?} cannot be used as a join key"
        )));
    }
    for v in [a, b] {
        if let Some(actual) = v.data_type() {
            if actual != data_type {
                return Err(OpError::TypeMismatch(format!(
                    "join key declared {data_type:?} but value {v} is {actual:?}"
                )));
            }
        }
    }
    Ok(match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => natural_cmp(a, b).unwrap_or(Ordering::Equal),
    })
}

/// Type-aware, order-aware comparator over one join-key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyComparator {
    data_type: DataType,
    order: SortOrder,
}

impl KeyComparator {
    /// Comparator for a join between a left key of `left` type and a right key
    /// of `right` type. Both must be the same orderable type.
    pub fn new(left: DataType, right: DataType, order: SortOrder) -> Result<Self, OpError> {
        if left != right {
            return Err(OpError::TypeMismatch(format!(
                "left join key is {left:?}, right join key is {right:?}"
            )));
        }
        Self::for_type(left, order)
    }

    /// Comparator over a single column type, as used by the external sort.
    pub fn for_type(data_type: DataType, order: SortOrder) -> Result<Self, OpError> {
        if !data_type.is_orderable() {
            return Err(OpError::TypeMismatch(format!(
                "{data_type:?} cannot be used as a join key"
            )));
        }
        Ok(Self { data_type, order })
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    /// LESS / EQUAL / GREATER in the configured order.
    pub fn compare(&self, a: &Scalar, b: &Scalar) -> Result<Ordering, OpError> {
        compare_fields(a, b, self.data_type).map(|o| self.order.apply(o))
    }

    /// Whether two keys join. A null key never equals anything, not even
    /// another null.
    pub fn keys_match(&self, a: &Scalar, b: &Scalar) -> Result<bool, OpError> {
        if a.is_null() || b.is_null() {
            // Still reject values of the wrong type.
            compare_fields(a, b, self.data_type)?;
            return Ok(false);
        }
        Ok(self.compare(a, b)? == Ordering::Equal)
    }

    /// Fail unless `value` may appear as a key of this comparator's type.
    pub fn check_key(&self, value: &Scalar) -> Result<(), OpError> {
        compare_fields(value, value, self.data_type).map(|_| ())
    }

    /// Order two tuples by their key at a 1-based `column`. Keys must have
    /// passed `check_key`; anything else compares equal.
    pub fn order_tuples(&self, a: &Tuple, b: &Tuple, column: usize) -> Ordering {
        match (a.get(column), b.get(column)) {
            (Some(x), Some(y)) => self.compare(x, y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        }
    }
}

/// Key value of `tuple` at a 1-based column, or `TypeMismatch` if the tuple is
/// too short to hold it.
pub fn key_of(tuple: &Tuple, column: usize) -> Result<&Scalar, OpError> {
    tuple.get(column).ok_or_else(|| {
        OpError::TypeMismatch(format!(
            "tuple has {} fields, join column {column} is missing",
            tuple.len()
        ))
    })
}
