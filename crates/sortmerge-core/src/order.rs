//! Sort direction and join side tags.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction both join inputs are ordered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// Re-orient a natural (ascending) comparison result for this direction.
    pub fn apply(self, natural: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => natural,
            SortOrder::Descending => natural.reverse(),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => f.write_str("ascending"),
            SortOrder::Descending => f.write_str("descending"),
        }
    }
}

/// Which join input a field, stream or error belongs to.
///
/// `Left` is R, the outer relation; `Right` is S, the inner relation whose
/// duplicate-key groups get buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}
