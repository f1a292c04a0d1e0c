//! Convenient re-exports for downstream crates.

pub use crate::config::EngineConfig;
pub use crate::error::{Error, Result};
pub use crate::expr::{Clause, CompOp, FieldRef, Operand, OutputFilter, Predicate};
pub use crate::id::{JoinId, SpillId};
pub use crate::order::{Side, SortOrder};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::types::{Scalar, Tuple};
