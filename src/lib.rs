#![forbid(unsafe_code)]
//! Sort-merge equi-join engine.
//!
//! Facade over the workspace crates: `sortmerge_core` data types,
//! `sortmerge_mem` budgets and spill, `sortmerge_operators` (the join, the
//! external sort and the pull interface) and `sortmerge_io` (CSV sources,
//! writers, storage, YAML jobs).

pub use sortmerge_core;
pub use sortmerge_io;
pub use sortmerge_mem;
pub use sortmerge_operators;

pub use sortmerge_operators::{JoinMetrics, JoinOptions, OpError, SortMergeJoin, TupleStream};
