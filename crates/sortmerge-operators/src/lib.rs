#![forbid(unsafe_code)]
//! sortmerge-operators: the pull interface, the external sort and the
//! sort-merge join built on them.
//!
//! Design intent:
//! - Everything is synchronous and pull-driven; a join runs on its caller's
//!   thread and does work only inside `open`/`get_next`.
//! - Every buffer that can grow with the input (sort runs, merge pages, the
//!   duplicate-key group) is accounted through `sortmerge-mem` guards, so the
//!   page budget is a hard limit.
//! - Sources, sorts and joins share one trait (`TupleStream`), so joins nest.

pub mod filter;
pub mod join;
pub mod scan;
pub mod sort;
pub mod traits;

pub use join::{JoinMetrics, JoinOptions, KeySpec, SortMergeJoin};
pub use scan::{MemoryScan, PullCounter};
pub use sort::{ExternalSort, Sorter};
pub use traits::{BoxedStream, OpError, StreamState, TupleStream};
