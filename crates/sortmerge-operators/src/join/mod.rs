//! Sort-merge equi-join over two pull streams.

pub mod compare;
pub mod compose;
pub mod config;
pub mod cursor;
pub mod ensure;
pub mod group;
pub mod merge;
pub mod metrics;
pub mod scanner;

pub use compare::KeyComparator;
pub use compose::OutputComposer;
pub use config::{JoinOptions, KeySpec};
pub use ensure::{SortEnsurer, SortRequest};
pub use group::GroupBuffer;
pub use merge::{JoinPhase, SortMergeJoin};
pub use metrics::JoinMetrics;
pub use scanner::{MergeScanner, ScanState};
