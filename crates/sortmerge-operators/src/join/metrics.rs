//! Per-join counters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinMetrics {
    /// `get_next` calls on the ordered left input.
    pub left_pulls: u64,
    /// `get_next` calls on the ordered right input.
    pub right_pulls: u64,
    pub groups_buffered: u64,
    pub largest_group_tuples: usize,
    /// Largest buffered group, in bytes.
    pub peak_group_bytes: usize,
    pub pairs_matched: u64,
    /// Matched pairs the output filter rejected.
    pub pairs_rejected: u64,
    pub tuples_emitted: u64,
    /// Inputs handed to the sort collaborator (0, 1 or 2).
    pub sorts_invoked: u32,
}

impl JoinMetrics {
    /// Forward the counters to tracing (no-op without the `tracing` feature).
    pub fn emit(&self, join: &str) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            join,
            left_pulls = self.left_pulls,
            right_pulls = self.right_pulls,
            groups = self.groups_buffered,
            largest_group = self.largest_group_tuples,
            peak_group_bytes = self.peak_group_bytes,
            matched = self.pairs_matched,
            rejected = self.pairs_rejected,
            emitted = self.tuples_emitted,
            sorts = self.sorts_invoked,
            "join metrics"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = join;
    }
}
