//! Peak usage tracking for budgeted buffers.
//!
//! The join records the byte size of every materialized duplicate-key group
//! here so callers can see how close a run came to its page budget.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PeakTracker {
    peak_bytes: AtomicUsize,
    samples: AtomicUsize,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new "used bytes" value; updates peak if higher.
    pub fn record_used(&self, used_bytes: usize) {
        self.samples.fetch_add(1, Ordering::Relaxed);
        let prev = self.peak_bytes.fetch_max(used_bytes, Ordering::AcqRel);
        #[cfg(feature = "tracing")]
        if used_bytes > prev {
            tracing::trace!(used_bytes, previous_peak = prev, "new peak");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = prev;
    }

    pub fn peak(&self) -> usize {
        self.peak_bytes.load(Ordering::Relaxed)
    }

    /// Number of values recorded so far.
    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::Relaxed)
    }
}
