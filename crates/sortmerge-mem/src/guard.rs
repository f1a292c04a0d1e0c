//! MemoryBudget + RAII guard implementations.
//!
//! A join gets one `MemoryBudgetImpl` sized from its page count. Buffers grow
//! by resizing their guard first; dropping the guard returns the bytes to the
//! budget (panic-safe).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sortmerge_core::budget::{BudgetGuard, MemoryBudget};

/// Shared inner state for the budget.
struct BudgetInner {
    capacity: usize,
    used: AtomicUsize,
}

impl BudgetInner {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: AtomicUsize::new(0),
        }
    }

    /// Reserve `bytes`; succeeds when the total stays at or under capacity.
    fn try_acquire(&self, bytes: usize) -> bool {
        loop {
            let cur = self.used.load(Ordering::Relaxed);
            let next = cur.saturating_add(bytes);
            if next > self.capacity {
                return false;
            }
            if self
                .used
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Concrete MemoryBudget implementation.
#[derive(Clone)]
pub struct MemoryBudgetImpl {
    inner: Arc<BudgetInner>,
}

impl MemoryBudgetImpl {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            inner: Arc::new(BudgetInner::new(capacity_bytes)),
        }
    }

    /// Budget of `pages` pages of `page_size` bytes each.
    pub fn from_pages(pages: usize, page_size: usize) -> Self {
        Self::new(pages.saturating_mul(page_size))
    }

    /// Current usage (advisory).
    pub fn used_bytes(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }

    pub fn capacity_bytes(&self) -> usize {
        self.inner.capacity
    }

    pub fn available_bytes(&self) -> usize {
        self.capacity_bytes().saturating_sub(self.used_bytes())
    }

    /// An empty guard to be grown with `try_resize` as a buffer fills up.
    pub fn empty_guard(&self, tag: &'static str) -> BudgetGuardImpl {
        BudgetGuardImpl {
            inner: Arc::clone(&self.inner),
            bytes: 0,
            tag,
        }
    }
}

/// RAII guard that accounts for a number of bytes.
/// Dropping it returns bytes to the budget.
pub struct BudgetGuardImpl {
    inner: Arc<BudgetInner>,
    bytes: usize,
    tag: &'static str,
}

impl Drop for BudgetGuardImpl {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.inner.release(self.bytes);
            // NOTE: do not log here to keep drop path fast.
            self.bytes = 0;
        }
    }
}

// ----- trait impls -----

impl BudgetGuard for BudgetGuardImpl {
    fn bytes(&self) -> usize {
        self.bytes
    }
    fn tag(&self) -> &'static str {
        self.tag
    }
}

impl BudgetGuardImpl {
    /// Try to resize this guard to a new byte count.
    /// Returns true if successful, false if the new size would exceed capacity.
    /// Shrinking always succeeds.
    pub fn try_resize(&mut self, new_bytes: usize) -> bool {
        if new_bytes == self.bytes {
            return true;
        }

        if new_bytes < self.bytes {
            let delta = self.bytes - new_bytes;
            self.inner.release(delta);
            self.bytes = new_bytes;
            true
        } else {
            let delta = new_bytes - self.bytes;
            if self.inner.try_acquire(delta) {
                self.bytes = new_bytes;
                true
            } else {
                #[cfg(feature = "tracing")]
                tracing::trace!(tag = self.tag, held = self.bytes, wanted = new_bytes, "budget refused growth");
                false
            }
        }
    }

    /// Grow by `delta` bytes. Same contract as `try_resize`.
    pub fn try_grow(&mut self, delta: usize) -> bool {
        self.try_resize(self.bytes.saturating_add(delta))
    }

    /// Return every byte held to the budget, keeping the guard usable.
    pub fn release_all(&mut self) {
        self.try_resize(0);
    }
}

impl MemoryBudget for MemoryBudgetImpl {
    type Guard = BudgetGuardImpl;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard> {
        if bytes == 0 {
            return Some(self.empty_guard(tag));
        }
        if self.inner.try_acquire(bytes) {
            Some(BudgetGuardImpl {
                inner: Arc::clone(&self.inner),
                bytes,
                tag,
            })
        } else {
            None
        }
    }

    fn capacity_bytes(&self) -> usize {
        self.inner.capacity
    }

    fn used_bytes(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }
}
