//! Run generation for the external sort.
//!
//! Tuples accumulate in memory until the next one would overflow the sort's
//! budget; the buffer is then sorted and written out as one run, split into
//! page-sized segments so the merge can hold a single page per run.

use std::sync::Mutex;

use sortmerge_core::id::SpillId;
use sortmerge_core::order::Side;
use sortmerge_core::types::Tuple;
use sortmerge_mem::guard::{BudgetGuardImpl, MemoryBudgetImpl};
use sortmerge_mem::spill::SegmentMeta;
use sortmerge_mem::SpillManager;

use crate::join::compare::{key_of, KeyComparator};
use crate::traits::OpError;

/// A sorted run on spill storage.
#[derive(Clone, Debug)]
pub struct RunMeta {
    pub tuples: u64,
    pub pages: Vec<SegmentMeta>,
}

/// Outcome of run generation.
pub enum Runs {
    /// Everything fit in one budget's worth of memory: a single sorted run
    /// that never left memory. The guard still holds its bytes.
    InMemory { tuples: Vec<Tuple>, guard: BudgetGuardImpl },
    /// Sorted runs on spill storage, in generation order.
    Spilled(Vec<RunMeta>),
}

pub struct RunGenerator<'a> {
    side: Side,
    spill_id: SpillId,
    key_column: usize,
    comparator: KeyComparator,
    page_size: usize,
    budget_bytes: usize,
    buffer: Vec<Tuple>,
    guard: BudgetGuardImpl,
    spill: Option<&'a Mutex<SpillManager>>,
    runs: Vec<RunMeta>,
}

impl<'a> RunGenerator<'a> {
    pub fn new(
        side: Side,
        spill_id: SpillId,
        key_column: usize,
        comparator: KeyComparator,
        page_size: usize,
        budget: &MemoryBudgetImpl,
        spill: Option<&'a Mutex<SpillManager>>,
    ) -> Self {
        Self {
            side,
            spill_id,
            key_column,
            comparator,
            page_size,
            budget_bytes: budget.capacity_bytes(),
            buffer: Vec::new(),
            guard: budget.empty_guard("sort_run"),
            spill,
            runs: Vec::new(),
        }
    }

    /// Add one input tuple, flushing a run first if it does not fit.
    pub fn push(&mut self, tuple: Tuple) -> Result<(), OpError> {
        self.comparator.check_key(key_of(&tuple, self.key_column)?)?;
        let len = tuple.byte_len();
        if !self.guard.try_grow(len) {
            if self.buffer.is_empty() {
                return Err(self.exhausted(format!(
                    "a single tuple of {len} bytes exceeds the {}-byte sort budget",
                    self.budget_bytes
                )));
            }
            self.flush()?;
            if !self.guard.try_grow(len) {
                return Err(self.exhausted(format!(
                    "a single tuple of {len} bytes exceeds the {}-byte sort budget",
                    self.budget_bytes
                )));
            }
        }
        self.buffer.push(tuple);
        Ok(())
    }

    pub fn finish(mut self) -> Result<Runs, OpError> {
        if self.runs.is_empty() {
            self.sort_buffer();
            return Ok(Runs::InMemory {
                tuples: self.buffer,
                guard: self.guard,
            });
        }
        if !self.buffer.is_empty() {
            self.flush()?;
        }
        Ok(Runs::Spilled(self.runs))
    }

    fn sort_buffer(&mut self) {
        let (cmp, column) = (self.comparator, self.key_column);
        // Stable: equal keys keep their input order.
        self.buffer.sort_by(|a, b| cmp.order_tuples(a, b, column));
    }

    fn flush(&mut self) -> Result<(), OpError> {
        let Some(spill) = self.spill else {
            return Err(self.exhausted(format!(
                "input exceeds the {}-byte sort budget and no spill storage is configured",
                self.budget_bytes
            )));
        };
        self.sort_buffer();

        let mut mgr = spill
            .lock()
            .map_err(|_| OpError::Internal("spill manager lock poisoned".into()))?;
        let run_index = mgr.next_run_index();
        let mut pages = Vec::new();
        for (page_index, page) in paginate(&self.buffer, self.page_size).into_iter().enumerate() {
            pages.push(mgr.write_page(page, self.spill_id, run_index, page_index as u32)?);
        }
        drop(mgr);

        #[cfg(feature = "tracing")]
        tracing::trace!(side = %self.side, run = run_index, tuples = self.buffer.len(), pages = pages.len(), "sorted run spilled");

        self.runs.push(RunMeta {
            tuples: self.buffer.len() as u64,
            pages,
        });
        self.buffer.clear();
        self.guard.release_all();
        Ok(())
    }

    fn exhausted(&self, reason: String) -> OpError {
        OpError::SortResourceExhausted {
            side: self.side,
            reason,
        }
    }
}

/// Split tuples into consecutive pages of at most `page_size` tuple bytes.
/// A tuple larger than a page gets a page of its own.
pub fn paginate(tuples: &[Tuple], page_size: usize) -> Vec<&[Tuple]> {
    let mut pages = Vec::new();
    let mut start = 0;
    let mut bytes = 0;
    for (i, t) in tuples.iter().enumerate() {
        let len = t.byte_len();
        if i > start && bytes + len > page_size {
            pages.push(&tuples[start..i]);
            start = i;
            bytes = 0;
        }
        bytes += len;
    }
    if start < tuples.len() {
        pages.push(&tuples[start..]);
    }
    pages
}
