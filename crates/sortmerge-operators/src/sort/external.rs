//! External sort with run generation and k-way merge.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use sortmerge_core::id::SpillId;
use sortmerge_core::order::Side;
use sortmerge_core::prelude::Schema;
use sortmerge_core::types::Tuple;
use sortmerge_mem::guard::{BudgetGuardImpl, MemoryBudgetImpl};
use sortmerge_mem::SpillManager;

use crate::join::compare::KeyComparator;
use crate::join::ensure::SortRequest;
use crate::traits::{BoxedStream, OpError, StreamState, TupleStream};

use super::run::{RunGenerator, RunMeta, Runs};
use super::Sorter;

/// Fewest pages a sort accepts: one to fill while reading, and at least two
/// runs' worth of merge input.
pub const MIN_SORT_PAGES: usize = 3;

/// Scratch space for decoding one spilled page; the serialized form is larger
/// than the tuple bytes it carries.
const DECODE_SCRATCH_BYTES: usize = 16 * 1024 * 1024;

/// External sort.
///
/// Inputs that fit in `mem_pages` pages are sorted in memory. Larger inputs
/// are cut into sorted runs on spill storage and merged with a min-heap,
/// reading one page per run at a time. Without a spill manager only the
/// in-memory path is available.
pub struct ExternalSort {
    spill: Option<Arc<Mutex<SpillManager>>>,
    invocations: AtomicUsize,
    next_spill_id: AtomicU64,
}

impl ExternalSort {
    pub fn in_memory() -> Self {
        Self {
            spill: None,
            invocations: AtomicUsize::new(0),
            next_spill_id: AtomicU64::new(0),
        }
    }

    pub fn with_spill(spill: Arc<Mutex<SpillManager>>) -> Self {
        Self {
            spill: Some(spill),
            ..Self::in_memory()
        }
    }

    /// How many inputs this sorter has been asked to sort.
    pub fn invocations(&self) -> usize {
        self.invocations.load(AtomicOrdering::Relaxed)
    }
}

impl Default for ExternalSort {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Sorter for ExternalSort {
    fn sort(&self, request: &SortRequest, mut input: BoxedStream) -> Result<BoxedStream, OpError> {
        self.invocations.fetch_add(1, AtomicOrdering::Relaxed);
        let side = request.side;
        let exhausted = |reason: String| OpError::SortResourceExhausted { side, reason };

        if request.mem_pages < MIN_SORT_PAGES {
            return Err(exhausted(format!(
                "{} pages given, external sort needs at least {MIN_SORT_PAGES}",
                request.mem_pages
            )));
        }
        let field = request.schema.field(request.key_column).ok_or_else(|| OpError::SortFailed {
            side,
            reason: format!("key column {} not in schema", request.key_column),
        })?;
        let comparator = KeyComparator::for_type(field.data_type, request.order)?;
        let budget = MemoryBudgetImpl::from_pages(request.mem_pages, request.page_size);
        let spill_id = SpillId::new(self.next_spill_id.fetch_add(1, AtomicOrdering::Relaxed));

        let mut gen = RunGenerator::new(
            side,
            spill_id,
            request.key_column,
            comparator,
            request.page_size,
            &budget,
            self.spill.as_deref(),
        );
        loop {
            match input.get_next() {
                Ok(Some(t)) => gen.push(t)?,
                Ok(None) => break,
                Err(e) => {
                    return Err(OpError::SortInputError {
                        side,
                        source: Box::new(e),
                    })
                }
            }
        }

        match gen.finish()? {
            Runs::InMemory { tuples, guard } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(side = %side, tuples = tuples.len(), "sorted in memory");
                Ok(Box::new(SortedRun::new(request.schema.clone(), tuples, guard, input)))
            }
            Runs::Spilled(runs) => {
                let spill = self
                    .spill
                    .clone()
                    .ok_or_else(|| OpError::Internal("runs spilled without a spill manager".into()))?;
                let max_runs = request.mem_pages - 1;
                if runs.len() > max_runs {
                    discard_runs(&spill, &runs);
                    return Err(exhausted(format!(
                        "{} sorted runs cannot be merged in {} pages (at most {max_runs} runs)",
                        runs.len(),
                        request.mem_pages
                    )));
                }
                #[cfg(feature = "tracing")]
                tracing::debug!(side = %side, runs = runs.len(), "merging spilled runs");
                let merge = MergeRuns::open(request.schema.clone(), side, runs, spill, comparator, request.key_column, budget, input)?;
                Ok(Box::new(merge))
            }
        }
    }
}

fn discard_runs(spill: &Mutex<SpillManager>, runs: &[RunMeta]) {
    if let Ok(mut mgr) = spill.lock() {
        for page in runs.iter().flat_map(|r| &r.pages) {
            if let Err(_e) = mgr.delete_segment(&page.name) {
                #[cfg(feature = "tracing")]
                tracing::debug!(segment = %page.name.0, error = %_e, "failed to delete spill page");
            }
        }
    }
}

/// The single run of an input that fit in memory.
struct SortedRun {
    schema: Schema,
    rows: std::vec::IntoIter<Tuple>,
    guard: BudgetGuardImpl,
    input: BoxedStream,
    state: StreamState,
}

impl SortedRun {
    fn new(schema: Schema, rows: Vec<Tuple>, guard: BudgetGuardImpl, input: BoxedStream) -> Self {
        Self {
            schema,
            rows: rows.into_iter(),
            guard,
            input,
            state: StreamState::Open,
        }
    }
}

impl TupleStream for SortedRun {
    fn open(&mut self) -> Result<(), OpError> {
        Ok(())
    }

    fn get_next(&mut self) -> Result<Option<Tuple>, OpError> {
        if self.state.is_closed() {
            return Err(OpError::IteratorClosed);
        }
        let next = self.rows.next();
        if next.is_none() {
            self.state = StreamState::Finished;
        }
        Ok(next)
    }

    fn close(&mut self) -> Result<(), OpError> {
        if self.state.is_closed() {
            return Ok(());
        }
        self.state = StreamState::Closed;
        self.rows = Vec::new().into_iter();
        self.guard.release_all();
        self.input.close()
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &'static str {
        "sorted_run"
    }
}

/// One spilled run being read page by page.
struct RunReader {
    run: RunMeta,
    next_page: usize,
    page: VecDeque<Tuple>,
    guard: BudgetGuardImpl,
}

impl RunReader {
    fn next(&mut self, spill: &Mutex<SpillManager>, decode: &MemoryBudgetImpl, side: Side) -> Result<Option<Tuple>, OpError> {
        if self.page.is_empty() {
            let Some(meta) = self.run.pages.get(self.next_page) else {
                self.guard.release_all();
                return Ok(None);
            };
            let tuples = spill
                .lock()
                .map_err(|_| OpError::Internal("spill manager lock poisoned".into()))?
                .read_page(meta, decode)?;
            self.next_page += 1;
            let bytes: usize = tuples.iter().map(Tuple::byte_len).sum();
            if !self.guard.try_resize(bytes) {
                return Err(OpError::SortResourceExhausted {
                    side,
                    reason: format!("merge page of {bytes} bytes does not fit the sort budget"),
                });
            }
            self.page = tuples.into();
        }
        Ok(self.page.pop_front())
    }
}

struct HeapEntry {
    tuple: Tuple,
    run: usize,
    comparator: KeyComparator,
    column: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    /// Reversed so `BinaryHeap` pops the smallest key first; ties go to the
    /// earlier run, keeping the merge stable.
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .order_tuples(&other.tuple, &self.tuple, self.column)
            .then_with(|| other.run.cmp(&self.run))
    }
}

/// K-way merge over spilled runs.
struct MergeRuns {
    schema: Schema,
    side: Side,
    spill: Arc<Mutex<SpillManager>>,
    readers: Vec<RunReader>,
    heap: BinaryHeap<HeapEntry>,
    comparator: KeyComparator,
    key_column: usize,
    decode: MemoryBudgetImpl,
    input: BoxedStream,
    state: StreamState,
}

impl MergeRuns {
    #[allow(clippy::too_many_arguments)]
    fn open(
        schema: Schema,
        side: Side,
        runs: Vec<RunMeta>,
        spill: Arc<Mutex<SpillManager>>,
        comparator: KeyComparator,
        key_column: usize,
        budget: MemoryBudgetImpl,
        input: BoxedStream,
    ) -> Result<Self, OpError> {
        let readers = runs
            .into_iter()
            .map(|run| RunReader {
                run,
                next_page: 0,
                page: VecDeque::new(),
                guard: budget.empty_guard("merge_page"),
            })
            .collect();
        let mut merge = Self {
            schema,
            side,
            spill,
            readers,
            heap: BinaryHeap::new(),
            comparator,
            key_column,
            decode: MemoryBudgetImpl::new(DECODE_SCRATCH_BYTES),
            input,
            state: StreamState::Open,
        };
        for run in 0..merge.readers.len() {
            merge.refill(run)?;
        }
        Ok(merge)
    }

    fn refill(&mut self, run: usize) -> Result<(), OpError> {
        let Some(reader) = self.readers.get_mut(run) else {
            return Ok(());
        };
        if let Some(tuple) = reader.next(&self.spill, &self.decode, self.side)? {
            self.heap.push(HeapEntry {
                tuple,
                run,
                comparator: self.comparator,
                column: self.key_column,
            });
        }
        Ok(())
    }
}

impl TupleStream for MergeRuns {
    fn open(&mut self) -> Result<(), OpError> {
        Ok(())
    }

    fn get_next(&mut self) -> Result<Option<Tuple>, OpError> {
        if self.state.is_closed() {
            return Err(OpError::IteratorClosed);
        }
        let Some(entry) = self.heap.pop() else {
            self.state = StreamState::Finished;
            return Ok(None);
        };
        self.refill(entry.run)?;
        Ok(Some(entry.tuple))
    }

    /// Deletes the run segments and closes the original input.
    fn close(&mut self) -> Result<(), OpError> {
        if self.state.is_closed() {
            return Ok(());
        }
        self.state = StreamState::Closed;
        self.heap.clear();
        let runs: Vec<RunMeta> = self.readers.drain(..).map(|r| r.run).collect();
        discard_runs(&self.spill, &runs);
        self.input.close()
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &'static str {
        "merge_runs"
    }
}
