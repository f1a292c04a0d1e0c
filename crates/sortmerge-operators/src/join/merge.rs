//! `SortMergeJoin`: the public pull-interface join.
//!
//! `open` opens both inputs, reads the first tuple of each (an empty input
//! ends the join before any sorting), gets both inputs into key order and
//! starts a `MergeScanner`. `get_next` asks the scanner for matched pairs and
//! hands each to the `OutputComposer` until one is accepted or the merge ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sortmerge_core::id::JoinId;
use sortmerge_core::order::Side;
use sortmerge_core::prelude::Schema;
use sortmerge_core::types::Tuple;
use sortmerge_mem::guard::MemoryBudgetImpl;

use crate::sort::{ExternalSort, Sorter};
use crate::traits::{BoxedStream, OpError, TupleStream};

use super::compare::KeyComparator;
use super::compose::OutputComposer;
use super::config::JoinOptions;
use super::cursor::{Prefixed, SideCursor};
use super::ensure::{SortEnsurer, SortRequest};
use super::metrics::JoinMetrics;
use super::scanner::MergeScanner;

static NEXT_JOIN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPhase {
    Unopened,
    Open,
    Closed,
}

pub struct SortMergeJoin {
    id: JoinId,
    options: JoinOptions,
    comparator: KeyComparator,
    composer: OutputComposer,
    ensurer: SortEnsurer,
    left: Option<BoxedStream>,
    right: Option<BoxedStream>,
    scanner: Option<MergeScanner>,
    phase: JoinPhase,
    metrics: JoinMetrics,
    reported: bool,
}

impl SortMergeJoin {
    /// Validate `options` and take ownership of both inputs. No input is
    /// touched here; a bad configuration fails before any I/O.
    pub fn new(
        options: JoinOptions,
        left: BoxedStream,
        right: BoxedStream,
        sorter: Arc<dyn Sorter>,
    ) -> Result<Self, OpError> {
        let composer = options.validate()?;
        for (side, stream) in [(Side::Left, &left), (Side::Right, &right)] {
            if stream.schema() != options.schema(side) {
                return Err(OpError::InvalidJoinConfiguration(format!(
                    "{side} input '{}' does not produce the declared {side} schema",
                    stream.name()
                )));
            }
        }
        let key_type = options
            .key_type()
            .ok_or_else(|| OpError::Internal("validated options without a key type".into()))?;
        let comparator = KeyComparator::for_type(key_type, options.order)?;
        Ok(Self {
            id: JoinId::new(NEXT_JOIN_ID.fetch_add(1, Ordering::Relaxed)),
            options,
            comparator,
            composer,
            ensurer: SortEnsurer::new(sorter),
            left: Some(left),
            right: Some(right),
            scanner: None,
            phase: JoinPhase::Unopened,
            metrics: JoinMetrics::default(),
            reported: false,
        })
    }

    /// A join whose unsorted inputs are sorted in memory only.
    pub fn in_memory(options: JoinOptions, left: BoxedStream, right: BoxedStream) -> Result<Self, OpError> {
        Self::new(options, left, right, Arc::new(ExternalSort::in_memory()))
    }

    pub fn id(&self) -> JoinId {
        self.id
    }

    pub fn phase(&self) -> JoinPhase {
        self.phase
    }

    pub fn options(&self) -> &JoinOptions {
        &self.options
    }

    /// Counters so far.
    pub fn metrics(&self) -> JoinMetrics {
        let mut m = self.metrics.clone();
        if let Some(s) = &self.scanner {
            m.left_pulls = s.left_pulls();
            m.right_pulls = s.right_pulls();
            m.groups_buffered = s.stats().groups_buffered;
            m.largest_group_tuples = s.stats().largest_group_tuples;
            m.peak_group_bytes = s.stats().group_bytes.peak();
        }
        m
    }

    fn sort_request(&self, side: Side) -> SortRequest {
        let key = self.options.key(side);
        SortRequest {
            side,
            schema: self.options.schema(side).clone(),
            key_column: key.column,
            key_length: key.length,
            order: self.options.order,
            mem_pages: self.options.mem_pages,
            page_size: self.options.page_size_bytes,
        }
    }

    fn budget(&self) -> MemoryBudgetImpl {
        MemoryBudgetImpl::from_pages(self.options.mem_pages, self.options.page_size_bytes)
    }

    fn open_inputs(&mut self) -> Result<MergeScanner, OpError> {
        let (Some(left), Some(right)) = (self.left.as_mut(), self.right.as_mut()) else {
            return Err(OpError::InvalidJoinConfiguration(
                "inputs were consumed by an earlier failed open".into(),
            ));
        };
        left.open().map_err(|e| OpError::input(Side::Left, "open", e))?;
        right.open().map_err(|e| OpError::input(Side::Right, "open", e))?;

        let first_left = left.get_next().map_err(|e| OpError::input(Side::Left, "get_next", e))?;
        let first_right = match first_left {
            Some(_) => right.get_next().map_err(|e| OpError::input(Side::Right, "get_next", e))?,
            None => None,
        };

        let (Some(left), Some(right)) = (self.left.take(), self.right.take()) else {
            return Err(OpError::Internal("inputs vanished during open".into()));
        };
        let (Some(first_left), Some(first_right)) = (first_left, first_right) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(join = %self.id, "an input is empty; nothing to sort");
            return Ok(MergeScanner::exhausted(
                SideCursor::new(left, Side::Left),
                SideCursor::new(right, Side::Right),
                self.comparator,
                self.budget(),
            ));
        };

        let left = match self.ensure(Side::Left, Box::new(Prefixed::new(first_left, left))) {
            Ok(l) => l,
            Err(e) => {
                self.right = Some(Box::new(Prefixed::new(first_right, right)));
                return Err(e);
            }
        };
        let right = match self.ensure(Side::Right, Box::new(Prefixed::new(first_right, right))) {
            Ok(r) => r,
            Err(e) => {
                // Keep the sorted left input so `close` still releases it.
                self.left = Some(left);
                return Err(e);
            }
        };

        Ok(MergeScanner::new(
            SideCursor::new(left, Side::Left),
            SideCursor::new(right, Side::Right),
            self.options.left_key.column,
            self.options.right_key.column,
            self.comparator,
            self.budget(),
        ))
    }

    fn ensure(&mut self, side: Side, stream: BoxedStream) -> Result<BoxedStream, OpError> {
        let presorted = self.options.is_sorted(side);
        if !presorted {
            self.metrics.sorts_invoked += 1;
        }
        let request = self.sort_request(side);
        self.ensurer.ensure_sorted(stream, &request, presorted)
    }

    fn report(&mut self) {
        if !self.reported {
            self.reported = true;
            self.metrics().emit(&self.id.to_string());
        }
    }
}

impl TupleStream for SortMergeJoin {
    /// Open both inputs and sort whichever are not declared sorted. Input
    /// failures come back as `OpError::Input` naming the side.
    fn open(&mut self) -> Result<(), OpError> {
        match self.phase {
            JoinPhase::Unopened => {}
            JoinPhase::Open => {
                return Err(OpError::InvalidJoinConfiguration("join is already open".into()));
            }
            JoinPhase::Closed => return Err(OpError::IteratorClosed),
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            join = %self.id,
            order = %self.options.order,
            mem_pages = self.options.mem_pages,
            budget_bytes = self.options.budget_bytes(),
            filter = %self.composer.filter(),
            "opening sort-merge join"
        );
        let scanner = self.open_inputs()?;
        self.scanner = Some(scanner);
        self.phase = JoinPhase::Open;
        Ok(())
    }

    fn get_next(&mut self) -> Result<Option<Tuple>, OpError> {
        match self.phase {
            JoinPhase::Unopened => return Err(OpError::NotOpen),
            JoinPhase::Closed => return Err(OpError::IteratorClosed),
            JoinPhase::Open => {}
        }
        let Some(scanner) = self.scanner.as_mut() else {
            return Err(OpError::Internal("open join without a scanner".into()));
        };
        loop {
            let Some((left, right)) = scanner.next_pair()? else {
                break;
            };
            self.metrics.pairs_matched += 1;
            match self.composer.compose(left, right) {
                Ok(Some(out)) => {
                    self.metrics.tuples_emitted += 1;
                    return Ok(Some(out));
                }
                Ok(None) => self.metrics.pairs_rejected += 1,
                Err(e) => {
                    scanner.fail();
                    return Err(e);
                }
            }
        }
        self.report();
        Ok(None)
    }

    /// Close both inputs. Closing again is a no-op.
    fn close(&mut self) -> Result<(), OpError> {
        if self.phase == JoinPhase::Closed {
            return Ok(());
        }
        let was_open = self.phase == JoinPhase::Open;
        self.phase = JoinPhase::Closed;
        if was_open {
            self.report();
        }

        let mut result = Ok(());
        if let Some(scanner) = self.scanner.as_mut() {
            result = scanner.close();
        }
        for (side, stream) in [(Side::Left, self.left.as_mut()), (Side::Right, self.right.as_mut())] {
            if let Some(s) = stream {
                let r = s.close().map_err(|e| OpError::input(side, "close", e));
                result = result.and(r);
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(join = %self.id, "sort-merge join closed");
        result
    }

    fn schema(&self) -> &Schema {
        self.composer.output_schema()
    }

    fn name(&self) -> &'static str {
        "sort_merge_join"
    }
}
