//! The merge state machine.
//!
//! Drives two key-ordered cursors in lockstep and yields every (left, right)
//! pair with equal keys. The right side's duplicate-key group is buffered in a
//! `GroupBuffer` and replayed for each left tuple carrying the same key, so
//! both inputs are read exactly once, front to back.
//!
//! ```text
//! Init ──► Aligning ──equal──► Matched ◄──same key── Advancing
//!   │          │  ▲               │                    │
//!   │      less/greater           └──group replayed───►┘
//!   │          │  └──────────────different key─────────┘
//!   └──────────┴──────────► Eof ◄──── input exhausted
//! ```

use std::cmp::Ordering;

use sortmerge_core::types::Tuple;
use sortmerge_mem::guard::MemoryBudgetImpl;
use sortmerge_mem::tracking::PeakTracker;

use crate::traits::OpError;

use super::compare::{key_of, KeyComparator};
use super::cursor::SideCursor;
use super::group::GroupBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Nothing read yet.
    Init,
    /// Comparing the current left and right keys.
    Aligning,
    /// Pairing the current left tuple with the buffered group.
    Matched,
    /// The group is exhausted for the current left tuple.
    Advancing,
    /// Terminal.
    Eof,
}

/// Counters the scanner keeps about its own work.
#[derive(Debug, Default)]
pub struct ScanStats {
    pub groups_buffered: u64,
    pub largest_group_tuples: usize,
    pub group_bytes: PeakTracker,
}

pub struct MergeScanner {
    left: SideCursor,
    right: SideCursor,
    left_key: usize,
    right_key: usize,
    comparator: KeyComparator,
    budget: MemoryBudgetImpl,
    state: ScanState,
    current_left: Option<Tuple>,
    /// Current right tuple while aligning; after a group is buffered, the
    /// lookahead tuple that ended it.
    current_right: Option<Tuple>,
    group: Option<GroupBuffer>,
    stats: ScanStats,
    done: bool,
}

impl MergeScanner {
    /// `left_key` / `right_key` are 1-based key columns. `budget` bounds the
    /// buffered group.
    pub fn new(
        left: SideCursor,
        right: SideCursor,
        left_key: usize,
        right_key: usize,
        comparator: KeyComparator,
        budget: MemoryBudgetImpl,
    ) -> Self {
        Self {
            left,
            right,
            left_key,
            right_key,
            comparator,
            budget,
            state: ScanState::Init,
            current_left: None,
            current_right: None,
            group: None,
            stats: ScanStats::default(),
            done: false,
        }
    }

    /// A scanner that produces nothing; used when an input was found empty
    /// before any sorting. The cursors are kept only to be closed.
    pub fn exhausted(left: SideCursor, right: SideCursor, comparator: KeyComparator, budget: MemoryBudgetImpl) -> Self {
        let mut s = Self::new(left, right, 1, 1, comparator, budget);
        s.state = ScanState::Eof;
        s
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn left_pulls(&self) -> u64 {
        self.left.pulls()
    }

    pub fn right_pulls(&self) -> u64 {
        self.right.pulls()
    }

    /// Bytes of the group currently buffered (0 if none).
    pub fn buffered_bytes(&self) -> usize {
        self.group.as_ref().map_or(0, GroupBuffer::byte_len)
    }

    /// Next matched pair, or `None` when the join is complete.
    ///
    /// Any error is fatal: the scanner drops its group and stays in `Eof`.
    pub fn next_pair(&mut self) -> Result<Option<(&Tuple, &Tuple)>, OpError> {
        let idx = match self.advance() {
            Ok(Some(idx)) => idx,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.fail();
                return Err(e);
            }
        };
        if self.pair_at(idx).is_none() {
            self.fail();
            return Err(OpError::Internal("matched state without a partner tuple".into()));
        }
        Ok(self.pair_at(idx))
    }

    fn pair_at(&self, idx: usize) -> Option<(&Tuple, &Tuple)> {
        self.current_left.as_ref().zip(self.group.as_ref()?.get(idx))
    }

    /// Move to the terminal state, releasing the buffered group.
    pub fn fail(&mut self) {
        self.done = true;
        self.state = ScanState::Eof;
        self.group = None;
        self.current_left = None;
        self.current_right = None;
    }

    /// Close both inputs; both are attempted even if the first fails.
    pub fn close(&mut self) -> Result<(), OpError> {
        self.fail();
        let l = self.left.close();
        let r = self.right.close();
        l.and(r)
    }

    /// Run the state machine until the next pair is ready; returns the index
    /// of the right tuple inside the buffered group.
    fn advance(&mut self) -> Result<Option<usize>, OpError> {
        loop {
            match self.state {
                ScanState::Init => {
                    self.current_left = self.left.pull()?;
                    if self.current_left.is_none() {
                        self.state = ScanState::Eof;
                        continue;
                    }
                    self.current_right = self.right.pull()?;
                    self.state = if self.current_right.is_none() {
                        ScanState::Eof
                    } else {
                        ScanState::Aligning
                    };
                }
                ScanState::Aligning => self.align()?,
                ScanState::Matched => {
                    let next = self.group.as_mut().and_then(GroupBuffer::next_index);
                    match next {
                        Some(idx) => return Ok(Some(idx)),
                        None => self.state = ScanState::Advancing,
                    }
                }
                ScanState::Advancing => self.advance_left()?,
                ScanState::Eof => {
                    self.finish();
                    return Ok(None);
                }
            }
        }
    }

    /// One comparison step of `Aligning`.
    fn align(&mut self) -> Result<(), OpError> {
        let (Some(l), Some(r)) = (&self.current_left, &self.current_right) else {
            self.state = ScanState::Eof;
            return Ok(());
        };
        let lk = key_of(l, self.left_key)?;
        let rk = key_of(r, self.right_key)?;
        self.comparator.check_key(lk)?;
        self.comparator.check_key(rk)?;

        // Null keys never join; step past them.
        let step = if lk.is_null() {
            Ordering::Less
        } else if rk.is_null() {
            Ordering::Greater
        } else {
            self.comparator.compare(lk, rk)?
        };

        match step {
            Ordering::Less => {
                self.current_left = self.left.pull()?;
                if self.current_left.is_none() {
                    self.state = ScanState::Eof;
                }
            }
            Ordering::Greater => {
                self.current_right = self.right.pull()?;
                if self.current_right.is_none() {
                    self.state = ScanState::Eof;
                }
            }
            Ordering::Equal => {
                let Some(first) = self.current_right.take() else {
                    return Err(OpError::Internal("aligning without a right tuple".into()));
                };
                // Release the previous group before buffering the next one.
                self.group = None;
                let (group, lookahead) =
                    GroupBuffer::materialize(&mut self.right, first, self.right_key, &self.comparator, &self.budget)?;
                self.stats.groups_buffered += 1;
                self.stats.largest_group_tuples = self.stats.largest_group_tuples.max(group.len());
                self.stats.group_bytes.record_used(group.byte_len());
                self.current_right = lookahead;
                self.group = Some(group);
                self.state = ScanState::Matched;
            }
        }
        Ok(())
    }

    /// `Advancing`: read the next left tuple and either replay the group for
    /// it or go back to aligning.
    fn advance_left(&mut self) -> Result<(), OpError> {
        self.current_left = self.left.pull()?;
        let Some(l) = &self.current_left else {
            self.state = ScanState::Eof;
            return Ok(());
        };
        let lk = key_of(l, self.left_key)?;
        let same = match &self.group {
            Some(g) => self.comparator.keys_match(lk, g.key())?,
            None => false,
        };
        if same {
            if let Some(g) = self.group.as_mut() {
                g.rewind();
            }
            self.state = ScanState::Matched;
        } else {
            self.group = None;
            self.state = if self.current_right.is_some() {
                ScanState::Aligning
            } else {
                ScanState::Eof
            };
        }
        Ok(())
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            #[cfg(feature = "tracing")]
            tracing::trace!(
                left_pulls = self.left.pulls(),
                right_pulls = self.right.pulls(),
                groups = self.stats.groups_buffered,
                "merge finished"
            );
        }
        self.state = ScanState::Eof;
        self.group = None;
        self.current_left = None;
        self.current_right = None;
    }
}
