//! Bounded buffering of one duplicate-key group.
//!
//! The merge replays the right side's group once per matching left tuple.
//! Replays come from this buffer, never from the stream, so the group has to
//! fit in the join's memory budget; a group that does not is a hard error.

use sortmerge_core::types::{Scalar, Tuple};
use sortmerge_mem::guard::{BudgetGuardImpl, MemoryBudgetImpl};

use crate::traits::OpError;

use super::compare::{key_of, KeyComparator};
use super::cursor::SideCursor;

pub struct GroupBuffer {
    key: Scalar,
    tuples: Vec<Tuple>,
    bytes: usize,
    /// Index of the next tuple `next_index` hands out.
    pos: usize,
    /// Holds `bytes` against the budget until the group is dropped.
    guard: BudgetGuardImpl,
}

impl GroupBuffer {
    /// Buffer `first` and every following tuple of `cursor` whose key at
    /// `key_column` equals `first`'s.
    ///
    /// Returns the group and the first tuple past it (or `None` at end of
    /// stream). That lookahead tuple has already been consumed from the
    /// stream; the caller must use it instead of pulling again.
    pub fn materialize(
        cursor: &mut SideCursor,
        first: Tuple,
        key_column: usize,
        comparator: &KeyComparator,
        budget: &MemoryBudgetImpl,
    ) -> Result<(GroupBuffer, Option<Tuple>), OpError> {
        let key = key_of(&first, key_column)?.clone();
        let mut group = GroupBuffer {
            key,
            tuples: Vec::new(),
            bytes: 0,
            pos: 0,
            guard: budget.empty_guard("merge_group"),
        };
        group.push(first, cursor, budget)?;

        loop {
            let Some(next) = cursor.pull()? else {
                break;
            };
            if !comparator.keys_match(key_of(&next, key_column)?, &group.key)? {
                #[cfg(feature = "tracing")]
                tracing::trace!(side = %cursor.side(), key = %group.key, tuples = group.tuples.len(), bytes = group.bytes, "group materialized");
                return Ok((group, Some(next)));
            }
            group.push(next, cursor, budget)?;
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(side = %cursor.side(), key = %group.key, tuples = group.tuples.len(), bytes = group.bytes, "group materialized at end of input");
        Ok((group, None))
    }

    fn push(&mut self, tuple: Tuple, cursor: &SideCursor, budget: &MemoryBudgetImpl) -> Result<(), OpError> {
        let len = tuple.byte_len();
        if !self.guard.try_grow(len) {
            #[cfg(feature = "tracing")]
            tracing::debug!(side = %cursor.side(), key = %self.key, bytes = self.bytes + len, budget = budget.capacity_bytes(), "group too large");
            return Err(OpError::GroupTooLarge {
                side: cursor.side(),
                key: self.key.to_string(),
                tuples: self.tuples.len() + 1,
                needed_bytes: self.bytes + len,
                budget_bytes: budget.capacity_bytes(),
            });
        }
        self.bytes += len;
        self.tuples.push(tuple);
        Ok(())
    }

    pub fn key(&self) -> &Scalar {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Total buffered bytes, as accounted against the budget.
    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    pub fn get(&self, idx: usize) -> Option<&Tuple> {
        self.tuples.get(idx)
    }

    /// Index of the next buffered tuple for the current partner, advancing the
    /// replay position.
    pub fn next_index(&mut self) -> Option<usize> {
        if self.pos < self.tuples.len() {
            self.pos += 1;
            Some(self.pos - 1)
        } else {
            None
        }
    }

    /// Restart the replay for a new partner with the same key.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::MemoryScan;
    use crate::traits::TupleStream;
    use sortmerge_core::order::{Side, SortOrder};
    use sortmerge_core::prelude::Schema;
    use sortmerge_core::schema::{DataType, Field};
    use sortmerge_core::tuple;

    fn cursor(rows: Vec<Tuple>) -> SideCursor {
        let schema = Schema::new(vec![Field::new("k", DataType::Int32), Field::string("v", 16)]);
        let mut s = MemoryScan::new(schema, rows);
        s.open().unwrap();
        SideCursor::new(s.boxed(), Side::Right)
    }

    fn cmp() -> KeyComparator {
        KeyComparator::for_type(DataType::Int32, SortOrder::Ascending).unwrap()
    }

    #[test]
    fn stops_at_first_different_key() {
        let mut c = cursor(vec![tuple![1i32, "b"], tuple![2i32, "c"], tuple![2i32, "d"]]);
        let budget = MemoryBudgetImpl::new(1024);
        let (mut g, look) = GroupBuffer::materialize(&mut c, tuple![1i32, "a"], 1, &cmp(), &budget).unwrap();
        assert_eq!(g.len(), 2);
        assert_eq!(g.key(), &Scalar::I32(1));
        assert_eq!(look, Some(tuple![2i32, "c"]));
        assert_eq!(g.byte_len(), 10);
        assert_eq!(budget.used_bytes(), 10);

        assert_eq!(g.next_index(), Some(0));
        assert_eq!(g.next_index(), Some(1));
        assert_eq!(g.next_index(), None);
        g.rewind();
        assert_eq!(g.next_index(), Some(0));

        drop(g);
        assert_eq!(budget.used_bytes(), 0);
    }

    #[test]
    fn group_reaching_end_of_input_has_no_lookahead() {
        let mut c = cursor(vec![tuple![4i32, "y"]]);
        let budget = MemoryBudgetImpl::new(1024);
        let (g, look) = GroupBuffer::materialize(&mut c, tuple![4i32, "x"], 1, &cmp(), &budget).unwrap();
        assert_eq!(g.len(), 2);
        assert!(look.is_none());
        assert!(c.is_exhausted());
    }

    #[test]
    fn exact_fit_succeeds_and_one_byte_over_fails() {
        // Each tuple is 4 + 1 bytes.
        let rows = vec![tuple![7i32, "b"], tuple![7i32, "c"]];
        let budget = MemoryBudgetImpl::new(15);
        let (g, _) = GroupBuffer::materialize(&mut cursor(rows.clone()), tuple![7i32, "a"], 1, &cmp(), &budget).unwrap();
        assert_eq!(g.byte_len(), 15);
        drop(g);

        let budget = MemoryBudgetImpl::new(14);
        let err = GroupBuffer::materialize(&mut cursor(rows), tuple![7i32, "a"], 1, &cmp(), &budget)
            .err()
            .unwrap();
        match err {
            OpError::GroupTooLarge { side, tuples, needed_bytes, budget_bytes, .. } => {
                assert_eq!(side, Side::Right);
                assert_eq!(tuples, 3);
                assert_eq!(needed_bytes, 15);
                assert_eq!(budget_bytes, 14);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(budget.used_bytes(), 0);
    }
}
