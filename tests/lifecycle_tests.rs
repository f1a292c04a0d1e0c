//! open / get_next / close discipline of the join iterator.

mod test_data_gen;

use sortmerge_core::prelude::*;
use sortmerge_operators::join::JoinPhase;
use sortmerge_operators::{
    ExternalSort, JoinOptions, MemoryScan, OpError, PullCounter, SortMergeJoin, TupleStream,
};
use std::sync::Arc;
use test_data_gen::*;

fn schema() -> Schema {
    keyed_schema(1)
}

fn options() -> JoinOptions {
    JoinOptions::new(schema(), 1, schema(), 1)
}

fn join(left: Vec<Tuple>, right: Vec<Tuple>) -> SortMergeJoin {
    SortMergeJoin::in_memory(options(), scan(&schema(), left), scan(&schema(), right)).unwrap()
}

#[test]
fn get_next_before_open_is_not_open() {
    let mut j = join(keyed_rows(&[(1, "a")]), keyed_rows(&[(1, "b")]));
    assert!(matches!(j.get_next(), Err(OpError::NotOpen)));
    assert_eq!(j.phase(), JoinPhase::Unopened);
}

#[test]
fn get_next_after_close_is_iterator_closed() {
    let mut j = join(keyed_rows(&[(1, "a")]), keyed_rows(&[(1, "b")]));
    j.open().unwrap();
    j.close().unwrap();
    assert!(matches!(j.get_next(), Err(OpError::IteratorClosed)));
    assert!(matches!(j.open(), Err(OpError::IteratorClosed)));
}

#[test]
fn second_open_is_rejected() {
    let mut j = join(keyed_rows(&[(1, "a")]), keyed_rows(&[(1, "b")]));
    j.open().unwrap();
    assert!(matches!(j.open(), Err(OpError::InvalidJoinConfiguration(_))));
    assert_eq!(j.get_next().unwrap().map(|t| t.len()), Some(4));
}

#[test]
fn close_is_idempotent_and_closes_inputs_once() {
    let (lc, rc) = (PullCounter::new(), PullCounter::new());
    let left = MemoryScan::new(schema(), keyed_rows(&[(1, "a")])).with_close_counter(lc.clone());
    let right = MemoryScan::new(schema(), keyed_rows(&[(1, "b")])).with_close_counter(rc.clone());
    let mut j = SortMergeJoin::in_memory(options(), left.boxed(), right.boxed()).unwrap();
    j.open().unwrap();
    j.close().unwrap();
    j.close().unwrap();
    assert_eq!((lc.get(), rc.get()), (1, 1));
    assert_eq!(j.phase(), JoinPhase::Closed);
}

#[test]
fn close_without_open_releases_inputs() {
    let lc = PullCounter::new();
    let left = MemoryScan::new(schema(), vec![]).with_close_counter(lc.clone());
    let mut j = SortMergeJoin::in_memory(options(), left.boxed(), scan(&schema(), vec![])).unwrap();
    j.close().unwrap();
    assert_eq!(lc.get(), 1);
}

#[test]
fn empty_left_input_ends_without_sorting_or_pulling_right() {
    let sorter = Arc::new(ExternalSort::in_memory());
    let rp = PullCounter::new();
    let mut j = SortMergeJoin::new(
        options(),
        scan(&schema(), vec![]),
        counted_scan(&schema(), keyed_rows(&[(2, "b"), (1, "a")]), &rp),
        sorter.clone(),
    )
    .unwrap();
    j.open().unwrap();
    assert_eq!(j.get_next().unwrap(), None);
    assert_eq!(j.get_next().unwrap(), None);
    j.close().unwrap();
    assert_eq!(sorter.invocations(), 0);
    assert_eq!(rp.get(), 0);
    assert_eq!(j.metrics().sorts_invoked, 0);
}

#[test]
fn empty_right_input_ends_without_sorting() {
    let sorter = Arc::new(ExternalSort::in_memory());
    let mut j = SortMergeJoin::new(
        options(),
        scan(&schema(), keyed_rows(&[(2, "b"), (1, "a")])),
        scan(&schema(), vec![]),
        sorter.clone(),
    )
    .unwrap();
    assert!(drain(&mut j).is_empty());
    assert_eq!(sorter.invocations(), 0);
}

#[test]
fn input_open_failure_names_the_side() {
    let mut closed = MemoryScan::new(schema(), vec![]);
    closed.close().unwrap();
    let mut j = SortMergeJoin::in_memory(options(), scan(&schema(), vec![]), closed.boxed()).unwrap();
    match j.open() {
        Err(OpError::Input { side, op, source }) => {
            assert_eq!(side, Side::Right);
            assert_eq!(op, "open");
            assert!(matches!(*source, OpError::StreamOpenFailed { .. }));
        }
        other => panic!("expected an input error, got {:?}", other.err()),
    }
    j.close().unwrap();
}

#[test]
fn bad_configuration_fails_before_any_io() {
    let pulls = PullCounter::new();
    let options = options().with_mem_pages(0);
    let res = SortMergeJoin::in_memory(
        options,
        counted_scan(&schema(), keyed_rows(&[(1, "a")]), &pulls),
        scan(&schema(), vec![]),
    );
    assert!(matches!(res.err(), Some(OpError::InvalidJoinConfiguration(_))));
    assert_eq!(pulls.get(), 0);
}

#[test]
fn stream_schema_must_match_declared_schema() {
    let other = Schema::new(vec![Field::new("k", DataType::Int64), Field::string("tag", 1)]);
    let res = SortMergeJoin::in_memory(options(), scan(&schema(), vec![]), scan(&other, vec![]));
    assert!(matches!(res.err(), Some(OpError::InvalidJoinConfiguration(_))));
}

#[test]
fn projection_out_of_range_is_reported() {
    let options = options().with_projection(vec![FieldRef::left(1), FieldRef::right(3)]);
    let res = SortMergeJoin::in_memory(options, scan(&schema(), vec![]), scan(&schema(), vec![]));
    assert!(matches!(
        res.err(),
        Some(OpError::ProjectionIndexOutOfRange { side: Side::Right, index: 3, field_count: 2 })
    ));
}

#[test]
fn filter_comparing_different_types_is_rejected_at_construction() {
    let filter = OutputFilter::all(vec![Predicate::fields(FieldRef::left(1), CompOp::Eq, FieldRef::right(2))]);
    let res = SortMergeJoin::in_memory(
        options().with_filter(filter),
        scan(&schema(), keyed_rows(&[(1, "a")])),
        scan(&schema(), keyed_rows(&[(1, "b")])),
    );
    assert!(matches!(res.err(), Some(OpError::TypeMismatch(_))));
}
