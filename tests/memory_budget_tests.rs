//! Page-budget boundaries of the buffered duplicate-key group.

mod test_data_gen;

use sortmerge_core::prelude::*;
use sortmerge_operators::{JoinOptions, OpError, SortMergeJoin, TupleStream};
use test_data_gen::*;

/// Right side holds one group of three 6-byte tuples (18 bytes).
fn join_with_budget(bytes: usize) -> SortMergeJoin {
    let schema = keyed_schema(2);
    let left = keyed_rows(&[(1, "q"), (2, "r")]);
    let right = keyed_rows(&[(1, "ab"), (1, "cd"), (1, "ef"), (2, "gh")]);
    let options = JoinOptions::new(schema.clone(), 1, schema.clone(), 1)
        .presorted(true, true)
        .with_page_size(1)
        .with_mem_pages(bytes);
    SortMergeJoin::in_memory(options, scan(&schema, left), scan(&schema, right)).unwrap()
}

#[test]
fn group_exactly_at_budget_succeeds() {
    let mut join = join_with_budget(18);
    let out = drain(&mut join);
    assert_eq!(out.len(), 4);
    let m = join.metrics();
    assert_eq!(m.peak_group_bytes, 18);
    assert_eq!(m.largest_group_tuples, 3);
    assert_eq!(m.groups_buffered, 2);
}

#[test]
fn one_byte_over_fails_with_group_too_large() {
    let mut join = join_with_budget(17);
    join.open().unwrap();
    let err = join.get_next().err().unwrap();
    match err.root() {
        OpError::GroupTooLarge {
            side,
            tuples,
            needed_bytes,
            budget_bytes,
            ..
        } => {
            assert_eq!(*side, Side::Right);
            assert_eq!(*tuples, 3);
            assert_eq!(*needed_bytes, 18);
            assert_eq!(*budget_bytes, 17);
        }
        other => panic!("expected GroupTooLarge, got {other}"),
    }
    // The iterator is finished after a fatal error; it must still close cleanly.
    assert_eq!(join.get_next().unwrap(), None);
    join.close().unwrap();
}

#[test]
fn groups_release_their_bytes_before_the_next_group() {
    // Two 12-byte groups fit one after the other in a 12-byte budget.
    let schema = keyed_schema(2);
    let left = keyed_rows(&[(1, "a"), (2, "b")]);
    let right = keyed_rows(&[(1, "aa"), (1, "bb"), (2, "cc"), (2, "dd")]);
    let options = JoinOptions::new(schema.clone(), 1, schema.clone(), 1)
        .presorted(true, true)
        .with_page_size(4)
        .with_mem_pages(3);
    let mut join = SortMergeJoin::in_memory(options, scan(&schema, left), scan(&schema, right)).unwrap();
    assert_eq!(
        render(&drain(&mut join)),
        vec!["1,a,1,aa", "1,a,1,bb", "2,b,2,cc", "2,b,2,dd"]
    );
}

#[test]
fn unmatched_right_keys_are_never_buffered() {
    let schema = keyed_schema(2);
    let left = keyed_rows(&[(5, "a")]);
    let right = keyed_rows(&[(1, "xx"), (1, "yy"), (1, "zz"), (5, "ok")]);
    let options = JoinOptions::new(schema.clone(), 1, schema.clone(), 1)
        .presorted(true, true)
        .with_page_size(1)
        .with_mem_pages(6);
    let mut join = SortMergeJoin::in_memory(options, scan(&schema, left), scan(&schema, right)).unwrap();
    assert_eq!(render(&drain(&mut join)), vec!["5,a,5,ok"]);
    assert_eq!(join.metrics().groups_buffered, 1);
}
