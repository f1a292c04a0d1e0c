//! Shared data builders for the integration tests.

#![allow(dead_code)]

use sortmerge_core::prelude::*;
use sortmerge_operators::{BoxedStream, MemoryScan, PullCounter, SortMergeJoin, TupleStream};

/// `(k Int32, tag Utf8(max_len))`
pub fn keyed_schema(max_len: usize) -> Schema {
    Schema::new(vec![Field::new("k", DataType::Int32), Field::string("tag", max_len)])
}

pub fn keyed_rows(rows: &[(i32, &str)]) -> Vec<Tuple> {
    rows.iter()
        .map(|(k, t)| Tuple::new(vec![Scalar::I32(*k), Scalar::from(*t)]))
        .collect()
}

pub fn scan(schema: &Schema, rows: Vec<Tuple>) -> BoxedStream {
    MemoryScan::new(schema.clone(), rows).boxed()
}

pub fn counted_scan(schema: &Schema, rows: Vec<Tuple>, pulls: &PullCounter) -> BoxedStream {
    MemoryScan::new(schema.clone(), rows)
        .with_pull_counter(pulls.clone())
        .boxed()
}

/// Open, pull to the end, close.
pub fn drain(join: &mut SortMergeJoin) -> Vec<Tuple> {
    join.open().unwrap();
    let mut out = Vec::new();
    while let Some(t) = join.get_next().unwrap() {
        out.push(t);
    }
    join.close().unwrap();
    out
}

/// Rows rendered as strings for compact assertions.
pub fn render(rows: &[Tuple]) -> Vec<String> {
    rows.iter()
        .map(|t| {
            t.values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect()
}

/// Deterministic pseudo-random keys in `0..range` (64-bit LCG).
pub fn generate_keys(n: usize, range: i32, seed: u64) -> Vec<i32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) % range as u64) as i32
        })
        .collect()
}

/// Rows `(key, "<prefix><i>")` for the given keys.
pub fn generate_keyed(keys: &[i32], prefix: &str) -> Vec<Tuple> {
    keys.iter()
        .enumerate()
        .map(|(i, k)| Tuple::new(vec![Scalar::I32(*k), Scalar::Str(format!("{prefix}{i}"))]))
        .collect()
}

/// Nested-loop reference join on the first column, all fields projected.
pub fn nested_loop_join(left: &[Tuple], right: &[Tuple]) -> Vec<Tuple> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            if l.values[0] == r.values[0] && !l.values[0].is_null() {
                let mut values = l.values.clone();
                values.extend(r.values.iter().cloned());
                out.push(Tuple::new(values));
            }
        }
    }
    out
}

pub fn create_temp_spill_dir(tag: &str) -> String {
    let dir = std::env::temp_dir().join(format!("sortmerge-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.to_string_lossy().into_owned()
}

pub fn cleanup_dir(dir: &str) {
    let _ = std::fs::remove_dir_all(dir);
}
