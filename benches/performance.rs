use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sortmerge_core::prelude::*;
use sortmerge_io::MemoryStorage;
use sortmerge_mem::{Codec, SpillManager};
use sortmerge_operators::{ExternalSort, JoinOptions, MemoryScan, SortMergeJoin, TupleStream};
use std::sync::{Arc, Mutex};

fn schema() -> Schema {
    Schema::new(vec![Field::new("k", DataType::Int64), Field::string("payload", 16)])
}

/// `rows` tuples, `dup` per key when sorted; scrambled keys otherwise.
fn make_rows(rows: usize, dup: usize, sorted: bool) -> Vec<Tuple> {
    let distinct = (rows / dup.max(1)).max(1) as i64;
    (0..rows as i64)
        .map(|i| {
            let k = if sorted { i / dup as i64 } else { (i * 7919) % distinct };
            Tuple::new(vec![Scalar::I64(k), Scalar::Str(format!("p{i:08}"))])
        })
        .collect()
}

fn run_join(options: JoinOptions, left: Vec<Tuple>, right: Vec<Tuple>, sorter: Arc<ExternalSort>) -> usize {
    let s = schema();
    let mut join = SortMergeJoin::new(
        options,
        MemoryScan::new(s.clone(), left).boxed(),
        MemoryScan::new(s, right).boxed(),
        sorter,
    )
    .unwrap();
    join.open().unwrap();
    let mut n = 0;
    while join.get_next().unwrap().is_some() {
        n += 1;
    }
    join.close().unwrap();
    n
}

fn bench_presorted_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_presorted");
    for dup in [1usize, 4, 16] {
        let left = make_rows(4096, dup, true);
        let right = make_rows(4096, dup, true);
        group.bench_with_input(BenchmarkId::from_parameter(dup), &dup, |b, _| {
            b.iter(|| {
                let options = JoinOptions::new(schema(), 1, schema(), 1).presorted(true, true);
                run_join(options, left.clone(), right.clone(), Arc::new(ExternalSort::in_memory()))
            })
        });
    }
    group.finish();
}

fn bench_sort_then_merge(c: &mut Criterion) {
    let left = make_rows(4096, 2, false);
    let right = make_rows(2048, 1, false);
    c.bench_function("sort_in_memory_then_merge", |b| {
        b.iter(|| {
            let options = JoinOptions::new(schema(), 1, schema(), 1).with_mem_pages(256);
            run_join(options, left.clone(), right.clone(), Arc::new(ExternalSort::in_memory()))
        })
    });
    c.bench_function("sort_with_spill_then_merge", |b| {
        b.iter(|| {
            let mgr = SpillManager::new(Box::new(MemoryStorage::new()), Codec::None, "bench".into());
            let sorter = Arc::new(ExternalSort::with_spill(Arc::new(Mutex::new(mgr))));
            let options = JoinOptions::new(schema(), 1, schema(), 1).with_mem_pages(16);
            run_join(options, left.clone(), right.clone(), sorter)
        })
    });
}

criterion_group!(benches, bench_presorted_merge, bench_sort_then_merge);
criterion_main!(benches);
