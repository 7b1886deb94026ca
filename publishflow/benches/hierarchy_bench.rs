//! Benchmarks for hierarchy depth resolution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use publishflow::core::{RecordMap, RecordMapEntry};
use publishflow::publish::resolve_depth;

fn chain(len: usize) -> RecordMap {
    let map = RecordMap::new();
    for i in 0..len {
        let related = (i > 0).then(|| format!("org-{}", i - 1));
        map.insert(RecordMapEntry::new(format!("org-{i}"), i as u64 + 1).with_related(related));
    }
    map
}

fn hierarchy_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_depth");
    for len in [10_usize, 100] {
        let map = chain(len);
        let leaf = format!("org-{}", len - 1);
        group.bench_with_input(BenchmarkId::new("chain", len), &leaf, |b, leaf| {
            b.iter(|| resolve_depth(black_box(&map), leaf, 1_000));
        });
    }
    group.finish();
}

criterion_group!(benches, hierarchy_benchmark);
criterion_main!(benches);
