use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::*;

mod common;
use common::*;

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    for &agents in &[AGENTS_SMALL, AGENTS_MED, AGENTS_LARGE] {
        let storage = populated_storage(agents).expect("spawn failed in benchmark");

        group.throughput(Throughput::Elements(agents as u64));

        group.bench_with_input(BenchmarkId::new("sequential_read_productivity", agents), &storage, |b, storage| {
            b.iter(|| {
                let mut total = 0.0f32;
                storage.for_entities_with::<(Productivity,), _>(|entity| {
                    total += storage.get_component::<Productivity>(entity).rate;
                });
                black_box(total);
            });
        });

        group.bench_with_input(BenchmarkId::new("parallel_match_wealth", agents), &storage, |b, storage| {
            b.iter(|| {
                let matched = AtomicUsize::new(0);
                storage.for_entities_with_parallel::<(Wealth, Productivity), _>(|_| {
                    matched.fetch_add(1, Ordering::Relaxed);
                });
                black_box(matched.into_inner());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
