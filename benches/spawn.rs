use std::hint::black_box;

use criterion::*;
use colonnade::engine::entity::Entity;
use colonnade::engine::storage::Storage;

mod common;
use common::*;

fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("spawn_100k_agents", |b| {
        b.iter(|| {
            let storage = populated_storage(AGENTS_MED).expect("spawn failed in benchmark");
            black_box(storage);
        });
    });

    group.bench_function("despawn_half_and_refresh_100k", |b| {
        b.iter_batched(
            || populated_storage(AGENTS_MED).expect("spawn failed in benchmark"),
            |mut storage: Storage| {
                for row in (0..AGENTS_MED).step_by(2) {
                    storage.remove_entity(Entity::from_raw(row as u32));
                }
                black_box(storage.refresh());
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
