use std::hint::black_box;

use criterion::*;
use colonnade::engine::config::RuntimeConfig;
use colonnade::prelude::*;

mod common;
use common::*;

fn build(config: RuntimeConfig, agents: usize) -> Scheduler {
    let storage = populated_storage(agents).expect("spawn failed in benchmark");

    let production = FnSystem::new(
        SystemDescriptor::new("production").reads::<Productivity>().writes::<Wealth>().parallel_safe(),
        |ctx| {
            let rate = ctx.get::<Productivity>().rate;
            ctx.get_mut::<Wealth>().value += rate;
            None
        },
    );

    let decay = FnSystem::new(
        SystemDescriptor::new("decay").writes::<Wealth>().parallel_safe(),
        |ctx| {
            ctx.get_mut::<Wealth>().value *= 0.99;
            None
        },
    );

    let drift = FnSystem::new(
        SystemDescriptor::new("drift").writes::<Position>().takes_delta_time().parallel_safe(),
        |ctx| {
            let dt = ctx.delta_time() as f32;
            let position = ctx.get_mut::<Position>();
            position.x += dt;
            position.y -= dt;
            None
        },
    );

    Scheduler::builder()
        .config(config.with_fixed_delta(0.01))
        .storage(storage)
        .system(production)
        .system(decay)
        .system(drift)
        .build()
        .expect("scheduler build failed in benchmark")
}

fn tick_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    group.throughput(Throughput::Elements(AGENTS_MED as u64));

    group.bench_function("sequential_3_systems_100k", |b| {
        let mut scheduler = build(RuntimeConfig::sequential(), AGENTS_MED);
        b.iter(|| black_box(scheduler.tick().expect("tick failed")));
    });

    group.bench_function("parallel_3_systems_100k", |b| {
        let mut scheduler = build(RuntimeConfig::parallel(), AGENTS_MED);
        b.iter(|| black_box(scheduler.tick().expect("tick failed")));
    });

    group.bench_function("parallel_no_inner_3_systems_100k", |b| {
        let mut scheduler = build(RuntimeConfig::parallel().with_inner_parallelism(false), AGENTS_MED);
        b.iter(|| black_box(scheduler.tick().expect("tick failed")));
    });

    group.finish();
}

criterion_group!(benches, tick_benchmark);
criterion_main!(benches);
