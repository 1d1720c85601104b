use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::time::Duration;
use stickfolk_core::cluster::dbscan;
use stickfolk_core::{Position, StickfolkConfig, WorldState};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

fn scattered(count: usize, width: f32, height: f32) -> Vec<Position> {
    (0..count as u32)
        .map(|seed| {
            let x = (seed.wrapping_mul(7_919) % width as u32) as f32;
            let y = (seed.wrapping_mul(104_729) % height as u32) as f32;
            Position::new(x, y)
        })
        .collect()
}

fn bench_world_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    group.sample_size(env_or("SF_BENCH_SAMPLES", 30usize).max(10));
    group.warm_up_time(Duration::from_secs(env_or("SF_BENCH_WARMUP_SECS", 2)));
    group.measurement_time(Duration::from_secs(env_or("SF_BENCH_MEASURE_SECS", 10)));
    // Steps per bench iteration (override via SF_BENCH_STEPS)
    let steps = env_or("SF_BENCH_STEPS", 64usize).max(1);

    for agents in [200usize, 1_000, 3_000] {
        group.bench_function(format!("steps{steps}_agents{agents}"), |b| {
            b.iter_batched(
                || {
                    let mut config = StickfolkConfig {
                        rng_seed: Some(0xBEEF),
                        history_capacity: 1,
                        ..StickfolkConfig::default()
                    };
                    // Short phases so every bench run crosses clustering and crowd setup.
                    config.phases.forming = 16;
                    config.phases.holding = 32;
                    config.phases.disbanding = 8;
                    let (width, height) = (config.world_width, config.world_height);
                    let mut world = WorldState::new(config).expect("world");
                    for position in scattered(agents, width, height) {
                        world.spawn_agent(position).expect("spawn");
                    }
                    world
                },
                |mut world| {
                    for _ in 0..steps {
                        world.step();
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("dbscan");
    for count in [500usize, 5_000] {
        let points: Vec<(f32, f32)> = scattered(count, 1_600.0, 1_000.0)
            .into_iter()
            .map(Position::as_tuple)
            .collect();
        group.bench_function(format!("points{count}"), |b| {
            b.iter(|| dbscan(&points, 90.0, 2).expect("clustering"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_world_steps, bench_clustering);
criterion_main!(benches);
