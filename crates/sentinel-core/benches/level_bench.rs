use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use glam::Vec3;
use sentinel_core::{
    BodyLayer, GroupAction, KineticBody, Level, LevelBuilder, PuzzleGroup, SentinelConfig,
};
use sentinel_index::Aabb;
use smallvec::SmallVec;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(fallback)
}

/// Square arena with a ring of sentries, a row of plates and a walking player.
fn arena(sentries: usize) -> Level {
    let config = SentinelConfig {
        history_capacity: 1,
        ..SentinelConfig::default()
    };
    let mut builder = LevelBuilder::new(config).expect("builder");
    builder.add_wall(
        Aabb::new(Vec3::new(-60.0, -1.0, -60.0), Vec3::new(60.0, 0.0, 60.0)).expect("floor"),
        Some("Floor".into()),
    );
    for pillar in 0..16 {
        let x = (pillar % 4) as f32 * 20.0 - 30.0;
        let z = (pillar / 4) as f32 * 20.0 - 30.0;
        builder.add_wall(
            Aabb::from_center(Vec3::new(x, 1.5, z), Vec3::new(1.0, 1.5, 1.0)).expect("pillar"),
            None,
        );
    }
    let door = builder
        .add_gate("door", Vec3::new(0.0, 1.5, 50.0), Vec3::new(2.0, 1.5, 0.25))
        .expect("door");
    let mut plates = SmallVec::<[_; 4]>::new();
    for index in 0..4 {
        let center = Vec3::new(index as f32 * 6.0 - 9.0, 0.0, 40.0);
        let plate = builder.add_plate(
            format!("plate-{index}"),
            Aabb::new(center - Vec3::new(1.0, 0.0, 1.0), center + Vec3::new(1.0, 0.2, 1.0))
                .expect("plate"),
            None,
            false,
            None,
        );
        plates.push(plate);
        builder
            .add_body(KineticBody::new(
                format!("crate-{index}"),
                center + Vec3::new(0.0, 0.5, 0.0),
                Vec3::splat(0.5),
                20.0,
                BodyLayer::Weighted,
            ))
            .expect("crate");
    }
    builder.add_puzzle(PuzzleGroup::new(
        "door",
        plates,
        GroupAction {
            gates: SmallVec::from_slice(&[door]),
            exit: None,
        },
    ));
    for index in 0..sentries {
        let angle = index as f32 / sentries as f32 * std::f32::consts::TAU;
        let radius = 35.0;
        let start = Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius);
        let waypoints = (0..4)
            .map(|corner| {
                let theta = angle + corner as f32 * std::f32::consts::FRAC_PI_2;
                Vec3::new(theta.cos() * radius, 0.0, theta.sin() * radius)
            })
            .collect();
        builder
            .add_sentry(format!("sentry-{index}"), start, angle, waypoints, None, Vec::new())
            .expect("sentry");
    }
    builder
        .set_player(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.3, 0.5, 0.3))
        .expect("player");
    builder.build()
}

fn bench_level_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("level_step");
    group.sample_size(env_or("SENTINEL_BENCH_SAMPLES", 30_usize).max(10));
    group.warm_up_time(Duration::from_secs(env_or("SENTINEL_BENCH_WARMUP_SECS", 2)));
    group.measurement_time(Duration::from_secs(env_or("SENTINEL_BENCH_MEASURE_SECS", 5)));
    let steps = env_or("SENTINEL_BENCH_STEPS", 120_usize).max(1);

    for sentries in [4_usize, 16, 64] {
        group.bench_function(format!("steps{steps}_sentries{sentries}"), |b| {
            b.iter_batched(
                || arena(sentries),
                |mut level| {
                    for tick in 0..steps {
                        let phase = tick as f32 * 0.05;
                        level.set_player_position(Vec3::new(
                            phase.sin() * 20.0,
                            0.5,
                            phase.cos() * 20.0,
                        ));
                        level.step();
                    }
                    level
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_level_steps);
criterion_main!(benches);
