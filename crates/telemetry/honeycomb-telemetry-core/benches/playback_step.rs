use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use honeycomb_telemetry_core::{
    Animator, AnimatorConfig, Frame, FrameStore, InterpolationStrategy, RotationMap, StateRecord,
    TelemetryAnimator,
};
use serde_json::json;

fn build_store(len: usize) -> Arc<FrameStore> {
    let frames = (0..len)
        .map(|i| {
            let angle = i as f64 * 0.01;
            let state = StateRecord::from_json(json!({
                "odometry": { "x": i as f64 * 0.1, "y": (i % 13) as f64 },
                "attitude": {
                    "qx": 0.0, "qy": 0.0,
                    "qz": (angle / 2.0).sin(), "qw": (angle / 2.0).cos()
                },
                "battery": 100.0 - i as f64 * 0.001,
                "mode": if i % 50 < 25 { "DRIVE" } else { "IDLE" }
            }))
            .unwrap();
            Frame::new(i as f64 * 100.0, state)
        })
        .collect();
    Arc::new(FrameStore::new(frames).unwrap())
}

fn animator(store: &Arc<FrameStore>) -> TelemetryAnimator {
    let config = AnimatorConfig {
        rotation_maps: vec![RotationMap::new("qx", "qy", "qz", "qw")],
        ..AnimatorConfig::default()
    };
    TelemetryAnimator::new(Arc::clone(store), config)
        .with_interpolation(InterpolationStrategy::NestedLinear)
}

fn bench_playback(c: &mut Criterion) {
    let store = build_store(10_000);

    c.bench_function("forward_step_16ms", |b| {
        let mut anim = animator(&store);
        let mut t = 0.0;
        b.iter(|| {
            t = if t > 999_000.0 { 0.0 } else { t + 16.0 };
            anim.set_time(black_box(t)).unwrap();
            black_box(anim.state().len());
        })
    });

    c.bench_function("random_seek", |b| {
        let mut anim = animator(&store);
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        b.iter(|| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let t = (seed % 1_000_000) as f64;
            anim.set_time(black_box(t)).unwrap();
            black_box(anim.state().len());
        })
    });
}

criterion_group!(benches, bench_playback);
criterion_main!(benches);
