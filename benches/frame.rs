//! Criterion benchmarks for the netweave frame loop.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features gpu
//!
//! Results are saved to target/criterion/

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use netweave::config::VizConfig;
use netweave::engine::NetworkViz;
use netweave::palette::Theme;
use netweave::pool::{SignalDirection, SignalPool};
use netweave::prng::Prng;
use netweave::scheduler::Instant;
use netweave::topology::Topology;

const STEP: Duration = Duration::from_micros(16_667);

fn make_viz(sizes: &[usize], force_raster: bool) -> NetworkViz {
    NetworkViz::mount(
        800,
        400,
        Theme::Dark,
        VizConfig {
            layer_sizes: sizes.to_vec(),
            force_raster,
            seed: Some(42),
            ..VizConfig::default()
        },
    )
}

/// Warm the engine into steady state so frames carry signals.
fn warm(viz: &mut NetworkViz) -> Instant {
    let mut now = Instant::now();
    for _ in 0..240 {
        now += STEP;
        viz.tick(now);
    }
    now
}

/// Benchmark a full steady-state frame on the raster backend.
fn bench_frame_raster(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_raster");

    for sizes in [vec![5, 10, 10, 5], vec![5, 10, 15, 10, 5], vec![16, 32, 32, 16]] {
        let edges: usize = sizes.windows(2).map(|w| w[0] * w[1]).sum();
        group.throughput(Throughput::Elements(edges as u64));

        group.bench_with_input(BenchmarkId::new("edges", edges), &sizes, |b, sizes| {
            let mut viz = make_viz(sizes, true);
            let mut now = warm(&mut viz);
            b.iter(|| {
                now += STEP;
                black_box(viz.tick(now))
            });
        });
    }

    group.finish();
}

/// Benchmark the selected backend (GPU when compiled in and available).
fn bench_frame_auto(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_auto");
    group.bench_function("default_layers", |b| {
        let mut viz = make_viz(&[5, 10, 15, 10, 5], false);
        let mut now = warm(&mut viz);
        b.iter(|| {
            now += STEP;
            black_box(viz.tick(now))
        });
    });
    group.finish();
}

/// Benchmark topology generation (mount and every resize).
fn bench_topology(c: &mut Criterion) {
    let mut group = c.benchmark_group("topology");
    for sizes in [vec![5, 10, 15, 10, 5], vec![64, 64, 64, 64]] {
        let nodes: usize = sizes.iter().sum();
        group.bench_with_input(BenchmarkId::new("generate", nodes), &sizes, |b, sizes| {
            let mut rng = Prng::new(42);
            b.iter(|| black_box(Topology::generate(800.0, 400.0, sizes, 1, &mut rng).edges.len()));
        });
    }
    group.finish();
}

/// Benchmark pool churn: fill, advance to completion, refill.
fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool");
    group.bench_function("churn_150", |b| {
        let mut pool = SignalPool::with_capacity(150);
        b.iter(|| {
            for edge in 0..150 {
                let _ = pool.acquire(edge, SignalDirection::Forward, 1.0, 0.5);
            }
            for _ in 0..40 {
                pool.advance(1.0 / 60.0);
            }
            black_box(pool.len())
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_frame_raster,
    bench_frame_auto,
    bench_topology,
    bench_pool
);
criterion_main!(benches);
