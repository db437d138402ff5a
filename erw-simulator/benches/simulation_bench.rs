#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use nalgebra::{Matrix2, Vector2};

use erw_config::SimulationConfig;
use erw_core::configuration::{ClimateBucket, Configuration};
use erw_core::posterior::StatePosterior;
use erw_simulator::{aggregator, CancellationToken, SimulationEngine};

/// Throughput of a full forecast: sampling, accumulation and report.
fn benchmark_forecast_throughput(c: &mut Criterion) {
    let posterior = StatePosterior::new(
        Vector2::new(0.05, 50.0),
        Matrix2::new(1e-4, 0.0, 0.0, 25.0),
    );
    let site = Configuration::new("bench-site", 10.0, ClimateBucket::Humid);
    let engine = SimulationEngine::new(SimulationConfig {
        sample_count: 2_000,
        seed: Some(42),
        environmental_noise_scale: 1.0,
        ..SimulationConfig::default()
    });
    let token = CancellationToken::new();

    c.bench_function("forecast_throughput", |b| {
        b.iter(|| {
            let run = engine.run(&posterior, &site, &token).unwrap();
            black_box(aggregator::report(&run, &site).unwrap());
        })
    });
}

criterion_group!(benches, benchmark_forecast_throughput);
criterion_main!(benches);
