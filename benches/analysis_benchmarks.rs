//! Analysis benchmarks over synthetic outage traces

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use failover_bench::analysis::{
    DetectorConfig, WindowMode, compute_percentile_latency, compute_throughput, detect_failures,
};
use failover_bench::metrics::{OutcomeRecord, Status};

/// One record every 10ms with an outage over the middle third
fn trace(n: u32) -> Vec<OutcomeRecord> {
    (0..n)
        .map(|i| {
            let t = f64::from(i) * 10.0;
            let outage = i > n / 3 && i < 2 * n / 3;
            let (latency, status) = if outage {
                (2_500.0, Status::Failed)
            } else {
                (40.0 + f64::from(i % 13), Status::Success)
            };
            OutcomeRecord::from_latency(t, latency, status, "bench", None).unwrap()
        })
        .collect()
}

fn throughput_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    for n in [1_000u32, 10_000, 100_000] {
        let records = trace(n);
        group.throughput(Throughput::Elements(u64::from(n)));
        group.bench_with_input(BenchmarkId::from_parameter(n), &records, |b, records| {
            b.iter(|| compute_throughput(black_box(records), 1_000.0));
        });
    }
    group.finish();
}

fn latency_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency");
    let records = trace(50_000);
    group.throughput(Throughput::Elements(50_000));

    group.bench_function("fixed", |b| {
        b.iter(|| compute_percentile_latency(black_box(&records), 1_000.0, WindowMode::Fixed));
    });
    group.bench_function("sliding", |b| {
        b.iter(|| {
            compute_percentile_latency(
                black_box(&records),
                1_000.0,
                WindowMode::Sliding { step_ms: 250.0 },
            )
        });
    });
    group.finish();
}

fn detector_benchmark(c: &mut Criterion) {
    let records = trace(50_000);
    let config = DetectorConfig::default();
    c.bench_function("detect_failures", |b| {
        b.iter(|| detect_failures(black_box(&records), &config));
    });
}

criterion_group!(
    benches,
    throughput_benchmark,
    latency_benchmark,
    detector_benchmark
);
criterion_main!(benches);
