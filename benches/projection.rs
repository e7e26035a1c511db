//! Projection benchmarks
//!
//! Benchmarks for flattening query sets into tables:
//! - Plain config paths
//! - Reduced metric series
//! - Arrow export
//!
//! Toyota Way: Measure before optimizing (Genchi Genbutsu)

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use trueno_runs::store::{MemoryDocumentStore, MemoryObjectStore};
use trueno_runs::{ColumnSpec, ExperimentLoader, QuerySet, Reducer};

/// Create a query set of `num_runs` runs with a 100-step loss curve each
#[allow(clippy::cast_precision_loss)]
fn create_query_set(num_runs: usize) -> QuerySet {
    let runs = Arc::new(MemoryDocumentStore::new());
    for i in 0..num_runs {
        let id = runs.insert_run(json!({
            "experiment": {"name": "bench"},
            "config": {"epochs": i % 10, "optimizer": if i % 2 == 0 { "sgd" } else { "adam" }},
        }));
        let steps: Vec<i64> = (0..100).collect();
        let values: Vec<f64> = steps.iter().map(|s| 1.0 / (*s as f64 + 1.0)).collect();
        runs.insert_metric(&id, "training_loss", &steps, &values);
    }
    let loader = ExperimentLoader::builder(runs, Arc::new(MemoryObjectStore::new()))
        .build()
        .unwrap();
    let set = loader.find_all().unwrap();
    // Warm the lazy metric caches so the benchmark measures projection only
    for exp in &set {
        exp.metrics().unwrap();
    }
    set
}

/// Benchmark projection of config paths
fn bench_project_config(c: &mut Criterion) {
    let mut group = c.benchmark_group("project_config");

    for num_runs in [10, 100, 1_000] {
        let set = create_query_set(num_runs);
        group.bench_with_input(BenchmarkId::from_parameter(num_runs), &set, |b, set| {
            b.iter(|| {
                let table = set
                    .project(["config.epochs", "config.optimizer"])
                    .unwrap();
                black_box(table.num_rows());
            });
        });
    }

    group.finish();
}

/// Benchmark projection with a mean reducer over metric series
fn bench_project_reduced(c: &mut Criterion) {
    let mut group = c.benchmark_group("project_reduced");

    for num_runs in [10, 100, 1_000] {
        let set = create_query_set(num_runs);
        group.bench_with_input(BenchmarkId::from_parameter(num_runs), &set, |b, set| {
            b.iter(|| {
                let table = set
                    .project([ColumnSpec::reduced("metrics.training_loss", Reducer::mean())])
                    .unwrap();
                black_box(table.num_rows());
            });
        });
    }

    group.finish();
}

/// Benchmark Arrow export of a projected table
fn bench_to_record_batch(c: &mut Criterion) {
    let set = create_query_set(1_000);
    let table = set
        .project([
            ColumnSpec::new("config.epochs"),
            ColumnSpec::new("config.optimizer"),
            ColumnSpec::reduced("metrics.training_loss", Reducer::last()),
        ])
        .unwrap();

    c.bench_function("to_record_batch_1000", |b| {
        b.iter(|| black_box(table.to_record_batch().unwrap()));
    });
}

criterion_group!(
    benches,
    bench_project_config,
    bench_project_reduced,
    bench_to_record_batch
);
criterion_main!(benches);
