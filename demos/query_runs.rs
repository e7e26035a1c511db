//! Query Runs Example
//!
//! Loads a handful of runs from the in-memory stores, projects them into a
//! table, saves artifacts in bulk and deletes a run.
//!
//! Run with: RUST_LOG=debug cargo run --example query_runs

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;
use trueno_runs::store::{MemoryDocumentStore, MemoryObjectStore};
use trueno_runs::utils::{differing_config_keys, format_config};
use trueno_runs::{
    AssumeYes, ColumnSpec, ExperimentLoader, LoaderConfig, OnMissing, ProjectOptions, Reducer,
    Rendered,
};

fn seed(runs: &MemoryDocumentStore, objects: &MemoryObjectStore) {
    let configs = [
        json!({"epochs": 1, "optimizer": "sgd"}),
        json!({"epochs": 3, "optimizer": "sgd"}),
        json!({"epochs": 1, "optimizer": "adam", "dropout": 0.5}),
    ];
    for (id, config) in (1_u32..).zip(configs) {
        let png = objects.put(
            format!("artifact://runs/{id}/confusion_matrix"),
            Some("image/png"),
            vec![0x89, b'P', b'N', b'G'],
        );
        let csv = objects.put(
            format!("artifact://runs/{id}/predictions"),
            Some("text/csv"),
            b"label,score\ncat,0.91\ndog,0.42\n".to_vec(),
        );
        let run_id = runs.insert_run(json!({
            "_id": id,
            "experiment": {"name": "example", "mainfile": "conduct.py"},
            "config": config,
            "start_time": format!("2024-05-0{id}T12:00:00+00:00"),
            "result": 0.05_f64.mul_add(f64::from(id), 0.8),
            "artifacts": [
                {"name": "confusion_matrix", "file_id": png.as_str(), "content_type": "image/png"},
                {"name": "predictions", "file_id": csv.as_str(), "content_type": "text/csv"},
            ],
        }));
        let losses: Vec<f64> = (1..=5)
            .map(|step| 1.0 / f64::from(step) / f64::from(id))
            .collect();
        runs.insert_metric(&run_id, "training_loss", &[0, 1, 2, 3, 4], &losses);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Trueno-Runs Query Walkthrough ===\n");

    let runs = Arc::new(MemoryDocumentStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    seed(&runs, &objects);

    let config = LoaderConfig::from_json_str(r#"{"database_name": "demo", "save_concurrency": 2}"#)?;
    let loader = ExperimentLoader::builder(runs, objects).config(config).build()?;

    // -------------------------------------------------------------------------
    // 1. Lookups
    // -------------------------------------------------------------------------
    println!("1. Lookups");
    let exp = loader.find_by_id(2)?;
    println!("   {exp}");
    println!("   config: {}", format_config(&exp, &["epochs", "optimizer"])?);
    println!("   started: {:?}", exp.start_time());
    println!("   latest: {}", loader.find_latest_one()?);
    println!("   sgd runs: {}", loader.find_by_config_key("optimizer", "sgd")?);

    // -------------------------------------------------------------------------
    // 2. Projection
    // -------------------------------------------------------------------------
    println!("\n2. Projection");
    let all = loader.find_all()?;
    let differing: Vec<String> = differing_config_keys(all.iter().map(Arc::as_ref))
        .into_iter()
        .collect();
    println!("   differing config keys: {differing:?}");

    let table = all.project_with(
        [
            ColumnSpec::new("config.epochs"),
            ColumnSpec::new("config.dropout"),
            ColumnSpec::reduced("metrics.training_loss", Reducer::mean()),
        ],
        ProjectOptions::default().on_missing(OnMissing::Ignore),
    )?;
    let batch = table.to_record_batch()?;
    println!("   {} rows x {} columns", batch.num_rows(), batch.num_columns());
    for id in table.index() {
        println!(
            "   exp_id={id} epochs={} dropout={} loss_mean={}",
            table.get(id, "epochs").unwrap_or(&Value::Null),
            table.get(id, "dropout").unwrap_or(&Value::Null),
            table.get(id, "training_loss_mean").unwrap_or(&Value::Null),
        );
    }

    // -------------------------------------------------------------------------
    // 3. Artifacts
    // -------------------------------------------------------------------------
    println!("\n3. Artifacts");
    if let Rendered::Table(predictions) = exp.artifact("predictions")?.render()? {
        println!("   predictions: {} rows", predictions.num_rows());
    }
    let out = std::env::temp_dir().join("trueno-runs-demo");
    let matrices = all.artifacts().filter("confusion_matrix*")?;
    let saved = loader.save_artifacts(&matrices, &out)?;
    println!("   saved {saved} files to {}", out.display());

    // -------------------------------------------------------------------------
    // 4. Delete
    // -------------------------------------------------------------------------
    println!("\n4. Delete");
    exp.delete(&AssumeYes)?;
    match loader.find_by_id(2) {
        Ok(_) => println!("   run 2 still present"),
        Err(e) => println!("   {e}"),
    }
    println!("   remaining: {}", loader.find_all()?);

    Ok(())
}
