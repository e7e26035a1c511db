//! # Trueno-Runs: Query Layer for Experiment-Tracking Runs
//!
//! **Version**: 0.1.0
//!
//! Trueno-Runs loads experiment runs from a document database plus an
//! artifact object store and exposes them as typed, lazily populated
//! objects: configuration, metric series and binary artifacts. Collections
//! of runs can be projected into rectangular tables, exported to Arrow or
//! Parquet, and deleted in bulk behind a confirmation policy.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Muda elimination**: Lookups are memoized in bounded LRU caches
//! - **Poka-Yoke safety**: Run documents are frozen snapshots; writes fail
//! - **Genchi Genbutsu**: Artifacts are typed by their recorded content-type
//! - **Jidoka**: Deletes stop at the first store failure and clear caches on success
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use trueno_runs::store::{MemoryDocumentStore, MemoryObjectStore};
//! use trueno_runs::{ColumnSpec, ExperimentLoader, Reducer};
//!
//! let runs = Arc::new(MemoryDocumentStore::new());
//! let id = runs.insert_run(json!({
//!     "experiment": {"name": "example"},
//!     "config": {"epochs": 3, "optimizer": "sgd"}
//! }));
//! runs.insert_metric(&id, "training_loss", &[0, 1, 2], &[0.9, 0.5, 0.1]);
//!
//! let loader = ExperimentLoader::builder(runs, Arc::new(MemoryObjectStore::new())).build()?;
//! let table = loader.find_by_name("exa")?.project([
//!     ColumnSpec::new("config.optimizer"),
//!     ColumnSpec::reduced("metrics.training_loss", Reducer::mean()),
//! ])?;
//! assert_eq!(table.column_names(), vec!["optimizer", "training_loss_mean"]);
//! # Ok::<(), trueno_runs::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod cache;
pub mod config;
pub mod confirm;
pub mod document;
pub mod error;
pub mod experiment;
pub mod loader;
pub mod metric;
pub mod projection;
pub mod query_set;
pub mod store;
pub mod utils;

pub use artifact::{Artifact, ArtifactKind, ArtifactSet, Rendered};
pub use config::LoaderConfig;
pub use confirm::{AssumeNo, AssumeYes, Confirmation, Prompt};
pub use document::{Document, FieldPath, RunId};
pub use error::{Error, Result};
pub use experiment::Experiment;
pub use loader::{ExperimentLoader, Latest, SearchValue};
pub use metric::MetricSeries;
pub use projection::{ColumnSpec, OnMissing, ProjectOptions, Projection, Reducer, Rename};
pub use query_set::{DeleteOutcome, QuerySet};
