//! Error types for trueno-runs
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// trueno-runs error types
#[derive(Error, Debug)]
pub enum Error {
    /// No run document carries the requested id
    #[error("Experiment with id {id} does not exist in database \"{database}\".")]
    ExperimentNotFound {
        /// Requested experiment id
        id: String,
        /// Name of the database that was searched
        database: String,
    },

    /// A path segment could not be resolved against a run
    #[error("Missing field: {path}")]
    MissingField {
        /// Dot-joined path up to and including the missing segment
        path: String,
    },

    /// Re-interpretation requested for a content-type without an artifact kind
    #[error("No artifact kind maps to content-type {0}")]
    NoContentTypeMapping(String),

    /// The artifact kind has no render behavior (usage error, not transient)
    #[error("{kind} does not support rendering; use save() instead")]
    UnsupportedRender {
        /// Artifact kind that was asked to render
        kind: String,
    },

    /// Run documents are snapshots and cannot be written to
    #[error("Experiment records are immutable: cannot assign field `{field}`")]
    ImmutableRecord {
        /// Field that was written to
        field: String,
    },

    /// Recency query against a store without runs
    #[error("No experiments stored in database \"{database}\"")]
    NoExperiments {
        /// Name of the database that was searched
        database: String,
    },

    /// Malformed query document or regex
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid caller input (glob pattern, capacity, worker count)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl Error {
    /// Whether this error reports an expected absence (id or field not found).
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ExperimentNotFound { .. } | Self::MissingField { .. }
        )
    }
}
