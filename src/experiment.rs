//! Experiment - lazily populated view over one run document
//!
//! An [`Experiment`] wraps a frozen run [`Document`]. Record fields are read
//! through dotted paths; artifacts and metrics are fetched from the stores on
//! first access and kept for the lifetime of the instance, independently of
//! the loader's caches.
//!
//! Deleting an experiment while another thread reads its artifacts or
//! metrics is not synchronized: readers may observe a half-deleted run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::confirm::Confirmation;
use crate::document::{Document, FieldPath, RunId};
use crate::metric::MetricSeries;
use crate::store::{Collection, DocumentStore, FileRef, Filter, FindOptions, ObjectStore};
use crate::{Error, Result};

/// Receives the "store changed" signal after a successful delete.
pub trait CacheInvalidation: Send + Sync {
    /// Drop every memoized lookup result.
    fn cache_clear(&self);
}

/// Link from a run document to a stored artifact payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLink {
    /// Artifact name within the run
    pub name: String,
    /// Object-store reference
    pub file_ref: FileRef,
    /// Content-type recorded on the link, if any
    pub content_type: Option<String>,
}

impl ArtifactLink {
    /// Parse a link entry (`name`, `file_id`, optional `content_type`).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            name: value.get("name")?.as_str()?.to_string(),
            file_ref: FileRef::from_value(value.get("file_id")?)?,
            content_type: value
                .get("content_type")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// One experiment run.
pub struct Experiment {
    id: RunId,
    record: Document,
    artifact_links: Vec<ArtifactLink>,
    database: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    invalidator: Option<Weak<dyn CacheInvalidation>>,
    artifacts: OnceLock<BTreeMap<String, Arc<Artifact>>>,
    metrics: OnceLock<BTreeMap<String, MetricSeries>>,
}

impl Experiment {
    /// Wrap a raw run document.
    ///
    /// `invalidator` is told to clear its caches after a successful delete.
    ///
    /// # Errors
    /// `MissingField` if the document has no usable `_id`.
    pub fn from_record(
        record: Value,
        database: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        invalidator: Option<Weak<dyn CacheInvalidation>>,
    ) -> Result<Self> {
        let id = record
            .get("_id")
            .and_then(RunId::from_value)
            .ok_or_else(|| Error::MissingField {
                path: "_id".to_string(),
            })?;

        let artifact_links = record
            .get("artifacts")
            .and_then(Value::as_array)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|link| {
                        let parsed = ArtifactLink::from_value(link);
                        if parsed.is_none() {
                            warn!(run = %id, link = %link, "skipping malformed artifact link");
                        }
                        parsed
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id,
            record: Document::new(record),
            artifact_links,
            database,
            objects,
            invalidator,
            artifacts: OnceLock::new(),
            metrics: OnceLock::new(),
        })
    }

    /// Run id.
    #[must_use]
    pub const fn id(&self) -> &RunId {
        &self.id
    }

    /// The frozen run document.
    #[must_use]
    pub const fn record(&self) -> &Document {
        &self.record
    }

    /// Record value at a dotted path, `None` if absent.
    #[must_use]
    pub fn get(&self, path: impl Into<FieldPath>) -> Option<&Value> {
        self.record.get(&path.into())
    }

    /// Record value at a dotted path.
    ///
    /// # Errors
    /// `MissingField` naming the first absent segment.
    pub fn field(&self, path: impl Into<FieldPath>) -> Result<&Value> {
        self.record.field(&path.into())
    }

    /// Top-level record keys.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.record.keys()
    }

    /// Experiment name (`experiment.name`).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get(["experiment", "name"]).and_then(Value::as_str)
    }

    /// Run configuration.
    #[must_use]
    pub fn config(&self) -> Option<&Value> {
        self.get(["config"])
    }

    /// Run result.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.get(["result"])
    }

    /// Start timestamp, parsed from an RFC 3339 `start_time`.
    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.get(["start_time"])
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Field writes are rejected; see [`Document::set`].
    ///
    /// # Errors
    /// Always returns [`Error::ImmutableRecord`].
    pub fn set_field(&self, field: &str, value: Value) -> Result<()> {
        self.record.set(field, value)
    }

    /// Plain mutable copy of the run document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        self.record.to_value()
    }

    /// Artifact links recorded on the run.
    #[must_use]
    pub fn artifact_links(&self) -> &[ArtifactLink] {
        &self.artifact_links
    }

    /// Artifacts by name, fetched from the object store on first access.
    ///
    /// # Errors
    /// Object-store failures while opening a payload.
    pub fn artifacts(&self) -> Result<&BTreeMap<String, Arc<Artifact>>> {
        if let Some(artifacts) = self.artifacts.get() {
            return Ok(artifacts);
        }
        let loaded = self.load_artifacts()?;
        Ok(self.artifacts.get_or_init(|| loaded))
    }

    /// One artifact by name.
    ///
    /// # Errors
    /// `MissingField` if the run has no such artifact, or object-store failures.
    pub fn artifact(&self, name: &str) -> Result<&Arc<Artifact>> {
        self.artifacts()?.get(name).ok_or_else(|| Error::MissingField {
            path: format!("artifacts.{name}"),
        })
    }

    fn load_artifacts(&self) -> Result<BTreeMap<String, Arc<Artifact>>> {
        let mut artifacts = BTreeMap::new();
        for link in &self.artifact_links {
            let stream = self.objects.get(&link.file_ref)?;
            let content_type = link
                .content_type
                .clone()
                .or_else(|| stream.content_type().map(str::to_string));
            let artifact =
                Artifact::from_content_type(link.name.clone(), stream, content_type.as_deref());
            artifacts.insert(link.name.clone(), Arc::new(artifact));
        }
        debug!(run = %self.id, count = artifacts.len(), "loaded artifacts");
        Ok(artifacts)
    }

    /// Metric series by name, queried from the metrics collection on first access.
    ///
    /// # Errors
    /// Document-store failures.
    pub fn metrics(&self) -> Result<&BTreeMap<String, MetricSeries>> {
        if let Some(metrics) = self.metrics.get() {
            return Ok(metrics);
        }
        let loaded = self.load_metrics()?;
        Ok(self.metrics.get_or_init(|| loaded))
    }

    /// One metric series by name.
    ///
    /// # Errors
    /// `MissingField` if the run logged no such metric, or store failures.
    pub fn metric(&self, name: &str) -> Result<&MetricSeries> {
        self.metrics()?.get(name).ok_or_else(|| Error::MissingField {
            path: format!("metrics.{name}"),
        })
    }

    fn load_metrics(&self) -> Result<BTreeMap<String, MetricSeries>> {
        let docs = self.database.find(
            Collection::Metrics,
            &self.metrics_filter(),
            &FindOptions::new(),
        )?;
        let metrics: BTreeMap<String, MetricSeries> = docs
            .iter()
            .filter_map(MetricSeries::from_document)
            .map(|series| (series.name().to_string(), series))
            .collect();
        debug!(run = %self.id, count = metrics.len(), "loaded metrics");
        Ok(metrics)
    }

    fn metrics_filter(&self) -> Filter {
        Filter::eq("run_id", self.id.to_value())
    }

    /// Delete the run together with its artifacts and metrics.
    ///
    /// Asks `confirmation` first; on refusal nothing is touched and
    /// `Ok(false)` is returned. After deleting, the owning loader's caches
    /// are cleared so that a later lookup of this id fails.
    ///
    /// # Errors
    /// Store failures; deletion stops at the first one.
    pub fn delete<C>(&self, confirmation: &C) -> Result<bool>
    where
        C: Confirmation + ?Sized,
    {
        if !confirmation.confirm(&format!("Are you sure you want to delete {self}?")) {
            warn!(run = %self.id, "deletion declined");
            return Ok(false);
        }

        for link in &self.artifact_links {
            self.objects.delete(&link.file_ref)?;
        }
        self.database
            .delete_many(Collection::Metrics, &self.metrics_filter())?;
        self.database
            .delete_one(Collection::Runs, &Filter::eq("_id", self.id.to_value()))?;

        if let Some(loader) = self.invalidator.as_ref().and_then(Weak::upgrade) {
            loader.cache_clear();
        }
        info!(run = %self.id, artifacts = self.artifact_links.len(), "deleted experiment");
        Ok(true)
    }
}

impl fmt::Display for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Experiment(id={}, name={})",
            self.id,
            self.name().unwrap_or("None")
        )
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("id", &self.id)
            .field("record", self.record.as_value())
            .field("artifacts_loaded", &self.artifacts.get().is_some())
            .field("metrics_loaded", &self.metrics.get().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{AssumeNo, AssumeYes};
    use crate::store::{MemoryDocumentStore, MemoryObjectStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingInvalidation(AtomicUsize);

    impl CacheInvalidation for CountingInvalidation {
        fn cache_clear(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        db: Arc<MemoryDocumentStore>,
        objects: Arc<MemoryObjectStore>,
        record: Value,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(MemoryDocumentStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let png = objects.put("artifact://runs/2/confusion_matrix", Some("image/png"), vec![1, 2, 3]);
        let csv = objects.put("artifact://runs/2/predictions", None, b"a,b\n1,2\n".to_vec());
        let record = json!({
            "_id": 2,
            "experiment": {"name": "example", "mainfile": "conduct.py"},
            "config": {"epochs": 3, "optimizer": "sgd"},
            "start_time": "2024-05-01T12:30:00+00:00",
            "result": 0.91,
            "artifacts": [
                {"name": "confusion_matrix", "file_id": png.as_str()},
                {"name": "predictions", "file_id": csv.as_str(), "content_type": "text/csv"},
                {"name": "broken"}
            ]
        });
        db.insert_run(record.clone());
        db.insert_metric(&RunId::Int(2), "training_loss", &[0, 1, 2], &[0.9, 0.5, 0.2]);
        db.insert_metric(&RunId::Int(2), "training_acc", &[0, 1, 2], &[0.3, 0.6, 0.8]);
        db.insert_metric(&RunId::Int(9), "training_loss", &[0], &[1.0]);
        Fixture { db, objects, record }
    }

    fn experiment(f: &Fixture, invalidator: Option<Weak<dyn CacheInvalidation>>) -> Experiment {
        Experiment::from_record(f.record.clone(), f.db.clone(), f.objects.clone(), invalidator)
            .unwrap()
    }

    #[test]
    fn test_field_access() {
        let f = fixture();
        let exp = experiment(&f, None);
        assert_eq!(exp.id(), &RunId::Int(2));
        assert_eq!(exp.name(), Some("example"));
        assert_eq!(exp.get("config.epochs"), Some(&json!(3)));
        assert_eq!(exp.field("experiment.mainfile").unwrap(), &json!("conduct.py"));
        assert_eq!(exp.config().unwrap()["optimizer"], json!("sgd"));
        assert_eq!(exp.result(), Some(&json!(0.91)));
        assert!(exp.start_time().is_some());
        assert!(matches!(exp.field("config.missing"), Err(Error::MissingField { .. })));
        assert_eq!(exp.to_string(), "Experiment(id=2, name=example)");
    }

    #[test]
    fn test_record_is_immutable_and_to_value_is_a_copy() {
        let f = fixture();
        let exp = experiment(&f, None);
        assert!(matches!(
            exp.set_field("result", json!(0.0)),
            Err(Error::ImmutableRecord { .. })
        ));
        let mut copy = exp.to_value();
        copy["result"] = json!(0.0);
        assert_eq!(exp.result(), Some(&json!(0.91)));
        assert_eq!(exp.keys().len(), copy.as_object().unwrap().len());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let f = fixture();
        let result = Experiment::from_record(json!({"config": {}}), f.db, f.objects, None);
        assert!(matches!(result, Err(Error::MissingField { ref path }) if path == "_id"));
    }

    #[test]
    fn test_artifacts_resolved_lazily_with_registry() {
        let f = fixture();
        let exp = experiment(&f, None);
        assert_eq!(exp.artifact_links().len(), 2);

        let artifacts = exp.artifacts().unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts["confusion_matrix"].kind(), crate::ArtifactKind::Image);
        assert_eq!(artifacts["predictions"].kind(), crate::ArtifactKind::Csv);

        // Cached: same instances on second access
        let again = exp.artifact("confusion_matrix").unwrap();
        assert!(Arc::ptr_eq(again, &artifacts["confusion_matrix"]));
        assert!(matches!(exp.artifact("nope"), Err(Error::MissingField { .. })));
    }

    #[test]
    fn test_metrics_filtered_by_run() {
        let f = fixture();
        let exp = experiment(&f, None);
        let metrics = exp.metrics().unwrap();
        assert_eq!(metrics.len(), 2);
        let loss = exp.metric("training_loss").unwrap();
        assert_eq!(loss.steps(), &[0, 1, 2]);
        assert_eq!(loss.name(), "training_loss");
        assert!(exp.metric("test_loss").is_err());
    }

    #[test]
    fn test_delete_declined_touches_nothing() {
        let f = fixture();
        let exp = experiment(&f, None);
        assert!(!exp.delete(&AssumeNo).unwrap());
        assert_eq!(f.db.count(Collection::Runs), 1);
        assert_eq!(f.db.count(Collection::Metrics), 3);
        assert_eq!(f.objects.len(), 2);
    }

    #[test]
    fn test_delete_removes_everything_and_invalidates() {
        let f = fixture();
        let counter = Arc::new(CountingInvalidation(AtomicUsize::new(0)));
        let weak: Weak<dyn CacheInvalidation> = Arc::downgrade(&counter) as Weak<dyn CacheInvalidation>;
        let exp = experiment(&f, Some(weak));

        assert!(exp.delete(&AssumeYes).unwrap());
        assert_eq!(f.db.count(Collection::Runs), 0);
        // Only the other run's metric survives
        assert_eq!(f.db.count(Collection::Metrics), 1);
        assert!(f.objects.is_empty());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
