//! ExperimentLoader - memoized lookups over a run database
//!
//! Every lookup method except [`ExperimentLoader::find_latest`] and the raw
//! [`ExperimentLoader::find`] keeps its own bounded LRU cache keyed by its
//! arguments. Repeated lookups hand back the same `Arc<Experiment>` instances
//! until [`ExperimentLoader::cache_clear`] runs; a confirmed
//! [`Experiment::delete`] triggers that automatically.
//!
//! ```text
//! find_by_id(3) ──▶ by_id cache ──miss──▶ DocumentStore::find_one({_id: 3})
//!                        │                          │
//!                        ◀──────── Arc<Experiment> ─┘
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::debug;

use crate::artifact::ArtifactSet;
use crate::cache::BoundedCache;
use crate::config::LoaderConfig;
use crate::document::{FieldPath, RunId};
use crate::experiment::{CacheInvalidation, Experiment};
use crate::query_set::QuerySet;
use crate::store::{Collection, DocumentStore, Filter, FindOptions, ObjectStore, SortOrder};
use crate::{Error, Result};

/// Default attribute for recency queries.
pub const DEFAULT_SORT_ATTRIBUTE: &str = "start_time";

/// Value searched for by the key-based finders.
///
/// Strings are regular expressions (a partial match is enough); numbers are
/// matched exactly.
#[derive(Debug, Clone)]
pub enum SearchValue {
    /// Regex matched against string fields
    Pattern(String),
    /// Exact integer match
    Int(i64),
    /// Exact float match
    Float(f64),
}

impl SearchValue {
    fn to_filter(&self, path: FieldPath) -> Result<Filter> {
        match self {
            Self::Pattern(pattern) => Filter::regex(path, pattern),
            Self::Int(i) => Ok(Filter::eq(path, *i)),
            Self::Float(f) if f.is_finite() => Ok(Filter::eq(path, *f)),
            Self::Float(f) => Err(Error::InvalidInput(format!(
                "cannot search {path} for non-finite value {f}"
            ))),
        }
    }
}

impl PartialEq for SearchValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Pattern(a), Self::Pattern(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for SearchValue {}

impl Hash for SearchValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Pattern(p) => p.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
        }
    }
}

impl From<&str> for SearchValue {
    fn from(pattern: &str) -> Self {
        Self::Pattern(pattern.to_string())
    }
}

impl From<String> for SearchValue {
    fn from(pattern: String) -> Self {
        Self::Pattern(pattern)
    }
}

impl From<i64> for SearchValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for SearchValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for SearchValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Result of [`ExperimentLoader::find_latest`].
#[derive(Debug, Clone)]
pub enum Latest {
    /// `n == 1`: the single most recent experiment
    One(Arc<Experiment>),
    /// `n > 1`: most recent first
    Many(QuerySet),
}

impl Latest {
    /// Collapse into a query set.
    #[must_use]
    pub fn into_query_set(self) -> QuerySet {
        match self {
            Self::One(exp) => QuerySet::new(vec![exp]),
            Self::Many(set) => set,
        }
    }

    /// The single experiment, if this is [`Latest::One`].
    #[must_use]
    pub fn one(self) -> Option<Arc<Experiment>> {
        match self {
            Self::One(exp) => Some(exp),
            Self::Many(_) => None,
        }
    }
}

type SearchKey = (String, SearchValue);

struct LoaderInner {
    database: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    config: LoaderConfig,
    by_id: BoundedCache<RunId, Arc<Experiment>>,
    by_name: BoundedCache<String, QuerySet>,
    by_key: BoundedCache<SearchKey, QuerySet>,
    by_config_key: BoundedCache<SearchKey, QuerySet>,
    all: BoundedCache<(), QuerySet>,
}

impl CacheInvalidation for LoaderInner {
    fn cache_clear(&self) {
        self.by_id.clear();
        self.by_name.clear();
        self.by_key.clear();
        self.by_config_key.clear();
        self.all.clear();
        debug!(database = %self.config.database_name, "loader caches cleared");
    }
}

/// Loads experiments from a document store and an object store.
///
/// Cheap to clone; clones share caches.
#[derive(Clone)]
pub struct ExperimentLoader {
    inner: Arc<LoaderInner>,
}

impl ExperimentLoader {
    /// Start building a loader over the given stores.
    #[must_use]
    pub fn builder(
        database: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> ExperimentLoaderBuilder {
        ExperimentLoaderBuilder {
            database,
            objects,
            config: LoaderConfig::default(),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Find one experiment by id. Memoized.
    ///
    /// # Errors
    /// `ExperimentNotFound` naming the id and database; store failures.
    pub fn find_by_id(&self, id: impl Into<RunId>) -> Result<Arc<Experiment>> {
        let id = id.into();
        self.inner.by_id.get_or_try_insert_with(id.clone(), || {
            let record = self
                .inner
                .database
                .find_one(Collection::Runs, &Filter::eq("_id", id.to_value()))?
                .ok_or_else(|| Error::ExperimentNotFound {
                    id: id.to_string(),
                    database: self.inner.config.database_name.clone(),
                })?;
            self.make_experiment(record).map(Arc::new)
        })
    }

    /// Find several experiments by id, preserving order. Uses the per-id cache.
    ///
    /// # Errors
    /// The first `ExperimentNotFound` encountered.
    pub fn find_by_ids<I, T>(&self, ids: I) -> Result<QuerySet>
    where
        I: IntoIterator<Item = T>,
        T: Into<RunId>,
    {
        ids.into_iter().map(|id| self.find_by_id(id)).collect()
    }

    /// Experiments whose `experiment.name` matches the regex `name`. Memoized.
    ///
    /// # Errors
    /// `InvalidQuery` for a malformed regex; store failures.
    pub fn find_by_name(&self, name: &str) -> Result<QuerySet> {
        self.inner.by_name.get_or_try_insert_with(name.to_string(), || {
            self.search(FieldPath::from(["experiment", "name"]), &SearchValue::from(name))
        })
    }

    /// Experiments whose field at `key` matches `value`. Memoized.
    ///
    /// # Errors
    /// `InvalidQuery` for a malformed regex; store failures.
    pub fn find_by_key(&self, key: &str, value: impl Into<SearchValue>) -> Result<QuerySet> {
        let value = value.into();
        self.inner
            .by_key
            .get_or_try_insert_with((key.to_string(), value.clone()), || {
                self.search(FieldPath::from(key), &value)
            })
    }

    /// Like [`ExperimentLoader::find_by_key`], scoped under `config.`. Memoized.
    ///
    /// # Errors
    /// `InvalidQuery` for a malformed regex; store failures.
    pub fn find_by_config_key(&self, key: &str, value: impl Into<SearchValue>) -> Result<QuerySet> {
        let value = value.into();
        self.inner
            .by_config_key
            .get_or_try_insert_with((key.to_string(), value.clone()), || {
                self.search(FieldPath::from(format!("config.{key}")), &value)
            })
    }

    /// Every stored experiment, in store order. Memoized.
    ///
    /// # Errors
    /// Store failures.
    pub fn find_all(&self) -> Result<QuerySet> {
        self.inner
            .all
            .get_or_try_insert_with((), || self.find(&Filter::All))
    }

    /// The `n` most recent experiments by `sort_attribute`, newest first.
    ///
    /// Never memoized. Returns [`Latest::One`] for `n == 1`.
    ///
    /// # Errors
    /// `InvalidInput` for `n == 0`; `NoExperiments` when the store is empty.
    pub fn find_latest(&self, n: usize, sort_attribute: &str) -> Result<Latest> {
        if n == 0 {
            return Err(Error::InvalidInput("n must be at least 1".to_string()));
        }
        let options = FindOptions::new()
            .sort(sort_attribute, SortOrder::Descending)
            .limit(n);
        let mut experiments: Vec<Arc<Experiment>> = self
            .inner
            .database
            .find(Collection::Runs, &Filter::All, &options)?
            .into_iter()
            .map(|record| self.make_experiment(record).map(Arc::new))
            .collect::<Result<_>>()?;

        if experiments.is_empty() {
            return Err(Error::NoExperiments {
                database: self.inner.config.database_name.clone(),
            });
        }
        Ok(if n == 1 {
            Latest::One(experiments.swap_remove(0))
        } else {
            Latest::Many(QuerySet::new(experiments))
        })
    }

    /// The most recently started experiment.
    ///
    /// # Errors
    /// `NoExperiments` when the store is empty.
    pub fn find_latest_one(&self) -> Result<Arc<Experiment>> {
        match self.find_latest(1, DEFAULT_SORT_ATTRIBUTE)? {
            Latest::One(exp) => Ok(exp),
            Latest::Many(set) => set.first().cloned().ok_or_else(|| Error::NoExperiments {
                database: self.inner.config.database_name.clone(),
            }),
        }
    }

    /// Raw query pass-through. Never memoized.
    ///
    /// # Errors
    /// Store failures.
    pub fn find(&self, filter: &Filter) -> Result<QuerySet> {
        self.inner
            .database
            .find(Collection::Runs, filter, &FindOptions::new())?
            .into_iter()
            .map(|record| self.make_experiment(record).map(Arc::new))
            .collect()
    }

    /// Raw query pass-through with a Mongo-style query document.
    ///
    /// # Errors
    /// `InvalidQuery` for a malformed document; store failures.
    pub fn find_json(&self, query: &Value) -> Result<QuerySet> {
        self.find(&Filter::from_json(query)?)
    }

    /// Save `artifacts` into `dir` using the configured `save_concurrency`.
    ///
    /// # Errors
    /// Same as [`ArtifactSet::save`].
    pub fn save_artifacts(&self, artifacts: &ArtifactSet, dir: impl AsRef<Path>) -> Result<usize> {
        artifacts.save(dir, self.inner.config.save_concurrency)
    }

    /// Drop every memoized lookup result.
    ///
    /// Experiments handed out earlier keep working with their already-loaded state.
    pub fn cache_clear(&self) {
        self.inner.cache_clear();
    }

    fn search(&self, path: FieldPath, value: &SearchValue) -> Result<QuerySet> {
        self.find(&value.to_filter(path)?)
    }

    fn make_experiment(&self, record: Value) -> Result<Experiment> {
        let weak = Arc::downgrade(&self.inner);
        let invalidator: Weak<dyn CacheInvalidation> = weak;
        Experiment::from_record(
            record,
            Arc::clone(&self.inner.database),
            Arc::clone(&self.inner.objects),
            Some(invalidator),
        )
    }
}

impl fmt::Debug for ExperimentLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentLoader")
            .field("config", &self.inner.config)
            .field("cached_ids", &self.inner.by_id.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ExperimentLoader`].
pub struct ExperimentLoaderBuilder {
    database: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    config: LoaderConfig,
}

impl ExperimentLoaderBuilder {
    /// Database name reported in not-found errors.
    #[must_use]
    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.config.database_name = name.into();
        self
    }

    /// Entries kept per memoized lookup method.
    #[must_use]
    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the loader.
    ///
    /// # Errors
    /// `InvalidInput` for a configuration rejected by [`LoaderConfig::validate`].
    pub fn build(self) -> Result<ExperimentLoader> {
        self.config.validate()?;
        let capacity = self.config.capacity()?;
        Ok(ExperimentLoader {
            inner: Arc::new(LoaderInner {
                database: self.database,
                objects: self.objects,
                by_id: BoundedCache::new("find_by_id", capacity),
                by_name: BoundedCache::new("find_by_name", capacity),
                by_key: BoundedCache::new("find_by_key", capacity),
                by_config_key: BoundedCache::new("find_by_config_key", capacity),
                all: BoundedCache::new("find_all", capacity),
                config: self.config,
            }),
        })
    }
}
