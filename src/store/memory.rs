//! In-memory store implementations using `DashMap`.
//!
//! These are the reference backends: data is lost on process restart.
//! They follow the same contract a networked database would, including
//! integer `_id` assignment in insertion order.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::debug;

use super::filter::sort_order;
use super::{Collection, DocumentStore, FileRef, FindOptions, ObjectStore, ObjectStream, SortOrder};
use crate::document::{walk, FieldPath, RunId};
use crate::{Error, Result};

/// In-memory document database.
///
/// Thread-safe; documents of each collection are kept in insertion order.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trueno_runs::store::{Collection, DocumentStore, Filter, MemoryDocumentStore};
///
/// # fn main() -> trueno_runs::Result<()> {
/// let db = MemoryDocumentStore::new();
/// let id = db.insert_run(json!({"experiment": {"name": "example"}, "config": {}}));
/// let found = db.find_one(Collection::Runs, &Filter::eq("_id", id.to_value()))?;
/// assert!(found.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<Collection, Vec<Value>>,
    next_id: AtomicI64,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw document to a collection.
    pub fn insert(&self, collection: Collection, doc: Value) {
        self.collections.entry(collection).or_default().push(doc);
    }

    /// Append a run document, assigning the next integer `_id` when absent.
    ///
    /// Ids start at 1.
    pub fn insert_run(&self, mut doc: Value) -> RunId {
        let existing = doc.get("_id").and_then(RunId::from_value);
        let id = existing.unwrap_or_else(|| RunId::Int(self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
        if let RunId::Int(n) = id {
            self.next_id.fetch_max(n, Ordering::SeqCst);
        }
        if let Value::Object(map) = &mut doc {
            map.insert("_id".to_string(), id.to_value());
        }
        self.insert(Collection::Runs, doc);
        id
    }

    /// Append a metric series document for a run.
    pub fn insert_metric(&self, run_id: &RunId, name: &str, steps: &[i64], values: &[f64]) {
        self.insert(
            Collection::Metrics,
            json!({
                "run_id": run_id.to_value(),
                "name": name,
                "steps": steps,
                "values": values,
            }),
        );
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn count(&self, collection: Collection) -> usize {
        self.collections.get(&collection).map_or(0, |docs| docs.len())
    }

    /// Remove every document.
    pub fn clear(&self) {
        self.collections.clear();
        self.next_id.store(0, Ordering::SeqCst);
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn find_one(&self, collection: Collection, filter: &super::Filter) -> Result<Option<Value>> {
        Ok(self
            .collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| filter.matches(d)).cloned()))
    }

    fn find(
        &self,
        collection: Collection,
        filter: &super::Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        let mut found: Vec<Value> = self
            .collections
            .get(&collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();

        if let Some((field, order)) = &options.sort {
            let path = FieldPath::from(field.as_str());
            // Stable sort keeps insertion order among equal keys
            found.sort_by(|a, b| {
                let ordering = sort_order(
                    walk(a, path.segments()).ok(),
                    walk(b, path.segments()).ok(),
                );
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = options.limit {
            found.truncate(limit);
        }

        debug!(collection = collection.as_str(), matched = found.len(), "find");
        Ok(found)
    }

    fn delete_one(&self, collection: Collection, filter: &super::Filter) -> Result<u64> {
        let Some(mut docs) = self.collections.get_mut(&collection) else {
            return Ok(0);
        };
        match docs.iter().position(|d| filter.matches(d)) {
            Some(index) => {
                docs.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn delete_many(&self, collection: Collection, filter: &super::Filter) -> Result<u64> {
        let Some(mut docs) = self.collections.get_mut(&collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !filter.matches(d));
        Ok((before - docs.len()) as u64)
    }
}

#[derive(Debug)]
struct StoredObject {
    filename: String,
    content_type: Option<String>,
    data: Arc<[u8]>,
}

/// In-memory binary object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<FileRef, StoredObject>,
    next_id: AtomicU64,
}

impl MemoryObjectStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload and return its reference.
    pub fn put(
        &self,
        filename: impl Into<String>,
        content_type: Option<&str>,
        data: impl Into<Vec<u8>>,
    ) -> FileRef {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let file_ref = FileRef::new(format!("obj-{id}"));
        self.objects.insert(
            file_ref.clone(),
            StoredObject {
                filename: filename.into(),
                content_type: content_type.map(str::to_string),
                data: Arc::from(data.into()),
            },
        );
        file_ref
    }

    /// Whether a reference resolves to a stored object.
    #[must_use]
    pub fn contains(&self, file_ref: &FileRef) -> bool {
        self.objects.contains_key(file_ref)
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, file_ref: &FileRef) -> Result<ObjectStream> {
        let object = self
            .objects
            .get(file_ref)
            .ok_or_else(|| Error::StorageError(format!("no object stored under {file_ref}")))?;
        Ok(ObjectStream::new(
            object.filename.clone(),
            object.content_type.clone(),
            Arc::clone(&object.data),
        ))
    }

    fn delete(&self, file_ref: &FileRef) -> Result<()> {
        self.objects.remove(file_ref);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Filter;
    use std::io::Read;

    #[test]
    fn test_insert_run_assigns_sequential_ids() {
        let db = MemoryDocumentStore::new();
        assert_eq!(db.insert_run(json!({})), RunId::Int(1));
        assert_eq!(db.insert_run(json!({})), RunId::Int(2));
        assert_eq!(db.insert_run(json!({"_id": 10})), RunId::Int(10));
        assert_eq!(db.insert_run(json!({})), RunId::Int(11));
        assert_eq!(db.count(Collection::Runs), 4);
    }

    #[test]
    fn test_find_sort_and_limit() {
        let db = MemoryDocumentStore::new();
        for (i, t) in ["2024-01-01", "2024-03-01", "2024-02-01"].iter().enumerate() {
            db.insert_run(json!({"start_time": t, "n": i}));
        }
        let opts = FindOptions::new()
            .sort("start_time", SortOrder::Descending)
            .limit(2);
        let docs = db.find(Collection::Runs, &Filter::All, &opts).unwrap();
        let times: Vec<&str> = docs.iter().filter_map(|d| d["start_time"].as_str()).collect();
        assert_eq!(times, ["2024-03-01", "2024-02-01"]);
    }

    #[test]
    fn test_delete_one_and_many() {
        let db = MemoryDocumentStore::new();
        let id = db.insert_run(json!({}));
        db.insert_metric(&id, "loss", &[0, 1], &[0.5, 0.4]);
        db.insert_metric(&id, "acc", &[0, 1], &[0.1, 0.2]);

        let by_run = Filter::eq("run_id", id.to_value());
        assert_eq!(db.delete_many(Collection::Metrics, &by_run).unwrap(), 2);
        assert_eq!(db.count(Collection::Metrics), 0);

        let by_id = Filter::eq("_id", id.to_value());
        assert_eq!(db.delete_one(Collection::Runs, &by_id).unwrap(), 1);
        assert_eq!(db.delete_one(Collection::Runs, &by_id).unwrap(), 0);
    }

    #[test]
    fn test_empty_collection_queries() {
        let db = MemoryDocumentStore::new();
        assert!(db.find_one(Collection::Runs, &Filter::All).unwrap().is_none());
        assert!(db
            .find(Collection::Metrics, &Filter::All, &FindOptions::new())
            .unwrap()
            .is_empty());
        assert_eq!(db.delete_many(Collection::Runs, &Filter::All).unwrap(), 0);
    }

    #[test]
    fn test_object_store_roundtrip_and_delete() {
        let objects = MemoryObjectStore::new();
        let file_ref = objects.put("artifact://runs/1/notes", Some("text/plain"), b"hi".to_vec());
        assert!(objects.contains(&file_ref));

        let mut stream = objects.get(&file_ref).unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hi");
        assert_eq!(stream.content_type(), Some("text/plain"));

        objects.delete(&file_ref).unwrap();
        assert!(objects.is_empty());
        assert!(matches!(objects.get(&file_ref), Err(Error::StorageError(_))));
    }
}
