//! Document and object store contracts
//!
//! The loader never talks to a concrete database. It consumes two narrow
//! traits: [`DocumentStore`] for run and metric documents, and
//! [`ObjectStore`] for artifact payloads. Errors raised by an implementation
//! (connectivity, auth) propagate to the caller untouched.
//!
//! ```text
//! runs collection      { _id, config, experiment, start_time, result, info, artifacts: [link] }
//! metrics collection   { run_id, name, steps: [..], values: [..] }
//! object store         file_ref -> bytes (+ filename, content_type)
//! ```
//!
//! [`MemoryDocumentStore`] and [`MemoryObjectStore`] are the in-process
//! reference backends.

mod filter;
mod memory;

pub use filter::{CmpOp, Filter};
pub use memory::{MemoryDocumentStore, MemoryObjectStore};

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Collections a run database exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// One document per run
    Runs,
    /// One document per (run, metric name)
    Metrics,
}

impl Collection {
    /// Collection name as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Runs => "runs",
            Self::Metrics => "metrics",
        }
    }
}

/// Sort order for cursor queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending order (smallest first)
    Ascending,
    /// Descending order (largest first)
    Descending,
}

/// Cursor modifiers for [`DocumentStore::find`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Field to sort on and direction
    pub sort: Option<(String, SortOrder)>,
    /// Maximum number of documents to return
    pub limit: Option<usize>,
}

impl FindOptions {
    /// No sort, no limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort by a dotted field path.
    #[must_use]
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }

    /// Limit the number of returned documents.
    #[must_use]
    pub const fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Minimal document database contract.
pub trait DocumentStore: Send + Sync {
    /// First document matching `filter`, if any.
    ///
    /// # Errors
    /// Backend failures.
    fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Value>>;

    /// All documents matching `filter`, after applying `options`.
    ///
    /// # Errors
    /// Backend failures.
    fn find(&self, collection: Collection, filter: &Filter, options: &FindOptions)
        -> Result<Vec<Value>>;

    /// Delete the first matching document. Returns the number deleted (0 or 1).
    ///
    /// # Errors
    /// Backend failures.
    fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<u64>;

    /// Delete every matching document. Returns the number deleted.
    ///
    /// # Errors
    /// Backend failures.
    fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64>;
}

/// Opaque reference to an object in the [`ObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(String);

impl FileRef {
    /// Wrap a raw reference.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Read a reference out of an artifact link. Non-string ids are rendered as JSON text.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self(s.clone())),
            other => Some(Self(other.to_string())),
        }
    }

    /// Raw reference string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimal binary object store contract.
pub trait ObjectStore: Send + Sync {
    /// Open the object behind `file_ref`.
    ///
    /// # Errors
    /// Missing objects and backend failures.
    fn get(&self, file_ref: &FileRef) -> Result<ObjectStream>;

    /// Remove the object behind `file_ref`.
    ///
    /// # Errors
    /// Backend failures.
    fn delete(&self, file_ref: &FileRef) -> Result<()>;
}

/// Readable, seekable handle over a stored object.
///
/// The payload is shared; each handle keeps its own read position.
/// [`ObjectStream::reopen`] hands out a new handle positioned at the start.
#[derive(Debug)]
pub struct ObjectStream {
    filename: String,
    content_type: Option<String>,
    data: Arc<[u8]>,
    position: u64,
}

impl ObjectStream {
    /// Create a stream over shared bytes.
    #[must_use]
    pub fn new(filename: impl Into<String>, content_type: Option<String>, data: Arc<[u8]>) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            data,
            position: 0,
        }
    }

    /// Stored filename (e.g. `artifact://runs/3/confusion_matrix`).
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Content-type recorded by the store, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fresh handle on the same payload, positioned at the start.
    #[must_use]
    pub fn reopen(&self) -> Self {
        Self {
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            data: Arc::clone(&self.data),
            position: 0,
        }
    }

    fn remaining(&self) -> &[u8] {
        let start = usize::try_from(self.position)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        &self.data[start..]
    }
}

impl Read for ObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = {
            let remaining = self.remaining();
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            n
        };
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for ObjectStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(n) => {
                self.position = n;
                return Ok(n);
            }
            SeekFrom::End(n) => (self.data.len() as u64, n),
            SeekFrom::Current(n) => (self.position, n),
        };
        match base.checked_add_signed(offset) {
            Some(n) => {
                self.position = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
