//! Frozen run documents and dotted-path addressing
//!
//! Run documents are nested key-value trees owned by the document store.
//! [`Document`] is a read-only snapshot of one of them: it can be read by
//! dotted path, copied out as a plain mutable [`serde_json::Value`], but
//! never written to in place.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Identifier of a run document (`_id`).
///
/// Stores assign integer ids by default; opaque string ids are also accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunId {
    /// Integer id (the common case)
    Int(i64),
    /// Opaque string id
    Text(String),
}

impl RunId {
    /// Read an id from a JSON value. Floats and nested values are not ids.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// JSON representation used in store filters.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RunId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<i32> for RunId {
    fn from(id: i32) -> Self {
        Self::Int(i64::from(id))
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for RunId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

/// A path into a run document, one segment per nesting level.
///
/// Built from a string it is split on `.`; built from a slice or array the
/// segments are taken literally, which allows keys that contain dots.
///
/// ```rust
/// use trueno_runs::FieldPath;
///
/// let dotted = FieldPath::from("config.optimizer.lr");
/// assert_eq!(dotted.segments(), ["config", "optimizer", "lr"]);
///
/// let literal = FieldPath::from(["artifacts", "model.pt"]);
/// assert_eq!(literal.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Create a path from explicit segments.
    #[must_use]
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Path segments in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final segment, if any.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the path has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments joined with `.`.
    #[must_use]
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }

    /// Dot-joined prefix of the first `n` segments, used in error messages.
    pub(crate) fn prefix(&self, n: usize) -> String {
        self.segments[..n.min(self.segments.len())].join(".")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::new(path.split('.'))
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        Self::from(path.as_str())
    }
}

impl From<&[&str]> for FieldPath {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for FieldPath {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

impl From<Vec<String>> for FieldPath {
    fn from(segments: Vec<String>) -> Self {
        Self { segments }
    }
}

/// Walk `segments` down from `root`, one mapping key or array index per step.
///
/// On failure returns the index of the first segment that could not be resolved.
pub(crate) fn walk<'a>(root: &'a Value, segments: &[String]) -> std::result::Result<&'a Value, usize> {
    let mut current = root;
    for (depth, segment) in segments.iter().enumerate() {
        current = step(current, segment).ok_or(depth)?;
    }
    Ok(current)
}

/// Resolve one segment against a JSON value (mapping key, then array index).
pub(crate) fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Read-only snapshot of a run document.
///
/// Cloning is cheap: the tree is shared behind an [`Arc`].
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Arc<Value>,
}

impl Document {
    /// Freeze a JSON tree.
    #[must_use]
    pub fn new(root: Value) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    /// Look up a value by path. Returns `None` if any segment is absent.
    #[must_use]
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        walk(&self.root, path.segments()).ok()
    }

    /// Look up a value by path, failing with [`Error::MissingField`] naming
    /// the first absent segment.
    ///
    /// # Errors
    /// Returns `MissingField` if the path does not resolve.
    pub fn field(&self, path: &FieldPath) -> Result<&Value> {
        walk(&self.root, path.segments()).map_err(|depth| Error::MissingField {
            path: path.prefix(depth + 1),
        })
    }

    /// Top-level keys of the document.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        match self.root.as_ref() {
            Value::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether a top-level key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.root.get(key).is_some()
    }

    /// Borrow the underlying tree.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Fully mutable copy of the document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        self.root.as_ref().clone()
    }

    /// Field writes are rejected: documents are snapshots of store state.
    ///
    /// # Errors
    /// Always returns [`Error::ImmutableRecord`].
    pub fn set(&self, field: &str, _value: Value) -> Result<()> {
        Err(Error::ImmutableRecord {
            field: field.to_string(),
        })
    }
}
