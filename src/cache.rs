//! Bounded memoization for loader lookups.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::Result;

/// Thread-safe LRU map from lookup arguments to results.
///
/// Least-recently-used entries are evicted beyond `capacity`. Values are
/// cloned out, so cached results should be cheap handles (`Arc`, `QuerySet`).
pub struct BoundedCache<K: Hash + Eq, V> {
    name: &'static str,
    entries: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries. `name` tags log lines.
    #[must_use]
    pub fn new(name: &'static str, capacity: NonZeroUsize) -> Self {
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, V>> {
        // Entries stay consistent even if a holder panicked
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached value for `key`, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    /// Insert or replace a value.
    pub fn insert(&self, key: K, value: V) {
        self.lock().put(key, value);
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// `compute` runs without holding the lock; failures are not cached.
    ///
    /// # Errors
    /// Whatever `compute` returns.
    pub fn get_or_try_insert_with<F>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(hit) = self.get(&key) {
            debug!(cache = self.name, "cache hit");
            return Ok(hit);
        }
        debug!(cache = self.name, "cache miss");
        let value = compute()?;
        let mut entries = self.lock();
        // A concurrent miss may have filled the slot first; keep that one
        if let Some(existing) = entries.get(&key) {
            return Ok(existing.clone());
        }
        entries.put(key, value.clone());
        Ok(value)
    }

    /// Drop one entry.
    pub fn invalidate(&self, key: &K) {
        self.lock().pop(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }
}

impl<K: Hash + Eq, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache").field("name", &self.name).finish_non_exhaustive()
    }
}
