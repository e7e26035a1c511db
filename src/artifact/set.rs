//! Flat artifact collections gathered across runs

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::info;

use super::Artifact;
use crate::{Error, Result};

/// Artifacts collected from one or more runs, ready for bulk save.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: Vec<Arc<Artifact>>,
}

impl ArtifactSet {
    /// Create a set from already-resolved artifacts.
    #[must_use]
    pub fn new(artifacts: Vec<Arc<Artifact>>) -> Self {
        Self { artifacts }
    }

    /// Artifact names, in set order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.name()).collect()
    }

    /// Save every artifact into `dir`.
    ///
    /// Saves run on a dedicated pool of at most `concurrency` workers
    /// (`None` lets rayon pick). Completion order is unspecified; the call
    /// returns once all saves finished or the first failure was observed.
    /// Returns the number of artifacts written.
    ///
    /// # Errors
    /// - `InvalidInput` for `Some(0)` workers or a pool that cannot start
    /// - the first IO error raised by an individual save
    pub fn save(&self, dir: impl AsRef<Path>, concurrency: Option<usize>) -> Result<usize> {
        let dir = dir.as_ref();
        if concurrency == Some(0) {
            return Err(Error::InvalidInput(
                "save concurrency must be at least 1".to_string(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(concurrency.unwrap_or(0))
            .thread_name(|i| format!("artifact-save-{i}"))
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to start save pool: {e}")))?;

        pool.install(|| {
            self.artifacts
                .par_iter()
                .try_for_each(|artifact| artifact.save(dir).map(|_| ()))
        })?;

        info!(count = self.artifacts.len(), dir = %dir.display(), "saved artifacts");
        Ok(self.artifacts.len())
    }
}

impl Deref for ArtifactSet {
    type Target = [Arc<Artifact>];

    fn deref(&self) -> &Self::Target {
        &self.artifacts
    }
}

impl FromIterator<Arc<Artifact>> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = Arc<Artifact>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for ArtifactSet {
    type Item = Arc<Artifact>;
    type IntoIter = std::vec::IntoIter<Arc<Artifact>>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.into_iter()
    }
}

impl<'a> IntoIterator for &'a ArtifactSet {
    type Item = &'a Arc<Artifact>;
    type IntoIter = std::slice::Iter<'a, Arc<Artifact>>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.iter()
    }
}
