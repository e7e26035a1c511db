//! QuerySet - ordered collection of experiments returned by the loader

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use globset::{Glob, GlobMatcher};
use tracing::{info, warn};

use crate::artifact::ArtifactSet;
use crate::confirm::Confirmation;
use crate::experiment::Experiment;
use crate::projection::{ColumnSpec, ProjectOptions, Projection};
use crate::{Error, Result};

/// Result of a bulk delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Confirmed; this many experiments were removed
    Deleted(usize),
    /// Declined; nothing was touched
    Aborted,
}

/// Ordered experiments. Duplicates are allowed.
///
/// Cloning is cheap: experiments are shared handles, so a clone of a cached
/// query result keeps pointing at the same instances.
#[derive(Debug, Clone, Default)]
pub struct QuerySet {
    experiments: Vec<Arc<Experiment>>,
}

impl QuerySet {
    /// Wrap experiments in query order.
    #[must_use]
    pub const fn new(experiments: Vec<Arc<Experiment>>) -> Self {
        Self { experiments }
    }

    /// Project with default options (`Rename::Last`, `OnMissing::Raise`).
    ///
    /// # Errors
    /// `MissingField` on the first absent path segment; store failures while
    /// resolving metrics or artifacts.
    pub fn project<I, S>(&self, on: I) -> Result<Projection>
    where
        I: IntoIterator<Item = S>,
        S: Into<ColumnSpec>,
    {
        self.project_with(on, ProjectOptions::default())
    }

    /// Project into a table: one row per experiment, one column per spec.
    ///
    /// # Errors
    /// `MissingField` under `OnMissing::Raise`; store failures.
    pub fn project_with<I, S>(&self, on: I, options: ProjectOptions) -> Result<Projection>
    where
        I: IntoIterator<Item = S>,
        S: Into<ColumnSpec>,
    {
        let specs: Vec<ColumnSpec> = on.into_iter().map(Into::into).collect();
        Projection::build(&self.experiments, &specs, options)
    }

    /// Delete every experiment after a single confirmation, then empty the set.
    ///
    /// # Errors
    /// Store failures; experiments deleted before the failure stay deleted and
    /// the set is left unchanged.
    pub fn delete<C>(&mut self, confirmation: &C) -> Result<DeleteOutcome>
    where
        C: Confirmation + ?Sized,
    {
        if !confirmation.confirm(&format!("Are you sure you want to delete {self}?")) {
            warn!("Deletion aborted");
            return Ok(DeleteOutcome::Aborted);
        }
        let always = |_: &str| true;
        for exp in &self.experiments {
            exp.delete(&always)?;
        }
        let count = self.experiments.len();
        self.experiments.clear();
        info!(count, "Deleted {count} experiments");
        Ok(DeleteOutcome::Deleted(count))
    }

    /// Artifact access across all contained experiments.
    #[must_use]
    pub fn artifacts(&self) -> ArtifactIndexer<'_> {
        ArtifactIndexer { set: self }
    }

    /// Contained experiments.
    #[must_use]
    pub fn as_slice(&self) -> &[Arc<Experiment>] {
        &self.experiments
    }

    /// Consume into the underlying vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<Arc<Experiment>> {
        self.experiments
    }
}

impl Deref for QuerySet {
    type Target = [Arc<Experiment>];

    fn deref(&self) -> &Self::Target {
        &self.experiments
    }
}

impl FromIterator<Arc<Experiment>> for QuerySet {
    fn from_iter<T: IntoIterator<Item = Arc<Experiment>>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for QuerySet {
    type Item = Arc<Experiment>;
    type IntoIter = std::vec::IntoIter<Arc<Experiment>>;

    fn into_iter(self) -> Self::IntoIter {
        self.experiments.into_iter()
    }
}

impl<'a> IntoIterator for &'a QuerySet {
    type Item = &'a Arc<Experiment>;
    type IntoIter = std::slice::Iter<'a, Arc<Experiment>>;

    fn into_iter(self) -> Self::IntoIter {
        self.experiments.iter()
    }
}

impl fmt::Display for QuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QuerySet([")?;
        for (i, exp) in self.experiments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{exp}")?;
        }
        f.write_str("])")
    }
}

/// Name-based artifact lookup over a [`QuerySet`].
#[derive(Debug, Clone, Copy)]
pub struct ArtifactIndexer<'a> {
    set: &'a QuerySet,
}

impl ArtifactIndexer<'_> {
    /// The artifact called `name` from every experiment, in query order.
    ///
    /// # Errors
    /// `MissingField` for the first experiment without such an artifact.
    pub fn get(&self, name: &str) -> Result<ArtifactSet> {
        self.set
            .experiments
            .iter()
            .map(|exp| exp.artifact(name).cloned())
            .collect()
    }

    /// Every artifact whose name matches the glob `pattern`, across all
    /// experiments. Experiments without a match contribute nothing.
    ///
    /// # Errors
    /// `InvalidInput` for a malformed pattern; store failures.
    pub fn filter(&self, pattern: &str) -> Result<ArtifactSet> {
        let matcher = compile_glob(pattern)?;
        let mut matched = Vec::new();
        for exp in &self.set.experiments {
            matched.extend(
                exp.artifacts()?
                    .iter()
                    .filter(|(name, _)| matcher.is_match(name.as_str()))
                    .map(|(_, artifact)| Arc::clone(artifact)),
            );
        }
        Ok(ArtifactSet::new(matched))
    }
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| Error::InvalidInput(format!("invalid glob pattern '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_matching() {
        let matcher = compile_glob("confusion_matrix*").unwrap();
        assert!(matcher.is_match("confusion_matrix"));
        assert!(matcher.is_match("confusion_matrix.pdf"));
        assert!(!matcher.is_match("predictions"));
        assert!(matches!(compile_glob("[unclosed"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_empty_set() {
        let mut set = QuerySet::default();
        assert_eq!(set.to_string(), "QuerySet([])");
        assert!(set.is_empty());
        assert_eq!(set.delete(&|_: &str| true).unwrap(), DeleteOutcome::Deleted(0));
        assert_eq!(set.artifacts().filter("*").unwrap().len(), 0);
        let table = set.project(["config.epochs"]).unwrap();
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.column_names(), vec!["epochs"]);
    }
}
