//! Loader configuration

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default database name used by the run observer.
pub const DEFAULT_DATABASE_NAME: &str = "sacred";

/// Default number of memoized results per lookup method.
pub const MAX_CACHE_SIZE: usize = 32;

/// Settings for [`crate::ExperimentLoader`].
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```rust
/// use trueno_runs::LoaderConfig;
///
/// let config = LoaderConfig::from_json_str(r#"{"database_name": "runs_test"}"#).unwrap();
/// assert_eq!(config.database_name, "runs_test");
/// assert_eq!(config.cache_capacity, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Database name, reported in not-found errors
    pub database_name: String,
    /// Entries kept per memoized lookup method
    pub cache_capacity: usize,
    /// Worker bound for bulk artifact saves (`None` = rayon default)
    pub save_concurrency: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            cache_capacity: MAX_CACHE_SIZE,
            save_concurrency: None,
        }
    }
}

impl LoaderConfig {
    /// Parse a JSON configuration document.
    ///
    /// # Errors
    /// JSON syntax errors, or a configuration rejected by [`LoaderConfig::validate`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the loader cannot work with.
    ///
    /// # Errors
    /// `InvalidInput` for a zero cache capacity or zero save workers.
    pub fn validate(&self) -> Result<()> {
        self.capacity()?;
        if self.save_concurrency == Some(0) {
            return Err(Error::InvalidInput(
                "save_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.cache_capacity)
            .ok_or_else(|| Error::InvalidInput("cache_capacity must be at least 1".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.database_name, "sacred");
        assert_eq!(config.cache_capacity, MAX_CACHE_SIZE);
        assert_eq!(config.save_concurrency, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = LoaderConfig::from_json_str(r#"{"save_concurrency": 4}"#).unwrap();
        assert_eq!(config.save_concurrency, Some(4));
        assert_eq!(config.database_name, "sacred");
    }

    #[test]
    fn test_rejects_zero_values() {
        assert!(matches!(
            LoaderConfig::from_json_str(r#"{"cache_capacity": 0}"#),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            LoaderConfig::from_json_str(r#"{"save_concurrency": 0}"#),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            LoaderConfig::from_json_str("{not json"),
            Err(Error::Json(_))
        ));
    }
}
