//! Helpers for comparing run configurations.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::experiment::Experiment;
use crate::{Error, Result};

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn config_entries(exp: &Experiment) -> Vec<(&str, String)> {
    exp.config()
        .and_then(Value::as_object)
        .map(|config| {
            config
                .iter()
                .map(|(key, value)| (key.as_str(), display_value(value)))
                .collect()
        })
        .unwrap_or_default()
}

/// Top-level config keys whose value is not shared by every experiment.
///
/// Values are compared by their display form, so `3` and `"3"` count as equal.
#[must_use]
pub fn differing_config_keys<'a, I>(experiments: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Experiment>,
{
    let entries: Vec<Vec<(&str, String)>> =
        experiments.into_iter().map(config_entries).collect();

    let value_sets: Vec<BTreeSet<&str>> = entries
        .iter()
        .map(|e| e.iter().map(|(_, v)| v.as_str()).collect())
        .collect();
    let Some((first, rest)) = value_sets.split_first() else {
        return BTreeSet::new();
    };
    let shared: BTreeSet<&str> = rest
        .iter()
        .fold(first.clone(), |acc, set| acc.intersection(set).copied().collect());

    entries
        .iter()
        .flatten()
        .filter(|(_, value)| !shared.contains(value.as_str()))
        .map(|(key, _)| (*key).to_string())
        .collect()
}

/// Render selected config values as `key=value | key=value`.
///
/// # Errors
/// `MissingField` if a key is absent from the run's config.
pub fn format_config(exp: &Experiment, keys: &[&str]) -> Result<String> {
    let parts = keys
        .iter()
        .map(|key| {
            exp.config()
                .and_then(|config| config.get(*key))
                .map(|value| format!("{key}={}", display_value(value)))
                .ok_or_else(|| Error::MissingField {
                    path: format!("config.{key}"),
                })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join(" | "))
}
