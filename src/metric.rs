//! Metric series - step-indexed time-series logged by a run

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named, step-ordered sequence of scalar samples.
///
/// Built from one metrics-collection document, whose parallel `steps` and
/// `values` arrays are kept in the order the store returned them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    name: String,
    steps: Vec<i64>,
    values: Vec<f64>,
}

impl MetricSeries {
    /// Create a series. Extra entries in the longer of the two inputs are dropped.
    #[must_use]
    pub fn new(name: impl Into<String>, mut steps: Vec<i64>, mut values: Vec<f64>) -> Self {
        let len = steps.len().min(values.len());
        steps.truncate(len);
        values.truncate(len);
        Self {
            name: name.into(),
            steps,
            values,
        }
    }

    /// Build from a metrics-collection document (`name`, `steps`, `values`).
    ///
    /// Returns `None` when the document has no string `name`. Non-numeric
    /// samples are skipped together with their step.
    #[must_use]
    pub fn from_document(doc: &Value) -> Option<Self> {
        let name = doc.get("name")?.as_str()?;
        let empty = Vec::new();
        let steps = doc.get("steps").and_then(Value::as_array).unwrap_or(&empty);
        let values = doc.get("values").and_then(Value::as_array).unwrap_or(&empty);

        let (steps, values) = steps
            .iter()
            .zip(values)
            .filter_map(|(s, v)| Some((s.as_i64()?, v.as_f64()?)))
            .unzip();
        Some(Self::new(name, steps, values))
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step index of each sample.
    #[must_use]
    pub fn steps(&self) -> &[i64] {
        &self.steps
    }

    /// Sample values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(step, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.steps.iter().copied().zip(self.values.iter().copied())
    }

    /// Value logged at `step`, if any.
    #[must_use]
    pub fn at_step(&self, step: i64) -> Option<f64> {
        self.iter().find(|(s, _)| *s == step).map(|(_, v)| v)
    }

    /// Arithmetic mean; `None` for an empty series.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Smallest value.
    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    /// Largest value.
    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    /// Last logged value.
    #[must_use]
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }
}
