//! Projection - flattening runs into a rectangular table
//!
//! Each [`ColumnSpec`] names a dotted path, optionally with a [`Reducer`].
//! Paths are walked from the [`Experiment`] itself: the first segment may be
//! `id`, `metrics`, `artifacts` or any top-level record key; later segments
//! index into mappings, arrays, metric series and artifacts.
//!
//! ```text
//! QuerySet ─project([config.epochs, {metrics.training_loss: mean}])─▶
//!
//!   exp_id | epochs | training_loss_mean
//!   -------+--------+-------------------
//!        1 |      1 |              0.64
//!        2 |      3 |              0.43
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde_json::{json, Value};

use crate::artifact::Artifact;
use crate::document::{self, FieldPath, RunId};
use crate::experiment::Experiment;
use crate::metric::MetricSeries;
use crate::{Error, Result};

/// Name of the index column in exported tables.
pub const INDEX_COLUMN: &str = "exp_id";

/// Column naming strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rename {
    /// Final path segment (`config.epochs` -> `epochs`)
    #[default]
    Last,
    /// Full dot-joined path
    Full,
}

/// Behavior when a path segment is absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnMissing {
    /// Fail with `MissingField`
    #[default]
    Raise,
    /// Put a null in the cell
    Ignore,
}

/// Options for [`crate::QuerySet::project_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectOptions {
    /// Column naming strategy
    pub rename: Rename,
    /// Missing-segment policy
    pub on_missing: OnMissing,
}

impl ProjectOptions {
    /// Set the column naming strategy.
    #[must_use]
    pub const fn rename(mut self, rename: Rename) -> Self {
        self.rename = rename;
        self
    }

    /// Set the missing-segment policy.
    #[must_use]
    pub const fn on_missing(mut self, on_missing: OnMissing) -> Self {
        self.on_missing = on_missing;
        self
    }
}

/// A value reached while walking a projection path.
#[derive(Debug, Clone)]
pub enum Resolved<'a> {
    /// The experiment id
    Id(&'a RunId),
    /// A value inside the run document
    Value(&'a Value),
    /// A value derived during the walk (series/artifact attributes)
    Scalar(Value),
    /// All metric series of the run
    Metrics(&'a BTreeMap<String, MetricSeries>),
    /// One metric series
    Series(&'a MetricSeries),
    /// All artifacts of the run
    Artifacts(&'a BTreeMap<String, Arc<Artifact>>),
    /// One artifact
    Artifact(&'a Arc<Artifact>),
}

impl<'a> Resolved<'a> {
    fn root(exp: &'a Experiment, segment: &str) -> Result<Option<Self>> {
        Ok(match segment {
            "id" => Some(Self::Id(exp.id())),
            "metrics" => Some(Self::Metrics(exp.metrics()?)),
            "artifacts" => Some(Self::Artifacts(exp.artifacts()?)),
            key => document::step(exp.record().as_value(), key).map(Self::Value),
        })
    }

    fn step(&self, segment: &str) -> Option<Self> {
        match self {
            Self::Id(_) | Self::Scalar(_) => None,
            Self::Value(value) => document::step(*value, segment).map(Self::Value),
            Self::Metrics(metrics) => metrics.get(segment).map(Self::Series),
            Self::Series(series) => match segment {
                "name" => Some(Self::Scalar(json!(series.name()))),
                "steps" => Some(Self::Scalar(json!(series.steps()))),
                "values" => Some(Self::Scalar(json!(series.values()))),
                step => step
                    .parse::<i64>()
                    .ok()
                    .and_then(|s| series.at_step(s))
                    .map(|v| Self::Scalar(json!(v))),
            },
            Self::Artifacts(artifacts) => artifacts.get(segment).map(Self::Artifact),
            Self::Artifact(artifact) => match segment {
                "name" => Some(Self::Scalar(json!(artifact.name()))),
                "content_type" => Some(Self::Scalar(json!(artifact.content_type()))),
                "extension" => Some(Self::Scalar(json!(artifact.extension()))),
                "kind" => Some(Self::Scalar(json!(artifact.kind().type_name()))),
                _ => None,
            },
        }
    }

    /// Numeric samples: a metric series, a number, or an all-numeric array.
    #[must_use]
    pub fn numbers(&self) -> Option<Vec<f64>> {
        fn from_value(value: &Value) -> Option<Vec<f64>> {
            match value {
                Value::Number(n) => n.as_f64().map(|v| vec![v]),
                Value::Array(items) => items.iter().map(Value::as_f64).collect(),
                _ => None,
            }
        }
        match self {
            Self::Series(series) => Some(series.values().to_vec()),
            Self::Value(value) => from_value(value),
            Self::Scalar(value) => from_value(value),
            _ => None,
        }
    }

    /// Cell value for the table.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Id(id) => id.to_value(),
            Self::Value(value) => (*value).clone(),
            Self::Scalar(value) => value.clone(),
            Self::Metrics(metrics) => Value::Object(
                metrics
                    .iter()
                    .map(|(name, series)| (name.clone(), json!(series.values())))
                    .collect(),
            ),
            Self::Series(series) => json!(series.values()),
            Self::Artifacts(artifacts) => json!(artifacts.keys().collect::<Vec<_>>()),
            Self::Artifact(artifact) => json!(artifact.name()),
        }
    }
}

type ReduceFn = dyn Fn(&Resolved<'_>) -> Value + Send + Sync;

/// Named function that summarizes a resolved value into one cell.
#[derive(Clone)]
pub struct Reducer {
    name: String,
    func: Arc<ReduceFn>,
}

impl Reducer {
    /// Custom reducer. `name` becomes the column-name suffix.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Resolved<'_>) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    fn numeric(name: &str, f: fn(&[f64]) -> Option<f64>) -> Self {
        Self::new(name, move |resolved| {
            resolved
                .numbers()
                .and_then(|values| f(&values))
                .map_or(Value::Null, |v| json!(v))
        })
    }

    /// Arithmetic mean of numeric samples.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean() -> Self {
        Self::numeric("mean", |values| {
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        })
    }

    /// Smallest numeric sample.
    #[must_use]
    pub fn min() -> Self {
        Self::numeric("min", |values| values.iter().copied().reduce(f64::min))
    }

    /// Largest numeric sample.
    #[must_use]
    pub fn max() -> Self {
        Self::numeric("max", |values| values.iter().copied().reduce(f64::max))
    }

    /// Last numeric sample.
    #[must_use]
    pub fn last() -> Self {
        Self::numeric("last", |values| values.last().copied())
    }

    /// Number of numeric samples.
    #[must_use]
    pub fn len() -> Self {
        Self::new("len", |resolved| {
            resolved.numbers().map_or(Value::Null, |values| json!(values.len()))
        })
    }

    /// Reducer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply to a resolved value.
    #[must_use]
    pub fn apply(&self, resolved: &Resolved<'_>) -> Value {
        (self.func)(resolved)
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reducer").field("name", &self.name).finish()
    }
}

/// One projected column: a path and an optional reducer.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    path: FieldPath,
    reducer: Option<Reducer>,
}

impl ColumnSpec {
    /// Plain path column.
    #[must_use]
    pub fn new(path: impl Into<FieldPath>) -> Self {
        Self {
            path: path.into(),
            reducer: None,
        }
    }

    /// Column holding `reducer` applied to the value at `path`.
    #[must_use]
    pub fn reduced(path: impl Into<FieldPath>, reducer: Reducer) -> Self {
        Self {
            path: path.into(),
            reducer: Some(reducer),
        }
    }

    /// Projected path.
    #[must_use]
    pub const fn path(&self) -> &FieldPath {
        &self.path
    }

    /// Column name under `rename`; reducers append `_{name}`.
    #[must_use]
    pub fn column_name(&self, rename: Rename) -> String {
        let base = match rename {
            Rename::Last => self.path.last().unwrap_or_default().to_string(),
            Rename::Full => self.path.dotted(),
        };
        match &self.reducer {
            Some(reducer) => format!("{base}_{}", reducer.name()),
            None => base,
        }
    }

    fn extract(&self, exp: &Experiment, on_missing: OnMissing) -> Result<Value> {
        let segments = self.path.segments();
        let missing = |depth: usize| match on_missing {
            OnMissing::Raise => Err(Error::MissingField {
                path: self.path.prefix(depth + 1),
            }),
            OnMissing::Ignore => Ok(Value::Null),
        };

        let Some((first, rest)) = segments.split_first() else {
            return missing(0);
        };
        let Some(mut current) = Resolved::root(exp, first)? else {
            return missing(0);
        };
        for (offset, segment) in rest.iter().enumerate() {
            match current.step(segment) {
                Some(next) => current = next,
                None => return missing(offset + 1),
            }
        }

        Ok(match &self.reducer {
            Some(reducer) => reducer.apply(&current),
            None => current.to_value(),
        })
    }
}

impl From<&str> for ColumnSpec {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<FieldPath> for ColumnSpec {
    fn from(path: FieldPath) -> Self {
        Self::new(path)
    }
}

impl<P: Into<FieldPath>> From<(P, Reducer)> for ColumnSpec {
    fn from((path, reducer): (P, Reducer)) -> Self {
        Self::reduced(path, reducer)
    }
}

/// A projected table: one row per experiment, indexed by experiment id.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    index: Vec<RunId>,
    names: Vec<String>,
    columns: Vec<Vec<Value>>,
}

impl Projection {
    pub(crate) fn build(
        experiments: &[Arc<Experiment>],
        on: &[ColumnSpec],
        options: ProjectOptions,
    ) -> Result<Self> {
        let mut columns: Vec<Vec<Value>> = on
            .iter()
            .map(|_| Vec::with_capacity(experiments.len()))
            .collect();
        for exp in experiments {
            for (spec, column) in on.iter().zip(columns.iter_mut()) {
                column.push(spec.extract(exp, options.on_missing)?);
            }
        }
        Ok(Self {
            index: experiments.iter().map(|e| e.id().clone()).collect(),
            names: on.iter().map(|s| s.column_name(options.rename)).collect(),
            columns,
        })
    }

    /// Row index (experiment ids, in query order).
    #[must_use]
    pub fn index(&self) -> &[RunId] {
        &self.index
    }

    /// Column names, in projection order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    /// Number of columns (excluding the index).
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.names.len()
    }

    /// Values of the first column named `name`.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        let position = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[position])
    }

    /// Cell at (`id`, `column`), using the first row with that id.
    #[must_use]
    pub fn get(&self, id: &RunId, column: &str) -> Option<&Value> {
        let row = self.index.iter().position(|i| i == id)?;
        self.column(column).map(|values| &values[row])
    }

    /// Export as an arrow batch: `exp_id` first, then one typed column per projection.
    ///
    /// Column types are inferred from the non-null cells: booleans, integers,
    /// floats and strings map to their arrow types; anything else is stored as
    /// JSON text.
    ///
    /// # Errors
    /// Arrow schema/length errors.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let index_values: Vec<Value> = self.index.iter().map(RunId::to_value).collect();
        let (index_type, index_array) = to_arrow(&index_values);

        let mut fields = vec![Field::new(INDEX_COLUMN, index_type, false)];
        let mut arrays = vec![index_array];
        for (name, values) in self.names.iter().zip(&self.columns) {
            let (data_type, array) = to_arrow(values);
            fields.push(Field::new(name, data_type, true));
            arrays.push(array);
        }
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }

    /// Write the table to a Parquet file.
    ///
    /// # Errors
    /// IO, arrow and parquet errors.
    pub fn write_parquet(&self, path: impl AsRef<Path>) -> Result<()> {
        let batch = self.to_record_batch()?;
        let file = File::create(path.as_ref())?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }
}

fn to_arrow(values: &[Value]) -> (DataType, ArrayRef) {
    let present = || values.iter().filter(|v| !v.is_null());

    if present().next().is_some() && present().all(Value::is_boolean) {
        let array: BooleanArray = values.iter().map(Value::as_bool).collect();
        return (DataType::Boolean, Arc::new(array));
    }
    if present().next().is_some() && present().all(|v| v.is_i64()) {
        let array: Int64Array = values.iter().map(Value::as_i64).collect();
        return (DataType::Int64, Arc::new(array));
    }
    if present().next().is_some() && present().all(Value::is_number) {
        let array: Float64Array = values.iter().map(Value::as_f64).collect();
        return (DataType::Float64, Arc::new(array));
    }
    let array: StringArray = values
        .iter()
        .map(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect();
    (DataType::Utf8, Arc::new(array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    #[test]
    fn test_column_names() {
        let plain = ColumnSpec::from("config.epochs");
        assert_eq!(plain.column_name(Rename::Last), "epochs");
        assert_eq!(plain.column_name(Rename::Full), "config.epochs");

        let reduced = ColumnSpec::from(("metrics.training_loss", Reducer::mean()));
        assert_eq!(reduced.column_name(Rename::Last), "training_loss_mean");
        assert_eq!(reduced.column_name(Rename::Full), "metrics.training_loss_mean");

        let literal = ColumnSpec::new(["artifacts", "model.pt"]);
        assert_eq!(literal.column_name(Rename::Last), "model.pt");
    }

    #[test]
    fn test_reducers_on_series() {
        let series = MetricSeries::new("loss", vec![0, 1, 2], vec![3.0, 1.0, 2.0]);
        let resolved = Resolved::Series(&series);
        assert_eq!(Reducer::mean().apply(&resolved), json!(2.0));
        assert_eq!(Reducer::min().apply(&resolved), json!(1.0));
        assert_eq!(Reducer::max().apply(&resolved), json!(3.0));
        assert_eq!(Reducer::last().apply(&resolved), json!(2.0));
        assert_eq!(Reducer::len().apply(&resolved), json!(3));
    }

    #[test]
    fn test_reducers_on_non_numeric_yield_null() {
        let value = json!("sgd");
        assert_eq!(Reducer::mean().apply(&Resolved::Value(&value)), Value::Null);
        let custom = Reducer::new("upper", |r| {
            r.to_value().as_str().map_or(Value::Null, |s| json!(s.to_uppercase()))
        });
        assert_eq!(custom.apply(&Resolved::Value(&value)), json!("SGD"));
        assert_eq!(custom.name(), "upper");
    }

    #[test]
    fn test_to_arrow_type_inference() {
        let (t, a) = to_arrow(&[json!(1), Value::Null, json!(3)]);
        assert_eq!(t, DataType::Int64);
        assert_eq!(a.null_count(), 1);

        let (t, _) = to_arrow(&[json!(1), json!(2.5)]);
        assert_eq!(t, DataType::Float64);

        let (t, _) = to_arrow(&[json!(true), json!(false)]);
        assert_eq!(t, DataType::Boolean);

        let (t, a) = to_arrow(&[json!("sgd"), json!({"lr": 0.1})]);
        assert_eq!(t, DataType::Utf8);
        let strings = a.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(strings.value(1), r#"{"lr":0.1}"#);

        let (t, a) = to_arrow(&[Value::Null, Value::Null]);
        assert_eq!(t, DataType::Utf8);
        assert_eq!(a.null_count(), 2);
    }
}
