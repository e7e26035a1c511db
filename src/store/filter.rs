//! Typed query filters with Mongo-style JSON parsing
//!
//! `Filter` is the pass-through query shape: callers either build one with
//! the constructors or parse a query document with [`Filter::from_json`].
//!
//! Supported query document syntax:
//! - `{"a.b": v}` equality (numbers compare by value, arrays match on any element)
//! - `{"a": {"$regex": "..."}}` partial regex match on strings
//! - `{"a": {"$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte": v}}`
//! - `{"a": {"$in": [..]}}`, `{"a": {"$exists": bool}}`
//! - `{"$and": [..]}`, `{"$or": [..]}`
//! - several top-level keys are combined with AND

use std::cmp::Ordering;

use chrono::DateTime;
use regex::Regex;
use serde_json::{Map, Value};

use crate::document::{walk, FieldPath};
use crate::{Error, Result};

/// Ordering comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
}

impl CmpOp {
    const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::Gte => !matches!(ordering, Ordering::Less),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::Lte => !matches!(ordering, Ordering::Greater),
        }
    }
}

/// Predicate over a document.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Matches every document
    All,
    /// Field equals value (`null` also matches an absent field)
    Eq(FieldPath, Value),
    /// Field differs from value
    Ne(FieldPath, Value),
    /// Ordering comparison against a number or string
    Cmp(FieldPath, CmpOp, Value),
    /// Field equals one of the values
    In(FieldPath, Vec<Value>),
    /// Field presence
    Exists(FieldPath, bool),
    /// String field contains a match for the regex
    Regex(FieldPath, Regex),
    /// All sub-filters match
    And(Vec<Filter>),
    /// At least one sub-filter matches
    Or(Vec<Filter>),
}

impl Filter {
    /// Equality filter.
    #[must_use]
    pub fn eq(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::Eq(path.into(), value.into())
    }

    /// Regex filter (partial match).
    ///
    /// # Errors
    /// Returns `InvalidQuery` if the pattern does not compile.
    pub fn regex(path: impl Into<FieldPath>, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InvalidQuery(format!("invalid regex {pattern:?}: {e}")))?;
        Ok(Self::Regex(path.into(), regex))
    }

    /// Parse a Mongo-style query document.
    ///
    /// # Errors
    /// Returns `InvalidQuery` for non-object queries, unknown operators or bad regexes.
    ///
    /// # Example
    /// ```
    /// use serde_json::json;
    /// use trueno_runs::store::Filter;
    ///
    /// # fn main() -> trueno_runs::Result<()> {
    /// let filter = Filter::from_json(&json!({
    ///     "$and": [{"config.optimizer": "sgd"}, {"config.epochs": 3}]
    /// }))?;
    /// assert!(filter.matches(&json!({"config": {"optimizer": "sgd", "epochs": 3}})));
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_json(query: &Value) -> Result<Self> {
        let Value::Object(map) = query else {
            return Err(Error::InvalidQuery(format!(
                "query must be an object, got {query}"
            )));
        };

        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            clauses.push(match key.as_str() {
                "$and" => Self::And(Self::parse_list(key, value)?),
                "$or" => Self::Or(Self::parse_list(key, value)?),
                op if op.starts_with('$') => {
                    return Err(Error::InvalidQuery(format!("unsupported operator {op}")))
                }
                field => Self::parse_field(FieldPath::from(field), value)?,
            });
        }

        Ok(match clauses.len() {
            0 => Self::All,
            1 => clauses.remove(0),
            _ => Self::And(clauses),
        })
    }

    fn parse_list(op: &str, value: &Value) -> Result<Vec<Self>> {
        let Value::Array(items) = value else {
            return Err(Error::InvalidQuery(format!("{op} expects an array")));
        };
        items.iter().map(Self::from_json).collect()
    }

    fn parse_field(path: FieldPath, value: &Value) -> Result<Self> {
        match value {
            Value::Object(ops) if is_operator_object(ops) => {
                let mut clauses = Vec::with_capacity(ops.len());
                for (op, operand) in ops {
                    clauses.push(Self::parse_operator(path.clone(), op, operand)?);
                }
                Ok(if clauses.len() == 1 {
                    clauses.remove(0)
                } else {
                    Self::And(clauses)
                })
            }
            literal => Ok(Self::Eq(path, literal.clone())),
        }
    }

    fn parse_operator(path: FieldPath, op: &str, operand: &Value) -> Result<Self> {
        Ok(match op {
            "$eq" => Self::Eq(path, operand.clone()),
            "$ne" => Self::Ne(path, operand.clone()),
            "$gt" => Self::Cmp(path, CmpOp::Gt, operand.clone()),
            "$gte" => Self::Cmp(path, CmpOp::Gte, operand.clone()),
            "$lt" => Self::Cmp(path, CmpOp::Lt, operand.clone()),
            "$lte" => Self::Cmp(path, CmpOp::Lte, operand.clone()),
            "$in" => match operand {
                Value::Array(items) => Self::In(path, items.clone()),
                _ => return Err(Error::InvalidQuery("$in expects an array".to_string())),
            },
            "$exists" => Self::Exists(path, operand.as_bool().unwrap_or(true)),
            "$regex" => match operand {
                Value::String(pattern) => Self::regex(path, pattern)?,
                _ => return Err(Error::InvalidQuery("$regex expects a string".to_string())),
            },
            other => return Err(Error::InvalidQuery(format!("unsupported operator {other}"))),
        })
    }

    /// Evaluate the filter against a document.
    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Eq(path, expected) => match lookup(doc, path) {
                Some(actual) => any_element(actual, |v| values_equal(v, expected)),
                None => expected.is_null(),
            },
            Self::Ne(path, expected) => !Self::Eq(path.clone(), expected.clone()).matches(doc),
            Self::Cmp(path, op, bound) => lookup(doc, path).is_some_and(|actual| {
                any_element(actual, |v| {
                    compare_same_type(v, bound).is_some_and(|ord| op.accepts(ord))
                })
            }),
            Self::In(path, options) => options
                .iter()
                .any(|o| Self::Eq(path.clone(), o.clone()).matches(doc)),
            Self::Exists(path, wanted) => lookup(doc, path).is_some() == *wanted,
            Self::Regex(path, regex) => lookup(doc, path).is_some_and(|actual| {
                any_element(actual, |v| v.as_str().is_some_and(|s| regex.is_match(s)))
            }),
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn lookup<'a>(doc: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    walk(doc, path.segments()).ok()
}

/// Array fields match when the value itself or any element satisfies `pred`.
fn any_element(value: &Value, pred: impl Fn(&Value) -> bool) -> bool {
    pred(value) || matches!(value, Value::Array(items) if items.iter().any(&pred))
}

/// Equality with numbers compared by value (`3 == 3.0`).
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(compare_strings(x, y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// RFC 3339 timestamps compare as instants, so mixed offsets and
/// fractional seconds order chronologically; other strings compare bytewise.
fn compare_strings(a: &str, b: &str) -> Ordering {
    match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

const fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for cursor sorting: absent/null < numbers < strings < objects < arrays < bools.
pub(crate) fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            compare_same_type(x, y).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
