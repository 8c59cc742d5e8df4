//! # Scalar Values and Record Mappings
//!
//! The repository moves record state around as plain key/value mappings
//! rather than engine-native rows. `Value` is the closed set of scalars a
//! field can hold; `RecordValues` is the mapping a record materializes as.
//!
//! Backends that store identifiers and timestamps as TEXT round-trip them
//! back through the tolerant accessors here (a uuid or RFC 3339 string is
//! accepted wherever a typed value is expected).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::error::{RepositoryError, RepositoryResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single scalar field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Read as a uuid, accepting the TEXT encoding.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(value) => Some(*value),
            Value::Text(text) => Uuid::parse_str(text).ok(),
            _ => None,
        }
    }

    /// Read as a timestamp, accepting the RFC 3339 TEXT encoding.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(value) => Some(*value),
            Value::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Read as a boolean, accepting the INTEGER encoding.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Int(value) => Some(*value != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Ordering between two values, where one exists.
    ///
    /// Values order within a variant; Int/Float and the TEXT encodings of
    /// uuid/timestamp values compare across variants. Anything else is
    /// unordered and no predicate matches it.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Text(_), Value::Uuid(_)) | (Value::Uuid(_), Value::Text(_)) => {
                match (self.as_uuid(), other.as_uuid()) {
                    (Some(a), Some(b)) => Some(a.cmp(&b)),
                    _ => None,
                }
            }
            (Value::Text(_), Value::DateTime(_)) | (Value::DateTime(_), Value::Text(_)) => {
                match (self.as_datetime(), other.as_datetime()) {
                    (Some(a), Some(b)) => Some(a.cmp(&b)),
                    _ => None,
                }
            }
            (Value::Bool(_), Value::Int(_)) | (Value::Int(_), Value::Bool(_)) => {
                match (self.as_i64(), other.as_i64()) {
                    (Some(a), Some(b)) => Some(a.cmp(&b)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Equality under [`Value::compare`].
    pub fn equals(&self, other: &Value) -> bool {
        matches!(self.compare(other), Some(Ordering::Equal))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// The plain key/value mapping a record materializes as.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordValues(BTreeMap<String, Value>);

impl RecordValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn uuid(&self, key: &str) -> RepositoryResult<Uuid> {
        self.get(key)
            .and_then(Value::as_uuid)
            .ok_or_else(|| field_error(key))
    }

    pub fn datetime(&self, key: &str) -> RepositoryResult<DateTime<Utc>> {
        self.get(key)
            .and_then(Value::as_datetime)
            .ok_or_else(|| field_error(key))
    }

    pub fn datetime_opt(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key).and_then(Value::as_datetime)
    }

    pub fn text(&self, key: &str) -> RepositoryResult<String> {
        self.get(key)
            .and_then(|value| value.as_text().map(str::to_string))
            .ok_or_else(|| field_error(key))
    }

    pub fn text_opt(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|value| value.as_text().map(str::to_string))
    }

    pub fn int(&self, key: &str) -> RepositoryResult<i64> {
        self.get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| field_error(key))
    }

    pub fn float(&self, key: &str) -> RepositoryResult<f64> {
        self.get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| field_error(key))
    }

    pub fn boolean(&self, key: &str) -> RepositoryResult<bool> {
        self.get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| field_error(key))
    }
}

impl IntoIterator for RecordValues {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn field_error(key: &str) -> RepositoryError {
    RepositoryError::storage(format!("row field `{key}` is missing or has an unexpected type"))
}
