//! Core types for the record store.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// A single record in the store.
///
/// Records are string-keyed maps of heterogeneous values with no identity
/// field. Two records are equal when their contents are equal.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Record(Map::new())
    }

    /// Build a record from a JSON value.
    ///
    /// Fails with [`StoreError::InvalidInput`] unless the value is an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Record(map)),
            other => Err(StoreError::InvalidInput(format!(
                "record must be an object, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Get a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder form of [`Record::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Subset match: every key of `pattern` is present here with a matching value.
    ///
    /// Extra keys on the record are ignored, and an empty pattern matches
    /// every record. Nested objects match as subsets too. A pattern list
    /// matches when each of its elements matches a distinct element of the
    /// record's list, in any order. Numbers compare by numeric value.
    pub fn matches(&self, pattern: &Record) -> bool {
        map_matches(&pattern.0, &self.0)
    }

    /// Shallow merge: each key of `patch` overwrites the same key here.
    ///
    /// Nested objects are replaced whole, never deep-merged.
    pub fn merge(&mut self, patch: &Record) {
        for (key, value) in &patch.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({})", Value::Object(self.0.clone()))
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self> {
        Record::from_value(value)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn map_matches(pattern: &Map<String, Value>, record: &Map<String, Value>) -> bool {
    pattern.iter().all(|(key, expected)| {
        record
            .get(key)
            .is_some_and(|actual| value_matches(expected, actual))
    })
}

fn value_matches(pattern: &Value, actual: &Value) -> bool {
    match (pattern, actual) {
        (Value::Object(p), Value::Object(a)) => map_matches(p, a),
        (Value::Array(p), Value::Array(a)) => list_matches(p, a),
        (Value::Number(p), Value::Number(a)) => numbers_equal(p, a),
        _ => pattern == actual,
    }
}

/// Partial, unordered list match: each pattern element pairs with its own
/// distinct element of `actual`, which may hold extra elements.
fn list_matches(pattern: &[Value], actual: &[Value]) -> bool {
    if pattern.len() > actual.len() {
        return false;
    }

    // owner[j] = pattern element currently paired with actual[j]
    let mut owner: Vec<Option<usize>> = vec![None; actual.len()];
    (0..pattern.len()).all(|i| {
        let mut visited = vec![false; actual.len()];
        assign(i, pattern, actual, &mut owner, &mut visited)
    })
}

/// Find a partner for `pattern[i]`, re-pairing earlier elements if needed.
fn assign(
    i: usize,
    pattern: &[Value],
    actual: &[Value],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for j in 0..actual.len() {
        if visited[j] || !value_matches(&pattern[i], &actual[j]) {
            continue;
        }
        visited[j] = true;
        let free = match owner[j] {
            None => true,
            Some(prev) => assign(prev, pattern, actual, owner, visited),
        };
        if free {
            owner[j] = Some(i);
            return true;
        }
    }
    false
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a == b;
    }
    a.as_f64() == b.as_f64()
}

/// Human-readable name of a JSON value's kind, for error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
