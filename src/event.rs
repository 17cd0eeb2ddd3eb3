// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event record data structures.
//!
//! An [`EventRecord`] is the unit that flows through the engine: a row pulled
//! from the backend, identified by an opaque `id`, ordered by `weight_score`,
//! and otherwise carried through untouched. An [`EventCollection`] is the
//! ordered, capped, duplicate-free list the consumer renders.
//!
//! # Example
//!
//! ```
//! use event_sync::{EventCollection, EventRecord};
//! use serde_json::json;
//!
//! let low = EventRecord::from_row(json!({"id": "a", "timestamp": 1, "weight_score": 1.0})).unwrap();
//! let high = EventRecord::from_row(json!({"id": "b", "timestamp": 2, "weight_score": 9.0})).unwrap();
//!
//! let collection = EventCollection::from_snapshot(vec![low, high], 10);
//! assert_eq!(collection.ids(), vec!["b", "a"]);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Why a raw row could not become an [`EventRecord`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("event row is not a JSON object")]
    NotAnObject,
    #[error("event row has no usable id")]
    MissingId,
}

/// A single event row.
///
/// Records are immutable once created. The ordering fields are derived from
/// the row when it is parsed; the row itself is kept verbatim as the payload,
/// so serializing a record reproduces the row it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct EventRecord {
    id: String,
    timestamp: i64,
    weight_score: f64,
    payload: Value,
}

impl EventRecord {
    /// Parse a backend row.
    ///
    /// `id` may be a string or a number. `timestamp` accepts integers, floats
    /// and numeric strings; anything else reads as 0. `weight_score` (or
    /// `weightScore`) defaults to 0 when missing or not finite.
    pub fn from_row(row: Value) -> Result<Self, RecordError> {
        let fields = row.as_object().ok_or(RecordError::NotAnObject)?;

        let id = match fields.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(RecordError::MissingId),
        };

        let timestamp = fields.get("timestamp").map_or(0, millis_from_value);

        let weight_score = fields
            .get("weight_score")
            .or_else(|| fields.get("weightScore"))
            .and_then(Value::as_f64)
            .filter(|w| w.is_finite())
            .unwrap_or(0.0);

        Ok(Self {
            id,
            timestamp,
            weight_score,
            payload: row,
        })
    }

    /// Opaque unique identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Event time (epoch millis).
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Ordering key; higher sorts first.
    #[must_use]
    pub fn weight_score(&self) -> f64 {
        self.weight_score
    }

    /// The raw row, unchanged.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

fn millis_from_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

impl TryFrom<Value> for EventRecord {
    type Error = RecordError;

    fn try_from(row: Value) -> Result<Self, Self::Error> {
        Self::from_row(row)
    }
}

impl From<EventRecord> for Value {
    fn from(record: EventRecord) -> Self {
        record.payload
    }
}

/// Which upstream produced a snapshot.
///
/// Surfaced to the consumer only; the engine never branches on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Primary,
    Fallback,
    #[default]
    #[serde(other)]
    Unknown,
}

impl DataSource {
    /// Map an upstream label onto a source. Unrecognised labels are `Unknown`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "primary" => Self::Primary,
            "fallback" => Self::Fallback,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Ordered list of events: descending by weight, stable on ties, unique ids,
/// never longer than the cap it was built with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCollection {
    records: Vec<EventRecord>,
}

impl EventCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from a full snapshot.
    ///
    /// The first occurrence of an id wins, the result is stable-sorted by
    /// weight and truncated to `cap`.
    #[must_use]
    pub fn from_snapshot(records: Vec<EventRecord>, cap: usize) -> Self {
        let mut seen = std::collections::HashSet::with_capacity(records.len());
        let mut records: Vec<EventRecord> = records
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        sort_by_weight(&mut records);
        records.truncate(cap);
        Self { records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[EventRecord] {
        &self.records
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&EventRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Ids in collection order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<EventRecord> {
        self.records
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    pub(crate) fn records_mut(&mut self) -> &mut Vec<EventRecord> {
        &mut self.records
    }
}

impl<'a> IntoIterator for &'a EventCollection {
    type Item = &'a EventRecord;
    type IntoIter = std::slice::Iter<'a, EventRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Stable sort, highest weight first.
pub(crate) fn sort_by_weight(records: &mut [EventRecord]) {
    records.sort_by(|a, b| b.weight_score.total_cmp(&a.weight_score));
}
