// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change notifications from the real-time stream.
//!
//! The transport delivers [`RawChange`] messages shaped like a database
//! change feed:
//!
//! ```text
//! { "eventType": "INSERT" | "UPDATE" | "DELETE", "new": { row }, "old": { row } }
//! ```
//!
//! The controller converts each one into a typed [`ChangeNotification`]
//! before it reaches the merge step. A message that cannot be converted is a
//! protocol error: it is dropped on its own and the subscription stays up.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::event::{EventRecord, RecordError};

/// A typed change to the live collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeNotification {
    Insert(EventRecord),
    Update(String, EventRecord),
    Delete(String),
}

impl ChangeNotification {
    /// Id of the record this notification targets.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Insert(record) => record.id(),
            Self::Update(id, _) | Self::Delete(id) => id,
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(..) => "update",
            Self::Delete(_) => "delete",
        }
    }
}

/// A malformed real-time message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown change type '{0}'")]
    UnknownType(String),
    #[error("change carries no usable record: {0}")]
    BadRecord(#[from] RecordError),
    #[error("delete carries no record id")]
    MissingDeleteId,
}

/// Wire shape of a change message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    #[serde(rename = "eventType", alias = "event_type", alias = "type")]
    pub event_type: String,
    #[serde(default)]
    pub new: Value,
    #[serde(default)]
    pub old: Value,
}

impl RawChange {
    pub fn insert(row: Value) -> Self {
        Self {
            event_type: "INSERT".into(),
            new: row,
            old: Value::Null,
        }
    }

    pub fn update(row: Value) -> Self {
        Self {
            event_type: "UPDATE".into(),
            new: row,
            old: Value::Null,
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            event_type: "DELETE".into(),
            new: Value::Null,
            old: serde_json::json!({ "id": id.into() }),
        }
    }
}

impl TryFrom<RawChange> for ChangeNotification {
    type Error = ProtocolError;

    fn try_from(raw: RawChange) -> Result<Self, Self::Error> {
        match raw.event_type.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert(EventRecord::from_row(raw.new)?)),
            "UPDATE" => {
                let fallback_id = row_id(&raw.old);
                let record = match EventRecord::from_row(raw.new.clone()) {
                    Ok(record) => record,
                    // Some feeds only put the key columns in `old`.
                    Err(RecordError::MissingId) if fallback_id.is_some() => {
                        let mut row = raw.new;
                        if let (Some(fields), Some(id)) = (row.as_object_mut(), fallback_id.clone()) {
                            fields.insert("id".into(), Value::String(id));
                        }
                        EventRecord::from_row(row)?
                    }
                    Err(e) => return Err(e.into()),
                };
                let id = record.id().to_string();
                Ok(Self::Update(id, record))
            }
            "DELETE" => row_id(&raw.old)
                .or_else(|| row_id(&raw.new))
                .map(Self::Delete)
                .ok_or(ProtocolError::MissingDeleteId),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

fn row_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
