// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Merge engine: applies one [`ChangeNotification`] to a collection.
//!
//! Rules:
//! - **Insert**: ignored if the id is already present. Otherwise the record is
//!   prepended, the collection is stable-sorted by weight, then truncated.
//! - **Update**: replaces the matching record where it stands. Updates never
//!   create records and never resort.
//! - **Delete**: removes the matching record if present.
//!
//! Every rule is idempotent, so a redelivered notification is harmless.
//!
//! ```
//! use event_sync::{merge, ChangeNotification, EventCollection, EventRecord};
//! use serde_json::json;
//!
//! let r = EventRecord::from_row(json!({"id": "a", "weight_score": 1})).unwrap();
//! let once = merge::apply(EventCollection::new(), &ChangeNotification::Insert(r.clone()), 10);
//! let twice = merge::apply(once.clone(), &ChangeNotification::Insert(r), 10);
//! assert_eq!(once, twice);
//! ```

use crate::event::{sort_by_weight, EventCollection};
use crate::notification::ChangeNotification;

/// What a merge did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    /// Inserted, but the new record sorted past the cap and was dropped.
    /// The resort may still have moved records whose weight drifted.
    Evicted,
    Updated,
    Deleted,
    /// Nothing changed (duplicate insert, unknown id, conflicting update).
    Ignored,
}

impl MergeOutcome {
    #[must_use]
    pub fn changed(self) -> bool {
        !matches!(self, Self::Ignored)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Evicted => "evicted",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Ignored => "ignored",
        }
    }
}

/// Apply `note` and return the resulting collection.
#[must_use]
pub fn apply(mut collection: EventCollection, note: &ChangeNotification, cap: usize) -> EventCollection {
    apply_in_place(&mut collection, note, cap);
    collection
}

/// Apply `note` to `collection` directly.
pub fn apply_in_place(
    collection: &mut EventCollection,
    note: &ChangeNotification,
    cap: usize,
) -> MergeOutcome {
    match note {
        ChangeNotification::Insert(record) => {
            if collection.contains(record.id()) {
                return MergeOutcome::Ignored;
            }
            let records = collection.records_mut();
            records.insert(0, record.clone());
            sort_by_weight(records);
            records.truncate(cap);
            if records.iter().any(|r| r.id() == record.id()) {
                MergeOutcome::Inserted
            } else {
                MergeOutcome::Evicted
            }
        }
        ChangeNotification::Update(id, record) => {
            let Some(pos) = collection.position(id) else {
                return MergeOutcome::Ignored;
            };
            // An update that renames onto another live id would break uniqueness.
            if record.id() != id {
                if let Some(other) = collection.position(record.id()) {
                    if other != pos {
                        return MergeOutcome::Ignored;
                    }
                }
            }
            collection.records_mut()[pos] = record.clone();
            MergeOutcome::Updated
        }
        ChangeNotification::Delete(id) => match collection.position(id) {
            Some(pos) => {
                collection.records_mut().remove(pos);
                MergeOutcome::Deleted
            }
            None => MergeOutcome::Ignored,
        },
    }
}
