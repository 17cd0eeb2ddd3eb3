//! Property-based tests for the merge engine and the wire decoders.
//!
//! Uses proptest to generate random collections, change sequences, and
//! malformed inputs, and checks the collection invariants hold and decoding
//! never panics.
//!
//! Run with: `cargo test --test proptest_merge`

use std::collections::HashSet;

use proptest::prelude::*;
use serde_json::{json, Value};

use event_sync::fetcher::decode_snapshot;
use event_sync::merge::{apply, apply_in_place};
use event_sync::{CacheEntry, ChangeNotification, EventCollection, EventRecord, MergeOutcome, RawChange};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Small id space so inserts, updates and deletes collide often.
fn id_strategy() -> impl Strategy<Value = String> {
    (0u8..24).prop_map(|n| format!("evt-{n}"))
}

/// Integer weights produce plenty of ties.
fn record_strategy() -> impl Strategy<Value = EventRecord> {
    (id_strategy(), 0u8..8, any::<i32>()).prop_map(|(id, weight, ts)| {
        EventRecord::from_row(json!({
            "id": id,
            "weight_score": f64::from(weight),
            "timestamp": i64::from(ts),
        }))
        .unwrap()
    })
}

fn snapshot_strategy() -> impl Strategy<Value = Vec<EventRecord>> {
    prop::collection::vec(record_strategy(), 0..40)
}

/// Inserts and deletes only: the operations that keep weight order.
fn ordered_change_strategy() -> impl Strategy<Value = ChangeNotification> {
    prop_oneof![
        3 => record_strategy().prop_map(ChangeNotification::Insert),
        1 => id_strategy().prop_map(ChangeNotification::Delete),
    ]
}

fn change_strategy() -> impl Strategy<Value = ChangeNotification> {
    prop_oneof![
        3 => record_strategy().prop_map(ChangeNotification::Insert),
        2 => (id_strategy(), record_strategy()).prop_map(|(id, r)| ChangeNotification::Update(id, r)),
        1 => id_strategy().prop_map(ChangeNotification::Delete),
    ]
}

/// Arbitrary JSON values (including invalid structures).
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,   // depth
        64,  // max nodes
        10,  // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map("[a-z_]{1,12}", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn assert_unique(collection: &EventCollection) -> Result<(), TestCaseError> {
    let mut seen = HashSet::new();
    for record in collection {
        prop_assert!(seen.insert(record.id()), "duplicate id {}", record.id());
    }
    Ok(())
}

fn assert_weight_order(collection: &EventCollection) -> Result<(), TestCaseError> {
    let weights: Vec<f64> = collection.iter().map(EventRecord::weight_score).collect();
    for pair in weights.windows(2) {
        prop_assert!(pair[0] >= pair[1], "out of order: {:?}", weights);
    }
    Ok(())
}

// =============================================================================
// Snapshot Invariants
// =============================================================================

proptest! {
    /// A snapshot becomes a unique, weight-ordered, capped collection.
    #[test]
    fn prop_snapshot_is_unique_sorted_capped(records in snapshot_strategy(), cap in 1usize..30) {
        let collection = EventCollection::from_snapshot(records, cap);

        prop_assert!(collection.len() <= cap);
        assert_unique(&collection)?;
        assert_weight_order(&collection)?;
    }

    /// Duplicate ids in a snapshot keep the first occurrence.
    #[test]
    fn prop_snapshot_first_duplicate_wins(records in snapshot_strategy()) {
        let collection = EventCollection::from_snapshot(records.clone(), usize::MAX);

        for record in &collection {
            let first = records.iter().find(|r| r.id() == record.id()).unwrap();
            prop_assert_eq!(record, first);
        }
    }
}

// =============================================================================
// Merge Invariants
// =============================================================================

proptest! {
    /// No sequence of changes ever produces duplicate ids or exceeds the cap.
    #[test]
    fn prop_changes_keep_ids_unique_and_capped(
        records in snapshot_strategy(),
        changes in prop::collection::vec(change_strategy(), 0..60),
        cap in 1usize..30,
    ) {
        let mut collection = EventCollection::from_snapshot(records, cap);
        for change in &changes {
            apply_in_place(&mut collection, change, cap);
            prop_assert!(collection.len() <= cap);
            assert_unique(&collection)?;
        }
    }

    /// Inserts and deletes keep the collection ordered by weight.
    #[test]
    fn prop_inserts_and_deletes_keep_weight_order(
        records in snapshot_strategy(),
        changes in prop::collection::vec(ordered_change_strategy(), 0..60),
        cap in 1usize..30,
    ) {
        let mut collection = EventCollection::from_snapshot(records, cap);
        for change in &changes {
            apply_in_place(&mut collection, change, cap);
            assert_weight_order(&collection)?;
        }
    }

    /// Applying the same insert twice is the same as applying it once.
    #[test]
    fn prop_insert_is_idempotent(
        records in snapshot_strategy(),
        record in record_strategy(),
        cap in 1usize..30,
    ) {
        let collection = EventCollection::from_snapshot(records, cap);
        let note = ChangeNotification::Insert(record);

        let once = apply(collection, &note, cap);
        let mut twice = once.clone();
        let outcome = apply_in_place(&mut twice, &note, cap);

        prop_assert_eq!(&once, &twice);
        if once.contains(note.id()) {
            prop_assert_eq!(outcome, MergeOutcome::Ignored);
        }
    }

    /// Deleting is idempotent and an absent id is a no-op.
    #[test]
    fn prop_delete_is_idempotent(records in snapshot_strategy(), id in id_strategy()) {
        let collection = EventCollection::from_snapshot(records, 100);
        let held = collection.contains(&id);
        let note = ChangeNotification::Delete(id.clone());

        let once = apply(collection.clone(), &note, 100);
        prop_assert!(!once.contains(&id));
        prop_assert_eq!(once.len() + usize::from(held), collection.len());

        let twice = apply(once.clone(), &note, 100);
        prop_assert_eq!(once, twice);
    }

    /// Updates never change the length or the position of the target.
    #[test]
    fn prop_update_replaces_in_place(records in snapshot_strategy(), replacement in record_strategy()) {
        let collection = EventCollection::from_snapshot(records, 100);
        prop_assume!(!collection.is_empty());
        let target = collection.as_slice()[collection.len() / 2].id().to_string();
        let position = collection.iter().position(|r| r.id() == target).unwrap();

        let mut updated = collection.clone();
        let outcome = apply_in_place(
            &mut updated,
            &ChangeNotification::Update(target, replacement.clone()),
            100,
        );

        prop_assert_eq!(updated.len(), collection.len());
        if outcome == MergeOutcome::Updated {
            prop_assert_eq!(&updated.as_slice()[position], &replacement);
        } else {
            prop_assert_eq!(updated, collection);
        }
    }
}

// =============================================================================
// Decoding Fuzz Tests
// =============================================================================

proptest! {
    /// Change messages from arbitrary JSON either convert or fail cleanly.
    #[test]
    fn fuzz_raw_change_from_arbitrary_json(
        event_type in prop_oneof![
            Just("INSERT".to_string()),
            Just("UPDATE".to_string()),
            Just("DELETE".to_string()),
            ".{0,10}",
        ],
        new in arbitrary_json_strategy(),
        old in arbitrary_json_strategy(),
    ) {
        let raw = json!({ "eventType": event_type, "new": new, "old": old });
        if let Ok(change) = serde_json::from_value::<RawChange>(raw) {
            let _ = ChangeNotification::try_from(change);
        }
    }

    /// Snapshot bodies: random bytes never panic the decoder.
    #[test]
    fn fuzz_snapshot_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..4096)) {
        let _ = decode_snapshot(&bytes);
    }

    /// Snapshot bodies: rows without an id are dropped, never fatal.
    #[test]
    fn fuzz_snapshot_rows(items in prop::collection::vec(arbitrary_json_strategy(), 0..20)) {
        let body = serde_json::to_vec(&json!({ "items": items })).unwrap();
        let snapshot = decode_snapshot(&body).unwrap();
        prop_assert!(snapshot.events.len() <= items.len());
    }

    /// Corrupted cache blobs fail cleanly.
    #[test]
    fn fuzz_corrupted_cache_entry(
        records in snapshot_strategy(),
        corruption in prop::collection::vec(any::<u8>(), 1..50),
        position in 0usize..10000,
    ) {
        let entry = CacheEntry::new(EventCollection::from_snapshot(records, 100), Default::default());
        let mut corrupted = serde_json::to_vec(&entry).unwrap();
        let pos = position % corrupted.len();
        for (i, b) in corruption.iter().enumerate() {
            let idx = (pos + i) % corrupted.len();
            corrupted[idx] ^= b;
        }

        let _ = serde_json::from_slice::<CacheEntry>(&corrupted);
    }
}
