// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot cache: the last known-good collection, persisted.
//!
//! The cache is a single JSON blob under a fixed key:
//!
//! ```text
//! { "events": [ row, ... ], "timestamp": <captured_at ms>, "source": "primary" }
//! ```
//!
//! # Freshness
//!
//! ```text
//!  age < fresh_window            → Fresh  (served, no revalidation)
//!  fresh_window ≤ age ≤ ceiling  → Stale  (served, revalidated in background)
//!  age > stale_ceiling           → absent (evicted)
//! ```
//!
//! Nothing here ever fails loudly. Unreadable blobs are deleted and reported
//! as absent; failed writes are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::{now_millis, DataSource, EventCollection};
use crate::storage::KeyValueStore;

/// One persisted snapshot. Always replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub events: EventCollection,
    #[serde(rename = "timestamp")]
    pub captured_at: i64,
    #[serde(default)]
    pub source: DataSource,
}

impl CacheEntry {
    pub fn new(events: EventCollection, source: DataSource) -> Self {
        Self {
            events,
            captured_at: now_millis(),
            source,
        }
    }

    /// Age relative to `now` (epoch millis). Entries from the future read as age 0.
    #[must_use]
    pub fn age_at(&self, now: i64) -> Duration {
        Duration::from_millis(now.saturating_sub(self.captured_at).max(0) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// A cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedEntry {
    pub entry: CacheEntry,
    pub freshness: Freshness,
}

impl LoadedEntry {
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }
}

/// Reads and writes [`CacheEntry`] blobs through a [`KeyValueStore`].
#[derive(Clone)]
pub struct SnapshotCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
    fresh_window: Duration,
    stale_ceiling: Duration,
}

impl SnapshotCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        fresh_window: Duration,
        stale_ceiling: Duration,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            fresh_window,
            stale_ceiling,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the entry as of the current time.
    pub async fn load(&self) -> Option<LoadedEntry> {
        self.load_at(now_millis()).await
    }

    /// Load the entry as of `now` (epoch millis).
    #[tracing::instrument(skip(self), fields(key = %self.key))]
    pub async fn load_at(&self, now: i64) -> Option<LoadedEntry> {
        let bytes = match self.store.get(&self.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("Cache miss");
                crate::metrics::record_cache_load("miss");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Cache read failed, treating as miss");
                crate::metrics::record_cache_load("error");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, bytes = bytes.len(), "Cache blob unreadable, deleting");
                crate::metrics::record_cache_load("corrupt");
                self.evict().await;
                return None;
            }
        };

        let age = entry.age_at(now);
        if age > self.stale_ceiling {
            debug!(age_ms = age.as_millis() as u64, "Cache entry past stale ceiling, evicting");
            crate::metrics::record_cache_load("expired");
            self.evict().await;
            return None;
        }

        let freshness = if age < self.fresh_window {
            Freshness::Fresh
        } else {
            Freshness::Stale
        };
        debug!(
            age_ms = age.as_millis() as u64,
            events = entry.events.len(),
            ?freshness,
            "Cache hit"
        );
        crate::metrics::record_cache_load(match freshness {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
        });

        Some(LoadedEntry { entry, freshness })
    }

    /// Persist `entry`, replacing whatever was there. Best effort.
    #[tracing::instrument(skip(self, entry), fields(key = %self.key, events = entry.events.len()))]
    pub async fn save(&self, entry: &CacheEntry) {
        let bytes = match serde_json::to_vec(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Cache entry failed to serialize, skipping write");
                crate::metrics::record_cache_write(false);
                return;
            }
        };

        match self.store.put(&self.key, &bytes).await {
            Ok(()) => {
                debug!(bytes = bytes.len(), "Cache entry written");
                crate::metrics::record_cache_write(true);
            }
            Err(e) => {
                warn!(error = %e, "Cache write rejected, keeping in-memory state only");
                crate::metrics::record_cache_write(false);
            }
        }
    }

    async fn evict(&self) {
        if let Err(e) = self.store.delete(&self.key).await {
            warn!(error = %e, "Cache eviction failed");
        }
    }
}
