// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot fetcher: one round trip to the snapshot endpoint.
//!
//! A fetcher never retries and never caches; both are the engine's job.
//! [`HttpSnapshotFetcher`] always sends `Cache-Control: no-store` so an HTTP
//! cache in between cannot hand back an old snapshot.
//!
//! # Wire format
//!
//! ```text
//! GET {endpoint}?limit=N
//! 200 { "items": [ row, ... ], "meta": { "source": "primary" } }
//! ```

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::event::{DataSource, EventRecord};

/// A transient snapshot failure. Every variant feeds the backoff sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("snapshot request failed: {0}")]
    Transport(String),
    #[error("snapshot endpoint returned status {0}")]
    Status(u16),
    #[error("snapshot body malformed: {0}")]
    Decode(String),
    #[error("snapshot attempt timed out")]
    Timeout,
}

impl From<tokio::time::error::Elapsed> for FetchError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        FetchError::Timeout
    }
}

/// One fetched snapshot, in upstream order.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub events: Vec<EventRecord>,
    pub source: DataSource,
}

#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch up to `limit` events. Must not retry internally.
    async fn fetch(&self, limit: usize) -> Result<Snapshot, FetchError>;
}

#[derive(Debug, Deserialize)]
struct WireSnapshot {
    items: Vec<Value>,
    #[serde(default)]
    meta: Option<WireMeta>,
}

#[derive(Debug, Deserialize)]
struct WireMeta {
    #[serde(default)]
    source: Option<String>,
}

/// Decode a snapshot response body.
///
/// Rows without a usable id are dropped; the rest of the snapshot stands.
pub fn decode_snapshot(body: &[u8]) -> Result<Snapshot, FetchError> {
    let wire: WireSnapshot =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    let total = wire.items.len();
    let events: Vec<EventRecord> = wire
        .items
        .into_iter()
        .filter_map(|row| match EventRecord::from_row(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Dropping snapshot row");
                None
            }
        })
        .collect();
    if events.len() < total {
        debug!(kept = events.len(), total, "Snapshot had unusable rows");
    }

    let source = wire
        .meta
        .and_then(|m| m.source)
        .map_or(DataSource::Unknown, |label| DataSource::from_label(&label));

    Ok(Snapshot { events, source })
}

/// Fetches snapshots over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSnapshotFetcher {
    client: Client,
    endpoint: String,
}

impl HttpSnapshotFetcher {
    /// Creates a fetcher for the given endpoint URL
    /// (e.g. `https://dashboard.example/api/events`).
    pub fn new(endpoint: impl Into<String>) -> Result<Self, FetchError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(FetchError::Transport(
                "snapshot endpoint must not be empty".to_string(),
            ));
        }
        let client = Client::builder()
            .build()
            .map_err(|err| FetchError::Transport(format!("http client build failed: {err}")))?;
        Ok(Self { client, endpoint })
    }

    /// Use a preconfigured client (proxies, TLS roots, default headers).
    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch(&self, limit: usize) -> Result<Snapshot, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("limit", limit)])
            .header(CACHE_CONTROL, "no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::Transport(format!("body read failed: {err}")))?;
        let snapshot = decode_snapshot(&body)?;
        debug!(events = snapshot.events.len(), source = %snapshot.source, "Snapshot fetched");
        Ok(snapshot)
    }
}
