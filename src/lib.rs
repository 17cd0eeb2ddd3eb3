//! # Event Sync
//!
//! Client-side synchronization engine for an ordered, capped collection of
//! event records.
//!
//! ## Architecture
//!
//! The engine keeps one in-memory collection consistent with three sources
//! while hiding latency and transient failure from the consumer:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Snapshot Cache                          │
//! │  • Last known-good snapshot, read once at start             │
//! │  • Fresh (< 5 min): served as is                            │
//! │  • Stale (< 30 min): served, revalidated in background      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Sync Controller (actor)                    │
//! │  • Sole owner of SyncState                                  │
//! │  • One fetch in flight; stale completions discarded         │
//! │  • Spinner only on a true cold start                        │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲                                        ▲
//!  (retry + backoff)                         (merge engine)
//!          │                                        │
//! ┌──────────────────────┐              ┌──────────────────────┐
//! │   Snapshot Fetcher   │              │   Real-time Stream   │
//! │  GET ?limit=N        │              │  INSERT/UPDATE/DELETE│
//! │  Cache-Control:      │              │  per table channel   │
//! │    no-store          │              │                      │
//! └──────────────────────┘              └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use event_sync::{FileStore, HttpSnapshotFetcher, LocalChannelHub, SyncConfig, SyncEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SyncConfig {
//!         endpoint: "https://dashboard.example/api/events".into(),
//!         ..Default::default()
//!     };
//!
//!     let fetcher = Arc::new(HttpSnapshotFetcher::new(config.endpoint.clone()).expect("endpoint"));
//!     let store = Arc::new(FileStore::open("./event-cache").await.expect("cache dir"));
//!     let hub = Arc::new(LocalChannelHub::new());
//!
//!     let handle = SyncEngine::new(config, fetcher, store, Some(hub.clone())).start().await;
//!
//!     let ready = handle.wait_for(|s| !s.loading).await.expect("engine running");
//!     println!("{} events from {}", ready.collection.len(), ready.data_source);
//!
//!     handle.stop().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`controller`]: The [`SyncEngine`] state machine and its [`SyncHandle`]
//! - [`cache`]: Snapshot cache codec and freshness rules
//! - [`storage`]: Key/value backends for the cache (memory, file)
//! - [`fetcher`]: Snapshot fetcher trait and HTTP implementation
//! - [`resilience`]: Retry with capped exponential backoff
//! - [`merge`]: Applying change notifications to a collection
//! - [`realtime`]: Change stream subscription seam
//! - [`metrics`]: `metrics`-crate instrumentation

pub mod config;
pub mod event;
pub mod notification;
pub mod merge;
pub mod storage;
pub mod cache;
pub mod fetcher;
pub mod resilience;
pub mod realtime;
pub mod controller;
pub mod metrics;

pub use config::SyncConfig;
pub use controller::{SyncEngine, SyncHandle, SyncState, SyncPhase, FetchMode, RefetchOutcome, EngineStopped};
pub use event::{EventRecord, EventCollection, DataSource, RecordError};
pub use notification::{ChangeNotification, RawChange, ProtocolError};
pub use merge::MergeOutcome;
pub use cache::{CacheEntry, SnapshotCache, Freshness, LoadedEntry};
pub use storage::{KeyValueStore, StorageError, InMemoryStore, FileStore};
pub use fetcher::{SnapshotFetcher, HttpSnapshotFetcher, Snapshot, FetchError};
pub use resilience::retry::{RetryConfig, RetryError};
pub use realtime::{RealtimeSource, Subscription, LocalChannelHub, RealtimeError};
pub use metrics::LatencyTimer;
