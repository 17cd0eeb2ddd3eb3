// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync controller.
//!
//! The [`SyncEngine`] ties the components together:
//! - snapshot cache (render-then-revalidate on start)
//! - snapshot fetcher behind the retry scheduler
//! - real-time change stream feeding the merge engine
//!
//! # Single writer
//!
//! After [`SyncEngine::start`] one task owns [`SyncState`]. Commands from
//! [`SyncHandle`], fetch completions, real-time changes and poll ticks all
//! arrive on that task's `select!` loop, so no two of them ever race to
//! write the collection.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use event_sync::{
//!     HttpSnapshotFetcher, InMemoryStore, LocalChannelHub, SyncConfig, SyncEngine, SyncPhase,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = SyncConfig {
//!     endpoint: "https://dashboard.example/api/events".into(),
//!     ..Default::default()
//! };
//! let fetcher = Arc::new(HttpSnapshotFetcher::new(config.endpoint.clone()).unwrap());
//! let hub = Arc::new(LocalChannelHub::new());
//!
//! let engine = SyncEngine::new(config, fetcher, Arc::new(InMemoryStore::new()), Some(hub));
//! assert_eq!(engine.state().phase, SyncPhase::Idle);
//!
//! let handle = engine.start().await;
//! let state = handle.state();
//! println!("{} events, loading={}", state.collection.len(), state.loading);
//! handle.stop().await;
//! # }
//! ```

mod types;
mod api;
mod fetch;
mod lifecycle;

pub use types::{SyncPhase, SyncState, FetchMode, RefetchOutcome, EngineStopped};
pub use api::SyncHandle;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheEntry, SnapshotCache};
use crate::config::SyncConfig;
use crate::fetcher::{FetchError, Snapshot, SnapshotFetcher};
use crate::realtime::{RealtimeSource, Subscription};
use crate::resilience::retry::{RetryConfig, RetryError};
use crate::storage::KeyValueStore;

/// Command queue depth between handles and the controller task.
const COMMAND_BUFFER: usize = 32;

/// A configured, not yet started engine.
pub struct SyncEngine {
    config: SyncConfig,
    fetcher: Arc<dyn SnapshotFetcher>,
    cache: SnapshotCache,
    realtime: Option<Arc<dyn RealtimeSource>>,
    state: watch::Sender<SyncState>,
}

impl SyncEngine {
    /// Create a new engine in the `Idle` phase.
    ///
    /// Call [`start()`](Self::start) to load the cache, kick off the first
    /// fetch if needed, and spawn the controller task.
    pub fn new(
        config: SyncConfig,
        fetcher: Arc<dyn SnapshotFetcher>,
        store: Arc<dyn KeyValueStore>,
        realtime: Option<Arc<dyn RealtimeSource>>,
    ) -> Self {
        let cache = SnapshotCache::new(
            store,
            config.cache_key.clone(),
            config.fresh_window(),
            config.stale_ceiling(),
        );
        let (state, _) = watch::channel(SyncState::default());

        Self {
            config,
            fetcher,
            cache,
            realtime,
            state,
        }
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state publication, starting now.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }
}

pub(crate) enum Command {
    Refetch {
        force: bool,
        ack: oneshot::Sender<RefetchOutcome>,
    },
    Stop,
}

/// Result of one fetch task, tagged with the generation that started it.
pub(crate) struct FetchCompletion {
    generation: u64,
    mode: FetchMode,
    result: Result<Snapshot, RetryError<FetchError>>,
}

struct InFlight {
    generation: u64,
    mode: FetchMode,
    cancel: CancellationToken,
}

/// The controller task's state. Only ever touched from that task.
pub(crate) struct SyncActor {
    config: SyncConfig,
    retry: RetryConfig,
    fetcher: Arc<dyn SnapshotFetcher>,
    cache: SnapshotCache,
    realtime: Option<Arc<dyn RealtimeSource>>,

    state: watch::Sender<SyncState>,
    commands: mpsc::Receiver<Command>,

    completions_tx: mpsc::UnboundedSender<FetchCompletion>,
    completions_rx: mpsc::UnboundedReceiver<FetchCompletion>,
    in_flight: Option<InFlight>,
    generation: u64,

    subscription: Option<Subscription>,
    poll: Option<Interval>,

    /// Latest snapshot awaiting persistence (latest wins)
    persist_tx: watch::Sender<Option<CacheEntry>>,
    persister: JoinHandle<()>,

    /// Parent of every fetch's cancellation token
    shutdown: CancellationToken,
}
