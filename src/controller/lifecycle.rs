//! Controller lifecycle: start, main loop, teardown.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, SnapshotCache};
use crate::event::{now_millis, EventCollection};
use crate::merge::{self, MergeOutcome};
use crate::notification::{ChangeNotification, RawChange};
use crate::realtime::Subscription;

use super::{Command, FetchMode, SyncActor, SyncEngine, SyncHandle, SyncPhase, SyncState, COMMAND_BUFFER};

impl SyncEngine {
    /// Start the engine.
    ///
    /// Startup flow:
    /// 1. `Idle → Initializing`
    /// 2. Read the snapshot cache
    ///    - hit → publish the cached collection and enter `Ready` before this
    ///      returns (no loading flash); stale hits also start a silent
    ///      background fetch
    ///    - miss → raise `loading` and start a foreground fetch
    /// 3. Attach the real-time stream once `Ready`
    /// 4. Spawn the controller task and hand back its [`SyncHandle`]
    #[tracing::instrument(skip(self), fields(cache_key = %self.config.cache_key, limit = self.config.limit))]
    pub async fn start(self) -> SyncHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let state_rx = self.state.subscribe();

        let mut actor = SyncActor::new(self, command_rx);
        actor.initialize().await;
        let task = tokio::spawn(actor.run());

        SyncHandle::new(command_tx, state_rx, task)
    }
}

impl SyncActor {
    fn new(engine: SyncEngine, commands: mpsc::Receiver<Command>) -> Self {
        let SyncEngine {
            config,
            fetcher,
            cache,
            realtime,
            state,
        } = engine;

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (persist_tx, persist_rx) = watch::channel(None);
        let persister = tokio::spawn(persist_loop(cache.clone(), persist_rx));

        let poll = config.poll_interval().map(poll_timer);

        Self {
            retry: config.retry_config(),
            config,
            fetcher,
            realtime,
            state,
            commands,
            completions_tx,
            completions_rx,
            in_flight: None,
            generation: 0,
            subscription: None,
            poll,
            persist_tx,
            persister,
            shutdown: CancellationToken::new(),
            cache,
        }
    }

    /// Apply `f` to the published state.
    pub(super) fn update(&self, f: impl FnOnce(&mut SyncState)) {
        self.state.send_modify(f);
    }

    pub(super) fn set_phase(&self, phase: SyncPhase) {
        let changed = self.state.send_if_modified(|s| {
            if s.phase == phase {
                return false;
            }
            s.phase = phase;
            true
        });
        if changed {
            debug!(%phase, "Phase changed");
            crate::metrics::set_engine_phase(&phase.to_string());
        }
    }

    pub(super) fn collection_is_empty(&self) -> bool {
        self.state.borrow().collection.is_empty()
    }

    async fn initialize(&mut self) {
        self.set_phase(SyncPhase::Initializing);

        match self.cache.load().await {
            Some(hit) => {
                let fresh = hit.is_fresh();
                let entry = hit.entry;
                let collection = EventCollection::from_snapshot(entry.events.into_vec(), self.config.limit);
                info!(
                    events = collection.len(),
                    source = %entry.source,
                    fresh,
                    "Serving cached snapshot"
                );
                crate::metrics::set_collection_size(collection.len());
                self.update(|s| {
                    s.collection = collection;
                    s.data_source = entry.source;
                    s.last_updated = Some(entry.captured_at);
                    s.loading = false;
                });
                self.set_phase(SyncPhase::Ready);
                self.attach_realtime().await;
                if !fresh {
                    self.request_fetch(FetchMode::Background, false);
                }
            }
            None => {
                info!("No usable cached snapshot, fetching");
                self.request_fetch(FetchMode::Foreground, false);
            }
        }
    }

    /// Attach the real-time stream if enabled and not already attached.
    pub(super) async fn attach_realtime(&mut self) {
        if !self.config.realtime_enabled || self.subscription.is_some() {
            return;
        }
        let Some(source) = self.realtime.clone() else {
            debug!("Realtime enabled but no source configured");
            return;
        };

        match source.subscribe(&self.config.realtime_channel).await {
            Ok(subscription) => {
                info!(channel = subscription.channel(), "Realtime stream attached");
                self.subscription = Some(subscription);
                self.update(|s| s.realtime_attached = true);
                crate::metrics::set_realtime_attached(true);
            }
            Err(e) => {
                warn!(
                    error = %e,
                    polling = self.poll.is_some(),
                    "Realtime subscribe failed, continuing without live updates"
                );
            }
        }
    }

    /// Poll only while ready and not receiving live changes.
    fn polling_active(&self) -> bool {
        self.poll.is_some()
            && self.subscription.is_none()
            && self.state.borrow().phase == SyncPhase::Ready
    }

    /// Run the main event loop until stopped.
    async fn run(mut self) {
        debug!("Controller task running");

        loop {
            let polling = self.polling_active();
            let listening = self.subscription.is_some();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Refetch { force, ack }) => {
                        let outcome = self.refetch(force);
                        let _ = ack.send(outcome);
                    }
                    Some(Command::Stop) | None => break,
                },

                Some(done) = self.completions_rx.recv() => {
                    self.on_fetch_complete(done).await;
                }

                change = next_change(&mut self.subscription), if listening => {
                    self.on_change(change);
                }

                _ = next_tick(&mut self.poll), if polling => {
                    debug!("Poll tick");
                    self.request_fetch(FetchMode::Background, false);
                }
            }
        }

        self.teardown().await;
    }

    /// Handle one message from the real-time stream.
    fn on_change(&mut self, change: Option<RawChange>) {
        let Some(raw) = change else {
            warn!("Realtime stream closed");
            self.subscription = None;
            self.update(|s| s.realtime_attached = false);
            crate::metrics::set_realtime_attached(false);
            return;
        };

        let note = match ChangeNotification::try_from(raw) {
            Ok(note) => note,
            Err(e) => {
                warn!(error = %e, "Dropping malformed realtime change");
                crate::metrics::record_notification_dropped();
                return;
            }
        };

        let limit = self.config.limit;
        let mut outcome = MergeOutcome::Ignored;
        let mut size = 0;
        self.state.send_if_modified(|s| {
            outcome = merge::apply_in_place(&mut s.collection, &note, limit);
            size = s.collection.len();
            if outcome.changed() {
                s.last_updated = Some(now_millis());
            }
            outcome.changed()
        });

        debug!(kind = note.kind(), id = note.id(), outcome = outcome.as_str(), "Realtime change merged");
        crate::metrics::record_merge(note.kind(), outcome.as_str());
        crate::metrics::set_collection_size(size);
    }

    /// Persist `entry` off the controller task.
    pub(super) fn persist(&self, entry: CacheEntry) {
        self.persist_tx.send_replace(Some(entry));
    }

    /// Teardown: unsubscribe, cancel pending retries, flush the persister.
    async fn teardown(mut self) {
        info!("Stopping sync engine");

        self.shutdown.cancel();
        if let Some(in_flight) = self.in_flight.take() {
            debug!(
                generation = in_flight.generation,
                mode = in_flight.mode.as_str(),
                "Abandoning in-flight fetch"
            );
        }
        if let Some(subscription) = self.subscription.take() {
            debug!(channel = subscription.channel(), "Realtime stream detached");
            crate::metrics::set_realtime_attached(false);
        }
        self.completions_rx.close();
        self.update(|s| {
            s.loading = false;
            s.revalidating = false;
            s.in_flight = false;
            s.realtime_attached = false;
        });

        let Self {
            persist_tx,
            persister,
            ..
        } = self;
        drop(persist_tx);
        if let Err(e) = persister.await {
            warn!(error = %e, "Cache persister task failed");
        }

        info!("Sync engine stopped");
    }
}

/// Writes each newly published snapshot, in order, until the sender is gone.
async fn persist_loop(cache: SnapshotCache, mut rx: watch::Receiver<Option<CacheEntry>>) {
    while rx.changed().await.is_ok() {
        let entry = rx.borrow_and_update().clone();
        if let Some(entry) = entry {
            cache.save(&entry).await;
        }
    }
}

fn poll_timer(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn next_change(subscription: &mut Option<Subscription>) -> Option<RawChange> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
