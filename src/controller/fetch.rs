//! Fetch scheduling: the in-flight guard, retries, and applying results.
//!
//! At most one fetch runs per engine. Each fetch gets a generation number
//! and a child cancellation token; a completion is applied only if its
//! generation is still the current one, so a superseded or torn-down fetch
//! can finish but never writes state.

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cache::CacheEntry;
use crate::event::EventCollection;
use crate::metrics::LatencyTimer;
use crate::resilience::retry::{retry, RetryError};

use super::{FetchCompletion, FetchMode, InFlight, RefetchOutcome, SyncActor, SyncPhase};

impl SyncActor {
    /// Manual refetch: silent if there is something on screen, loud otherwise.
    pub(super) fn refetch(&mut self, force: bool) -> RefetchOutcome {
        let mode = if self.collection_is_empty() {
            FetchMode::Foreground
        } else {
            FetchMode::Background
        };
        self.request_fetch(mode, force)
    }

    /// Start a fetch unless one is already running.
    ///
    /// `force` supersedes the running fetch instead of coalescing into it.
    pub(super) fn request_fetch(&mut self, mode: FetchMode, force: bool) -> RefetchOutcome {
        if let Some(current) = &self.in_flight {
            if !force {
                debug!(
                    requested = mode.as_str(),
                    running = current.mode.as_str(),
                    generation = current.generation,
                    "Fetch already in flight, coalescing"
                );
                crate::metrics::record_fetch_coalesced();
                return RefetchOutcome::Coalesced;
            }
            info!(generation = current.generation, "Superseding in-flight fetch");
            current.cancel.cancel();
        }

        self.generation += 1;
        let generation = self.generation;
        let cancel = self.shutdown.child_token();

        let fetcher = self.fetcher.clone();
        let config = self.retry.clone();
        let limit = self.config.limit;
        let completions = self.completions_tx.clone();
        let token = cancel.clone();

        let span = info_span!("snapshot_fetch", generation, mode = mode.as_str(), limit);
        tokio::spawn(
            async move {
                let _timer = LatencyTimer::new(mode.as_str());
                let result = retry(mode.operation_name(), &config, &token, || fetcher.fetch(limit)).await;

                // Superseded or torn down: nobody wants this result.
                if token.is_cancelled() {
                    debug!("Dropping completion of cancelled fetch");
                    return;
                }
                let _ = completions.send(FetchCompletion {
                    generation,
                    mode,
                    result,
                });
            }
            .instrument(span),
        );

        debug!(generation, mode = mode.as_str(), "Fetch started");
        self.in_flight = Some(InFlight {
            generation,
            mode,
            cancel,
        });
        self.update(|s| {
            s.in_flight = true;
            s.loading = mode == FetchMode::Foreground;
            s.revalidating = mode == FetchMode::Background;
        });

        RefetchOutcome::Started(mode)
    }

    /// Apply a finished fetch, if it is still the current one.
    pub(super) async fn on_fetch_complete(&mut self, done: FetchCompletion) {
        let current = self.in_flight.as_ref().map(|f| f.generation);
        if current != Some(done.generation) {
            debug!(
                generation = done.generation,
                current = ?current,
                "Discarding completion of superseded fetch"
            );
            crate::metrics::record_fetch_result(done.mode.as_str(), "discarded");
            return;
        }
        self.in_flight = None;

        match done.result {
            Ok(snapshot) => {
                let collection = EventCollection::from_snapshot(snapshot.events, self.config.limit);
                let entry = CacheEntry::new(collection.clone(), snapshot.source);
                let captured_at = entry.captured_at;
                let size = collection.len();

                self.update(|s| {
                    s.collection = collection;
                    s.data_source = snapshot.source;
                    s.last_updated = Some(captured_at);
                    s.error = None;
                    s.loading = false;
                    s.revalidating = false;
                    s.in_flight = false;
                    s.retry_count = 0;
                });
                self.set_phase(SyncPhase::Ready);
                self.persist(entry);

                info!(
                    events = size,
                    source = %snapshot.source,
                    mode = done.mode.as_str(),
                    "Snapshot applied"
                );
                crate::metrics::record_fetch_result(done.mode.as_str(), "success");
                crate::metrics::set_collection_size(size);

                self.attach_realtime().await;
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                // Partial data over no data: only a cold start with nothing
                // to show is allowed to surface the failure.
                let surface = done.mode == FetchMode::Foreground && self.collection_is_empty();
                self.update(|s| {
                    s.loading = false;
                    s.revalidating = false;
                    s.in_flight = false;
                    s.retry_count = u32::try_from(attempts).unwrap_or(u32::MAX);
                    if surface {
                        s.error = Some(last.to_string());
                    }
                });

                if surface {
                    self.set_phase(SyncPhase::Error);
                    error!(attempts, error = %last, "Snapshot fetch failed with nothing to show");
                } else {
                    warn!(
                        attempts,
                        error = %last,
                        mode = done.mode.as_str(),
                        "Snapshot fetch failed, keeping current data"
                    );
                }
                crate::metrics::record_fetch_result(done.mode.as_str(), "exhausted");
            }
            Err(RetryError::Cancelled) => {
                self.update(|s| {
                    s.loading = false;
                    s.revalidating = false;
                    s.in_flight = false;
                });
                crate::metrics::record_fetch_result(done.mode.as_str(), "cancelled");
            }
        }
    }
}
