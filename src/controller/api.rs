//! Consumer-facing handle to a running engine.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use super::{Command, EngineStopped, RefetchOutcome, SyncState};

/// Handle to a started engine.
///
/// Dropping the handle stops the engine as well; [`stop()`](Self::stop)
/// additionally waits for teardown (including the final cache write).
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SyncState>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub(super) fn new(
        commands: mpsc::Sender<Command>,
        state: watch::Receiver<SyncState>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            commands,
            state,
            task,
        }
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Receiver for state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SyncState) -> bool,
    ) -> Result<SyncState, EngineStopped> {
        let mut rx = self.state.clone();
        let state = rx.wait_for(|s| predicate(s)).await.map_err(|_| EngineStopped)?;
        Ok(state.clone())
    }

    /// Ask for a fresh snapshot.
    ///
    /// Silent (background) when a collection is already held, foreground
    /// otherwise. Folded into the running fetch if there is one.
    pub async fn refetch(&self) -> Result<RefetchOutcome, EngineStopped> {
        self.send_refetch(false).await
    }

    /// Like [`refetch()`](Self::refetch), but a running fetch is superseded:
    /// its backoff is cancelled and its result, if any, discarded.
    pub async fn force_refetch(&self) -> Result<RefetchOutcome, EngineStopped> {
        self.send_refetch(true).await
    }

    async fn send_refetch(&self, force: bool) -> Result<RefetchOutcome, EngineStopped> {
        let (ack, outcome) = oneshot::channel();
        self.commands
            .send(Command::Refetch { force, ack })
            .await
            .map_err(|_| EngineStopped)?;
        outcome.await.map_err(|_| EngineStopped)
    }

    /// Whether the controller task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the engine and wait for teardown to finish.
    pub async fn stop(self) {
        let _ = self.commands.send(Command::Stop).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Controller task ended abnormally");
        }
    }
}
