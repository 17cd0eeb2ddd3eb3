//! Public types for the sync controller.

use thiserror::Error;

use crate::event::{DataSource, EventCollection};

/// Controller lifecycle phase.
///
/// ```text
/// Idle → Initializing → Ready
///                     ↘ Error → (successful refetch) → Ready
/// ```
///
/// `Ready` carries two independent flags on [`SyncState`]: `revalidating`
/// and `realtime_attached`. Toggling them never leaves `Ready`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    /// Created, not yet started
    #[default]
    Idle,
    /// Reading the cache / running the first fetch
    Initializing,
    /// Holding a collection (possibly empty) and accepting updates
    Ready,
    /// Cold start failed: retries exhausted with nothing to show
    Error,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Ready => write!(f, "Ready"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Everything the consumer renders from.
///
/// Published as a whole on every change; owned and written only by the
/// controller task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    pub phase: SyncPhase,
    pub collection: EventCollection,
    /// True only while a foreground (cold) fetch is running
    pub loading: bool,
    /// True while a silent background fetch is running
    pub revalidating: bool,
    pub realtime_attached: bool,
    /// Set only when a foreground fetch exhausted its retries with nothing to show
    pub error: Option<String>,
    pub data_source: DataSource,
    /// Epoch millis of the last change to `collection`
    pub last_updated: Option<i64>,
    pub in_flight: bool,
    /// Failed attempts behind the last finished fetch (0 after a success)
    pub retry_count: u32,
}

impl SyncState {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase == SyncPhase::Ready
    }
}

/// How a fetch presents itself to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Cold fetch: raises `loading`, may set `error` on exhaustion
    Foreground,
    /// Silent revalidation: raises `revalidating`, failures are swallowed
    Background,
}

impl FetchMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
        }
    }

    pub(super) fn operation_name(self) -> &'static str {
        match self {
            Self::Foreground => "snapshot_foreground",
            Self::Background => "snapshot_background",
        }
    }
}

/// What a refetch request turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchOutcome {
    Started(FetchMode),
    /// A fetch was already in flight; the request was folded into it
    Coalesced,
}

/// The controller task is gone (stopped, or every handle was dropped).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("sync engine has stopped")]
pub struct EngineStopped;
