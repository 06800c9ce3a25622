use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds between background pulls.
pub const PULL_INTERVAL_SECS: u64 = 8;

/// Seconds between background pushes (only when the push timer is enabled).
pub const PUSH_INTERVAL_SECS: u64 = 60;

/// Quiet period after the last local edit before a debounced push fires.
pub const DEBOUNCE_SECS: u64 = 3;

/// Minimum spacing between auto-sync success notifications.
pub const NOTIFY_THROTTLE_SECS: u64 = 8;

/// Bound on any single network call.
pub const HTTP_TIMEOUT_SECS: u64 = 15;

/// Where the orchestrator currently is in a sync cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Sync is turned off or no server is configured.
    Disabled,
    Idle,
    Pulling,
    Merging,
    Saving,
    Pushing,
}

/// The four timer-driven entry points into the orchestrator. Tests drive
/// these directly instead of waiting on real timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// One-shot pull-and-replace when the app starts.
    Startup,
    /// Background pull + merge.
    PeriodicPull,
    /// Background save + push.
    PeriodicPush,
    /// Save + push after a quiet period following local edits.
    DebouncePush,
}

/// Outcome of the most recent sync attempt, for display by a UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    /// Human-readable status line.
    pub message: String,
    /// Whether the last attempt succeeded.
    pub ok: bool,
    /// Last successful sync timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Disabled,
            message: String::new(),
            ok: false,
            last_sync: None,
        }
    }
}
