//! Replicator state types.
//!
//! Defines the state machine for one replication run.
//!
//! # State Transitions
//!
//! ```text
//!         run()                        scan cursor back to 0
//! Idle ─────────→ CaptureStarted ──→ BulkSyncing ─────────────→ SteadyState
//!   │  (strategy                          │                          │
//!   │   none)                             │ strategy none            │ shutdown()
//!   └──────────────────────→──────────────┤ or shutdown()            ↓
//!                                         └────────────────────→ Stopped
//!
//! any state ── fatal error ──→ Failed
//! ```
//!
//! # State Descriptions
//!
//! - **Idle**: Constructed, `run()` not called yet.
//! - **CaptureStarted**: Live feed subscribed and consumer running; scan not started.
//! - **BulkSyncing**: SCAN pass in progress. Live events are applied concurrently.
//! - **SteadyState**: Initial copy complete ("initially synced"); only live events remain.
//! - **Stopped**: Run ended cleanly.
//! - **Failed**: Run ended on a fatal error.

use crate::scanner::ScanStats;

/// State of a replication run.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicatorState {
    Idle,
    CaptureStarted,
    BulkSyncing,
    SteadyState,
    Stopped,
    Failed,
}

impl ReplicatorState {
    /// Label used by the `replication_state` gauge.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ReplicatorState::Idle => "idle",
            ReplicatorState::CaptureStarted => "capture_started",
            ReplicatorState::BulkSyncing => "bulk_syncing",
            ReplicatorState::SteadyState => "steady_state",
            ReplicatorState::Stopped => "stopped",
            ReplicatorState::Failed => "failed",
        }
    }

    /// Whether the run has ended, cleanly or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplicatorState::Stopped | ReplicatorState::Failed)
    }
}

impl std::fmt::Display for ReplicatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicatorState::Idle => write!(f, "Idle"),
            ReplicatorState::CaptureStarted => write!(f, "CaptureStarted"),
            ReplicatorState::BulkSyncing => write!(f, "BulkSyncing"),
            ReplicatorState::SteadyState => write!(f, "SteadyState"),
            ReplicatorState::Stopped => write!(f, "Stopped"),
            ReplicatorState::Failed => write!(f, "Failed"),
        }
    }
}

/// Live consumer totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveStats {
    /// Actions taken off the capture channel.
    pub received: u64,
    pub applied: u64,
    /// Actions dropped under the log-and-skip policy.
    pub skipped: u64,
}

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub scan: ScanStats,
    pub live: LiveStats,
}

impl RunSummary {
    /// Whether the bulk scan reached the end of the keyspace.
    pub fn initially_synced(&self) -> bool {
        self.scan.completed
    }
}
