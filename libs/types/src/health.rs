//! Health and sync status vocabulary shared across services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall health of a registered adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Adapter is healthy and operating normally
    Healthy,

    /// Adapter is responding but its recent failure history suggests trouble
    Degraded,

    /// Adapter probes are failing; data from it should not be trusted
    Unhealthy,
}

/// Live synchronization state for one game
///
/// Created when sync starts for the game, updated on every batch cycle and
/// error, removed when sync stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Whether the adapter's push subscription is active
    pub is_connected: bool,

    /// When the last batch cycle completed
    pub last_sync_time: Option<DateTime<Utc>>,

    /// Updates queued and not yet flushed
    pub pending_updates: usize,

    /// Total errors observed since sync started
    pub error_count: u64,

    /// Most recent error message
    pub last_error: Option<String>,
}
