//! Typed event vocabulary for the core event bus.
//!
//! Every event is a [`CoreEvent`] variant so subscribers match exhaustively
//! and payloads are structured rather than stringly-typed.

use crate::alerts::PerformanceAlert;
use crate::health::HealthStatus;
use crate::player::StandardizedGameData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of sync event occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    /// A validated player update was republished
    PlayerUpdate,
    /// A sync cycle or fetch failed for a game
    SyncError,
}

/// A sync-engine event for one game (and usually one player)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Kind of event
    pub kind: SyncEventKind,

    /// Game the event concerns
    pub game_id: String,

    /// Player the event concerns, when known
    pub player_id: Option<String>,

    /// Normalized snapshot for `PlayerUpdate` events
    pub data: Option<StandardizedGameData>,

    /// Error message for `SyncError` events
    pub error: Option<String>,

    /// When the engine emitted the event
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    /// A validated player update
    pub fn player_update(data: StandardizedGameData) -> Self {
        Self {
            kind: SyncEventKind::PlayerUpdate,
            game_id: data.game_id.clone(),
            player_id: Some(data.player_id.clone()),
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A sync failure for a game
    pub fn sync_error(
        game_id: impl Into<String>,
        player_id: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            kind: SyncEventKind::SyncError,
            game_id: game_id.into(),
            player_id,
            data: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// What happened inside the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    /// Read found a live entry
    Hit,
    /// Read found nothing (or an expired entry)
    Miss,
    /// A value was stored
    Set,
    /// A key was deleted directly
    Delete,
    /// A backend/serialization problem was swallowed
    Error,
    /// A pattern invalidation removed matching keys
    InvalidatePattern,
}

/// A cache observability event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEvent {
    /// Kind of event
    pub kind: CacheEventKind,

    /// The key, or the resolved pattern for invalidations
    pub key: String,

    /// Extra detail (error text, number of keys removed)
    pub detail: Option<String>,
}

/// Every event the aggregation core publishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoreEvent {
    /// An adapter was registered for a game
    AdapterRegistered {
        /// Game the adapter serves
        game_id: String,
    },

    /// An adapter was unregistered
    AdapterUnregistered {
        /// Game the adapter served
        game_id: String,
    },

    /// An adapter operation failed
    AdapterError {
        /// Game whose adapter failed
        game_id: String,
        /// What went wrong
        message: String,
    },

    /// An adapter's health status actually changed (no event on repeats)
    AdapterHealthChanged {
        /// Game whose adapter changed status
        game_id: String,
        /// The new status
        status: HealthStatus,
    },

    /// A sync-engine event
    Sync(SyncEvent),

    /// A cache event
    Cache(CacheEvent),

    /// The monitor created an alert
    AlertCreated(PerformanceAlert),

    /// An operator resolved an alert
    AlertResolved(PerformanceAlert),
}
