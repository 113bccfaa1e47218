//! Player data model: raw fetch results, normalized snapshots, assets,
//! achievements and adapter capability descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capabilities a game adapter can declare support for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameFeature {
    /// Player-owned assets (tokens, items)
    Assets,
    /// Earned achievements
    Achievements,
    /// Gameplay statistics
    Statistics,
    /// Push-based update subscriptions
    RealTimeUpdates,
    /// Assets can be traded through the marketplace
    AssetTrading,
}

/// A single player-owned asset as reported by a game backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAsset {
    /// Stable asset identifier within the source game
    pub id: String,

    /// On-chain token identifier
    pub token_id: String,

    /// Contract the token lives under
    pub contract_address: String,

    /// Current owner address or player id
    pub owner: String,

    /// Human-readable name, when the source provides one
    pub name: Option<String>,

    /// Source-specific attributes passed through untouched
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// An achievement earned by a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    /// Stable achievement identifier within the source game
    pub id: String,

    /// Display name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// When the player earned it
    pub earned_at: DateTime<Utc>,
}

/// Normalized player snapshot, independent of the source game's native format
///
/// Every adapter's `normalize` step produces this record; all cross-game
/// logic (validation, caching, fan-out aggregation) operates on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedGameData {
    /// Player identifier
    pub player_id: String,

    /// Source game identifier
    pub game_id: String,

    /// Player-owned assets
    pub assets: Vec<GameAsset>,

    /// Earned achievements
    pub achievements: Vec<Achievement>,

    /// Free-form gameplay statistics
    pub statistics: HashMap<String, serde_json::Value>,

    /// When the source last updated this data
    pub last_updated: DateTime<Utc>,
}

/// Raw + normalized result of one adapter fetch, timestamped at sync time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerGameData {
    /// Player identifier
    pub player_id: String,

    /// Source game identifier
    pub game_id: String,

    /// The backend's native payload, untouched
    pub raw: serde_json::Value,

    /// The adapter's normalized view of `raw`
    pub normalized: StandardizedGameData,

    /// When the adapter produced this snapshot
    pub synced_at: DateTime<Utc>,
}

impl StandardizedGameData {
    /// Empty snapshot for a player/game pair, stamped now
    pub fn empty(player_id: impl Into<String>, game_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            game_id: game_id.into(),
            assets: Vec::new(),
            achievements: Vec::new(),
            statistics: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}
