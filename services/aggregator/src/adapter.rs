//! # Game Adapter Contract
//!
//! The boundary between the aggregation core and every external game
//! integration. Each game backend ships one [`GameAdapter`] implementation;
//! the core never sees transport details, only this trait.
//!
//! The shared [`normalize`] helpers replace per-game normalization
//! boilerplate: adapters that receive conventional JSON shapes can delegate
//! to them instead of hand-rolling the mapping.

use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use types::{GameAsset, GameFeature, PlayerGameData};

/// Callback invoked by an adapter for every pushed player update
///
/// Implementations must be cheap and non-blocking; the sync engine's
/// callbacks only append to an in-memory queue.
pub type UpdateCallback = Arc<dyn Fn(PlayerGameData) + Send + Sync>;

/// Contract every external game integration must satisfy
#[async_trait]
pub trait GameAdapter: Send + Sync {
    /// Stable game identifier, unique across the registry
    fn game_id(&self) -> &str;

    /// Human-readable game name
    fn game_name(&self) -> &str;

    /// Adapter implementation version
    fn version(&self) -> &str;

    /// Capabilities this integration supports
    fn supported_features(&self) -> &[GameFeature];

    /// Fetch one player's current state: raw payload plus normalized
    /// snapshot, timestamped
    async fn fetch_player_data(&self, player_id: &str) -> Result<PlayerGameData>;

    /// Begin pushing player updates into `callback`
    async fn subscribe_to_updates(&self, callback: UpdateCallback) -> Result<()>;

    /// Stop pushing updates
    async fn unsubscribe_from_updates(&self) -> Result<()>;

    /// Verify an asset against the source of truth (usually on-chain)
    async fn validate_asset(&self, asset: &GameAsset) -> Result<bool>;

    /// Liveness probe
    async fn is_healthy(&self) -> bool;

    /// When this adapter last produced data
    async fn last_sync_time(&self) -> Option<DateTime<Utc>>;

    /// Enrich an error with game context before it leaves the adapter.
    ///
    /// The default tags bare transport errors with this adapter's game id;
    /// integrations with richer upstream error vocabularies override it.
    fn handle_error(&self, error: AdapterError) -> AdapterError {
        match error {
            AdapterError::Internal(msg) => AdapterError::ConnectionFailed {
                game_id: self.game_id().to_string(),
                reason: msg,
            },
            other => other,
        }
    }

    /// Whether this adapter declares support for `feature`
    fn supports_feature(&self, feature: GameFeature) -> bool {
        self.supported_features().contains(&feature)
    }
}

/// Shared default normalization from conventional raw JSON shapes
pub mod normalize {
    use chrono::{DateTime, Utc};
    use serde_json::Value;
    use std::collections::HashMap;
    use types::{Achievement, GameAsset, StandardizedGameData};

    /// Build a normalized snapshot from a raw payload that follows the
    /// common `{assets: [], achievements: [], statistics: {}}` shape.
    ///
    /// Unrecognized or missing sections normalize to empty collections; an
    /// adapter should only fall back to this helper when its backend emits
    /// the conventional shape.
    pub fn standardize(game_id: &str, player_id: &str, raw: &Value) -> StandardizedGameData {
        StandardizedGameData {
            player_id: player_id.to_string(),
            game_id: game_id.to_string(),
            assets: assets_from(raw.get("assets")),
            achievements: achievements_from(raw.get("achievements")),
            statistics: statistics_from(raw.get("statistics")),
            last_updated: timestamp_from(raw.get("updated_at")).unwrap_or_else(Utc::now),
        }
    }

    fn assets_from(section: Option<&Value>) -> Vec<GameAsset> {
        let Some(Value::Array(items)) = section else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                Some(GameAsset {
                    id: str_field(item, "id")?,
                    token_id: str_field(item, "token_id")
                        .or_else(|| str_field(item, "tokenId"))?,
                    contract_address: str_field(item, "contract_address")
                        .or_else(|| str_field(item, "contractAddress"))?,
                    owner: str_field(item, "owner")?,
                    name: str_field(item, "name"),
                    metadata: item.get("metadata").cloned().unwrap_or(Value::Null),
                })
            })
            .collect()
    }

    fn achievements_from(section: Option<&Value>) -> Vec<Achievement> {
        let Some(Value::Array(items)) = section else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                Some(Achievement {
                    id: str_field(item, "id")?,
                    name: str_field(item, "name")?,
                    description: str_field(item, "description"),
                    earned_at: timestamp_from(item.get("earned_at")).unwrap_or_else(Utc::now),
                })
            })
            .collect()
    }

    fn statistics_from(section: Option<&Value>) -> HashMap<String, Value> {
        match section {
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    fn str_field(value: &Value, field: &str) -> Option<String> {
        value.get(field)?.as_str().map(String::from)
    }

    fn timestamp_from(value: Option<&Value>) -> Option<DateTime<Utc>> {
        value?
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn conventional_shape_normalizes() {
            let raw = json!({
                "assets": [
                    {"id": "a1", "token_id": "7", "contract_address": "0xabc", "owner": "p1", "name": "Sword"},
                    {"id": "bad"} // missing required fields, skipped
                ],
                "achievements": [
                    {"id": "ach1", "name": "First Blood", "earned_at": "2026-01-01T00:00:00Z"}
                ],
                "statistics": {"kills": 12}
            });

            let data = standardize("g1", "p1", &raw);
            assert_eq!(data.assets.len(), 1);
            assert_eq!(data.assets[0].name.as_deref(), Some("Sword"));
            assert_eq!(data.achievements.len(), 1);
            assert_eq!(data.statistics["kills"], json!(12));
        }

        #[test]
        fn missing_sections_are_empty() {
            let data = standardize("g1", "p1", &json!({}));
            assert!(data.assets.is_empty());
            assert!(data.achievements.is_empty());
            assert!(data.statistics.is_empty());
        }

        #[test]
        fn camel_case_asset_fields_accepted() {
            let raw = json!({
                "assets": [
                    {"id": "a1", "tokenId": "9", "contractAddress": "0xdef", "owner": "p2"}
                ]
            });
            let data = standardize("g1", "p2", &raw);
            assert_eq!(data.assets[0].token_id, "9");
            assert_eq!(data.assets[0].contract_address, "0xdef");
        }
    }
}
