//! Scriptable mock adapter and fixtures for tests
//!
//! Shipped as a normal module so integration and e2e test crates can drive
//! the full pipeline without a real game backend.

use crate::adapter::{normalize, GameAdapter, UpdateCallback};
use crate::config::GameAdapterConfig;
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use types::{GameFeature, PlayerGameData};

/// A fully scriptable in-memory [`GameAdapter`]
pub struct MockGameAdapter {
    game_id: String,
    game_name: String,
    features: Vec<GameFeature>,
    healthy: AtomicBool,
    fail_fetch: AtomicBool,
    fail_next_fetch: AtomicBool,
    fail_validate: AtomicBool,
    asset_verdict: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
    fetch_calls: AtomicU64,
    callback: Mutex<Option<UpdateCallback>>,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    payload: Mutex<Option<serde_json::Value>>,
}

impl MockGameAdapter {
    /// Healthy adapter supporting every feature
    pub fn new(game_id: impl Into<String>, game_name: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            game_name: game_name.into(),
            features: vec![
                GameFeature::Assets,
                GameFeature::Achievements,
                GameFeature::Statistics,
                GameFeature::RealTimeUpdates,
                GameFeature::AssetTrading,
            ],
            healthy: AtomicBool::new(true),
            fail_fetch: AtomicBool::new(false),
            fail_next_fetch: AtomicBool::new(false),
            fail_validate: AtomicBool::new(false),
            asset_verdict: AtomicBool::new(true),
            fetch_delay: Mutex::new(None),
            fetch_calls: AtomicU64::new(0),
            callback: Mutex::new(None),
            last_sync: Mutex::new(None),
            payload: Mutex::new(None),
        }
    }

    /// Replace the declared feature set
    pub fn with_features(mut self, features: Vec<GameFeature>) -> Self {
        self.features = features;
        self
    }

    /// Add an artificial delay to every fetch
    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        *self.fetch_delay.lock() = Some(delay);
        self
    }

    /// A valid default config for this adapter's game
    pub fn default_config(&self) -> GameAdapterConfig {
        GameAdapterConfig::defaults_for(&self.game_id, &self.game_name)
    }

    /// Script the health probe result
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make every fetch fail until reset
    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Make only the next fetch fail
    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::SeqCst);
    }

    /// Script the on-chain verification verdict
    pub fn set_asset_verdict(&self, valid: bool) {
        self.asset_verdict.store(valid, Ordering::SeqCst);
    }

    /// Make `validate_asset` return an error
    pub fn set_fail_validate(&self, fail: bool) {
        self.fail_validate.store(fail, Ordering::SeqCst);
    }

    /// Replace the raw payload every fetch and push will normalize from
    pub fn set_payload(&self, raw: serde_json::Value) {
        *self.payload.lock() = Some(raw);
    }

    /// Number of fetches attempted so far
    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Whether a subscription is currently installed
    pub fn is_subscribed(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Push one update through the installed subscription callback.
    ///
    /// Returns false when nothing is subscribed.
    pub fn push_update(&self, player_id: &str) -> bool {
        let callback = self.callback.lock().clone();
        match callback {
            Some(callback) => {
                callback(self.build_player_data(player_id));
                true
            }
            None => false,
        }
    }

    fn build_player_data(&self, player_id: &str) -> PlayerGameData {
        match self.payload.lock().clone() {
            Some(raw) => {
                let normalized = normalize::standardize(&self.game_id, player_id, &raw);
                PlayerGameData {
                    player_id: player_id.to_string(),
                    game_id: self.game_id.clone(),
                    raw,
                    normalized,
                    synced_at: Utc::now(),
                }
            }
            None => make_player_data(&self.game_id, player_id),
        }
    }
}

#[async_trait]
impl GameAdapter for MockGameAdapter {
    fn game_id(&self) -> &str {
        &self.game_id
    }

    fn game_name(&self) -> &str {
        &self.game_name
    }

    fn version(&self) -> &str {
        "0.1.0-mock"
    }

    fn supported_features(&self) -> &[GameFeature] {
        &self.features
    }

    async fn fetch_player_data(&self, player_id: &str) -> Result<PlayerGameData> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_fetch.load(Ordering::SeqCst)
            || self.fail_next_fetch.swap(false, Ordering::SeqCst)
        {
            return Err(AdapterError::ConnectionFailed {
                game_id: self.game_id.clone(),
                reason: "simulated fetch failure".to_string(),
            });
        }

        let data = self.build_player_data(player_id);
        *self.last_sync.lock() = Some(data.synced_at);
        Ok(data)
    }

    async fn subscribe_to_updates(&self, callback: UpdateCallback) -> Result<()> {
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    async fn unsubscribe_from_updates(&self) -> Result<()> {
        *self.callback.lock() = None;
        Ok(())
    }

    async fn validate_asset(&self, _asset: &types::GameAsset) -> Result<bool> {
        if self.fail_validate.load(Ordering::SeqCst) {
            return Err(AdapterError::ConnectionFailed {
                game_id: self.game_id.clone(),
                reason: "chain verifier unreachable".to_string(),
            });
        }
        Ok(self.asset_verdict.load(Ordering::SeqCst))
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock()
    }
}

/// A realistic raw payload plus its normalized snapshot for one player
pub fn make_player_data(game_id: &str, player_id: &str) -> PlayerGameData {
    let raw = json!({
        "assets": [
            {
                "id": format!("{game_id}-sword-1"),
                "token_id": "1001",
                "contract_address": format!("0x{game_id}cafe"),
                "owner": player_id,
                "name": "Rusty Sword",
                "metadata": {"rarity": "common"}
            }
        ],
        "achievements": [
            {
                "id": "first-login",
                "name": "First Login",
                "earned_at": "2026-01-15T12:00:00Z"
            }
        ],
        "statistics": {"play_time_hours": 12, "level": 3}
    });

    let normalized = normalize::standardize(game_id, player_id, &raw);
    PlayerGameData {
        player_id: player_id.to_string(),
        game_id: game_id.to_string(),
        raw,
        normalized,
        synced_at: Utc::now(),
    }
}
