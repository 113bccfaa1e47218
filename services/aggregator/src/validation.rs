//! # Player Data Validation Pipeline
//!
//! Rule-based validation of raw fetch results plus structural validation of
//! normalized snapshots. Rules are additive and independent: a failing
//! Error-severity rule fails the whole validation, a failing
//! Warning-severity rule only appends warnings. Warnings never flip
//! validity.
//!
//! Identical snapshots (same game, player and sync timestamp) reuse a
//! time-boxed cached result instead of re-running the pipeline.

use crate::adapter::GameAdapter;
use crate::error::Result;
use crate::registry::AdapterRegistry;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use types::{PlayerGameData, StandardizedGameData};

/// How a failing rule affects the overall verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSeverity {
    /// Failure fails the whole validation
    Error,
    /// Failure only appends warnings
    Warning,
}

/// Aggregated result of a validation run
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// False iff at least one Error-severity rule failed
    pub is_valid: bool,
    /// Error messages from failed Error-severity checks
    pub errors: Vec<String>,
    /// Informational findings
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    /// A passing outcome with nothing to report
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// A failing outcome with one error
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![error.into()],
            warnings: Vec::new(),
        }
    }
}

/// One independent validation check
#[async_trait]
pub trait ValidationRule: Send + Sync {
    /// Stable rule name used in findings and logs
    fn name(&self) -> &str;

    /// How failures of this rule are treated
    fn severity(&self) -> RuleSeverity;

    /// Run the check against one raw fetch result
    async fn check(&self, data: &PlayerGameData) -> ValidationOutcome;
}

/// Error-severity check that the snapshot is structurally coherent
struct BasicStructureRule;

#[async_trait]
impl ValidationRule for BasicStructureRule {
    fn name(&self) -> &str {
        "basic_structure"
    }

    fn severity(&self) -> RuleSeverity {
        RuleSeverity::Error
    }

    async fn check(&self, data: &PlayerGameData) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::valid();

        if data.player_id.is_empty() {
            outcome.is_valid = false;
            outcome.errors.push("player_id is empty".to_string());
        }
        if data.game_id.is_empty() {
            outcome.is_valid = false;
            outcome.errors.push("game_id is empty".to_string());
        }
        if data.normalized.player_id != data.player_id {
            outcome.is_valid = false;
            outcome.errors.push(format!(
                "normalized player_id {} does not match {}",
                data.normalized.player_id, data.player_id
            ));
        }
        if data.normalized.game_id != data.game_id {
            outcome.is_valid = false;
            outcome.errors.push(format!(
                "normalized game_id {} does not match {}",
                data.normalized.game_id, data.game_id
            ));
        }

        outcome
    }
}

/// Warning-severity check comparing a player's assets against every other
/// registered adapter's view of the same player
///
/// Flags the same (token, contract) pair reported under different owners by
/// different games. Per-adapter fetch failures are skipped, not fatal: a
/// backend being down must not poison validation of data we already hold.
struct CrossGameConsistencyRule {
    registry: Arc<AdapterRegistry>,
}

#[async_trait]
impl ValidationRule for CrossGameConsistencyRule {
    fn name(&self) -> &str {
        "cross_game_consistency"
    }

    fn severity(&self) -> RuleSeverity {
        RuleSeverity::Warning
    }

    async fn check(&self, data: &PlayerGameData) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::valid();

        for (game_id, adapter) in self.registry.all_adapters().await {
            if game_id == data.game_id {
                continue;
            }

            let other = match adapter.fetch_player_data(&data.player_id).await {
                Ok(other) => other,
                Err(err) => {
                    debug!(
                        game_id,
                        player_id = data.player_id,
                        error = %err,
                        "skipping cross-game check, fetch failed"
                    );
                    continue;
                }
            };

            for asset in &data.normalized.assets {
                for other_asset in &other.normalized.assets {
                    if asset.token_id == other_asset.token_id
                        && asset.contract_address == other_asset.contract_address
                        && asset.owner != other_asset.owner
                    {
                        outcome.warnings.push(format!(
                            "token {} on {} owned by {} in {} but {} in {}",
                            asset.token_id,
                            asset.contract_address,
                            asset.owner,
                            data.game_id,
                            other_asset.owner,
                            game_id
                        ));
                    }
                }
            }
        }

        outcome
    }
}

struct CachedOutcome {
    outcome: ValidationOutcome,
    stored_at: Instant,
}

// Result-cache entries beyond this trigger a prune of expired ones
const RESULT_CACHE_PRUNE_THRESHOLD: usize = 1024;

/// The pluggable validation pipeline
pub struct DataValidator {
    rules: Vec<Arc<dyn ValidationRule>>,
    result_cache: DashMap<String, CachedOutcome>,
    cache_ttl: Duration,
    drift_tolerance: chrono::Duration,
}

impl DataValidator {
    /// Pipeline with the built-in rules.
    ///
    /// `basic_structure` is always present; `cross_game_consistency` is
    /// added when `cross_game` is enabled.
    pub fn new(
        registry: Arc<AdapterRegistry>,
        cross_game: bool,
        cache_ttl: Duration,
        drift_tolerance_secs: i64,
    ) -> Self {
        let mut rules: Vec<Arc<dyn ValidationRule>> = vec![Arc::new(BasicStructureRule)];
        if cross_game {
            rules.push(Arc::new(CrossGameConsistencyRule { registry }));
        }

        Self {
            rules,
            result_cache: DashMap::new(),
            cache_ttl,
            drift_tolerance: chrono::Duration::seconds(drift_tolerance_secs),
        }
    }

    /// Install an additional rule at the end of the pipeline
    pub fn add_rule(&mut self, rule: Arc<dyn ValidationRule>) {
        self.rules.push(rule);
    }

    /// Validate one raw fetch result through the rule pipeline.
    ///
    /// Results are cached per (game, player, synced_at) for the configured
    /// TTL, so re-validating an identical snapshot is free.
    pub async fn validate_player_data(&self, data: &PlayerGameData) -> ValidationOutcome {
        let cache_key = format!(
            "{}:{}:{}",
            data.game_id,
            data.player_id,
            data.synced_at.timestamp_millis()
        );

        if let Some(cached) = self.result_cache.get(&cache_key) {
            if cached.stored_at.elapsed() < self.cache_ttl {
                return cached.outcome.clone();
            }
        }

        let mut overall = ValidationOutcome::valid();
        for rule in &self.rules {
            let outcome = rule.check(data).await;
            match rule.severity() {
                RuleSeverity::Error => {
                    if !outcome.is_valid {
                        warn!(
                            rule = rule.name(),
                            game_id = data.game_id,
                            player_id = data.player_id,
                            "validation rule failed"
                        );
                        overall.is_valid = false;
                        overall.errors.extend(outcome.errors);
                    }
                    overall.warnings.extend(outcome.warnings);
                }
                RuleSeverity::Warning => {
                    overall.warnings.extend(outcome.errors);
                    overall.warnings.extend(outcome.warnings);
                }
            }
        }

        if self.result_cache.len() > RESULT_CACHE_PRUNE_THRESHOLD {
            let ttl = self.cache_ttl;
            self.result_cache
                .retain(|_, cached| cached.stored_at.elapsed() < ttl);
        }
        self.result_cache.insert(
            cache_key,
            CachedOutcome {
                outcome: overall.clone(),
                stored_at: Instant::now(),
            },
        );

        overall
    }

    /// Structurally validate a normalized snapshot.
    ///
    /// Asset field presence is an error; timestamp drift beyond the
    /// tolerance is an error for future timestamps and a warning for stale
    /// ones. When the owning adapter is supplied, each asset is additionally
    /// verified on-chain — failures there are warnings, chain availability
    /// is not this validator's concern.
    pub async fn validate_standardized_data(
        &self,
        data: &StandardizedGameData,
        adapter: Option<&Arc<dyn GameAdapter>>,
    ) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::valid();

        if data.player_id.is_empty() {
            outcome.is_valid = false;
            outcome.errors.push("player_id is empty".to_string());
        }
        if data.game_id.is_empty() {
            outcome.is_valid = false;
            outcome.errors.push("game_id is empty".to_string());
        }

        for (index, asset) in data.assets.iter().enumerate() {
            for (field, value) in [
                ("id", &asset.id),
                ("token_id", &asset.token_id),
                ("contract_address", &asset.contract_address),
                ("owner", &asset.owner),
            ] {
                if value.is_empty() {
                    outcome.is_valid = false;
                    outcome
                        .errors
                        .push(format!("asset[{index}] missing {field}"));
                }
            }
        }

        let now = Utc::now();
        if data.last_updated > now + self.drift_tolerance {
            outcome.is_valid = false;
            outcome.errors.push(format!(
                "FUTURE_TIMESTAMP: last_updated {} is ahead of now",
                data.last_updated
            ));
        } else if data.last_updated < now - self.drift_tolerance {
            outcome.warnings.push(format!(
                "OLD_TIMESTAMP: last_updated {} is stale",
                data.last_updated
            ));
        }

        if let Some(adapter) = adapter {
            for asset in &data.assets {
                match self.verify_on_chain(adapter, asset).await {
                    Ok(true) => {}
                    Ok(false) => outcome.warnings.push(format!(
                        "asset {} failed on-chain verification",
                        asset.id
                    )),
                    Err(err) => outcome.warnings.push(format!(
                        "on-chain verification unavailable for asset {}: {}",
                        asset.id, err
                    )),
                }
            }
        }

        outcome
    }

    async fn verify_on_chain(
        &self,
        adapter: &Arc<dyn GameAdapter>,
        asset: &types::GameAsset,
    ) -> Result<bool> {
        adapter.validate_asset(asset).await
    }

    /// Number of cached validation results (observability)
    pub fn cached_results(&self) -> usize {
        self.result_cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerManager};
    use crate::test_utils::{make_player_data, MockGameAdapter};
    use serde_json::json;

    fn registry() -> Arc<AdapterRegistry> {
        AdapterRegistry::new(
            Arc::new(CircuitBreakerManager::new(CircuitBreakerConfig::default())),
            EventBus::new(64),
            Duration::from_secs(30),
        )
    }

    fn validator(registry: Arc<AdapterRegistry>, cross_game: bool) -> DataValidator {
        DataValidator::new(registry, cross_game, Duration::from_secs(60), 300)
    }

    #[tokio::test]
    async fn well_formed_data_passes() {
        let validator = validator(registry(), false);
        let data = make_player_data("g1", "p1");

        let outcome = validator.validate_player_data(&data).await;
        assert!(outcome.is_valid);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn empty_player_id_fails_basic_structure() {
        let validator = validator(registry(), false);
        let mut data = make_player_data("g1", "p1");
        data.player_id = String::new();

        let outcome = validator.validate_player_data(&data).await;
        assert!(!outcome.is_valid);
        assert!(outcome.errors.iter().any(|e| e.contains("player_id")));
    }

    #[tokio::test]
    async fn mismatched_normalization_fails() {
        let validator = validator(registry(), false);
        let mut data = make_player_data("g1", "p1");
        data.normalized.player_id = "someone-else".to_string();

        let outcome = validator.validate_player_data(&data).await;
        assert!(!outcome.is_valid);
    }

    #[tokio::test]
    async fn cross_game_collision_is_warning_only() {
        let registry = registry();
        let validator = validator(registry.clone(), true);

        // Two games reporting the same token/contract under different owners
        let payload = |owner: &str| {
            json!({
                "assets": [{
                    "id": "a1",
                    "token_id": "42",
                    "contract_address": "0xshared",
                    "owner": owner
                }]
            })
        };

        let g1 = Arc::new(MockGameAdapter::new("g1", "Voidlands"));
        g1.set_payload(payload("p1"));
        let g2 = Arc::new(MockGameAdapter::new("g2", "Skyforge"));
        g2.set_payload(payload("intruder"));

        registry
            .register_adapter(g1.clone(), g1.default_config())
            .await
            .unwrap();
        registry
            .register_adapter(g2.clone(), g2.default_config())
            .await
            .unwrap();

        let data = g1.fetch_player_data("p1").await.unwrap();
        let outcome = validator.validate_player_data(&data).await;

        assert!(outcome.is_valid, "warnings must not flip validity");
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.contains("token 42") && w.contains("intruder")));
    }

    #[tokio::test]
    async fn cross_game_tolerates_fetch_failures() {
        let registry = registry();
        let validator = validator(registry.clone(), true);

        let g1 = Arc::new(MockGameAdapter::new("g1", "Voidlands"));
        let g2 = Arc::new(MockGameAdapter::new("g2", "Skyforge"));
        g2.set_fail_fetch(true);

        registry
            .register_adapter(g1.clone(), g1.default_config())
            .await
            .unwrap();
        registry
            .register_adapter(g2.clone(), g2.default_config())
            .await
            .unwrap();

        let data = g1.fetch_player_data("p1").await.unwrap();
        let outcome = validator.validate_player_data(&data).await;
        assert!(outcome.is_valid);
    }

    #[tokio::test]
    async fn identical_snapshot_reuses_cached_result() {
        let registry = registry();
        let validator = validator(registry.clone(), true);

        let g1 = Arc::new(MockGameAdapter::new("g1", "Voidlands"));
        let g2 = Arc::new(MockGameAdapter::new("g2", "Skyforge"));
        registry
            .register_adapter(g1.clone(), g1.default_config())
            .await
            .unwrap();
        registry
            .register_adapter(g2.clone(), g2.default_config())
            .await
            .unwrap();

        let data = g1.fetch_player_data("p1").await.unwrap();
        let fetches_before_first = g2.fetch_calls();
        let first = validator.validate_player_data(&data).await;
        assert!(g2.fetch_calls() > fetches_before_first);

        // Same snapshot again: cross-game rule must not re-fetch
        let fetches_after_first = g2.fetch_calls();
        let second = validator.validate_player_data(&data).await;
        assert_eq!(g2.fetch_calls(), fetches_after_first);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn structural_missing_asset_fields_fail() {
        let validator = validator(registry(), false);
        let mut data = make_player_data("g1", "p1").normalized;
        data.assets[0].owner = String::new();

        let outcome = validator.validate_standardized_data(&data, None).await;
        assert!(!outcome.is_valid);
        assert!(outcome.errors.iter().any(|e| e.contains("owner")));
    }

    #[tokio::test]
    async fn future_timestamp_is_error_old_is_warning() {
        let validator = validator(registry(), false);

        let mut data = make_player_data("g1", "p1").normalized;
        data.last_updated = Utc::now() + chrono::Duration::hours(2);
        let outcome = validator.validate_standardized_data(&data, None).await;
        assert!(!outcome.is_valid);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.contains("FUTURE_TIMESTAMP")));

        let mut data = make_player_data("g1", "p1").normalized;
        data.last_updated = Utc::now() - chrono::Duration::hours(2);
        let outcome = validator.validate_standardized_data(&data, None).await;
        assert!(outcome.is_valid);
        assert!(outcome.warnings.iter().any(|w| w.contains("OLD_TIMESTAMP")));
    }

    #[tokio::test]
    async fn on_chain_failures_are_warnings() {
        let validator = validator(registry(), false);
        let adapter = Arc::new(MockGameAdapter::new("g1", "Voidlands"));
        let data = make_player_data("g1", "p1").normalized;

        adapter.set_asset_verdict(false);
        let handle: Arc<dyn GameAdapter> = adapter.clone();
        let outcome = validator
            .validate_standardized_data(&data, Some(&handle))
            .await;
        assert!(outcome.is_valid);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.contains("failed on-chain verification")));

        adapter.set_fail_validate(true);
        let outcome = validator
            .validate_standardized_data(&data, Some(&handle))
            .await;
        assert!(outcome.is_valid);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.contains("verification unavailable")));
    }
}
