//! Configuration for the aggregation engine and per-game adapters
//!
//! Provides environment-based configuration with validated bounds; an
//! invalid config is rejected before it can reach the registry or engine.

use crate::error::{AdapterError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Cache sizing and lifetime bounds for one game's entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Entry time-to-live in seconds (60-3600)
    pub ttl_secs: u64,

    /// Maximum cached entries (100-10000)
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 5000,
        }
    }
}

impl CacheSettings {
    /// Enforce the configured bounds
    pub fn validate(&self) -> Result<()> {
        if !(60..=3600).contains(&self.ttl_secs) {
            return Err(AdapterError::Configuration(format!(
                "cache ttl_secs must be 60-3600, got {}",
                self.ttl_secs
            )));
        }
        if !(100..=10000).contains(&self.max_entries) {
            return Err(AdapterError::Configuration(format!(
                "cache max_entries must be 100-10000, got {}",
                self.max_entries
            )));
        }
        Ok(())
    }

    /// TTL as a [`Duration`]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Per-game adapter configuration, immutable once validated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAdapterConfig {
    /// Game identifier, unique across the registry
    pub game_id: String,

    /// Human-readable game name
    pub game_name: String,

    /// Asset contract address for this game
    pub contract_address: String,

    /// RPC endpoint the adapter talks to
    pub rpc_endpoint: String,

    /// Backoff policy for this game's operations
    pub retry: RetryPolicy,

    /// Cache bounds for this game's entries
    pub cache: CacheSettings,

    /// Optional request budget for on-demand fetches
    pub requests_per_minute: Option<u32>,
}

impl GameAdapterConfig {
    /// Sensible defaults for a game, used when the facade derives a config
    /// from an adapter's capability descriptors
    pub fn defaults_for(game_id: impl Into<String>, game_name: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            game_name: game_name.into(),
            contract_address: String::new(),
            rpc_endpoint: String::new(),
            retry: RetryPolicy::default(),
            cache: CacheSettings::default(),
            requests_per_minute: None,
        }
    }

    /// Validate all bounds; called before any registry insertion
    pub fn validate(&self) -> Result<()> {
        if self.game_id.is_empty() {
            return Err(AdapterError::Configuration(
                "game_id cannot be empty".to_string(),
            ));
        }
        if self.game_name.is_empty() {
            return Err(AdapterError::Configuration(
                "game_name cannot be empty".to_string(),
            ));
        }
        self.retry.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

/// Warning/critical threshold pair for one monitored metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    /// Crossing this creates a warning alert
    pub warning: f64,
    /// Crossing this creates a critical alert
    pub critical: f64,
}

impl ThresholdPair {
    fn validate(&self, name: &str) -> Result<()> {
        if self.warning >= self.critical {
            return Err(AdapterError::Configuration(format!(
                "{} warning threshold ({}) must be below critical ({})",
                name, self.warning, self.critical
            )));
        }
        Ok(())
    }
}

/// Alerting thresholds for the performance monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorThresholds {
    /// Average latency in milliseconds
    pub avg_latency_ms: ThresholdPair,

    /// Errors per request over the rolling window (0.0-1.0)
    pub error_rate: ThresholdPair,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            avg_latency_ms: ThresholdPair {
                warning: 500.0,
                critical: 2000.0,
            },
            error_rate: ThresholdPair {
                warning: 0.05,
                critical: 0.25,
            },
        }
    }
}

/// Global aggregator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Seconds between registry health probe fan-outs
    pub health_check_interval_secs: u64,

    /// Milliseconds between batch flush ticks
    pub batch_interval_ms: u64,

    /// Maximum updates processed per chunk within one tick
    pub batch_size: usize,

    /// Start each registered game's sync automatically
    pub enable_real_time_sync: bool,

    /// Run the cross-game consistency rule in the validator
    pub enable_cross_game_validation: bool,

    /// Compress cache values over the threshold
    pub enable_compression: bool,

    /// Serialized size beyond which values are compressed
    pub compression_threshold_bytes: usize,

    /// Default cache bounds (per-game configs may override TTL semantics)
    pub cache: CacheSettings,

    /// Seconds between cache expiry sweeps
    pub cache_cleanup_interval_secs: u64,

    /// Seconds a validation result stays reusable for an identical snapshot
    pub validation_cache_ttl_secs: u64,

    /// Tolerated clock drift before timestamps are flagged, in seconds
    pub timestamp_drift_tolerance_secs: i64,

    /// Seconds between monitor metric collections
    pub monitor_collection_interval_secs: u64,

    /// Alerting thresholds
    pub monitor: MonitorThresholds,

    /// Consecutive failures before a breaker opens
    pub breaker_failure_threshold: u32,

    /// Seconds a breaker stays open before probing
    pub breaker_reset_timeout_secs: u64,

    /// Event bus channel capacity
    pub event_bus_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 30,
            batch_interval_ms: 1000,
            batch_size: 50,
            enable_real_time_sync: true,
            enable_cross_game_validation: true,
            enable_compression: true,
            compression_threshold_bytes: 1024,
            cache: CacheSettings::default(),
            cache_cleanup_interval_secs: 60,
            validation_cache_ttl_secs: 60,
            timestamp_drift_tolerance_secs: 300,
            monitor_collection_interval_secs: 10,
            monitor: MonitorThresholds::default(),
            breaker_failure_threshold: 5,
            breaker_reset_timeout_secs: 60,
            event_bus_capacity: 1024,
        }
    }
}

impl AggregatorConfig {
    /// Load configuration from `GAMEBRIDGE_*` environment variables,
    /// falling back to defaults for anything unset
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            health_check_interval_secs: env_parse(
                "GAMEBRIDGE_HEALTH_CHECK_INTERVAL_SECS",
                defaults.health_check_interval_secs,
            ),
            batch_interval_ms: env_parse("GAMEBRIDGE_BATCH_INTERVAL_MS", defaults.batch_interval_ms),
            batch_size: env_parse("GAMEBRIDGE_BATCH_SIZE", defaults.batch_size),
            enable_real_time_sync: env_flag(
                "GAMEBRIDGE_REAL_TIME_SYNC",
                defaults.enable_real_time_sync,
            ),
            enable_cross_game_validation: env_flag(
                "GAMEBRIDGE_CROSS_GAME_VALIDATION",
                defaults.enable_cross_game_validation,
            ),
            enable_compression: env_flag("GAMEBRIDGE_COMPRESSION", defaults.enable_compression),
            compression_threshold_bytes: env_parse(
                "GAMEBRIDGE_COMPRESSION_THRESHOLD_BYTES",
                defaults.compression_threshold_bytes,
            ),
            cache: CacheSettings {
                ttl_secs: env_parse("GAMEBRIDGE_CACHE_TTL_SECS", defaults.cache.ttl_secs),
                max_entries: env_parse("GAMEBRIDGE_CACHE_MAX_ENTRIES", defaults.cache.max_entries),
            },
            cache_cleanup_interval_secs: env_parse(
                "GAMEBRIDGE_CACHE_CLEANUP_INTERVAL_SECS",
                defaults.cache_cleanup_interval_secs,
            ),
            validation_cache_ttl_secs: env_parse(
                "GAMEBRIDGE_VALIDATION_CACHE_TTL_SECS",
                defaults.validation_cache_ttl_secs,
            ),
            timestamp_drift_tolerance_secs: env_parse(
                "GAMEBRIDGE_TIMESTAMP_DRIFT_TOLERANCE_SECS",
                defaults.timestamp_drift_tolerance_secs,
            ),
            monitor_collection_interval_secs: env_parse(
                "GAMEBRIDGE_MONITOR_INTERVAL_SECS",
                defaults.monitor_collection_interval_secs,
            ),
            monitor: defaults.monitor,
            breaker_failure_threshold: env_parse(
                "GAMEBRIDGE_BREAKER_FAILURE_THRESHOLD",
                defaults.breaker_failure_threshold,
            ),
            breaker_reset_timeout_secs: env_parse(
                "GAMEBRIDGE_BREAKER_RESET_TIMEOUT_SECS",
                defaults.breaker_reset_timeout_secs,
            ),
            event_bus_capacity: env_parse(
                "GAMEBRIDGE_EVENT_BUS_CAPACITY",
                defaults.event_bus_capacity,
            ),
        }
    }

    /// Validate all configurations
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AdapterError::Configuration(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.batch_interval_ms == 0 {
            return Err(AdapterError::Configuration(
                "batch_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.health_check_interval_secs == 0 {
            return Err(AdapterError::Configuration(
                "health_check_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.event_bus_capacity == 0 {
            return Err(AdapterError::Configuration(
                "event_bus_capacity must be greater than 0".to_string(),
            ));
        }
        if self.breaker_failure_threshold == 0 {
            return Err(AdapterError::Configuration(
                "breaker_failure_threshold must be greater than 0".to_string(),
            ));
        }
        self.cache.validate()?;
        self.monitor.avg_latency_ms.validate("avg_latency_ms")?;
        self.monitor.error_rate.validate("error_rate")?;
        Ok(())
    }

    /// Health probe interval as a [`Duration`]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Batch flush interval as a [`Duration`]
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|s| s.to_lowercase() == "true")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AggregatorConfig::default().validate().is_ok());
    }

    #[test]
    fn adapter_config_bounds() {
        let mut config = GameAdapterConfig::defaults_for("g1", "Voidlands");
        assert!(config.validate().is_ok());

        config.cache.ttl_secs = 30;
        assert!(config.validate().is_err());
        config.cache.ttl_secs = 3601;
        assert!(config.validate().is_err());
        config.cache.ttl_secs = 60;
        assert!(config.validate().is_ok());

        config.cache.max_entries = 50;
        assert!(config.validate().is_err());
        config.cache.max_entries = 10001;
        assert!(config.validate().is_err());
        config.cache.max_entries = 100;
        assert!(config.validate().is_ok());

        config.retry.max_retries = 11;
        assert!(config.validate().is_err());
        config.retry.max_retries = 10;
        assert!(config.validate().is_ok());

        config.game_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_env_overrides_defaults() {
        env::set_var("GAMEBRIDGE_BATCH_SIZE", "25");
        env::set_var("GAMEBRIDGE_REAL_TIME_SYNC", "false");

        let config = AggregatorConfig::from_env();
        assert_eq!(config.batch_size, 25);
        assert!(!config.enable_real_time_sync);

        env::remove_var("GAMEBRIDGE_BATCH_SIZE");
        env::remove_var("GAMEBRIDGE_REAL_TIME_SYNC");
    }

    #[test]
    fn threshold_pair_ordering_enforced() {
        let mut config = AggregatorConfig::default();
        config.monitor.error_rate = ThresholdPair {
            warning: 0.5,
            critical: 0.1,
        };
        assert!(config.validate().is_err());
    }
}
