//! Shared harness for Gamebridge end-to-end tests
//!
//! Builds fully-wired aggregators with intervals short enough that the
//! background timers (batch flush, health probes, metric collection)
//! actually fire within a test's lifetime.

use aggregator_service::{AggregatorConfig, GameDataAggregator, Result};
use std::sync::Arc;
use std::time::Duration;

/// Aggregator config with test-friendly timer intervals
pub fn fast_config() -> AggregatorConfig {
    AggregatorConfig {
        health_check_interval_secs: 1,
        batch_interval_ms: 50,
        monitor_collection_interval_secs: 1,
        cache_cleanup_interval_secs: 1,
        ..AggregatorConfig::default()
    }
}

/// A fully initialized aggregator on fast timers
pub async fn start_aggregator() -> Result<Arc<GameDataAggregator>> {
    let aggregator = GameDataAggregator::new(fast_config())?;
    aggregator.initialize().await?;
    Ok(aggregator)
}

/// Poll `condition` every 10 ms until it holds or `timeout` elapses
pub async fn wait_for<F: FnMut() -> bool>(mut condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
