//! # Gamebridge Aggregator - Player State Aggregation Engine
//!
//! ## Purpose
//!
//! Continuously aggregates player state (assets, achievements, statistics)
//! from independently-operated game backends, keeps it synchronized in
//! near-real-time, and serves it to downstream consumers through an
//! advisory cache. The engine is built for resilience under partial
//! failure: every game backend sits behind its own circuit breaker, every
//! fan-out settles all branches, and one misbehaving adapter can never take
//! down the pipeline.
//!
//! ## Integration Points
//!
//! - **Input Sources**: game backends plugged in through the [`GameAdapter`]
//!   contract (push subscriptions plus on-demand fetches)
//! - **Output Destinations**: typed [`types::CoreEvent`] streams consumed by
//!   the marketplace, social and API layers
//! - **Validation Pipeline**: rule-based checks on raw fetch results and
//!   normalized snapshots, with cross-game consistency scanning
//! - **Monitoring**: rolling metrics, threshold alerting, circuit breaker
//!   and cache observability
//! - **Configuration**: bounds-validated per-game configs and
//!   environment-driven engine settings
//!
//! ## Architecture Role
//!
//! The aggregator is the boundary between heterogeneous game backends and
//! the unified player view. Leaf-to-root: the resilience layer (error
//! classification, retry, circuit breakers) underpins the adapter registry;
//! the validator and cache consume registry lookups; the sync engine ties
//! them into one continuously-running pipeline; the [`GameDataAggregator`]
//! façade composes the whole thing.
//!
//! ## Example
//!
//! ```rust,no_run
//! use aggregator_service::{AggregatorConfig, GameDataAggregator};
//! use aggregator_service::test_utils::MockGameAdapter;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> aggregator_service::Result<()> {
//! let aggregator = GameDataAggregator::new(AggregatorConfig::from_env())?;
//! aggregator.initialize().await?;
//!
//! let adapter = Arc::new(MockGameAdapter::new("voidlands", "Voidlands"));
//! aggregator.register_game(adapter).await?;
//!
//! let snapshot = aggregator.get_player_game_data("p1", "voidlands").await?;
//! println!("{} assets", snapshot.assets.len());
//!
//! aggregator.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Resilience layer
pub mod circuit_breaker;
pub mod error;
pub mod rate_limit;
pub mod retry;

// Adapter contract and registry
pub mod adapter;
pub mod registry;

// Validation pipeline
pub mod validation;

// Cache manager and invalidation
pub mod cache;
pub mod invalidation;

// Sync engine and monitoring
pub mod monitor;
pub mod sync;

// Composition
pub mod bus;
pub mod config;
pub mod facade;

// Shared test fixtures (mock adapters), used by integration and e2e tests
pub mod test_utils;

// Re-export the resilience primitives
pub use circuit_breaker::{
    BreakerStatus, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager,
    CircuitBreakerMetrics, CircuitState,
};
pub use error::{AdapterError, ErrorCategory, Result};
pub use rate_limit::RateLimiter;
pub use retry::{execute_with_retry, RetryPolicy};

// Re-export the adapter surface
pub use adapter::{normalize, GameAdapter, UpdateCallback};
pub use registry::{AdapterRegistry, RegistrationInfo};

// Re-export validation types
pub use validation::{DataValidator, RuleSeverity, ValidationOutcome, ValidationRule};

// Re-export the cache surface
pub use cache::{CacheKey, CacheManager, CacheStats};
pub use invalidation::{
    default_strategies, InvalidationContext, InvalidationStrategy, InvalidationTrigger,
};

// Re-export the engine and monitor
pub use monitor::{MetricsSnapshot, PerformanceMonitor};
pub use sync::SyncEngine;

// Re-export composition types
pub use bus::EventBus;
pub use config::{
    AggregatorConfig, CacheSettings, GameAdapterConfig, MonitorThresholds, ThresholdPair,
};
pub use facade::GameDataAggregator;

// Re-export the shared vocabulary for convenience
pub use types::{
    Achievement, AlertSeverity, CacheEvent, CacheEventKind, CoreEvent, GameAsset, GameFeature,
    HealthStatus, PerformanceAlert, PlayerGameData, StandardizedGameData, SyncEvent,
    SyncEventKind, SyncStatus,
};
