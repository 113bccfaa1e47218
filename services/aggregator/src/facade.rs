//! # Aggregation Façade
//!
//! The public contract of the core: register games, sync players, read
//! player data, subscribe to events. Composes every component over one
//! event bus and wires the cross-cutting flows (player updates invalidate
//! that player's cache entries, adapter errors feed the monitor).

use crate::adapter::GameAdapter;
use crate::bus::EventBus;
use crate::cache::{CacheKey, CacheManager};
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerManager};
use crate::config::{AggregatorConfig, GameAdapterConfig};
use crate::error::{AdapterError, Result};
use crate::invalidation::{InvalidationContext, InvalidationTrigger};
use crate::monitor::PerformanceMonitor;
use crate::rate_limit::RateLimiter;
use crate::registry::AdapterRegistry;
use crate::retry::execute_with_retry;
use crate::sync::SyncEngine;
use crate::validation::DataValidator;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::{CoreEvent, StandardizedGameData, SyncEvent, SyncEventKind};

/// The aggregation core, fully wired
pub struct GameDataAggregator {
    config: AggregatorConfig,
    bus: EventBus,
    breakers: Arc<CircuitBreakerManager>,
    registry: Arc<AdapterRegistry>,
    validator: Arc<DataValidator>,
    cache: Arc<CacheManager>,
    sync: Arc<SyncEngine>,
    monitor: Arc<PerformanceMonitor>,
    rate_limiter: RateLimiter,
    initialized: AtomicBool,
    wiring_task: Mutex<Option<JoinHandle<()>>>,
}

impl GameDataAggregator {
    /// Construct and wire every component from one validated config
    pub fn new(config: AggregatorConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let bus = EventBus::new(config.event_bus_capacity);
        let breakers = Arc::new(CircuitBreakerManager::new(CircuitBreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            reset_timeout: Duration::from_secs(config.breaker_reset_timeout_secs),
        }));
        let registry = AdapterRegistry::new(
            breakers.clone(),
            bus.clone(),
            config.health_check_interval(),
        );
        let validator = Arc::new(DataValidator::new(
            registry.clone(),
            config.enable_cross_game_validation,
            Duration::from_secs(config.validation_cache_ttl_secs),
            config.timestamp_drift_tolerance_secs,
        ));
        let cache = CacheManager::new(
            config.cache.ttl(),
            config.cache.max_entries,
            config.enable_compression,
            config.compression_threshold_bytes,
            Duration::from_secs(config.cache_cleanup_interval_secs),
            bus.clone(),
        );
        let sync = SyncEngine::new(
            registry.clone(),
            validator.clone(),
            breakers.clone(),
            bus.clone(),
            config.batch_interval(),
            config.batch_size,
            config.enable_real_time_sync,
        );
        let monitor = PerformanceMonitor::new(
            config.monitor.clone(),
            Duration::from_secs(config.monitor_collection_interval_secs),
            bus.clone(),
        );

        Ok(Arc::new(Self {
            config,
            bus,
            breakers,
            registry,
            validator,
            cache,
            sync,
            monitor,
            rate_limiter: RateLimiter::new(),
            initialized: AtomicBool::new(false),
            wiring_task: Mutex::new(None),
        }))
    }

    /// Start every component: cache sweeper, sync engine, monitor, in that
    /// order, plus registry health checking and the cross-cutting event
    /// wiring. Not reentrant.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(AdapterError::Internal(
                "aggregator already initialized".to_string(),
            ));
        }

        self.cache.start_cleanup();
        self.sync.start();
        self.monitor.start();
        self.registry.start_health_checks();
        self.start_wiring();

        info!("aggregator initialized");
        Ok(())
    }

    /// Register a game by adapter, deriving a default config from its
    /// capability descriptors
    pub async fn register_game(&self, adapter: Arc<dyn GameAdapter>) -> Result<()> {
        let config =
            GameAdapterConfig::defaults_for(adapter.game_id(), adapter.game_name());
        self.register_game_with_config(adapter, config).await
    }

    /// Register a game with an explicit, validated config
    pub async fn register_game_with_config(
        &self,
        adapter: Arc<dyn GameAdapter>,
        config: GameAdapterConfig,
    ) -> Result<()> {
        let game_id = config.game_id.clone();
        let requests_per_minute = config.requests_per_minute;

        self.registry.register_adapter(adapter, config).await?;

        if let Some(rpm) = requests_per_minute {
            self.rate_limiter.configure_game(&game_id, rpm);
        }

        if self.config.enable_real_time_sync {
            match self.sync.start_game_sync(&game_id).await {
                Ok(()) => {}
                Err(AdapterError::SyncAlreadyStarted { .. }) => {
                    // The registry-event listener won the race
                    debug!(game_id, "sync already running");
                }
                Err(err) => {
                    warn!(game_id, error = %err, "could not start sync for new game");
                }
            }
        }
        Ok(())
    }

    /// Unregister a game; its sync stops via the registry event
    pub async fn unregister_game(&self, game_id: &str) -> Result<()> {
        self.registry.unregister_adapter(game_id).await?;
        self.rate_limiter.remove_game(game_id);
        Ok(())
    }

    /// One player's normalized data for one game: cache first, then a
    /// rate-limited, breaker-wrapped, retried adapter fetch plus validation.
    /// Latency and outcome are recorded on both paths.
    pub async fn get_player_game_data(
        &self,
        player_id: &str,
        game_id: &str,
    ) -> Result<StandardizedGameData> {
        let started = Instant::now();
        let key = CacheKey::new("player_data")
            .game(game_id)
            .player(player_id)
            .build();

        if let Some(data) = self.cache.get::<StandardizedGameData>(&key) {
            self.monitor.record_request(started.elapsed(), true);
            return Ok(data);
        }

        let result = self.fetch_and_validate(player_id, game_id, &key).await;
        match &result {
            Ok(_) => self.monitor.record_request(started.elapsed(), true),
            Err(err) => {
                self.monitor.record_request(started.elapsed(), false);
                self.bus.publish(CoreEvent::AdapterError {
                    game_id: game_id.to_string(),
                    message: err.to_string(),
                });
            }
        }
        result
    }

    async fn fetch_and_validate(
        &self,
        player_id: &str,
        game_id: &str,
        cache_key: &str,
    ) -> Result<StandardizedGameData> {
        let adapter =
            self.registry
                .get_adapter(game_id)
                .await
                .ok_or_else(|| AdapterError::GameNotFound {
                    game_id: game_id.to_string(),
                })?;
        let registration = self.registry.get_registration(game_id).await;

        self.rate_limiter.wait(game_id).await;

        let retry = registration
            .as_ref()
            .map(|r| r.config.retry.clone())
            .unwrap_or_default();
        let breaker = self.breakers.breaker(game_id);

        let data = breaker
            .call(|| {
                execute_with_retry(
                    || adapter.fetch_player_data(player_id),
                    &retry,
                    "get_player_game_data",
                )
            })
            .await?;

        let outcome = self.validator.validate_player_data(&data).await;
        if !outcome.is_valid {
            return Err(AdapterError::ValidationFailed(outcome.errors.join("; ")));
        }
        for warning in &outcome.warnings {
            debug!(game_id, player_id, warning, "validation warning");
        }

        let ttl = registration.map(|r| r.config.cache.ttl());
        self.cache.set(cache_key, &data.normalized, ttl);
        Ok(data.normalized)
    }

    /// One player's normalized data across every registered game: the
    /// aggregate cache entry first, then a fan-out sync.
    ///
    /// Partial results: failing or invalid games are excluded, never fatal.
    /// Valid snapshots are cached per game and as one aggregate entry.
    pub async fn sync_player_data(
        &self,
        player_id: &str,
    ) -> HashMap<String, StandardizedGameData> {
        let started = Instant::now();
        let aggregate_key = CacheKey::new("player_sync").player(player_id).build();

        if let Some(aggregated) = self
            .cache
            .get::<HashMap<String, StandardizedGameData>>(&aggregate_key)
        {
            self.monitor.record_request(started.elapsed(), true);
            return aggregated;
        }

        let mut aggregated = HashMap::new();
        for data in self.sync.sync_player(player_id).await {
            let outcome = self.validator.validate_player_data(&data).await;
            if !outcome.is_valid {
                warn!(
                    game_id = data.game_id,
                    player_id,
                    errors = outcome.errors.join("; "),
                    "dropping invalid sync result"
                );
                continue;
            }

            let key = CacheKey::new("player_data")
                .game(&data.game_id)
                .player(player_id)
                .build();
            let ttl = self
                .registry
                .get_registration(&data.game_id)
                .await
                .map(|r| r.config.cache.ttl());
            self.cache.set(&key, &data.normalized, ttl);
            aggregated.insert(data.game_id.clone(), data.normalized);
        }

        if !aggregated.is_empty() {
            self.cache.set(&aggregate_key, &aggregated, None);
        }
        self.monitor.record_request(started.elapsed(), true);
        aggregated
    }

    /// Subscribe to every core event
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.bus.subscribe()
    }

    /// Registry handle for queries and lifecycle operations
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Cache handle for direct reads and invalidation
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Sync engine handle for status queries
    pub fn sync_engine(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    /// Monitor handle for metrics and alert management
    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// Circuit breaker manager handle for observability
    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    /// Tear everything down in reverse dependency order
    pub async fn shutdown(&self) {
        if let Some(task) = self.wiring_task.lock().take() {
            task.abort();
        }
        self.monitor.stop();
        self.sync.shutdown().await;
        self.cache.stop_cleanup();
        self.registry.destroy().await;
        self.initialized.store(false, Ordering::SeqCst);
        info!("aggregator shut down");
    }

    /// Wire cross-cutting flows: a validated player update invalidates that
    /// player's cache families
    fn start_wiring(self: &Arc<Self>) {
        let mut guard = self.wiring_task.lock();
        if guard.is_some() {
            return;
        }

        let aggregator = Arc::clone(self);
        let mut events = self.bus.subscribe();
        *guard = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(CoreEvent::Sync(SyncEvent {
                        kind: SyncEventKind::PlayerUpdate,
                        game_id,
                        player_id: Some(player_id),
                        ..
                    })) => {
                        let context = InvalidationContext::player(game_id, player_id);
                        aggregator
                            .cache
                            .fire_trigger(InvalidationTrigger::PlayerUpdate, &context);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "facade wiring lagged on event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }
}
