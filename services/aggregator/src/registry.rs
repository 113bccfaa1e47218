//! Adapter registry: plugin registration, health probing and lookup
//!
//! Holds the one-registration-per-game invariant. Registrations are created
//! by [`AdapterRegistry::register_adapter`], mutated by the background
//! health loop and [`AdapterRegistry::set_adapter_active`], and destroyed by
//! [`AdapterRegistry::unregister_adapter`].

use crate::adapter::GameAdapter;
use crate::bus::EventBus;
use crate::circuit_breaker::{CircuitBreakerManager, CircuitState};
use crate::config::GameAdapterConfig;
use crate::error::{AdapterError, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::{CoreEvent, GameFeature, HealthStatus};

/// One registered adapter and its live state
struct AdapterRegistration {
    adapter: Arc<dyn GameAdapter>,
    config: GameAdapterConfig,
    registered_at: DateTime<Utc>,
    is_active: bool,
    last_health_check: Option<DateTime<Utc>>,
    health: HealthStatus,
}

/// Serializable registration snapshot for observability and queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationInfo {
    /// The validated config this adapter was registered with
    pub config: GameAdapterConfig,
    /// When the registration was created
    pub registered_at: DateTime<Utc>,
    /// Whether queries may return this adapter
    pub is_active: bool,
    /// When the last health probe ran
    pub last_health_check: Option<DateTime<Utc>>,
    /// Result of the last health probe
    pub health: HealthStatus,
}

/// Registry of game-data-source plugins
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, AdapterRegistration>>,
    breakers: Arc<CircuitBreakerManager>,
    bus: EventBus,
    health_interval: Duration,
    health_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl AdapterRegistry {
    /// New registry probing adapter health every `health_interval`
    pub fn new(
        breakers: Arc<CircuitBreakerManager>,
        bus: EventBus,
        health_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            adapters: RwLock::new(HashMap::new()),
            breakers,
            bus,
            health_interval,
            health_task: parking_lot::Mutex::new(None),
        })
    }

    /// Register an adapter for its game.
    ///
    /// Rejects invalid configs and duplicate game ids before touching the
    /// registry; the adapter's health is probed before insertion so the
    /// registration never starts with unknown status. A rejected
    /// registration leaves no partial state behind.
    pub async fn register_adapter(
        &self,
        adapter: Arc<dyn GameAdapter>,
        config: GameAdapterConfig,
    ) -> Result<()> {
        config.validate()?;

        if adapter.game_id() != config.game_id {
            return Err(AdapterError::Configuration(format!(
                "adapter reports game id {} but config is for {}",
                adapter.game_id(),
                config.game_id
            )));
        }

        let game_id = config.game_id.clone();
        if self.adapters.read().await.contains_key(&game_id) {
            return Err(AdapterError::AlreadyRegistered { game_id });
        }

        let health = self.probe_health(&game_id, &adapter).await;

        {
            let mut adapters = self.adapters.write().await;
            // A concurrent register may have won while we probed
            if adapters.contains_key(&game_id) {
                return Err(AdapterError::AlreadyRegistered { game_id });
            }
            adapters.insert(
                game_id.clone(),
                AdapterRegistration {
                    adapter,
                    config,
                    registered_at: Utc::now(),
                    is_active: true,
                    last_health_check: Some(Utc::now()),
                    health,
                },
            );
        }

        info!(game_id, ?health, "adapter registered");
        self.bus.publish(CoreEvent::AdapterRegistered { game_id });
        Ok(())
    }

    /// Remove a registration, best-effort unsubscribing its adapter first.
    ///
    /// Cleanup failures are logged, never propagated; the entry is removed
    /// regardless.
    pub async fn unregister_adapter(&self, game_id: &str) -> Result<()> {
        let adapter = {
            let adapters = self.adapters.read().await;
            adapters
                .get(game_id)
                .map(|reg| reg.adapter.clone())
                .ok_or_else(|| AdapterError::GameNotFound {
                    game_id: game_id.to_string(),
                })?
        };

        if let Err(err) = adapter.unsubscribe_from_updates().await {
            warn!(game_id, error = %err, "unsubscribe during unregister failed");
        }

        self.adapters.write().await.remove(game_id);

        info!(game_id, "adapter unregistered");
        self.bus.publish(CoreEvent::AdapterUnregistered {
            game_id: game_id.to_string(),
        });
        Ok(())
    }

    /// Toggle whether queries may return this adapter
    pub async fn set_adapter_active(&self, game_id: &str, active: bool) -> Result<()> {
        let mut adapters = self.adapters.write().await;
        let registration =
            adapters
                .get_mut(game_id)
                .ok_or_else(|| AdapterError::GameNotFound {
                    game_id: game_id.to_string(),
                })?;
        registration.is_active = active;
        debug!(game_id, active, "adapter active flag changed");
        Ok(())
    }

    /// The active adapter for a game, if any
    pub async fn get_adapter(&self, game_id: &str) -> Option<Arc<dyn GameAdapter>> {
        let adapters = self.adapters.read().await;
        adapters
            .get(game_id)
            .filter(|reg| reg.is_active)
            .map(|reg| reg.adapter.clone())
    }

    /// Registration snapshot for a game (active only)
    pub async fn get_registration(&self, game_id: &str) -> Option<RegistrationInfo> {
        let adapters = self.adapters.read().await;
        adapters
            .get(game_id)
            .filter(|reg| reg.is_active)
            .map(snapshot)
    }

    /// All active adapters, keyed by game id
    pub async fn all_adapters(&self) -> HashMap<String, Arc<dyn GameAdapter>> {
        let adapters = self.adapters.read().await;
        adapters
            .iter()
            .filter(|(_, reg)| reg.is_active)
            .map(|(id, reg)| (id.clone(), reg.adapter.clone()))
            .collect()
    }

    /// Registration snapshots for every active adapter
    pub async fn all_registrations(&self) -> HashMap<String, RegistrationInfo> {
        let adapters = self.adapters.read().await;
        adapters
            .iter()
            .filter(|(_, reg)| reg.is_active)
            .map(|(id, reg)| (id.clone(), snapshot(reg)))
            .collect()
    }

    /// Active adapters declaring support for `feature`
    pub async fn adapters_by_feature(&self, feature: GameFeature) -> Vec<Arc<dyn GameAdapter>> {
        let adapters = self.adapters.read().await;
        adapters
            .values()
            .filter(|reg| reg.is_active && reg.adapter.supports_feature(feature))
            .map(|reg| reg.adapter.clone())
            .collect()
    }

    /// Whether an active registration exists for the game
    pub async fn is_game_supported(&self, game_id: &str) -> bool {
        let adapters = self.adapters.read().await;
        adapters
            .get(game_id)
            .map(|reg| reg.is_active)
            .unwrap_or(false)
    }

    /// Start the periodic health probe fan-out. Idempotent.
    pub fn start_health_checks(self: &Arc<Self>) {
        let mut guard = self.health_task.lock();
        if guard.is_some() {
            return;
        }

        let registry = Arc::clone(self);
        let interval = self.health_interval;
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately; skip it so probes start one
            // interval after startup
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.run_health_cycle().await;
            }
        }));
        debug!("registry health checking started");
    }

    /// Stop the health probe loop. Idempotent.
    pub fn stop_health_checks(&self) {
        if let Some(task) = self.health_task.lock().take() {
            task.abort();
            debug!("registry health checking stopped");
        }
    }

    /// One probe fan-out across all active adapters.
    ///
    /// Probes run concurrently with settle-all semantics: a slow or failing
    /// adapter never blocks or fails the others. Health-changed events fire
    /// only on actual transitions.
    async fn run_health_cycle(&self) {
        let targets: Vec<(String, Arc<dyn GameAdapter>)> = {
            let adapters = self.adapters.read().await;
            adapters
                .iter()
                .filter(|(_, reg)| reg.is_active)
                .map(|(id, reg)| (id.clone(), reg.adapter.clone()))
                .collect()
        };

        if targets.is_empty() {
            return;
        }

        let probes = targets.into_iter().map(|(game_id, adapter)| async move {
            let health = self.probe_health(&game_id, &adapter).await;
            (game_id, health)
        });
        let results = join_all(probes).await;

        let mut adapters = self.adapters.write().await;
        for (game_id, health) in results {
            let Some(registration) = adapters.get_mut(&game_id) else {
                // Unregistered while we probed
                continue;
            };
            registration.last_health_check = Some(Utc::now());
            if registration.health != health {
                info!(game_id, from = ?registration.health, to = ?health, "adapter health changed");
                registration.health = health;
                self.bus
                    .publish(CoreEvent::AdapterHealthChanged { game_id, status: health });
            }
        }
    }

    /// Probe one adapter through its circuit breaker.
    ///
    /// A passing probe behind a breaker that was not CLOSED when the probe
    /// started reports Degraded: the adapter is answering again but its
    /// recent failure history is still live.
    async fn probe_health(&self, game_id: &str, adapter: &Arc<dyn GameAdapter>) -> HealthStatus {
        let breaker = self.breakers.breaker(game_id);
        let state_before = breaker.state().await;

        let adapter = adapter.clone();
        let probe = breaker
            .call(move || async move {
                if adapter.is_healthy().await {
                    Ok(())
                } else {
                    Err(AdapterError::Internal(
                        "health probe reported unhealthy".to_string(),
                    ))
                }
            })
            .await;

        match probe {
            Ok(()) if state_before == CircuitState::Closed => HealthStatus::Healthy,
            Ok(()) => HealthStatus::Degraded,
            Err(err) => {
                debug!(game_id, error = %err, "health probe failed");
                HealthStatus::Unhealthy
            }
        }
    }

    /// Stop health checking and unregister every adapter, continuing past
    /// individual failures.
    pub async fn destroy(&self) {
        self.stop_health_checks();

        let game_ids: Vec<String> = {
            let adapters = self.adapters.read().await;
            adapters.keys().cloned().collect()
        };

        for game_id in game_ids {
            if let Err(err) = self.unregister_adapter(&game_id).await {
                error!(game_id, error = %err, "unregister during destroy failed");
            }
        }
        info!("adapter registry destroyed");
    }
}

fn snapshot(reg: &AdapterRegistration) -> RegistrationInfo {
    RegistrationInfo {
        config: reg.config.clone(),
        registered_at: reg.registered_at,
        is_active: reg.is_active,
        last_health_check: reg.last_health_check,
        health: reg.health,
    }
}
