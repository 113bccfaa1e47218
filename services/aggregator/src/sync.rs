//! # Sync Engine
//!
//! Continuous per-game synchronization: adapter push callbacks append raw
//! updates to in-memory queues, a fixed-interval batch timer drains each
//! game's queue in configurable chunks, validates every update and
//! republishes the outcome as typed sync events. On-demand
//! [`sync_player`](SyncEngine::sync_player) fans a single fetch out across
//! every registered adapter with settle-all semantics.

use crate::bus::EventBus;
use crate::circuit_breaker::CircuitBreakerManager;
use crate::error::{AdapterError, Result};
use crate::registry::AdapterRegistry;
use crate::validation::DataValidator;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::{CoreEvent, PlayerGameData, SyncEvent, SyncStatus};

struct GameSyncState {
    is_connected: bool,
    last_sync_time: Option<chrono::DateTime<Utc>>,
    error_count: u64,
    last_error: Option<String>,
}

/// Per-game sync bookkeeping: the pending-update queue plus live status
struct GameSync {
    queue: Mutex<VecDeque<PlayerGameData>>,
    state: Mutex<GameSyncState>,
}

impl GameSync {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            state: Mutex::new(GameSyncState {
                is_connected: true,
                last_sync_time: None,
                error_count: 0,
                last_error: None,
            }),
        })
    }

    fn status(&self) -> SyncStatus {
        let state = self.state.lock();
        SyncStatus {
            is_connected: state.is_connected,
            last_sync_time: state.last_sync_time,
            pending_updates: self.queue.lock().len(),
            error_count: state.error_count,
            last_error: state.last_error.clone(),
        }
    }

    fn record_error(&self, message: &str) {
        let mut state = self.state.lock();
        state.error_count += 1;
        state.last_error = Some(message.to_string());
    }
}

/// Orchestrates continuous synchronization for every registered game
pub struct SyncEngine {
    registry: Arc<AdapterRegistry>,
    validator: Arc<DataValidator>,
    breakers: Arc<CircuitBreakerManager>,
    bus: EventBus,
    games: DashMap<String, Arc<GameSync>>,
    batch_interval: Duration,
    batch_size: usize,
    auto_start: bool,
    batch_task: Mutex<Option<JoinHandle<()>>>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// New engine; `auto_start` controls whether registry lifecycle events
    /// start and stop game syncs automatically
    pub fn new(
        registry: Arc<AdapterRegistry>,
        validator: Arc<DataValidator>,
        breakers: Arc<CircuitBreakerManager>,
        bus: EventBus,
        batch_interval: Duration,
        batch_size: usize,
        auto_start: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            validator,
            breakers,
            bus,
            games: DashMap::new(),
            batch_interval,
            batch_size,
            auto_start,
            batch_task: Mutex::new(None),
            listener_task: Mutex::new(None),
        })
    }

    /// Start continuous sync for one game.
    ///
    /// Looks the adapter up in the registry, rejects duplicate starts,
    /// subscribes to the adapter's push feed and marks the game connected.
    /// The push callback only appends to the pending queue; it can never
    /// block the batch timer.
    pub async fn start_game_sync(&self, game_id: &str) -> Result<()> {
        let adapter =
            self.registry
                .get_adapter(game_id)
                .await
                .ok_or_else(|| AdapterError::GameNotFound {
                    game_id: game_id.to_string(),
                })?;

        let sync = match self.games.entry(game_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(AdapterError::SyncAlreadyStarted {
                    game_id: game_id.to_string(),
                });
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let sync = GameSync::new();
                vacant.insert(sync.clone());
                sync
            }
        };

        let queue_sync = sync.clone();
        let callback: crate::adapter::UpdateCallback = Arc::new(move |update| {
            queue_sync.queue.lock().push_back(update);
        });

        if let Err(err) = adapter.subscribe_to_updates(callback).await {
            self.games.remove(game_id);
            return Err(err);
        }

        info!(game_id, "game sync started");
        Ok(())
    }

    /// Stop sync for one game, flushing whatever is still queued before the
    /// state is torn down.
    pub async fn stop_game_sync(&self, game_id: &str) -> Result<()> {
        let (_, sync) =
            self.games
                .remove(game_id)
                .ok_or_else(|| AdapterError::GameNotFound {
                    game_id: game_id.to_string(),
                })?;

        // Best-effort unsubscribe; the adapter may already be gone
        if let Some(adapter) = self.registry.get_adapter(game_id).await {
            if let Err(err) = adapter.unsubscribe_from_updates().await {
                warn!(game_id, error = %err, "unsubscribe during sync stop failed");
            }
        }

        sync.state.lock().is_connected = false;
        self.drain_game(game_id, &sync).await;

        info!(game_id, "game sync stopped");
        Ok(())
    }

    /// Live status for one game's sync, if started
    pub fn sync_status(&self, game_id: &str) -> Option<SyncStatus> {
        self.games.get(game_id).map(|sync| sync.status())
    }

    /// Status of every running game sync
    pub fn all_statuses(&self) -> HashMap<String, SyncStatus> {
        self.games
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }

    /// On-demand fetch of one player across every registered adapter.
    ///
    /// Fetches run concurrently, each wrapped by its game's circuit
    /// breaker, with settle-all semantics: a failing adapter is recorded as
    /// a sync error for its game and excluded from the result — partial
    /// results are returned, never an aggregate failure.
    pub async fn sync_player(&self, player_id: &str) -> Vec<PlayerGameData> {
        let adapters = self.registry.all_adapters().await;

        let fetches = adapters.into_iter().map(|(game_id, adapter)| {
            let breaker = self.breakers.breaker(&game_id);
            let player_id = player_id.to_string();
            async move {
                let result = breaker
                    .call(|| async { adapter.fetch_player_data(&player_id).await })
                    .await;
                (game_id, result)
            }
        });

        let mut results = Vec::new();
        for (game_id, result) in join_all(fetches).await {
            match result {
                Ok(data) => results.push(data),
                Err(err) => {
                    debug!(game_id, player_id, error = %err, "sync_player fetch failed");
                    if let Some(sync) = self.games.get(&game_id) {
                        sync.record_error(&err.to_string());
                    }
                    self.bus.publish(CoreEvent::Sync(SyncEvent::sync_error(
                        game_id,
                        Some(player_id.to_string()),
                        err.to_string(),
                    )));
                }
            }
        }
        results
    }

    /// Start the batch timer and the registry-event listener. Idempotent.
    pub fn start(self: &Arc<Self>) {
        {
            let mut guard = self.batch_task.lock();
            if guard.is_none() {
                let engine = Arc::clone(self);
                let interval = self.batch_interval;
                *guard = Some(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.tick().await;
                    loop {
                        ticker.tick().await;
                        engine.run_batch_cycle().await;
                    }
                }));
            }
        }

        {
            let mut guard = self.listener_task.lock();
            if guard.is_none() {
                let engine = Arc::clone(self);
                let mut events = self.bus.subscribe();
                *guard = Some(tokio::spawn(async move {
                    loop {
                        match events.recv().await {
                            Ok(CoreEvent::AdapterRegistered { game_id }) => {
                                if engine.auto_start {
                                    if let Err(err) = engine.start_game_sync(&game_id).await {
                                        warn!(game_id, error = %err, "auto-start sync failed");
                                    }
                                }
                            }
                            Ok(CoreEvent::AdapterUnregistered { game_id }) => {
                                if let Err(err) = engine.stop_game_sync(&game_id).await {
                                    debug!(game_id, error = %err, "auto-stop sync skipped");
                                }
                            }
                            Ok(_) => {}
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(skipped, "sync engine lagged on event bus");
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }));
            }
        }
        debug!("sync engine started");
    }

    /// One pass over every game: drain its queue in batch-size chunks,
    /// validate each update and republish. Any per-game problem is logged
    /// and must never stop the other games or future cycles.
    pub async fn run_batch_cycle(&self) {
        let games: Vec<(String, Arc<GameSync>)> = self
            .games
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (game_id, sync) in games {
            self.drain_game(&game_id, &sync).await;
        }
    }

    /// Drain one game's queue completely, processing in chunks
    async fn drain_game(&self, game_id: &str, sync: &Arc<GameSync>) {
        let mut processed = 0usize;
        loop {
            let batch: Vec<PlayerGameData> = {
                let mut queue = sync.queue.lock();
                let take = self.batch_size.min(queue.len());
                queue.drain(..take).collect()
            };
            if batch.is_empty() {
                break;
            }

            processed += batch.len();
            for update in batch {
                self.process_update(game_id, sync, update).await;
            }
        }

        if processed > 0 {
            debug!(game_id, processed, "batch flush");
        }
        sync.state.lock().last_sync_time = Some(Utc::now());
    }

    async fn process_update(&self, game_id: &str, sync: &Arc<GameSync>, update: PlayerGameData) {
        let outcome = self.validator.validate_player_data(&update).await;
        if outcome.is_valid {
            self.bus
                .publish(CoreEvent::Sync(SyncEvent::player_update(update.normalized)));
        } else {
            let message = outcome.errors.join("; ");
            warn!(game_id, player_id = update.player_id, message, "update rejected");
            sync.record_error(&message);
            self.bus.publish(CoreEvent::Sync(SyncEvent::sync_error(
                game_id,
                Some(update.player_id),
                message,
            )));
        }
    }

    /// Stop every game sync and both background tasks
    pub async fn shutdown(&self) {
        if let Some(task) = self.listener_task.lock().take() {
            task.abort();
        }

        let game_ids: Vec<String> = self.games.iter().map(|e| e.key().clone()).collect();
        for game_id in game_ids {
            if let Err(err) = self.stop_game_sync(&game_id).await {
                error!(game_id, error = %err, "stop during shutdown failed");
            }
        }

        if let Some(task) = self.batch_task.lock().take() {
            task.abort();
        }
        info!("sync engine shut down");
    }
}
