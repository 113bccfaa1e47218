//! Keyed, TTL-based cache with trigger-driven pattern invalidation
//!
//! The cache is advisory, never authoritative: a miss, a serialization
//! problem or an eviction degrades to `None`/no-op rather than propagating.
//! Callers must always be able to fall back to the source adapter.

use crate::bus::EventBus;
use crate::invalidation::{
    default_strategies, wildcard_to_regex, InvalidationContext, InvalidationStrategy,
    InvalidationTrigger,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use types::{CacheEvent, CacheEventKind, CoreEvent};

const KEY_PREFIX: &str = "gb";

/// Structured cache key; building it is deterministic regardless of the
/// order fields were supplied in
#[derive(Debug, Clone, Default)]
pub struct CacheKey {
    kind: String,
    game_id: Option<String>,
    player_id: Option<String>,
    asset_id: Option<String>,
    achievement_id: Option<String>,
    // BTreeMap keeps extra params sorted, so insertion order is irrelevant
    params: BTreeMap<String, String>,
}

impl CacheKey {
    /// Key for one logical cache family (e.g. `player_data`)
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Scope the key to a game
    pub fn game(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    /// Scope the key to a player
    pub fn player(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    /// Scope the key to an asset
    pub fn asset(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    /// Scope the key to an achievement
    pub fn achievement(mut self, achievement_id: impl Into<String>) -> Self {
        self.achievement_id = Some(achievement_id.into());
        self
    }

    /// Attach an extra parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Render the deterministic string key
    pub fn build(&self) -> String {
        let mut parts = vec![KEY_PREFIX.to_string(), self.kind.clone()];
        for part in [
            &self.game_id,
            &self.player_id,
            &self.asset_id,
            &self.achievement_id,
        ]
        .into_iter()
        .flatten()
        {
            parts.push(part.clone());
        }
        for (key, value) in &self.params {
            parts.push(format!("{key}={value}"));
        }
        parts.join(":")
    }
}

struct CacheEntry {
    value: Vec<u8>,
    compressed: bool,
    size: usize,
    ttl: Duration,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Counters snapshot for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Live entries (including not-yet-swept expired ones)
    pub entries: usize,
    /// Reads that found a live entry
    pub hits: u64,
    /// Reads that found nothing
    pub misses: u64,
    /// Values stored
    pub sets: u64,
    /// Keys deleted (directly or via invalidation)
    pub deletes: u64,
    /// Entries evicted to respect the size bound
    pub evictions: u64,
}

impl CacheStats {
    /// Hits over all reads, 0.0 when nothing was read yet
    pub fn hit_rate(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            0.0
        } else {
            self.hits as f64 / reads as f64
        }
    }
}

/// TTL-based in-memory cache with pattern invalidation
pub struct CacheManager {
    entries: dashmap::DashMap<String, CacheEntry>,
    strategies: parking_lot::RwLock<Vec<InvalidationStrategy>>,
    bus: EventBus,
    default_ttl: Duration,
    max_entries: usize,
    compression_enabled: bool,
    compression_threshold: usize,
    cleanup_interval: Duration,
    cleanup_task: parking_lot::Mutex<Option<JoinHandle<()>>>,

    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
}

impl CacheManager {
    /// New manager with the default invalidation strategies installed
    pub fn new(
        default_ttl: Duration,
        max_entries: usize,
        compression_enabled: bool,
        compression_threshold: usize,
        cleanup_interval: Duration,
        bus: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            entries: dashmap::DashMap::new(),
            strategies: parking_lot::RwLock::new(default_strategies()),
            bus,
            default_ttl,
            max_entries,
            compression_enabled,
            compression_threshold,
            cleanup_interval,
            cleanup_task: parking_lot::Mutex::new(None),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Read a value. Expired entries are removed eagerly; any problem
    /// (missing key, corrupt payload) degrades to `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = {
            let mut entry = match self.entries.get_mut(key) {
                Some(entry) => entry,
                None => {
                    self.record_miss(key);
                    return None;
                }
            };

            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                self.record_miss(key);
                return None;
            }

            entry.last_accessed = Instant::now();
            entry.access_count += 1;

            if entry.compressed {
                match lz4_flex::decompress_size_prepended(&entry.value) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        drop(entry);
                        self.entries.remove(key);
                        self.record_error(key, &format!("decompression failed: {err}"));
                        return None;
                    }
                }
            } else {
                entry.value.clone()
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.emit(CacheEventKind::Hit, key, None);
                Some(value)
            }
            Err(err) => {
                self.entries.remove(key);
                self.record_error(key, &format!("deserialization failed: {err}"));
                None
            }
        }
    }

    /// Store a value under `key`. Serialization failures are swallowed (the
    /// cache is advisory); oversized values are compressed when enabled.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.record_error(key, &format!("serialization failed: {err}"));
                return;
            }
        };

        let size = bytes.len();
        let (value, compressed) =
            if self.compression_enabled && size > self.compression_threshold {
                (lz4_flex::compress_prepend_size(&bytes), true)
            } else {
                (bytes, false)
            };

        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.evict_lru();
        }

        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                compressed,
                size,
                ttl: ttl.unwrap_or(self.default_ttl),
                created_at: now,
                last_accessed: now,
                access_count: 0,
            },
        );
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.emit(CacheEventKind::Set, key, None);
    }

    /// Delete one key; returns whether it existed
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.deletes.fetch_add(1, Ordering::Relaxed);
            self.emit(CacheEventKind::Delete, key, None);
        }
        removed
    }

    /// Delete every key matching a `*`-wildcard pattern; returns how many
    /// were removed
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let regex = wildcard_to_regex(pattern);
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| regex.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in matching {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            self.deletes.fetch_add(removed as u64, Ordering::Relaxed);
        }
        debug!(pattern, removed, "pattern invalidation");
        self.emit(
            CacheEventKind::InvalidatePattern,
            pattern,
            Some(removed.to_string()),
        );
        removed
    }

    /// Cut the TTL of every key matching `pattern` to `ttl`
    fn shorten_ttl_pattern(&self, pattern: &str, ttl: Duration) -> usize {
        let regex = wildcard_to_regex(pattern);
        let mut touched = 0;
        for mut entry in self.entries.iter_mut() {
            if regex.is_match(entry.key()) {
                let elapsed = entry.created_at.elapsed();
                entry.ttl = elapsed + ttl;
                touched += 1;
            }
        }
        touched
    }

    /// Fire a business trigger: every strategy responding to it resolves its
    /// pattern against `context` (unresolved placeholders become wildcards)
    /// and invalidates the matching keys. Returns total keys affected.
    pub fn fire_trigger(
        &self,
        trigger: InvalidationTrigger,
        context: &InvalidationContext,
    ) -> usize {
        let strategies: Vec<InvalidationStrategy> = self
            .strategies
            .read()
            .iter()
            .filter(|s| s.responds_to(trigger))
            .cloned()
            .collect();

        let mut affected = 0;
        for strategy in strategies {
            let pattern = strategy.resolve(context);
            affected += match strategy.ttl_override {
                Some(ttl) => self.shorten_ttl_pattern(&pattern, ttl),
                None => self.invalidate_pattern(&pattern),
            };
        }
        affected
    }

    /// Install an additional invalidation strategy
    pub fn register_strategy(&self, strategy: InvalidationStrategy) {
        self.strategies.write().push(strategy);
    }

    /// Remove entries already expired; returns how many were swept
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    /// Start the periodic expiry sweep. Idempotent.
    pub fn start_cleanup(self: &Arc<Self>) {
        let mut guard = self.cleanup_task.lock();
        if guard.is_some() {
            return;
        }

        let cache = Arc::clone(self);
        let interval = self.cleanup_interval;
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let swept = cache.cleanup_expired();
                if swept > 0 {
                    debug!(swept, "cache expiry sweep");
                }
            }
        }));
    }

    /// Stop the expiry sweep. Idempotent.
    pub fn stop_cleanup(&self) {
        if let Some(task) = self.cleanup_task.lock().take() {
            task.abort();
        }
    }

    /// Live counter snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_lru(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_accessed)
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key, "evicted least-recently-accessed entry");
        }
    }

    fn record_miss(&self, key: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.emit(CacheEventKind::Miss, key, None);
    }

    fn record_error(&self, key: &str, detail: &str) {
        warn!(key, detail, "cache error degraded to miss");
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.emit(CacheEventKind::Error, key, Some(detail.to_string()));
    }

    fn emit(&self, kind: CacheEventKind, key: &str, detail: Option<String>) {
        self.bus.publish(CoreEvent::Cache(CacheEvent {
            kind,
            key: key.to_string(),
            detail,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> Arc<CacheManager> {
        CacheManager::new(
            Duration::from_secs(300),
            100,
            true,
            1024,
            Duration::from_secs(60),
            EventBus::new(256),
        )
    }

    #[test]
    fn key_building_is_order_independent() {
        let a = CacheKey::new("player_data")
            .game("g1")
            .player("p1")
            .param("b", "2")
            .param("a", "1")
            .build();
        let b = CacheKey::new("player_data")
            .player("p1")
            .game("g1")
            .param("a", "1")
            .param("b", "2")
            .build();
        assert_eq!(a, b);
        assert_eq!(a, "gb:player_data:g1:p1:a=1:b=2");
    }

    #[test]
    fn set_get_round_trip() {
        let cache = cache();
        let key = CacheKey::new("player_data").game("g1").player("p1").build();

        cache.set(&key, &json!({"level": 9}), None);
        let value: serde_json::Value = cache.get(&key).unwrap();
        assert_eq!(value["level"], 9);

        let stats = cache.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn miss_returns_none() {
        let cache = cache();
        let value: Option<serde_json::Value> = cache.get("gb:player_data:missing");
        assert!(value.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn expired_entries_are_removed_on_read() {
        let cache = cache();
        cache.set("k", &json!(1), Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(5));

        let value: Option<serde_json::Value> = cache.get("k");
        assert!(value.is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn large_values_compress_transparently() {
        let cache = cache();
        // Well over the 1 KiB threshold, and compressible
        let big = "x".repeat(64 * 1024);
        cache.set("big", &big, None);

        let entry_size = cache.entries.get("big").unwrap().value.len();
        assert!(entry_size < big.len());
        assert!(cache.entries.get("big").unwrap().compressed);

        let back: String = cache.get("big").unwrap();
        assert_eq!(back, big);
    }

    #[test]
    fn small_values_stay_uncompressed() {
        let cache = cache();
        cache.set("small", &json!({"a": 1}), None);
        assert!(!cache.entries.get("small").unwrap().compressed);
    }

    #[test]
    fn eviction_respects_max_entries() {
        let cache = CacheManager::new(
            Duration::from_secs(300),
            3,
            false,
            1024,
            Duration::from_secs(60),
            EventBus::new(256),
        );

        for i in 0..3 {
            cache.set(&format!("k{i}"), &json!(i), None);
        }
        // Touch k0 so k1 becomes the LRU victim
        std::thread::sleep(Duration::from_millis(5));
        let _: Option<serde_json::Value> = cache.get("k0");

        cache.set("k3", &json!(3), None);
        assert_eq!(cache.stats().entries, 3);
        assert_eq!(cache.stats().evictions, 1);
        let gone: Option<serde_json::Value> = cache.get("k1");
        assert!(gone.is_none());
    }

    #[test]
    fn pattern_invalidation_deletes_matches_only() {
        let cache = cache();
        cache.set("gb:player_data:g1:p1", &json!(1), None);
        cache.set("gb:player_data:g2:p1", &json!(2), None);
        cache.set("gb:player_data:g1:p2", &json!(3), None);

        let removed = cache.invalidate_pattern("gb:player_data:*:p1");
        assert_eq!(removed, 2);
        let survivor: Option<serde_json::Value> = cache.get("gb:player_data:g1:p2");
        assert!(survivor.is_some());
    }

    #[test]
    fn fire_trigger_resolves_and_wildcards() {
        let cache = cache();
        cache.set("gb:player_data:g1:p1", &json!(1), None);
        cache.set("gb:assets:g2:p1", &json!(2), None);
        cache.set("gb:player_data:g1:p2", &json!(3), None);

        // No game in context: {game_id} wildcards, both of p1's families go
        let affected = cache.fire_trigger(
            InvalidationTrigger::PlayerUpdate,
            &InvalidationContext::player_only("p1"),
        );
        assert_eq!(affected, 2);
        let survivor: Option<serde_json::Value> = cache.get("gb:player_data:g1:p2");
        assert!(survivor.is_some());
    }

    #[test]
    fn trigger_filtering_by_strategy() {
        let cache = cache();
        cache.set("gb:achievements:g1:p1", &json!(1), None);
        cache.set("gb:assets:g1:p1", &json!(2), None);

        // asset_transfer does not touch the achievements family
        cache.fire_trigger(
            InvalidationTrigger::AssetTransfer,
            &InvalidationContext::player("g1", "p1"),
        );
        let achievements: Option<serde_json::Value> = cache.get("gb:achievements:g1:p1");
        assert!(achievements.is_some());
        let assets: Option<serde_json::Value> = cache.get("gb:assets:g1:p1");
        assert!(assets.is_none());
    }

    #[test]
    fn ttl_override_soft_invalidates() {
        let cache = cache();
        cache.register_strategy(
            InvalidationStrategy::new(
                "session_soft",
                "gb:session:{player_id}*",
                [InvalidationTrigger::PlayerUpdate],
            )
            .with_ttl_override(Duration::ZERO),
        );
        cache.set("gb:session:p1", &json!(1), None);

        cache.fire_trigger(
            InvalidationTrigger::PlayerUpdate,
            &InvalidationContext::player_only("p1"),
        );

        std::thread::sleep(Duration::from_millis(5));
        let gone: Option<serde_json::Value> = cache.get("gb:session:p1");
        assert!(gone.is_none());
    }

    #[test]
    fn cleanup_sweeps_expired_entries() {
        let cache = cache();
        cache.set("a", &json!(1), Some(Duration::ZERO));
        cache.set("b", &json!(2), None);
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.stats().entries, 1);
    }
}
