//! # Gamebridge Unified Types Library
//!
//! Shared vocabulary for the Gamebridge aggregation core and everything that
//! consumes it: player snapshots, adapter capability descriptors, health
//! status, sync status, performance alerts, and the typed event vocabulary
//! published on the core event bus.
//!
//! ## Design Philosophy
//!
//! - **Unified Type System**: one library for every cross-service type, so
//!   the aggregator, downstream consumers and adapter plugins agree on shape
//! - **Normalized Snapshots**: every game backend is reduced to the same
//!   [`StandardizedGameData`] record regardless of its native format
//! - **Typed Events**: the event bus carries [`CoreEvent`] values, not string
//!   topics, so subscribers match exhaustively and the compiler catches
//!   missing handlers
//! - **Clear Boundaries**: wall-clock timestamps are `chrono::DateTime<Utc>`
//!   at the API boundary; elapsed-time math stays internal to services
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{GameFeature, StandardizedGameData};
//!
//! let snapshot = StandardizedGameData::empty("p1", "voidlands");
//! assert!(snapshot.assets.is_empty());
//! assert_ne!(GameFeature::Assets, GameFeature::Achievements);
//! ```
//!
//! ## Integration Points
//!
//! - **Aggregator Service**: registry, validator, sync engine and cache all
//!   operate on these types
//! - **Adapter Plugins**: implement the adapter contract in terms of
//!   [`PlayerGameData`] and [`GameAsset`]
//! - **Downstream Consumers**: marketplace, social and API layers subscribe
//!   to [`CoreEvent`] streams and read normalized snapshots

pub mod alerts;
pub mod events;
pub mod health;
pub mod player;

pub use alerts::{AlertSeverity, PerformanceAlert};
pub use events::{CacheEvent, CacheEventKind, CoreEvent, SyncEvent, SyncEventKind};
pub use health::{HealthStatus, SyncStatus};
pub use player::{
    Achievement, GameAsset, GameFeature, PlayerGameData, StandardizedGameData,
};
