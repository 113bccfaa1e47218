//! Trigger-driven cache invalidation strategies
//!
//! One business event (a player's asset moved, an achievement landed) can
//! invalidate every cache family keyed by that player without the caller
//! enumerating keys: each strategy declares the triggers it responds to and
//! a key pattern with `{placeholder}`s resolved from the runtime context.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Business events that strategies key off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationTrigger {
    /// A player's state changed
    PlayerUpdate,
    /// An asset changed owner
    AssetTransfer,
    /// A player earned an achievement
    AchievementEarned,
}

/// Runtime context a trigger fires with
#[derive(Debug, Clone, Default)]
pub struct InvalidationContext {
    /// Game the event concerns, when known
    pub game_id: Option<String>,
    /// Player the event concerns, when known
    pub player_id: Option<String>,
    /// Additional placeholder values
    pub extra: HashMap<String, String>,
}

impl InvalidationContext {
    /// Context for a player-scoped event
    pub fn player(game_id: impl Into<String>, player_id: impl Into<String>) -> Self {
        Self {
            game_id: Some(game_id.into()),
            player_id: Some(player_id.into()),
            extra: HashMap::new(),
        }
    }

    /// Context carrying only a player id
    pub fn player_only(player_id: impl Into<String>) -> Self {
        Self {
            game_id: None,
            player_id: Some(player_id.into()),
            extra: HashMap::new(),
        }
    }

    fn lookup(&self, placeholder: &str) -> Option<&str> {
        match placeholder {
            "game_id" => self.game_id.as_deref(),
            "player_id" => self.player_id.as_deref(),
            other => self.extra.get(other).map(String::as_str),
        }
    }
}

/// Static invalidation configuration resolved against context at fire time
#[derive(Debug, Clone)]
pub struct InvalidationStrategy {
    /// Strategy name for logs and observability
    pub name: String,

    /// Key pattern with `{placeholder}`s and `*` wildcards
    pub pattern: String,

    /// Triggers this strategy responds to
    pub triggers: HashSet<InvalidationTrigger>,

    /// When set, matched entries are soft-invalidated: their TTL is cut to
    /// this value instead of deleting them outright
    pub ttl_override: Option<Duration>,
}

impl InvalidationStrategy {
    /// New strategy responding to `triggers`
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        triggers: impl IntoIterator<Item = InvalidationTrigger>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            triggers: triggers.into_iter().collect(),
            ttl_override: None,
        }
    }

    /// Soft-invalidate matches by cutting their TTL instead of deleting
    pub fn with_ttl_override(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    /// Whether this strategy responds to `trigger`
    pub fn responds_to(&self, trigger: InvalidationTrigger) -> bool {
        self.triggers.contains(&trigger)
    }

    /// Resolve the pattern against a context. Placeholders the context
    /// cannot fill become wildcards.
    pub fn resolve(&self, context: &InvalidationContext) -> String {
        let mut resolved = String::with_capacity(self.pattern.len());
        let mut rest = self.pattern.as_str();

        while let Some(open) = rest.find('{') {
            resolved.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let placeholder = &after[..close];
                    match context.lookup(placeholder) {
                        Some(value) => resolved.push_str(value),
                        None => resolved.push('*'),
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    // Unterminated brace, keep literally
                    resolved.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        resolved.push_str(rest);
        resolved
    }
}

/// Compile a `*`-wildcard key pattern to an anchored regex
pub fn wildcard_to_regex(pattern: &str) -> Regex {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push('^');
    let mut first = true;
    for segment in pattern.split('*') {
        if !first {
            expression.push_str(".*");
        }
        first = false;
        expression.push_str(&regex::escape(segment));
    }
    expression.push('$');

    // The expression is built from escaped literals and ".*" only
    Regex::new(&expression).expect("escaped wildcard pattern is always a valid regex")
}

/// The strategies every cache manager starts with: one per cache family
/// keyed by player
pub fn default_strategies() -> Vec<InvalidationStrategy> {
    vec![
        InvalidationStrategy::new(
            "player_snapshots",
            "gb:player_data:{game_id}:{player_id}*",
            [
                InvalidationTrigger::PlayerUpdate,
                InvalidationTrigger::AssetTransfer,
                InvalidationTrigger::AchievementEarned,
            ],
        ),
        InvalidationStrategy::new(
            "player_assets",
            "gb:assets:{game_id}:{player_id}*",
            [
                InvalidationTrigger::PlayerUpdate,
                InvalidationTrigger::AssetTransfer,
            ],
        ),
        InvalidationStrategy::new(
            "player_achievements",
            "gb:achievements:{game_id}:{player_id}*",
            [
                InvalidationTrigger::PlayerUpdate,
                InvalidationTrigger::AchievementEarned,
            ],
        ),
        InvalidationStrategy::new(
            "player_sync_aggregate",
            "gb:player_sync:{player_id}*",
            [
                InvalidationTrigger::PlayerUpdate,
                InvalidationTrigger::AssetTransfer,
                InvalidationTrigger::AchievementEarned,
            ],
        ),
    ]
}
