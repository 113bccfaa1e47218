//! Rate limiting for game backend API requests

use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::warn;

/// Per-game request rate limiter
///
/// Games without a configured limit pass through unlimited; the limiter is
/// advisory backpressure for on-demand fetch paths, not a hard gate on the
/// sync pipeline.
pub struct RateLimiter {
    limiters: DashMap<String, Arc<DefaultDirectRateLimiter>>,
}

impl RateLimiter {
    /// Create a new rate limiter with no per-game limits configured
    pub fn new() -> Self {
        Self {
            limiters: DashMap::new(),
        }
    }

    /// Configure the requests-per-minute budget for a game
    pub fn configure_game(&self, game_id: &str, requests_per_minute: u32) {
        match NonZeroU32::try_from(requests_per_minute) {
            Ok(rate) => {
                let quota = Quota::per_minute(rate);
                self.limiters.insert(
                    game_id.to_string(),
                    Arc::new(DefaultDirectRateLimiter::direct(quota)),
                );
            }
            Err(_) => {
                warn!(game_id, requests_per_minute, "invalid rate limit ignored");
            }
        }
    }

    /// Drop the limit for a game (e.g. on unregister)
    pub fn remove_game(&self, game_id: &str) {
        self.limiters.remove(game_id);
    }

    /// Check if a request is allowed right now (non-blocking)
    pub fn check(&self, game_id: &str) -> bool {
        self.limiters
            .get(game_id)
            .map(|limiter| limiter.check().is_ok())
            .unwrap_or(true)
    }

    /// Wait until a request is allowed
    pub async fn wait(&self, game_id: &str) {
        let limiter = self.limiters.get(game_id).map(|l| l.clone());
        if let Some(limiter) = limiter {
            limiter.until_ready().await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_game_passes_through() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("unknown"));
        limiter.wait("unknown").await;
    }

    #[tokio::test]
    async fn configured_limit_is_enforced() {
        let limiter = RateLimiter::new();
        limiter.configure_game("g1", 1);

        assert!(limiter.check("g1"));
        // Budget of 1/min is spent, next check fails
        assert!(!limiter.check("g1"));
        // Other games unaffected
        assert!(limiter.check("g2"));
    }

    #[test]
    fn zero_rate_is_ignored() {
        let limiter = RateLimiter::new();
        limiter.configure_game("g1", 0);
        assert!(limiter.check("g1"));
    }
}
