//! Retry executor with capped exponential backoff
//!
//! Transient failures are retried locally and never surface to callers until
//! the attempt budget is exhausted; non-retryable categories fail on the
//! first attempt.

use crate::error::{AdapterError, ErrorCategory, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff and retryability configuration for one operation class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (0-10)
    pub max_retries: u32,

    /// First backoff delay in milliseconds (100-10000)
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds, must be >= base delay
    pub max_delay_ms: u64,

    /// Per-attempt delay multiplier (1.0-5.0)
    pub backoff_multiplier: f64,

    /// Error categories worth retrying; anything else fails immediately
    pub retryable: Vec<ErrorCategory>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            retryable: vec![ErrorCategory::Network, ErrorCategory::ExternalService],
        }
    }
}

impl RetryPolicy {
    /// Enforce the configured bounds; an out-of-range policy never reaches
    /// the executor or the adapter registry.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries > 10 {
            return Err(AdapterError::Configuration(format!(
                "max_retries must be 0-10, got {}",
                self.max_retries
            )));
        }
        if !(100..=10000).contains(&self.base_delay_ms) {
            return Err(AdapterError::Configuration(format!(
                "base_delay_ms must be 100-10000, got {}",
                self.base_delay_ms
            )));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(AdapterError::Configuration(format!(
                "max_delay_ms ({}) must be >= base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if !(1.0..=5.0).contains(&self.backoff_multiplier) {
            return Err(AdapterError::Configuration(format!(
                "backoff_multiplier must be 1.0-5.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Delay before the attempt following failure number `attempt` (0-based):
    /// `min(base * multiplier^attempt, max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }

    fn is_retryable(&self, category: ErrorCategory) -> bool {
        self.retryable.contains(&category)
    }
}

/// Run `operation` up to `max_retries + 1` times with backoff between
/// attempts.
///
/// After each failure the error is classified; a non-retryable category is
/// returned immediately. The wait suspends only this logical operation,
/// concurrent work elsewhere is unaffected. Exhausting the budget returns
/// the last error.
pub async fn execute_with_retry<T, F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
    context: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(context, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let category = err.category();

                if !policy.is_retryable(category) {
                    debug!(context, ?category, "error not retryable, failing fast");
                    return Err(err);
                }
                if attempt >= policy.max_retries {
                    warn!(context, attempt, ?category, error = %err, "retries exhausted");
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    context,
                    attempt,
                    ?category,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
