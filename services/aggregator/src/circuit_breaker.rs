//! Circuit breaker pattern for fault tolerance

use crate::error::{AdapterError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failing - requests are rejected
    Open,
    /// Testing recovery - exactly one probe call allowed
    HalfOpen,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Time to wait in OPEN before allowing a recovery probe
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    // Set while the single half-open probe is in flight
    probe_in_flight: bool,
}

/// Per-service circuit breaker
///
/// Failure count is monotonic within CLOSED and HALF_OPEN; it is reset only
/// by a successful half-open probe or a manual [`reset`](Self::reset).
pub struct CircuitBreaker {
    service: String,
    inner: Mutex<BreakerInner>,
    config: CircuitBreakerConfig,

    // Metrics
    total_requests: AtomicU64,
    total_failures: AtomicU64,
    circuit_opens: AtomicU64,
}

/// Outcome of admission control for one call
enum Admission {
    Pass,
    Probe,
}

impl CircuitBreaker {
    /// Create a new circuit breaker guarding `service`
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            service: service.into(),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                probe_in_flight: false,
            }),
            config,
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            circuit_opens: AtomicU64::new(0),
        }
    }

    /// Execute an operation through the circuit breaker.
    ///
    /// While OPEN, calls fail immediately with
    /// [`AdapterError::CircuitBreakerOpen`] without invoking the operation,
    /// until the reset timeout elapses and a single probe is admitted.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let admission = self.admit().await?;
        let is_probe = matches!(admission, Admission::Probe);

        match operation().await {
            Ok(value) => {
                self.on_success(is_probe).await;
                Ok(value)
            }
            Err(error) => {
                self.on_failure(is_probe).await;
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                Err(error)
            }
        }
    }

    /// Decide whether a call may proceed, transitioning OPEN to HALF_OPEN
    /// when the reset timeout has elapsed.
    async fn admit(&self) -> Result<Admission> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            CircuitState::Closed => Ok(Admission::Pass),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed > self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!(service = %self.service, "circuit breaker half-open, probing");
                    Ok(Admission::Probe)
                } else {
                    Err(AdapterError::CircuitBreakerOpen {
                        service: self.service.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    // Only one probe at a time
                    Err(AdapterError::CircuitBreakerOpen {
                        service: self.service.clone(),
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    async fn on_success(&self, is_probe: bool) {
        let mut inner = self.inner.lock().await;
        if is_probe {
            inner.probe_in_flight = false;
        }
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            info!(service = %self.service, "circuit breaker closed after successful probe");
        }
    }

    async fn on_failure(&self, is_probe: bool) {
        let mut inner = self.inner.lock().await;
        if is_probe {
            inner.probe_in_flight = false;
        }
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    self.circuit_opens.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        service = %self.service,
                        failures = inner.failure_count,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Get current circuit state
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Current consecutive failure count
    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.failure_count
    }

    /// Reset the circuit breaker to CLOSED with a clean slate
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
        inner.probe_in_flight = false;
    }

    /// Get circuit breaker metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            circuit_opens: self.circuit_opens.load(Ordering::Relaxed),
        }
    }

    /// Name of the service this breaker guards
    pub fn service(&self) -> &str {
        &self.service
    }
}

/// Metrics for circuit breaker monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Total requests attempted
    pub total_requests: u64,
    /// Total failed requests
    pub total_failures: u64,
    /// Number of times the circuit opened
    pub circuit_opens: u64,
}

/// Observability snapshot for one named breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStatus {
    /// Current state
    pub state: CircuitState,
    /// Current consecutive failure count
    pub failure_count: u32,
    /// Lifetime counters
    pub metrics: CircuitBreakerMetrics,
}

/// Lazily creates and caches one breaker per service name
pub struct CircuitBreakerManager {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    /// Manager whose breakers all share `config`
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Get the breaker for `service`, creating it on first use.
    /// Breakers are never destroyed, only reset.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(service, self.config.clone()))
            })
            .clone()
    }

    /// Aggregate status of every known breaker
    pub async fn status_summary(&self) -> HashMap<String, BreakerStatus> {
        let mut summary = HashMap::new();
        for entry in self.breakers.iter() {
            let breaker = entry.value();
            summary.insert(
                entry.key().clone(),
                BreakerStatus {
                    state: breaker.state().await,
                    failure_count: breaker.failure_count().await,
                    metrics: breaker.metrics(),
                },
            );
        }
        summary
    }

    /// Reset one breaker; returns false if it was never created
    pub async fn reset(&self, service: &str) -> bool {
        match self.breakers.get(service) {
            Some(breaker) => {
                breaker.reset().await;
                true
            }
            None => false,
        }
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
