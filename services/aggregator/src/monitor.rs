//! # Performance Monitor
//!
//! Rolling request/latency windows, per-category error accounting and
//! threshold-based alerting. The monitor observes event flows and records
//! what callers report; it never gates behavior.

use crate::bus::EventBus;
use crate::config::MonitorThresholds;
use crate::error::ErrorCategory;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::{AlertSeverity, CoreEvent, PerformanceAlert, SyncEventKind};
use uuid::Uuid;

struct RequestSample {
    at: Instant,
    latency_ms: f64,
    success: bool,
}

/// Live metric values derived from the rolling window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Requests per second over the window
    pub requests_per_second: f64,
    /// Average latency over the window, in milliseconds
    pub avg_latency_ms: f64,
    /// Failed requests over total requests in the window (0.0-1.0)
    pub error_rate: f64,
    /// Lifetime request count
    pub total_requests: u64,
    /// Lifetime error count (requests plus observed error events)
    pub total_errors: u64,
    /// Lifetime error counts keyed by classified category
    pub errors_by_category: HashMap<String, u64>,
}

/// Rolling metrics and threshold-based alerting
pub struct PerformanceMonitor {
    window: Duration,
    samples: Mutex<VecDeque<RequestSample>>,
    errors_by_category: DashMap<String, u64>,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    thresholds: MonitorThresholds,
    alerts: RwLock<Vec<PerformanceAlert>>,
    bus: EventBus,
    collection_interval: Duration,
    collection_task: Mutex<Option<JoinHandle<()>>>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
}

impl PerformanceMonitor {
    /// Monitor deriving metrics over a 60 s rolling window
    pub fn new(
        thresholds: MonitorThresholds,
        collection_interval: Duration,
        bus: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            window: Duration::from_secs(60),
            samples: Mutex::new(VecDeque::new()),
            errors_by_category: DashMap::new(),
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            thresholds,
            alerts: RwLock::new(Vec::new()),
            bus,
            collection_interval,
            collection_task: Mutex::new(None),
            listener_task: Mutex::new(None),
        })
    }

    /// Record one request's latency and outcome
    pub fn record_request(&self, latency: Duration, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }

        let mut samples = self.samples.lock();
        samples.push_back(RequestSample {
            at: Instant::now(),
            latency_ms: latency.as_secs_f64() * 1000.0,
            success,
        });
        Self::prune(&mut samples, self.window);
    }

    /// Record one classified error observed outside a request path
    pub fn record_error(&self, category: ErrorCategory) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
        *self
            .errors_by_category
            .entry(category.as_str().to_string())
            .or_insert(0) += 1;
    }

    /// Current metric values over the rolling window
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (count, failures, latency_sum) = {
            let mut samples = self.samples.lock();
            Self::prune(&mut samples, self.window);
            let count = samples.len();
            let failures = samples.iter().filter(|s| !s.success).count();
            let latency_sum: f64 = samples.iter().map(|s| s.latency_ms).sum();
            (count, failures, latency_sum)
        };

        MetricsSnapshot {
            requests_per_second: count as f64 / self.window.as_secs_f64(),
            avg_latency_ms: if count == 0 { 0.0 } else { latency_sum / count as f64 },
            error_rate: if count == 0 {
                0.0
            } else {
                failures as f64 / count as f64
            },
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            errors_by_category: self
                .errors_by_category
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
        }
    }

    /// Compare live metrics against the configured threshold pairs,
    /// creating alerts for crossings.
    ///
    /// At most one unresolved alert exists per (metric, severity); a
    /// sustained condition never floods operators with duplicates.
    pub fn check_thresholds(&self) {
        let snapshot = self.snapshot();

        self.check_metric(
            "avg_latency_ms",
            snapshot.avg_latency_ms,
            self.thresholds.avg_latency_ms.warning,
            self.thresholds.avg_latency_ms.critical,
        );
        self.check_metric(
            "error_rate",
            snapshot.error_rate,
            self.thresholds.error_rate.warning,
            self.thresholds.error_rate.critical,
        );
    }

    fn check_metric(&self, metric: &str, value: f64, warning: f64, critical: f64) {
        if value >= critical {
            self.ensure_alert(metric, AlertSeverity::Critical, critical, value);
        } else if value >= warning {
            self.ensure_alert(metric, AlertSeverity::Warning, warning, value);
        }
    }

    fn ensure_alert(&self, metric: &str, severity: AlertSeverity, threshold: f64, value: f64) {
        let mut alerts = self.alerts.write();
        let duplicate = alerts
            .iter()
            .any(|a| !a.resolved && a.metric == metric && a.severity == severity);
        if duplicate {
            return;
        }

        let alert = PerformanceAlert::new(metric, severity, threshold, value);
        warn!(metric, ?severity, value, threshold, "performance alert created");
        alerts.push(alert.clone());
        drop(alerts);
        self.bus.publish(CoreEvent::AlertCreated(alert));
    }

    /// Resolve an alert by id. Idempotent: resolving an unknown or
    /// already-resolved alert returns false and changes nothing.
    pub fn resolve_alert(&self, id: Uuid) -> bool {
        let resolved = {
            let mut alerts = self.alerts.write();
            match alerts.iter_mut().find(|a| a.id == id && !a.resolved) {
                Some(alert) => {
                    alert.resolved = true;
                    alert.resolved_at = Some(chrono::Utc::now());
                    Some(alert.clone())
                }
                None => None,
            }
        };

        match resolved {
            Some(alert) => {
                info!(alert_id = %id, metric = alert.metric, "alert resolved");
                self.bus.publish(CoreEvent::AlertResolved(alert));
                true
            }
            None => false,
        }
    }

    /// Unresolved alerts, newest last
    pub fn active_alerts(&self) -> Vec<PerformanceAlert> {
        self.alerts
            .read()
            .iter()
            .filter(|a| !a.resolved)
            .cloned()
            .collect()
    }

    /// Every alert ever created, resolved or not
    pub fn all_alerts(&self) -> Vec<PerformanceAlert> {
        self.alerts.read().clone()
    }

    /// Start the collection loop and the error-event listener. Idempotent.
    pub fn start(self: &Arc<Self>) {
        {
            let mut guard = self.collection_task.lock();
            if guard.is_none() {
                let monitor = Arc::clone(self);
                let interval = self.collection_interval;
                *guard = Some(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.tick().await;
                    loop {
                        ticker.tick().await;
                        monitor.check_thresholds();
                    }
                }));
            }
        }

        {
            let mut guard = self.listener_task.lock();
            if guard.is_none() {
                let monitor = Arc::clone(self);
                let mut events = self.bus.subscribe();
                *guard = Some(tokio::spawn(async move {
                    loop {
                        match events.recv().await {
                            Ok(CoreEvent::AdapterError { message, .. }) => {
                                monitor.record_error(ErrorCategory::classify(&message, None));
                            }
                            Ok(CoreEvent::Sync(sync)) if sync.kind == SyncEventKind::SyncError => {
                                let message = sync.error.unwrap_or_default();
                                monitor.record_error(ErrorCategory::classify(&message, None));
                            }
                            Ok(_) => {}
                            Err(RecvError::Lagged(skipped)) => {
                                debug!(skipped, "monitor lagged on event bus");
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }));
            }
        }
        debug!("performance monitor started");
    }

    /// Stop both background tasks. Idempotent.
    pub fn stop(&self) {
        if let Some(task) = self.collection_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.listener_task.lock().take() {
            task.abort();
        }
        debug!("performance monitor stopped");
    }

    fn prune(samples: &mut VecDeque<RequestSample>, window: Duration) {
        let Some(cutoff) = Instant::now().checked_sub(window) else {
            return;
        };
        while samples.front().map(|s| s.at < cutoff).unwrap_or(false) {
            samples.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThresholdPair;

    fn thresholds() -> MonitorThresholds {
        MonitorThresholds {
            avg_latency_ms: ThresholdPair {
                warning: 100.0,
                critical: 500.0,
            },
            error_rate: ThresholdPair {
                warning: 0.2,
                critical: 0.5,
            },
        }
    }

    fn monitor() -> Arc<PerformanceMonitor> {
        PerformanceMonitor::new(thresholds(), Duration::from_secs(10), EventBus::new(256))
    }

    #[test]
    fn snapshot_derives_window_metrics() {
        let monitor = monitor();
        monitor.record_request(Duration::from_millis(100), true);
        monitor.record_request(Duration::from_millis(300), false);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert!((snapshot.avg_latency_ms - 200.0).abs() < 1.0);
        assert!((snapshot.error_rate - 0.5).abs() < f64::EPSILON);
        assert!(snapshot.requests_per_second > 0.0);
    }

    #[test]
    fn threshold_crossing_creates_one_alert() {
        let monitor = monitor();
        for _ in 0..4 {
            monitor.record_request(Duration::from_millis(200), true);
        }

        monitor.check_thresholds();
        // Sustained condition: repeated checks must not duplicate
        monitor.check_thresholds();
        monitor.check_thresholds();

        let active = monitor.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].metric, "avg_latency_ms");
        assert_eq!(active[0].severity, AlertSeverity::Warning);
    }

    #[test]
    fn critical_crossing_takes_precedence() {
        let monitor = monitor();
        monitor.record_request(Duration::from_millis(900), true);

        monitor.check_thresholds();
        let active = monitor.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn resolve_alert_is_idempotent() {
        let monitor = monitor();
        monitor.record_request(Duration::from_millis(200), true);
        monitor.check_thresholds();

        let alert = monitor.active_alerts().pop().unwrap();
        assert!(monitor.resolve_alert(alert.id));
        assert!(!monitor.resolve_alert(alert.id));
        assert!(monitor.active_alerts().is_empty());

        // Alert stays resolved in history
        let history = monitor.all_alerts();
        assert!(history.iter().any(|a| a.id == alert.id && a.resolved));
    }

    #[test]
    fn resolving_unknown_alert_is_false() {
        let monitor = monitor();
        assert!(!monitor.resolve_alert(Uuid::new_v4()));
    }

    #[test]
    fn new_alert_allowed_after_resolution() {
        let monitor = monitor();
        monitor.record_request(Duration::from_millis(200), true);
        monitor.check_thresholds();

        let alert = monitor.active_alerts().pop().unwrap();
        monitor.resolve_alert(alert.id);

        monitor.check_thresholds();
        assert_eq!(monitor.active_alerts().len(), 1);
    }

    #[test]
    fn error_events_accumulate_by_category() {
        let monitor = monitor();
        monitor.record_error(ErrorCategory::Network);
        monitor.record_error(ErrorCategory::Network);
        monitor.record_error(ErrorCategory::Auth);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.errors_by_category["network"], 2);
        assert_eq!(snapshot.errors_by_category["auth"], 1);
        assert_eq!(snapshot.total_errors, 3);
    }

    #[tokio::test]
    async fn bus_errors_feed_the_monitor() {
        let bus = EventBus::new(64);
        let monitor =
            PerformanceMonitor::new(thresholds(), Duration::from_secs(10), bus.clone());
        monitor.start();

        bus.publish(CoreEvent::AdapterError {
            game_id: "g1".to_string(),
            message: "connection refused".to_string(),
        });

        for _ in 0..50 {
            if monitor.snapshot().total_errors > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(monitor.snapshot().errors_by_category["network"], 1);

        monitor.stop();
    }
}
