//! Performance alert vocabulary emitted by the monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How urgent an alert is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Metric crossed the warning threshold
    Warning,
    /// Metric crossed the critical threshold
    Critical,
}

/// A threshold crossing observed by the performance monitor
///
/// At most one unresolved alert exists per (metric, severity) pair; a
/// sustained condition does not flood operators with duplicates. Alerts are
/// resolved explicitly, never auto-expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAlert {
    /// Unique alert id
    pub id: Uuid,

    /// Metric that crossed its threshold (e.g. `avg_latency_ms`)
    pub metric: String,

    /// Severity of the crossing
    pub severity: AlertSeverity,

    /// The configured threshold that was crossed
    pub threshold: f64,

    /// The metric value observed at creation time
    pub current_value: f64,

    /// When the alert was created
    pub created_at: DateTime<Utc>,

    /// Whether an operator has resolved this alert
    pub resolved: bool,

    /// When it was resolved, if it was
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PerformanceAlert {
    /// New unresolved alert for a threshold crossing
    pub fn new(
        metric: impl Into<String>,
        severity: AlertSeverity,
        threshold: f64,
        current_value: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            metric: metric.into(),
            severity,
            threshold,
            current_value,
            created_at: Utc::now(),
            resolved: false,
            resolved_at: None,
        }
    }
}
