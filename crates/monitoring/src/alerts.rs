//! Threshold-based alerting over system metrics snapshots.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use common::AlertId;
use serde::{Deserialize, Serialize};

use crate::error::{MonitoringError, Result};
use crate::metrics::SystemMetrics;

/// System-wide metric a threshold can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMetricKind {
    SuccessRatePercent,
    ErrorRatePercent,
    CompensationRatePercent,
    EventsPerSecond,
    ActiveSagas,
    FailedSagas,
}

impl SystemMetricKind {
    pub fn value_of(self, snapshot: &SystemMetrics) -> f64 {
        match self {
            SystemMetricKind::SuccessRatePercent => snapshot.success_rate_percent,
            SystemMetricKind::ErrorRatePercent => snapshot.error_rate_percent,
            SystemMetricKind::CompensationRatePercent => snapshot.compensation_rate_percent,
            SystemMetricKind::EventsPerSecond => snapshot.events_per_second,
            SystemMetricKind::ActiveSagas => snapshot.active_sagas as f64,
            SystemMetricKind::FailedSagas => snapshot.failed_sagas as f64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemMetricKind::SuccessRatePercent => "success_rate_percent",
            SystemMetricKind::ErrorRatePercent => "error_rate_percent",
            SystemMetricKind::CompensationRatePercent => "compensation_rate_percent",
            SystemMetricKind::EventsPerSecond => "events_per_second",
            SystemMetricKind::ActiveSagas => "active_sagas",
            SystemMetricKind::FailedSagas => "failed_sagas",
        }
    }
}

impl std::fmt::Display for SystemMetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    GreaterThan,
    LessThan,
}

impl ComparisonOp {
    fn breached(self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOp::GreaterThan => value > threshold,
            ComparisonOp::LessThan => value < threshold,
        }
    }

    fn description(self) -> &'static str {
        match self {
            ComparisonOp::GreaterThan => "above",
            ComparisonOp::LessThan => "below",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// One registered watch condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlertThreshold {
    pub metric: SystemMetricKind,
    pub op: ComparisonOp,
    pub threshold: f64,
    pub severity: AlertSeverity,
}

impl AlertThreshold {
    pub fn above(metric: SystemMetricKind, threshold: f64, severity: AlertSeverity) -> Self {
        Self {
            metric,
            op: ComparisonOp::GreaterThan,
            threshold,
            severity,
        }
    }

    pub fn below(metric: SystemMetricKind, threshold: f64, severity: AlertSeverity) -> Self {
        Self {
            metric,
            op: ComparisonOp::LessThan,
            threshold,
            severity,
        }
    }
}

/// A triggered threshold breach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: AlertId,
    pub metric: SystemMetricKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub triggered_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Holds registered thresholds and every alert they have triggered.
///
/// A metric with an unresolved alert does not trigger again; repeated
/// breaches of the same condition collapse into the one open alert until
/// an operator resolves it.
#[derive(Default)]
pub struct AlertRegistry {
    thresholds: RwLock<Vec<AlertThreshold>>,
    alerts: RwLock<Vec<Alert>>,
}

impl AlertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline watch conditions installed at service startup.
    pub fn default_thresholds() -> Vec<AlertThreshold> {
        vec![
            AlertThreshold::above(
                SystemMetricKind::ErrorRatePercent,
                20.0,
                AlertSeverity::Critical,
            ),
            AlertThreshold::above(
                SystemMetricKind::CompensationRatePercent,
                10.0,
                AlertSeverity::Warning,
            ),
            AlertThreshold::below(
                SystemMetricKind::SuccessRatePercent,
                50.0,
                AlertSeverity::Warning,
            ),
        ]
    }

    pub fn add_threshold(&self, threshold: AlertThreshold) {
        self.thresholds.write().unwrap().push(threshold);
    }

    pub fn threshold_count(&self) -> usize {
        self.thresholds.read().unwrap().len()
    }

    /// Checks every threshold against `snapshot`, returning only the
    /// alerts created by this call.
    pub fn evaluate(&self, snapshot: &SystemMetrics) -> Vec<Alert> {
        let thresholds = self.thresholds.read().unwrap().clone();
        let mut alerts = self.alerts.write().unwrap();
        let mut fresh = Vec::new();

        for threshold in thresholds {
            let value = threshold.metric.value_of(snapshot);
            if !threshold.op.breached(value, threshold.threshold) {
                continue;
            }
            let already_open = alerts
                .iter()
                .any(|alert| alert.metric == threshold.metric && !alert.resolved);
            if already_open {
                continue;
            }

            let alert = Alert {
                alert_id: AlertId::new(),
                metric: threshold.metric,
                severity: threshold.severity,
                message: format!(
                    "{} is {:.2}, {} threshold {:.2}",
                    threshold.metric,
                    value,
                    threshold.op.description(),
                    threshold.threshold
                ),
                value,
                threshold: threshold.threshold,
                triggered_at: Utc::now(),
                resolved: false,
                resolved_at: None,
            };
            alerts.push(alert.clone());
            fresh.push(alert);
        }

        fresh
    }

    /// Unresolved alerts, newest first.
    pub fn active(&self) -> Vec<Alert> {
        let mut active: Vec<Alert> = self
            .alerts
            .read()
            .unwrap()
            .iter()
            .filter(|alert| !alert.resolved)
            .cloned()
            .collect();
        active.sort_by_key(|alert| std::cmp::Reverse(alert.triggered_at));
        active
    }

    pub fn all(&self) -> Vec<Alert> {
        self.alerts.read().unwrap().clone()
    }

    /// Marks the alert resolved. Resolution happens exactly once; a second
    /// call for the same alert is an error.
    pub fn resolve(&self, alert_id: AlertId) -> Result<Alert> {
        let mut alerts = self.alerts.write().unwrap();
        let alert = alerts
            .iter_mut()
            .find(|alert| alert.alert_id == alert_id)
            .ok_or(MonitoringError::AlertNotFound(alert_id))?;
        if alert.resolved {
            return Err(MonitoringError::AlertAlreadyResolved(alert_id));
        }
        alert.resolved = true;
        alert.resolved_at = Some(Utc::now());
        Ok(alert.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(error_rate: f64, success_rate: f64) -> SystemMetrics {
        SystemMetrics {
            total_sagas: 10,
            active_sagas: 2,
            completed_sagas: 5,
            failed_sagas: 2,
            compensated_sagas: 1,
            success_rate_percent: success_rate,
            error_rate_percent: error_rate,
            compensation_rate_percent: 10.0,
            events_per_second: 1.5,
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn test_breach_creates_alert_with_message() {
        let registry = AlertRegistry::new();
        registry.add_threshold(AlertThreshold::above(
            SystemMetricKind::ErrorRatePercent,
            20.0,
            AlertSeverity::Critical,
        ));

        let fresh = registry.evaluate(&snapshot(25.0, 50.0));

        assert_eq!(fresh.len(), 1);
        let alert = &fresh[0];
        assert_eq!(alert.metric, SystemMetricKind::ErrorRatePercent);
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert!(!alert.resolved);
        assert_eq!(
            alert.message,
            "error_rate_percent is 25.00, above threshold 20.00"
        );
    }

    #[test]
    fn test_no_alert_below_threshold() {
        let registry = AlertRegistry::new();
        registry.add_threshold(AlertThreshold::above(
            SystemMetricKind::ErrorRatePercent,
            20.0,
            AlertSeverity::Critical,
        ));

        assert!(registry.evaluate(&snapshot(5.0, 95.0)).is_empty());
        assert!(registry.active().is_empty());
    }

    #[test]
    fn test_repeated_breach_is_deduplicated() {
        let registry = AlertRegistry::new();
        registry.add_threshold(AlertThreshold::above(
            SystemMetricKind::ErrorRatePercent,
            20.0,
            AlertSeverity::Critical,
        ));

        let first = registry.evaluate(&snapshot(25.0, 50.0));
        let second = registry.evaluate(&snapshot(30.0, 50.0));

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(registry.active().len(), 1);
    }

    #[test]
    fn test_resolution_reopens_the_watch() {
        let registry = AlertRegistry::new();
        registry.add_threshold(AlertThreshold::above(
            SystemMetricKind::ErrorRatePercent,
            20.0,
            AlertSeverity::Critical,
        ));

        let first = registry.evaluate(&snapshot(25.0, 50.0));
        registry.resolve(first[0].alert_id).unwrap();

        // A still-breaching metric triggers a new alert once the old one
        // is resolved.
        let second = registry.evaluate(&snapshot(25.0, 50.0));
        assert_eq!(second.len(), 1);
        assert_ne!(second[0].alert_id, first[0].alert_id);
        assert_eq!(registry.all().len(), 2);
    }

    #[test]
    fn test_resolve_is_exactly_once() {
        let registry = AlertRegistry::new();
        registry.add_threshold(AlertThreshold::below(
            SystemMetricKind::SuccessRatePercent,
            50.0,
            AlertSeverity::Warning,
        ));
        let fresh = registry.evaluate(&snapshot(0.0, 40.0));
        let alert_id = fresh[0].alert_id;

        let resolved = registry.resolve(alert_id).unwrap();
        assert!(resolved.resolved);
        assert!(resolved.resolved_at.is_some());

        assert!(matches!(
            registry.resolve(alert_id),
            Err(MonitoringError::AlertAlreadyResolved(_))
        ));
        assert!(matches!(
            registry.resolve(AlertId::new()),
            Err(MonitoringError::AlertNotFound(_))
        ));
    }

    #[test]
    fn test_default_thresholds_cover_failure_signals() {
        let registry = AlertRegistry::new();
        for threshold in AlertRegistry::default_thresholds() {
            registry.add_threshold(threshold);
        }

        // Healthy system: nothing fires.
        assert!(registry.evaluate(&snapshot(0.0, 100.0)).is_empty());

        // Degraded system: error rate and success rate both breach.
        let fresh = registry.evaluate(&snapshot(30.0, 40.0));
        let metrics: Vec<_> = fresh.iter().map(|alert| alert.metric).collect();
        assert!(metrics.contains(&SystemMetricKind::ErrorRatePercent));
        assert!(metrics.contains(&SystemMetricKind::SuccessRatePercent));
    }
}
