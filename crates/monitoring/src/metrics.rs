//! Live performance and health metrics derived from the audit trail.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use common::{AlertId, OnboardingStep, SagaId};
use saga_log::{LogConsumer, LogEntry, LogEventKind};
use serde::{Deserialize, Serialize};

use crate::alerts::{Alert, AlertRegistry, AlertThreshold};
use crate::audit::{SagaAuditTrail, Timeline, TimelineStatus};
use crate::error::{MonitoringError, Result};

/// Trailing window backing the events-per-second rate.
const EVENT_WINDOW_SECS: i64 = 60;

/// Default bound on retained system snapshots (one hour at a 10 s
/// monitor interval).
pub const DEFAULT_HISTORY_CAPACITY: usize = 360;

const SLOW_STEP_MS: i64 = 60_000;
const LONG_SAGA_MS: i64 = 300_000;

/// A named step together with its measured execution time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: OnboardingStep,
    pub duration_ms: i64,
}

/// Execution profile of one saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub saga_id: SagaId,
    pub total_duration_ms: i64,
    pub step_count: usize,
    pub average_step_ms: f64,
    pub slowest_step: Option<StepTiming>,
    pub fastest_step: Option<StepTiming>,
    pub events_per_second: f64,
    pub error_count: usize,
    pub compensation_count: usize,
}

impl PerformanceMetrics {
    /// Derives the profile from a reconstructed timeline. Steps count
    /// only when they completed with a measured duration; an unfinished
    /// saga is measured up to now.
    pub fn from_timeline(timeline: &Timeline) -> Self {
        let total_duration_ms = timeline
            .total_duration_ms
            .unwrap_or_else(|| (Utc::now() - timeline.start_time).num_milliseconds());

        let timed: Vec<StepTiming> = timeline
            .steps
            .iter()
            .filter(|entry| entry.kind == LogEventKind::StepCompleted)
            .filter_map(|entry| {
                Some(StepTiming {
                    step: entry.step?,
                    duration_ms: entry.duration_ms?,
                })
            })
            .collect();

        let average_step_ms = if timed.is_empty() {
            0.0
        } else {
            timed.iter().map(|timing| timing.duration_ms as f64).sum::<f64>() / timed.len() as f64
        };
        let slowest_step = timed.iter().max_by_key(|timing| timing.duration_ms).copied();
        let fastest_step = timed.iter().min_by_key(|timing| timing.duration_ms).copied();

        let events_per_second = if total_duration_ms > 0 {
            timeline.events.len() as f64 / (total_duration_ms as f64 / 1000.0)
        } else {
            0.0
        };

        Self {
            saga_id: timeline.saga_id,
            total_duration_ms,
            step_count: timed.len(),
            average_step_ms,
            slowest_step,
            fastest_step,
            events_per_second,
            error_count: timeline
                .error_summary
                .as_ref()
                .map_or(0, |summary| summary.total_errors),
            compensation_count: timeline
                .steps
                .iter()
                .filter(|entry| entry.kind == LogEventKind::StepCompensated)
                .count(),
        }
    }
}

/// Point-in-time health of the whole system.
///
/// Counts satisfy `completed + failed + compensated + active == total` at
/// every snapshot; a saga whose compensation is still running counts as
/// failed until the compensated entry lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub total_sagas: usize,
    pub active_sagas: usize,
    pub completed_sagas: usize,
    pub failed_sagas: usize,
    pub compensated_sagas: usize,
    pub success_rate_percent: f64,
    pub error_rate_percent: f64,
    pub compensation_rate_percent: f64,
    pub events_per_second: f64,
    pub collected_at: DateTime<Utc>,
}

struct MetricsState {
    recent_events: VecDeque<DateTime<Utc>>,
    history: VecDeque<SystemMetrics>,
}

/// Computes per-saga and system-wide metrics and hosts the alert
/// registry.
///
/// Saga counts always come from the audit trail at collection time, so a
/// snapshot cannot drift from the timelines it summarizes. The consumer
/// half only feeds the trailing event-rate window.
pub struct SagaMetrics {
    audit: Arc<SagaAuditTrail>,
    state: RwLock<MetricsState>,
    alerts: AlertRegistry,
    history_capacity: usize,
}

impl SagaMetrics {
    pub fn new(audit: Arc<SagaAuditTrail>) -> Self {
        Self::with_history_capacity(audit, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(audit: Arc<SagaAuditTrail>, history_capacity: usize) -> Self {
        Self {
            audit,
            state: RwLock::new(MetricsState {
                recent_events: VecDeque::new(),
                history: VecDeque::new(),
            }),
            alerts: AlertRegistry::new(),
            history_capacity: history_capacity.max(1),
        }
    }

    /// Execution profile for one saga.
    pub fn performance(&self, saga_id: SagaId) -> Result<PerformanceMetrics> {
        let timeline = self
            .audit
            .timeline(saga_id)
            .ok_or(MonitoringError::TimelineNotFound(saga_id))?;
        Ok(PerformanceMetrics::from_timeline(&timeline))
    }

    /// Computes a fresh system snapshot without recording it.
    pub fn collect(&self) -> SystemMetrics {
        let timelines = self.audit.all_timelines();
        let total = timelines.len();
        let count = |status: TimelineStatus| {
            timelines
                .iter()
                .filter(|timeline| timeline.status == status)
                .count()
        };
        let completed = count(TimelineStatus::Completed);
        let failed = count(TimelineStatus::Failed);
        let compensated = count(TimelineStatus::Compensated);
        let active = total - completed - failed - compensated;

        let now = Utc::now();
        let events_per_second = {
            let mut state = self.state.write().unwrap();
            let cutoff = now - chrono::Duration::seconds(EVENT_WINDOW_SECS);
            while state.recent_events.front().is_some_and(|at| *at < cutoff) {
                state.recent_events.pop_front();
            }
            state.recent_events.len() as f64 / EVENT_WINDOW_SECS as f64
        };

        let pct = |part: usize| {
            if total == 0 {
                0.0
            } else {
                part as f64 * 100.0 / total as f64
            }
        };

        SystemMetrics {
            total_sagas: total,
            active_sagas: active,
            completed_sagas: completed,
            failed_sagas: failed,
            compensated_sagas: compensated,
            success_rate_percent: pct(completed),
            error_rate_percent: pct(failed),
            compensation_rate_percent: pct(compensated),
            events_per_second,
            collected_at: now,
        }
    }

    /// Collects a snapshot and appends it to the bounded trend history.
    pub fn record_snapshot(&self) -> SystemMetrics {
        let snapshot = self.collect();
        metrics::gauge!("sagas_active").set(snapshot.active_sagas as f64);
        metrics::gauge!("sagas_total").set(snapshot.total_sagas as f64);

        let mut state = self.state.write().unwrap();
        while state.history.len() >= self.history_capacity {
            state.history.pop_front();
        }
        state.history.push_back(snapshot.clone());
        snapshot
    }

    /// Recorded snapshots, oldest first.
    pub fn history(&self) -> Vec<SystemMetrics> {
        self.state.read().unwrap().history.iter().cloned().collect()
    }

    /// Advisory tuning hints for one saga.
    pub fn recommendations(&self, saga_id: SagaId) -> Result<Vec<String>> {
        let performance = self.performance(saga_id)?;
        let mut advice = Vec::new();

        if let Some(slowest) = &performance.slowest_step
            && slowest.duration_ms > SLOW_STEP_MS
        {
            advice.push(format!(
                "Step {} took {} ms; investigate the {} backend",
                slowest.step,
                slowest.duration_ms,
                slowest.step.service()
            ));
        }
        if performance.compensation_count > 0 {
            advice.push(format!(
                "{} step(s) were rolled back; review the failure before retrying this partner",
                performance.compensation_count
            ));
        }
        if performance.error_count > 0 {
            advice.push(format!(
                "{} error(s) recorded; inspect the saga log for root causes",
                performance.error_count
            ));
        }
        if performance.total_duration_ms > LONG_SAGA_MS {
            advice.push(format!(
                "Onboarding ran {} ms end to end; consider tightening step timeouts",
                performance.total_duration_ms
            ));
        }

        Ok(advice)
    }

    pub fn add_threshold(&self, threshold: AlertThreshold) {
        self.alerts.add_threshold(threshold);
    }

    /// Checks thresholds against `snapshot`; returns newly created
    /// alerts only.
    pub fn evaluate(&self, snapshot: &SystemMetrics) -> Vec<Alert> {
        self.alerts.evaluate(snapshot)
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts.active()
    }

    pub fn all_alerts(&self) -> Vec<Alert> {
        self.alerts.all()
    }

    pub fn resolve_alert(&self, alert_id: AlertId) -> Result<Alert> {
        self.alerts.resolve(alert_id)
    }
}

impl LogConsumer for SagaMetrics {
    fn accept(&self, entry: &LogEntry) {
        let mut state = self.state.write().unwrap();
        let cutoff = entry.timestamp - chrono::Duration::seconds(EVENT_WINDOW_SECS);
        while state.recent_events.front().is_some_and(|at| *at < cutoff) {
            state.recent_events.pop_front();
        }
        state.recent_events.push_back(entry.timestamp);
    }
}
