//! Per-saga audit trail reconstructed from the log stream.
//!
//! [`SagaAuditTrail`] subscribes to the saga log as a [`LogConsumer`] and
//! folds the flat entry stream into one [`Timeline`] per saga. Because
//! the fold is driven entry by entry, replaying a restored log through a
//! fresh trail reproduces the same timelines.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use common::{OnboardingStep, PartnerId, SagaId};
use saga_log::{LogConsumer, LogEntry, LogEventKind, LogLevel, SagaOutcome, StepResult};
use serde::{Deserialize, Serialize};

/// Saga lifecycle as visible from the log.
///
/// Tracks the forward half of the status machine only as `InProgress`;
/// the interesting distinctions start at the terminal entries. `Failed`
/// may still continue to `Compensated`; nothing reopens after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineStatus {
    InProgress,
    Completed,
    Failed,
    Compensated,
}

impl TimelineStatus {
    fn accepts(self, next: TimelineStatus) -> bool {
        matches!(
            (self, next),
            (TimelineStatus::InProgress, _) | (TimelineStatus::Failed, TimelineStatus::Compensated)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineStatus::InProgress => "in_progress",
            TimelineStatus::Completed => "completed",
            TimelineStatus::Failed => "failed",
            TimelineStatus::Compensated => "compensated",
        }
    }
}

impl std::fmt::Display for TimelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SagaOutcome> for TimelineStatus {
    fn from(outcome: SagaOutcome) -> Self {
        match outcome {
            SagaOutcome::Completed => TimelineStatus::Completed,
            SagaOutcome::Failed => TimelineStatus::Failed,
            SagaOutcome::Compensated => TimelineStatus::Compensated,
        }
    }
}

/// One step-classified log entry on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineStep {
    pub step: Option<OnboardingStep>,
    pub kind: LogEventKind,
    pub result: StepResult,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

/// One bus-delivery log entry on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub kind: LogEventKind,
    pub service: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
}

/// One compensation-classified log entry on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineCompensation {
    pub kind: LogEventKind,
    pub step: Option<OnboardingStep>,
    pub result: StepResult,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

/// Rolled-up failure information for one saga.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub total_errors: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub failed_steps: Vec<OnboardingStep>,
    pub last_error: Option<String>,
}

/// Full reconstructed history of one saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub saga_id: SagaId,
    pub partner_id: PartnerId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_duration_ms: Option<i64>,
    pub steps: Vec<TimelineStep>,
    pub events: Vec<TimelineEvent>,
    pub compensations: Vec<TimelineCompensation>,
    pub status: TimelineStatus,
    pub error_summary: Option<ErrorSummary>,
}

impl Timeline {
    fn new(entry: &LogEntry) -> Self {
        Self {
            saga_id: entry.saga_id,
            partner_id: entry.partner_id,
            start_time: entry.timestamp,
            end_time: None,
            total_duration_ms: None,
            steps: Vec::new(),
            events: Vec::new(),
            compensations: Vec::new(),
            status: TimelineStatus::InProgress,
            error_summary: None,
        }
    }

    fn apply(&mut self, entry: &LogEntry) {
        let kind = entry.event_kind;

        if kind.is_step() {
            self.steps.push(TimelineStep {
                step: entry.step,
                kind,
                result: entry.result,
                timestamp: entry.timestamp,
                duration_ms: entry.duration_ms,
                error: entry.error.clone(),
            });
        } else if kind.is_event() {
            self.events.push(TimelineEvent {
                kind,
                service: entry.service.clone(),
                level: entry.level,
                timestamp: entry.timestamp,
            });
        } else if kind.is_compensation() {
            self.compensations.push(TimelineCompensation {
                kind,
                step: entry.step,
                result: entry.result,
                timestamp: entry.timestamp,
                error: entry.error.clone(),
            });
        }

        if let Some(outcome) = kind.terminal_status() {
            let next = TimelineStatus::from(outcome);
            if self.status.accepts(next) {
                self.status = next;
                self.end_time = Some(entry.timestamp);
                self.total_duration_ms =
                    Some((entry.timestamp - self.start_time).num_milliseconds());
            }
        }

        if entry.result == StepResult::Failed {
            let summary = self.error_summary.get_or_insert_with(ErrorSummary::default);
            summary.total_errors += 1;
            *summary.by_kind.entry(kind.as_str().to_string()).or_insert(0) += 1;
            if let Some(step) = entry.step
                && !summary.failed_steps.contains(&step)
            {
                summary.failed_steps.push(step);
            }
            if entry.error.is_some() {
                summary.last_error = entry.error.clone();
            }
        }
    }
}

/// Builds and serves per-saga timelines from the live log stream.
#[derive(Default)]
pub struct SagaAuditTrail {
    timelines: RwLock<HashMap<SagaId, Timeline>>,
}

impl SagaAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeline(&self, saga_id: SagaId) -> Option<Timeline> {
        self.timelines.read().unwrap().get(&saga_id).cloned()
    }

    /// All timelines, oldest saga first.
    pub fn all_timelines(&self) -> Vec<Timeline> {
        let mut timelines: Vec<Timeline> =
            self.timelines.read().unwrap().values().cloned().collect();
        timelines.sort_by_key(|timeline| timeline.start_time);
        timelines
    }

    pub fn timelines_for_partner(&self, partner_id: PartnerId) -> Vec<Timeline> {
        let mut timelines: Vec<Timeline> = self
            .timelines
            .read()
            .unwrap()
            .values()
            .filter(|timeline| timeline.partner_id == partner_id)
            .cloned()
            .collect();
        timelines.sort_by_key(|timeline| timeline.start_time);
        timelines
    }

    pub fn saga_count(&self) -> usize {
        self.timelines.read().unwrap().len()
    }
}

impl LogConsumer for SagaAuditTrail {
    fn accept(&self, entry: &LogEntry) {
        self.timelines
            .write()
            .unwrap()
            .entry(entry.saga_id)
            .or_insert_with(|| Timeline::new(entry))
            .apply(entry);
    }
}
