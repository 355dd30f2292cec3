//! Log entry types.

use chrono::{DateTime, Utc};
use common::{EventId, OnboardingStep, PartnerId, SagaId};
use serde::{Deserialize, Serialize};

/// Severity of a log entry, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome recorded by a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    Success,
    Failed,
    Compensated,
}

/// Outcome a terminal log entry assigns to its saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaOutcome {
    Completed,
    Failed,
    Compensated,
}

/// What happened, as recorded by one log entry.
///
/// Kinds fall into four families: saga lifecycle (`SagaStarted` and the
/// three terminal kinds), step execution (`Step*`), event-bus activity
/// (`Event*`), and compensation progress (`Compensation*`). The
/// classification methods below drive the audit trail's timeline fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    SagaStarted,
    StepStarted,
    StepCompleted,
    StepFailed,
    StepCompensated,
    SagaCompleted,
    SagaFailed,
    SagaCompensated,
    EventPublished,
    EventReceived,
    EventProcessed,
    EventFailed,
    CompensationStarted,
    CompensationCompleted,
    CompensationFailed,
}

impl LogEventKind {
    /// Returns true for per-step execution kinds, including compensation of
    /// a single step (`StepCompensated` describes a step, not the
    /// compensation run as a whole).
    pub fn is_step(&self) -> bool {
        matches!(
            self,
            LogEventKind::StepStarted
                | LogEventKind::StepCompleted
                | LogEventKind::StepFailed
                | LogEventKind::StepCompensated
        )
    }

    /// Returns true for event-bus activity kinds.
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            LogEventKind::EventPublished
                | LogEventKind::EventReceived
                | LogEventKind::EventProcessed
                | LogEventKind::EventFailed
        )
    }

    /// Returns true for compensation-run progress kinds.
    pub fn is_compensation(&self) -> bool {
        matches!(
            self,
            LogEventKind::CompensationStarted
                | LogEventKind::CompensationCompleted
                | LogEventKind::CompensationFailed
        )
    }

    /// The saga outcome this kind implies, for the three terminal kinds.
    pub fn terminal_status(&self) -> Option<SagaOutcome> {
        match self {
            LogEventKind::SagaCompleted => Some(SagaOutcome::Completed),
            LogEventKind::SagaFailed => Some(SagaOutcome::Failed),
            LogEventKind::SagaCompensated => Some(SagaOutcome::Compensated),
            _ => None,
        }
    }

    /// Returns the kind name as a string, matching its serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEventKind::SagaStarted => "saga_started",
            LogEventKind::StepStarted => "step_started",
            LogEventKind::StepCompleted => "step_completed",
            LogEventKind::StepFailed => "step_failed",
            LogEventKind::StepCompensated => "step_compensated",
            LogEventKind::SagaCompleted => "saga_completed",
            LogEventKind::SagaFailed => "saga_failed",
            LogEventKind::SagaCompensated => "saga_compensated",
            LogEventKind::EventPublished => "event_published",
            LogEventKind::EventReceived => "event_received",
            LogEventKind::EventProcessed => "event_processed",
            LogEventKind::EventFailed => "event_failed",
            LogEventKind::CompensationStarted => "compensation_started",
            LogEventKind::CompensationCompleted => "compensation_completed",
            LogEventKind::CompensationFailed => "compensation_failed",
        }
    }
}

impl std::fmt::Display for LogEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable record of saga activity.
///
/// Entries are created by [`SagaLog`](crate::SagaLog) recorder methods and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier of this entry.
    pub id: EventId,
    /// UTC time the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// The saga this entry belongs to.
    pub saga_id: SagaId,
    /// The partner the saga is onboarding.
    pub partner_id: PartnerId,
    /// Severity.
    pub level: LogLevel,
    /// What happened.
    pub event_kind: LogEventKind,
    /// The step concerned, when the entry describes step-scoped activity.
    pub step: Option<OnboardingStep>,
    /// The component that acted: a step's owning service, an event handler
    /// name, or the orchestrator.
    pub service: String,
    /// Outcome of the recorded activity.
    pub result: StepResult,
    /// Elapsed milliseconds since the matching start record, when one exists.
    pub duration_ms: Option<i64>,
    /// Error details for failure entries.
    pub error: Option<String>,
}

impl LogEntry {
    /// Starts an entry with a generated id, a UTC timestamp, no step, an
    /// empty service, a `Success` result and no duration or error.
    pub(crate) fn new(
        saga_id: SagaId,
        partner_id: PartnerId,
        level: LogLevel,
        event_kind: LogEventKind,
    ) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            saga_id,
            partner_id,
            level,
            event_kind,
            step: None,
            service: String::new(),
            result: StepResult::Success,
            duration_ms: None,
            error: None,
        }
    }

    /// Sets the step and defaults the service to the step's owner.
    pub(crate) fn step(mut self, step: OnboardingStep) -> Self {
        self.service = step.service().to_string();
        self.step = Some(step);
        self
    }

    pub(crate) fn maybe_step(mut self, step: Option<OnboardingStep>) -> Self {
        self.step = step;
        self
    }

    pub(crate) fn service(mut self, service: &str) -> Self {
        self.service = service.to_string();
        self
    }

    pub(crate) fn result(mut self, result: StepResult) -> Self {
        self.result = result;
        self
    }

    pub(crate) fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
