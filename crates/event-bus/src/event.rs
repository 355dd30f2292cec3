//! Saga choreography events.

use chrono::{DateTime, Utc};
use common::{CorrelationId, EventId, OnboardingStep, PartnerId, SagaId};
use serde::{Deserialize, Serialize};

/// Discriminant of an event, used as the subscription key on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    StepRequested,
    StepCompleted,
    StepFailed,
    CompensationRequested,
    CompensationCompleted,
    CompensationFailed,
    SagaCompleted,
    SagaCompensated,
}

impl EventKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StepRequested => "StepRequested",
            EventKind::StepCompleted => "StepCompleted",
            EventKind::StepFailed => "StepFailed",
            EventKind::CompensationRequested => "CompensationRequested",
            EventKind::CompensationCompleted => "CompensationCompleted",
            EventKind::CompensationFailed => "CompensationFailed",
            EventKind::SagaCompleted => "SagaCompleted",
            EventKind::SagaCompensated => "SagaCompensated",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an event announces, with its kind-specific data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventBody {
    /// The orchestrator asks the owning service to execute a step.
    StepRequested(StepRequestedData),

    /// A service reports that it executed a step.
    StepCompleted(StepCompletedData),

    /// A service reports that a step failed.
    StepFailed(StepFailedData),

    /// The orchestrator asks the owning service to undo a completed step.
    CompensationRequested(CompensationRequestedData),

    /// A service acknowledges that it undid a step.
    CompensationCompleted(CompensationCompletedData),

    /// A service reports that undoing a step failed (still an
    /// acknowledgment; compensation continues).
    CompensationFailed(StepFailedData),

    /// Every step of a saga completed.
    SagaCompleted(SagaRefData),

    /// Every requested compensation of a saga was acknowledged.
    SagaCompensated(SagaRefData),
}

/// Data for StepRequested events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRequestedData {
    /// The saga instance.
    pub saga_id: SagaId,
    /// The partner being onboarded.
    pub partner_id: PartnerId,
    /// The step to execute.
    pub step: OnboardingStep,
    /// Business payload the executing service needs.
    pub payload: serde_json::Value,
}

/// Data for StepCompleted events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompletedData {
    /// The saga instance.
    pub saga_id: SagaId,
    /// The partner being onboarded.
    pub partner_id: PartnerId,
    /// The step that completed.
    pub step: OnboardingStep,
    /// Reference id produced by the service (contract number, campaign id, …).
    pub output: Option<String>,
}

/// Data for StepFailed and CompensationFailed events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailedData {
    /// The saga instance.
    pub saga_id: SagaId,
    /// The partner being onboarded.
    pub partner_id: PartnerId,
    /// The step that failed.
    pub step: OnboardingStep,
    /// Error message describing the failure.
    pub error: String,
}

/// Data for CompensationRequested events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationRequestedData {
    /// The saga instance.
    pub saga_id: SagaId,
    /// The partner being onboarded.
    pub partner_id: PartnerId,
    /// The completed step to undo.
    pub step: OnboardingStep,
    /// The step whose failure triggered compensation.
    pub failed_step: OnboardingStep,
    /// The undone step's recorded output, so the service can locate what it
    /// created.
    pub compensation_data: Option<serde_json::Value>,
}

/// Data for CompensationCompleted events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationCompletedData {
    /// The saga instance.
    pub saga_id: SagaId,
    /// The partner being onboarded.
    pub partner_id: PartnerId,
    /// The step that was undone.
    pub step: OnboardingStep,
}

/// Data for saga-level events carrying no step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaRefData {
    /// The saga instance.
    pub saga_id: SagaId,
    /// The partner being onboarded.
    pub partner_id: PartnerId,
}

impl EventBody {
    /// The discriminant used as the bus subscription key.
    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::StepRequested(_) => EventKind::StepRequested,
            EventBody::StepCompleted(_) => EventKind::StepCompleted,
            EventBody::StepFailed(_) => EventKind::StepFailed,
            EventBody::CompensationRequested(_) => EventKind::CompensationRequested,
            EventBody::CompensationCompleted(_) => EventKind::CompensationCompleted,
            EventBody::CompensationFailed(_) => EventKind::CompensationFailed,
            EventBody::SagaCompleted(_) => EventKind::SagaCompleted,
            EventBody::SagaCompensated(_) => EventKind::SagaCompensated,
        }
    }

    /// The saga this event belongs to.
    pub fn saga_id(&self) -> SagaId {
        match self {
            EventBody::StepRequested(data) => data.saga_id,
            EventBody::StepCompleted(data) => data.saga_id,
            EventBody::StepFailed(data) => data.saga_id,
            EventBody::CompensationRequested(data) => data.saga_id,
            EventBody::CompensationCompleted(data) => data.saga_id,
            EventBody::CompensationFailed(data) => data.saga_id,
            EventBody::SagaCompleted(data) => data.saga_id,
            EventBody::SagaCompensated(data) => data.saga_id,
        }
    }

    /// The partner the saga is onboarding.
    pub fn partner_id(&self) -> PartnerId {
        match self {
            EventBody::StepRequested(data) => data.partner_id,
            EventBody::StepCompleted(data) => data.partner_id,
            EventBody::StepFailed(data) => data.partner_id,
            EventBody::CompensationRequested(data) => data.partner_id,
            EventBody::CompensationCompleted(data) => data.partner_id,
            EventBody::CompensationFailed(data) => data.partner_id,
            EventBody::SagaCompleted(data) => data.partner_id,
            EventBody::SagaCompensated(data) => data.partner_id,
        }
    }

    /// The step this event concerns, for step-scoped kinds.
    pub fn step(&self) -> Option<OnboardingStep> {
        match self {
            EventBody::StepRequested(data) => Some(data.step),
            EventBody::StepCompleted(data) => Some(data.step),
            EventBody::StepFailed(data) => Some(data.step),
            EventBody::CompensationRequested(data) => Some(data.step),
            EventBody::CompensationCompleted(data) => Some(data.step),
            EventBody::CompensationFailed(data) => Some(data.step),
            EventBody::SagaCompleted(_) | EventBody::SagaCompensated(_) => None,
        }
    }
}

// Convenience constructors
impl EventBody {
    /// Creates a StepRequested body.
    pub fn step_requested(
        saga_id: SagaId,
        partner_id: PartnerId,
        step: OnboardingStep,
        payload: serde_json::Value,
    ) -> Self {
        EventBody::StepRequested(StepRequestedData {
            saga_id,
            partner_id,
            step,
            payload,
        })
    }

    /// Creates a StepCompleted body.
    pub fn step_completed(
        saga_id: SagaId,
        partner_id: PartnerId,
        step: OnboardingStep,
        output: Option<String>,
    ) -> Self {
        EventBody::StepCompleted(StepCompletedData {
            saga_id,
            partner_id,
            step,
            output,
        })
    }

    /// Creates a StepFailed body.
    pub fn step_failed(
        saga_id: SagaId,
        partner_id: PartnerId,
        step: OnboardingStep,
        error: impl Into<String>,
    ) -> Self {
        EventBody::StepFailed(StepFailedData {
            saga_id,
            partner_id,
            step,
            error: error.into(),
        })
    }

    /// Creates a CompensationRequested body.
    pub fn compensation_requested(
        saga_id: SagaId,
        partner_id: PartnerId,
        step: OnboardingStep,
        failed_step: OnboardingStep,
        compensation_data: Option<serde_json::Value>,
    ) -> Self {
        EventBody::CompensationRequested(CompensationRequestedData {
            saga_id,
            partner_id,
            step,
            failed_step,
            compensation_data,
        })
    }

    /// Creates a CompensationCompleted body.
    pub fn compensation_completed(
        saga_id: SagaId,
        partner_id: PartnerId,
        step: OnboardingStep,
    ) -> Self {
        EventBody::CompensationCompleted(CompensationCompletedData {
            saga_id,
            partner_id,
            step,
        })
    }

    /// Creates a CompensationFailed body.
    pub fn compensation_failed(
        saga_id: SagaId,
        partner_id: PartnerId,
        step: OnboardingStep,
        error: impl Into<String>,
    ) -> Self {
        EventBody::CompensationFailed(StepFailedData {
            saga_id,
            partner_id,
            step,
            error: error.into(),
        })
    }

    /// Creates a SagaCompleted body.
    pub fn saga_completed(saga_id: SagaId, partner_id: PartnerId) -> Self {
        EventBody::SagaCompleted(SagaRefData {
            saga_id,
            partner_id,
        })
    }

    /// Creates a SagaCompensated body.
    pub fn saga_compensated(saga_id: SagaId, partner_id: PartnerId) -> Self {
        EventBody::SagaCompensated(SagaRefData {
            saga_id,
            partner_id,
        })
    }
}

/// An immutable event on the bus.
///
/// Every event carries its causal lineage: `correlation_id` groups all
/// events of one saga instance, and `causation_id` points at the event that
/// triggered this one. The saga-start event is built with [`Event::root`]
/// (no causation); everything downstream is built with [`Event::caused_by`],
/// so chains are acyclic and rooted by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier of this event.
    pub event_id: EventId,
    /// Groups every event belonging to one saga instance.
    pub correlation_id: CorrelationId,
    /// The event that triggered this one; `None` for the root event.
    pub causation_id: Option<EventId>,
    /// UTC time the event was created.
    pub occurred_at: DateTime<Utc>,
    /// What the event announces.
    pub body: EventBody,
}

impl Event {
    /// Creates the root event of a causal chain.
    pub fn root(correlation_id: CorrelationId, body: EventBody) -> Self {
        Self {
            event_id: EventId::new(),
            correlation_id,
            causation_id: None,
            occurred_at: Utc::now(),
            body,
        }
    }

    /// Creates an event caused by `parent`, inheriting its correlation id.
    pub fn caused_by(parent: &Event, body: EventBody) -> Self {
        Self {
            event_id: EventId::new(),
            correlation_id: parent.correlation_id,
            causation_id: Some(parent.event_id),
            occurred_at: Utc::now(),
            body,
        }
    }

    /// The discriminant used as the bus subscription key.
    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }

    /// The saga this event belongs to.
    pub fn saga_id(&self) -> SagaId {
        self.body.saga_id()
    }

    /// The partner the saga is onboarding.
    pub fn partner_id(&self) -> PartnerId {
        self.body.partner_id()
    }

    /// The step this event concerns, for step-scoped kinds.
    pub fn step(&self) -> Option<OnboardingStep> {
        self.body.step()
    }
}
