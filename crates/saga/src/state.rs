//! Saga state.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use common::{CorrelationId, EventId, OnboardingStep, PartnerId, SagaId, SagaStatus};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};

/// The persistent state of one partner onboarding saga.
///
/// Owned by the state store and mutated only by the orchestrator. One
/// instance exists per in-flight business transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaState {
    /// Unique saga instance id.
    pub saga_id: SagaId,
    /// The partner being onboarded (business correlation key).
    pub partner_id: PartnerId,
    /// Current position in the status graph.
    pub status: SagaStatus,
    /// Correlation id shared by every event of this saga.
    pub correlation_id: CorrelationId,
    /// The last event applied to this state.
    pub causation_id: Option<EventId>,
    /// Opaque business payload the steps operate on.
    pub business_payload: serde_json::Value,
    /// Steps that completed, in completion order.
    pub completed_steps: Vec<OnboardingStep>,
    /// Steps that failed, in failure order.
    pub failed_steps: Vec<OnboardingStep>,
    /// Reference ids reported by completed steps.
    pub step_outputs: BTreeMap<OnboardingStep, String>,
    /// Events already applied, for duplicate detection.
    pub processed_events: HashSet<EventId>,
    /// Compensation requests awaiting acknowledgment.
    pub pending_compensations: Vec<OnboardingStep>,
    /// When the saga was created.
    pub created_at: DateTime<Utc>,
    /// When the saga was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl SagaState {
    /// Creates a fresh saga in `Initiated` status.
    pub fn new(
        partner_id: PartnerId,
        business_payload: serde_json::Value,
        correlation_id: CorrelationId,
    ) -> Self {
        let now = Utc::now();
        Self {
            saga_id: SagaId::new(),
            partner_id,
            status: SagaStatus::Initiated,
            correlation_id,
            causation_id: None,
            business_payload,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            step_outputs: BTreeMap::new(),
            processed_events: HashSet::new(),
            pending_compensations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the saga to `status`, rejecting edges outside the status graph.
    pub fn transition(&mut self, status: SagaStatus) -> Result<()> {
        if !self.status.can_transition_to(status) {
            return Err(SagaError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.touch();
        Ok(())
    }

    /// Records a completed step and its output.
    ///
    /// Returns false when the step was already recorded, so a duplicate
    /// completion never double-advances `completed_steps`.
    pub fn record_completed(&mut self, step: OnboardingStep, output: Option<String>) -> bool {
        if self.completed_steps.contains(&step) {
            return false;
        }
        self.completed_steps.push(step);
        if let Some(output) = output {
            self.step_outputs.insert(step, output);
        }
        self.touch();
        true
    }

    /// Records a failed step. Returns false when already recorded.
    pub fn record_failed(&mut self, step: OnboardingStep) -> bool {
        if self.failed_steps.contains(&step) {
            return false;
        }
        self.failed_steps.push(step);
        self.touch();
        true
    }

    /// Returns true if `event_id` was already applied to this saga.
    pub fn is_duplicate(&self, event_id: EventId) -> bool {
        self.processed_events.contains(&event_id)
    }

    /// Remembers `event_id` as applied.
    pub fn mark_processed(&mut self, event_id: EventId) {
        self.processed_events.insert(event_id);
        self.causation_id = Some(event_id);
    }

    /// The completed steps that must be undone after `failed_step` failed:
    /// every completed step earlier in the pipeline than the failed one,
    /// most recently completed first.
    pub fn compensation_plan(&self, failed_step: OnboardingStep) -> Vec<OnboardingStep> {
        self.completed_steps
            .iter()
            .rev()
            .filter(|step| step.index() < failed_step.index())
            .copied()
            .collect()
    }

    /// Arms the acknowledgment bookkeeping for a compensation run.
    pub fn begin_compensation(&mut self, plan: &[OnboardingStep]) {
        self.pending_compensations = plan.to_vec();
        self.touch();
    }

    /// Acknowledges one compensation request and returns how many are still
    /// outstanding. A stray acknowledgment for a step that is not pending
    /// leaves the count unchanged.
    pub fn ack_compensation(&mut self, step: OnboardingStep) -> usize {
        if let Some(position) = self
            .pending_compensations
            .iter()
            .position(|pending| *pending == step)
        {
            self.pending_compensations.remove(position);
            self.touch();
        }
        self.pending_compensations.len()
    }

    /// The step currently in flight, if the saga is progressing forward.
    pub fn current_step(&self) -> Option<OnboardingStep> {
        match self.completed_steps.last() {
            Some(last) => last.next(),
            None => Some(OnboardingStep::first()),
        }
    }

    /// Bumps `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
