//! Choreography coordinator for the partner onboarding saga.
//!
//! The orchestrator owns no business logic. It reacts to step outcome
//! events published by the participating services, advances the saga
//! status machine, and requests the next step (or compensation) by
//! publishing follow-up events on the same bus.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CorrelationId, OnboardingStep, PartnerId, SagaId, SagaStatus};
use event_bus::{
    CompensationCompletedData, Event, EventBody, EventBus, EventHandler, EventKind, HandlerError,
    StepCompletedData, StepFailedData,
};
use saga_log::{SagaLog, log::ORCHESTRATOR};

use crate::error::{Result, SagaError};
use crate::onboarding::validate_payload;
use crate::state::SagaState;
use crate::store::SagaStateStore;

/// Coordinates partner onboarding sagas over the event bus.
///
/// All state mutations follow the same discipline: mutate the in-memory
/// [`SagaState`], save it to the store, and only then publish follow-up
/// events. Delivery is synchronous, so a published event may re-enter
/// this orchestrator (through the participants) before `publish`
/// returns; the persisted state must already reflect the transition the
/// event announces.
pub struct SagaOrchestrator<S: SagaStateStore> {
    bus: Arc<EventBus>,
    store: S,
    log: Arc<SagaLog>,
}

impl<S: SagaStateStore + 'static> SagaOrchestrator<S> {
    pub fn new(bus: Arc<EventBus>, store: S, log: Arc<SagaLog>) -> Self {
        Self { bus, store, log }
    }

    /// Subscribes the orchestrator to every event kind it reacts to.
    pub async fn register(self: Arc<Self>) {
        for kind in [
            EventKind::StepCompleted,
            EventKind::StepFailed,
            EventKind::CompensationCompleted,
            EventKind::CompensationFailed,
        ] {
            self.bus.subscribe(kind, self.clone()).await;
        }
    }

    /// Starts a new onboarding saga for `partner_id`.
    ///
    /// Validates the business payload, persists the initial state and
    /// publishes the first step request. Because delivery is
    /// synchronous, the whole saga may run to completion inside this
    /// call when the participants are in-process.
    #[tracing::instrument(skip(self, payload, correlation_id), fields(partner_id = %partner_id))]
    pub async fn start(
        &self,
        partner_id: PartnerId,
        payload: serde_json::Value,
        correlation_id: Option<CorrelationId>,
    ) -> Result<SagaId> {
        validate_payload(&payload)?;

        let correlation_id = correlation_id.unwrap_or_default();
        let state = SagaState::new(partner_id, payload.clone(), correlation_id);
        let saga_id = state.saga_id;
        let first = OnboardingStep::first();

        self.store.save(&state).await?;

        metrics::counter!("saga_started_total").increment(1);
        self.log.saga_started(saga_id, partner_id);
        self.log.step_started(saga_id, partner_id, first);
        tracing::info!(saga_id = %saga_id, "Onboarding saga started");

        let event = Event::root(
            correlation_id,
            EventBody::step_requested(saga_id, partner_id, first, payload),
        );
        self.bus.publish(&event).await;

        Ok(saga_id)
    }

    /// Returns the current state of the saga for `partner_id`.
    ///
    /// When several sagas exist for the partner, the most recently
    /// updated one wins.
    pub async fn status(&self, partner_id: PartnerId) -> Result<SagaState> {
        self.store
            .find_by_partner(partner_id)
            .await?
            .ok_or(SagaError::PartnerNotFound(partner_id))
    }

    /// Begins compensation for `partner_id` on operator request.
    ///
    /// Uses the last recorded failed step as the failure point; when no
    /// step failed yet (the automatic chain stalled), falls back to the
    /// step currently in flight.
    #[tracing::instrument(skip(self, reason), fields(partner_id = %partner_id))]
    pub async fn request_compensation(
        &self,
        partner_id: PartnerId,
        reason: &str,
    ) -> Result<SagaId> {
        let state = self
            .store
            .find_by_partner(partner_id)
            .await?
            .ok_or(SagaError::PartnerNotFound(partner_id))?;

        if state.status.is_terminal() {
            return Err(SagaError::AlreadyTerminal {
                saga_id: state.saga_id,
                status: state.status,
            });
        }
        if state.status == SagaStatus::Compensating {
            return Err(SagaError::AlreadyCompensating(state.saga_id));
        }

        let failed_step = state
            .failed_steps
            .last()
            .copied()
            .or_else(|| state.current_step())
            .unwrap_or_else(OnboardingStep::first);

        tracing::warn!(
            saga_id = %state.saga_id,
            step = %failed_step,
            reason,
            "Manual compensation requested"
        );
        let saga_id = state.saga_id;
        self.compensate(saga_id, failed_step, None).await?;
        Ok(saga_id)
    }

    /// Moves the saga into compensation and requests the undo of every
    /// completed step before `failed_step`, in reverse completion order.
    ///
    /// `cause` carries the event that triggered the failure when
    /// compensation starts automatically; manual triggers pass `None`
    /// and the compensation events start a fresh causal chain.
    pub async fn compensate(
        &self,
        saga_id: SagaId,
        failed_step: OnboardingStep,
        cause: Option<&Event>,
    ) -> Result<()> {
        let mut state = self
            .store
            .get(saga_id)
            .await?
            .ok_or(SagaError::SagaNotFound(saga_id))?;

        if state.status.is_terminal() {
            return Err(SagaError::AlreadyTerminal {
                saga_id,
                status: state.status,
            });
        }

        let plan = state.compensation_plan(failed_step);

        // Manual triggers arrive while the saga is still in a forward
        // status; the automatic path has already recorded the failure.
        if state.status != SagaStatus::Failed {
            state.transition(SagaStatus::Failed)?;
            self.log.saga_failed(
                saga_id,
                state.partner_id,
                &format!("Compensation requested at step {failed_step}"),
            );
            metrics::counter!("saga_failed_total").increment(1);
        }

        state.transition(SagaStatus::Compensating)?;
        state.begin_compensation(&plan);
        self.log.compensation_started(saga_id, state.partner_id);
        tracing::warn!(
            saga_id = %saga_id,
            steps = plan.len(),
            "Compensating completed steps in reverse order"
        );

        if plan.is_empty() {
            // Nothing completed before the failure point.
            state.transition(SagaStatus::Compensated)?;
            let partner_id = state.partner_id;
            self.store.save(&state).await?;
            self.finish_compensation(&state, cause).await;
            tracing::info!(saga_id = %saga_id, partner_id = %partner_id, "Nothing to compensate");
            return Ok(());
        }

        let partner_id = state.partner_id;
        let correlation_id = state.correlation_id;
        let requests: Vec<Event> = plan
            .iter()
            .map(|step| {
                let compensation_data = state
                    .step_outputs
                    .get(step)
                    .map(|output| serde_json::Value::String(output.clone()));
                let body = EventBody::compensation_requested(
                    saga_id,
                    partner_id,
                    *step,
                    failed_step,
                    compensation_data,
                );
                match cause {
                    Some(parent) => Event::caused_by(parent, body),
                    None => Event::root(correlation_id, body),
                }
            })
            .collect();

        // Save before publishing: the compensation handlers re-enter
        // this orchestrator synchronously and must observe the
        // Compensating status and the pending set.
        self.store.save(&state).await?;
        for event in &requests {
            self.bus.publish(event).await;
        }

        Ok(())
    }

    /// Returns every non-terminal saga not updated within `max_age`.
    ///
    /// A step that never reports back leaves its saga parked in a
    /// forward status; this surfaces those for manual compensation.
    pub async fn stalled(&self, max_age: chrono::Duration) -> Result<Vec<SagaState>> {
        let cutoff = Utc::now() - max_age;
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|state| !state.status.is_terminal() && state.updated_at < cutoff)
            .collect())
    }

    async fn on_step_completed(&self, event: &Event, data: &StepCompletedData) -> Result<()> {
        let mut state = self
            .store
            .get(data.saga_id)
            .await?
            .ok_or(SagaError::SagaNotFound(data.saga_id))?;

        if state.is_duplicate(event.event_id) {
            tracing::debug!(saga_id = %data.saga_id, event_id = %event.event_id, "Duplicate event ignored");
            return Ok(());
        }
        state.mark_processed(event.event_id);

        if !state.record_completed(data.step, data.output.clone()) {
            // Same step reported twice under different event ids.
            self.store.save(&state).await?;
            tracing::debug!(saga_id = %data.saga_id, step = %data.step, "Step already completed");
            return Ok(());
        }

        state.transition(data.step.completed_status())?;
        self.log
            .step_completed(data.saga_id, data.partner_id, data.step);

        match data.step.next() {
            Some(next) => {
                self.log.step_started(data.saga_id, data.partner_id, next);
                self.store.save(&state).await?;
                let request = Event::caused_by(
                    event,
                    EventBody::step_requested(
                        data.saga_id,
                        data.partner_id,
                        next,
                        state.business_payload.clone(),
                    ),
                );
                self.bus.publish(&request).await;
            }
            None => {
                state.transition(SagaStatus::Completed)?;
                self.store.save(&state).await?;

                self.log.saga_completed(data.saga_id, data.partner_id);
                metrics::counter!("saga_completed_total").increment(1);
                let elapsed = (Utc::now() - state.created_at).num_milliseconds() as f64 / 1000.0;
                metrics::histogram!("saga_duration_seconds").record(elapsed);
                tracing::info!(saga_id = %data.saga_id, "Onboarding saga completed");

                let done = Event::caused_by(
                    event,
                    EventBody::saga_completed(data.saga_id, data.partner_id),
                );
                self.bus.publish(&done).await;
            }
        }

        Ok(())
    }

    async fn on_step_failed(&self, event: &Event, data: &StepFailedData) -> Result<()> {
        let mut state = self
            .store
            .get(data.saga_id)
            .await?
            .ok_or(SagaError::SagaNotFound(data.saga_id))?;

        if state.is_duplicate(event.event_id) {
            tracing::debug!(saga_id = %data.saga_id, event_id = %event.event_id, "Duplicate event ignored");
            return Ok(());
        }
        state.mark_processed(event.event_id);

        if !state.record_failed(data.step) {
            self.store.save(&state).await?;
            tracing::debug!(saga_id = %data.saga_id, step = %data.step, "Step failure already recorded");
            return Ok(());
        }

        state.transition(SagaStatus::Failed)?;
        self.log
            .step_failed(data.saga_id, data.partner_id, data.step, &data.error);
        self.log
            .saga_failed(data.saga_id, data.partner_id, &data.error);
        metrics::counter!("saga_failed_total").increment(1);
        tracing::error!(
            saga_id = %data.saga_id,
            step = %data.step,
            error = %data.error,
            "Onboarding step failed"
        );

        self.store.save(&state).await?;
        self.compensate(data.saga_id, data.step, Some(event)).await
    }

    async fn on_compensation_completed(
        &self,
        event: &Event,
        data: &CompensationCompletedData,
    ) -> Result<()> {
        let mut state = self
            .store
            .get(data.saga_id)
            .await?
            .ok_or(SagaError::SagaNotFound(data.saga_id))?;

        if state.is_duplicate(event.event_id) {
            tracing::debug!(saga_id = %data.saga_id, event_id = %event.event_id, "Duplicate event ignored");
            return Ok(());
        }
        state.mark_processed(event.event_id);

        if state.status != SagaStatus::Compensating {
            // Stray ack after the saga already settled.
            self.store.save(&state).await?;
            return Ok(());
        }

        let remaining = state.ack_compensation(data.step);
        self.log
            .step_compensated(data.saga_id, data.partner_id, data.step);
        tracing::warn!(saga_id = %data.saga_id, step = %data.step, remaining, "Step compensated");

        if remaining == 0 {
            state.transition(SagaStatus::Compensated)?;
            self.store.save(&state).await?;
            self.finish_compensation(&state, Some(event)).await;
        } else {
            self.store.save(&state).await?;
        }

        Ok(())
    }

    async fn on_compensation_failed(&self, event: &Event, data: &StepFailedData) -> Result<()> {
        let mut state = self
            .store
            .get(data.saga_id)
            .await?
            .ok_or(SagaError::SagaNotFound(data.saga_id))?;

        if state.is_duplicate(event.event_id) {
            tracing::debug!(saga_id = %data.saga_id, event_id = %event.event_id, "Duplicate event ignored");
            return Ok(());
        }
        state.mark_processed(event.event_id);

        if state.status != SagaStatus::Compensating {
            self.store.save(&state).await?;
            return Ok(());
        }

        // A failed compensation still settles its slot. There is no
        // further escalation; the entry below is the operator's cue.
        let remaining = state.ack_compensation(data.step);
        self.log
            .compensation_failed(data.saga_id, data.partner_id, data.step, &data.error);
        tracing::error!(
            saga_id = %data.saga_id,
            step = %data.step,
            error = %data.error,
            "Compensation step failed; manual cleanup may be required"
        );

        if remaining == 0 {
            state.transition(SagaStatus::Compensated)?;
            self.store.save(&state).await?;
            self.finish_compensation(&state, Some(event)).await;
        } else {
            self.store.save(&state).await?;
        }

        Ok(())
    }

    /// Records the terminal compensation bookkeeping and announces it.
    /// The state must already be saved as Compensated.
    async fn finish_compensation(&self, state: &SagaState, cause: Option<&Event>) {
        self.log
            .compensation_completed(state.saga_id, state.partner_id);
        self.log.saga_compensated(state.saga_id, state.partner_id);
        metrics::counter!("saga_compensated_total").increment(1);
        let elapsed = (Utc::now() - state.created_at).num_milliseconds() as f64 / 1000.0;
        metrics::histogram!("saga_duration_seconds").record(elapsed);
        tracing::warn!(saga_id = %state.saga_id, "Onboarding saga compensated");

        let body = EventBody::saga_compensated(state.saga_id, state.partner_id);
        let event = match cause {
            Some(parent) => Event::caused_by(parent, body),
            None => Event::root(state.correlation_id, body),
        };
        self.bus.publish(&event).await;
    }
}

#[async_trait]
impl<S: SagaStateStore + 'static> EventHandler for SagaOrchestrator<S> {
    fn name(&self) -> &str {
        ORCHESTRATOR
    }

    async fn handle(&self, event: &Event) -> std::result::Result<(), HandlerError> {
        match &event.body {
            EventBody::StepCompleted(data) => self.on_step_completed(event, data).await?,
            EventBody::StepFailed(data) => self.on_step_failed(event, data).await?,
            EventBody::CompensationCompleted(data) => {
                self.on_compensation_completed(event, data).await?;
            }
            EventBody::CompensationFailed(data) => {
                self.on_compensation_failed(event, data).await?;
            }
            _ => {}
        }
        Ok(())
    }
}
