//! In-process participant services for the onboarding saga.
//!
//! Each [`InMemoryStepService`] owns exactly one [`OnboardingStep`] and
//! reacts to step and compensation requests for it. Outcomes travel back
//! to the orchestrator as published events only; a participant never
//! returns an error across the bus for a business failure.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OnboardingStep;
use event_bus::{
    CompensationRequestedData, Event, EventBody, EventBus, EventHandler, EventKind, HandlerError,
    StepRequestedData,
};

fn reference_prefix(step: OnboardingStep) -> &'static str {
    match step {
        OnboardingStep::RegisterPartner => "PTR",
        OnboardingStep::CreateContract => "CTR",
        OnboardingStep::VerifyDocuments => "DOC",
        OnboardingStep::EnableCampaigns => "CMP",
        OnboardingStep::SetupRecruitment => "RCT",
    }
}

#[derive(Debug)]
struct StepServiceState {
    executions: usize,
    compensations: usize,
    next_reference: u32,
    fail_on_execute: bool,
    fail_on_compensate: bool,
}

impl Default for StepServiceState {
    fn default() -> Self {
        Self {
            executions: 0,
            compensations: 0,
            next_reference: 1,
            fail_on_execute: false,
            fail_on_compensate: false,
        }
    }
}

/// Default in-process implementation of one onboarding service.
///
/// Executing a step hands out a sequential business reference
/// (`PTR-0001`, `CTR-0001`, ...) as the step output, which later becomes
/// the compensation data when the saga unwinds. Failure injection via
/// [`set_fail_on_execute`](Self::set_fail_on_execute) and
/// [`set_fail_on_compensate`](Self::set_fail_on_compensate) drives the
/// unhappy paths in tests and demos.
pub struct InMemoryStepService {
    step: OnboardingStep,
    bus: Arc<EventBus>,
    state: RwLock<StepServiceState>,
}

impl InMemoryStepService {
    pub fn new(step: OnboardingStep, bus: Arc<EventBus>) -> Self {
        Self {
            step,
            bus,
            state: RwLock::new(StepServiceState::default()),
        }
    }

    pub fn step(&self) -> OnboardingStep {
        self.step
    }

    /// Number of step requests this service has handled.
    pub fn execution_count(&self) -> usize {
        self.state.read().unwrap().executions
    }

    /// Number of compensation requests this service has handled.
    pub fn compensation_count(&self) -> usize {
        self.state.read().unwrap().compensations
    }

    pub fn set_fail_on_execute(&self, fail: bool) {
        self.state.write().unwrap().fail_on_execute = fail;
    }

    pub fn set_fail_on_compensate(&self, fail: bool) {
        self.state.write().unwrap().fail_on_compensate = fail;
    }

    async fn execute(&self, event: &Event, data: &StepRequestedData) {
        // The guard is not Send; build the outcome before awaiting.
        let body = {
            let mut state = self.state.write().unwrap();
            state.executions += 1;
            if state.fail_on_execute {
                tracing::warn!(
                    saga_id = %data.saga_id,
                    step = %self.step,
                    "Step rejected by injected failure"
                );
                EventBody::step_failed(
                    data.saga_id,
                    data.partner_id,
                    self.step,
                    format!("{} rejected the request", self.step.service()),
                )
            } else {
                let reference =
                    format!("{}-{:04}", reference_prefix(self.step), state.next_reference);
                state.next_reference += 1;
                tracing::info!(
                    saga_id = %data.saga_id,
                    step = %self.step,
                    reference,
                    "Step executed"
                );
                EventBody::step_completed(
                    data.saga_id,
                    data.partner_id,
                    self.step,
                    Some(reference),
                )
            }
        };
        self.bus.publish(&Event::caused_by(event, body)).await;
    }

    async fn compensate(&self, event: &Event, data: &CompensationRequestedData) {
        let body = {
            let mut state = self.state.write().unwrap();
            state.compensations += 1;
            if state.fail_on_compensate {
                tracing::error!(
                    saga_id = %data.saga_id,
                    step = %self.step,
                    "Compensation rejected by injected failure"
                );
                EventBody::compensation_failed(
                    data.saga_id,
                    data.partner_id,
                    self.step,
                    format!("{} could not undo the step", self.step.service()),
                )
            } else {
                tracing::warn!(
                    saga_id = %data.saga_id,
                    step = %self.step,
                    failed_step = %data.failed_step,
                    "Step compensated"
                );
                EventBody::compensation_completed(data.saga_id, data.partner_id, self.step)
            }
        };
        self.bus.publish(&Event::caused_by(event, body)).await;
    }
}

#[async_trait]
impl EventHandler for InMemoryStepService {
    fn name(&self) -> &str {
        self.step.service()
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        match &event.body {
            EventBody::StepRequested(data) if data.step == self.step => {
                self.execute(event, data).await;
            }
            EventBody::CompensationRequested(data) if data.step == self.step => {
                self.compensate(event, data).await;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Creates one [`InMemoryStepService`] per onboarding step and wires
/// each to the step and compensation request streams.
pub async fn register_default_participants(bus: &Arc<EventBus>) -> Vec<Arc<InMemoryStepService>> {
    let mut services = Vec::with_capacity(OnboardingStep::ALL.len());
    for step in OnboardingStep::ALL {
        let service = Arc::new(InMemoryStepService::new(step, bus.clone()));
        bus.subscribe(EventKind::StepRequested, service.clone()).await;
        bus.subscribe(EventKind::CompensationRequested, service.clone())
            .await;
        services.push(service);
    }
    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CorrelationId, PartnerId, SagaId};
    use std::sync::Mutex;

    struct Capture {
        events: Mutex<Vec<Event>>,
    }

    impl Capture {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn bodies(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn step_request(step: OnboardingStep) -> Event {
        Event::root(
            CorrelationId::new(),
            EventBody::step_requested(
                SagaId::new(),
                PartnerId::new(),
                step,
                serde_json::json!({}),
            ),
        )
    }

    #[tokio::test]
    async fn test_service_only_reacts_to_its_own_step() {
        let bus = Arc::new(EventBus::new());
        let partner = Arc::new(InMemoryStepService::new(
            OnboardingStep::RegisterPartner,
            bus.clone(),
        ));
        let contract = Arc::new(InMemoryStepService::new(
            OnboardingStep::CreateContract,
            bus.clone(),
        ));
        bus.subscribe(EventKind::StepRequested, partner.clone()).await;
        bus.subscribe(EventKind::StepRequested, contract.clone()).await;

        bus.publish(&step_request(OnboardingStep::RegisterPartner))
            .await;

        assert_eq!(partner.execution_count(), 1);
        assert_eq!(contract.execution_count(), 0);
    }

    #[tokio::test]
    async fn test_execution_publishes_completion_with_reference() {
        let bus = Arc::new(EventBus::new());
        let service = Arc::new(InMemoryStepService::new(
            OnboardingStep::RegisterPartner,
            bus.clone(),
        ));
        let capture = Capture::new();
        bus.subscribe(EventKind::StepRequested, service.clone()).await;
        bus.subscribe(EventKind::StepCompleted, capture.clone()).await;

        let request = step_request(OnboardingStep::RegisterPartner);
        bus.publish(&request).await;

        let events = capture.bodies();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, request.correlation_id);
        assert_eq!(events[0].causation_id, Some(request.event_id));
        match &events[0].body {
            EventBody::StepCompleted(data) => {
                assert_eq!(data.output.as_deref(), Some("PTR-0001"));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_references_are_sequential() {
        let bus = Arc::new(EventBus::new());
        let service = Arc::new(InMemoryStepService::new(
            OnboardingStep::CreateContract,
            bus.clone(),
        ));
        let capture = Capture::new();
        bus.subscribe(EventKind::StepRequested, service.clone()).await;
        bus.subscribe(EventKind::StepCompleted, capture.clone()).await;

        bus.publish(&step_request(OnboardingStep::CreateContract))
            .await;
        bus.publish(&step_request(OnboardingStep::CreateContract))
            .await;

        let outputs: Vec<_> = capture
            .bodies()
            .iter()
            .filter_map(|event| match &event.body {
                EventBody::StepCompleted(data) => data.output.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(outputs, vec!["CTR-0001".to_string(), "CTR-0002".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_failure_publishes_step_failed() {
        let bus = Arc::new(EventBus::new());
        let service = Arc::new(InMemoryStepService::new(
            OnboardingStep::VerifyDocuments,
            bus.clone(),
        ));
        let capture = Capture::new();
        bus.subscribe(EventKind::StepRequested, service.clone()).await;
        bus.subscribe(EventKind::StepFailed, capture.clone()).await;
        service.set_fail_on_execute(true);

        bus.publish(&step_request(OnboardingStep::VerifyDocuments))
            .await;

        let events = capture.bodies();
        assert_eq!(events.len(), 1);
        match &events[0].body {
            EventBody::StepFailed(data) => {
                assert!(data.error.contains("verification-service"));
            }
            other => panic!("unexpected body: {other:?}"),
        }
        assert_eq!(service.execution_count(), 1);
    }

    #[tokio::test]
    async fn test_compensation_publishes_ack() {
        let bus = Arc::new(EventBus::new());
        let service = Arc::new(InMemoryStepService::new(
            OnboardingStep::EnableCampaigns,
            bus.clone(),
        ));
        let capture = Capture::new();
        bus.subscribe(EventKind::CompensationRequested, service.clone())
            .await;
        bus.subscribe(EventKind::CompensationCompleted, capture.clone())
            .await;

        let request = Event::root(
            CorrelationId::new(),
            EventBody::compensation_requested(
                SagaId::new(),
                PartnerId::new(),
                OnboardingStep::EnableCampaigns,
                OnboardingStep::SetupRecruitment,
                Some(serde_json::Value::String("CMP-0001".to_string())),
            ),
        );
        bus.publish(&request).await;

        assert_eq!(service.compensation_count(), 1);
        let events = capture.bodies();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].body,
            EventBody::CompensationCompleted(_)
        ));
    }

    #[tokio::test]
    async fn test_injected_compensation_failure_publishes_failed_ack() {
        let bus = Arc::new(EventBus::new());
        let service = Arc::new(InMemoryStepService::new(
            OnboardingStep::CreateContract,
            bus.clone(),
        ));
        let capture = Capture::new();
        bus.subscribe(EventKind::CompensationRequested, service.clone())
            .await;
        bus.subscribe(EventKind::CompensationFailed, capture.clone())
            .await;
        service.set_fail_on_compensate(true);

        let request = Event::root(
            CorrelationId::new(),
            EventBody::compensation_requested(
                SagaId::new(),
                PartnerId::new(),
                OnboardingStep::CreateContract,
                OnboardingStep::VerifyDocuments,
                None,
            ),
        );
        bus.publish(&request).await;

        let events = capture.bodies();
        assert_eq!(events.len(), 1);
        match &events[0].body {
            EventBody::CompensationFailed(data) => {
                assert!(data.error.contains("contract-service"));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_default_participants_covers_every_step() {
        let bus = Arc::new(EventBus::new());

        let services = register_default_participants(&bus).await;

        assert_eq!(services.len(), OnboardingStep::ALL.len());
        assert_eq!(bus.handler_count(EventKind::StepRequested).await, 5);
        assert_eq!(bus.handler_count(EventKind::CompensationRequested).await, 5);
    }
}
