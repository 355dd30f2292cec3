//! Integration tests for the partner onboarding saga.

use std::sync::Arc;

use async_trait::async_trait;
use common::{CorrelationId, OnboardingStep, PartnerId, SagaStatus};
use event_bus::{Event, EventBody, EventBus, EventHandler, EventKind, HandlerError};
use saga::{InMemorySagaStateStore, InMemoryStepService, SagaError, SagaOrchestrator, SagaStateStore};
use saga_log::{LogEventKind, SagaLog};

struct TestHarness {
    orchestrator: Arc<SagaOrchestrator<InMemorySagaStateStore>>,
    store: InMemorySagaStateStore,
    bus: Arc<EventBus>,
    log: Arc<SagaLog>,
    services: Vec<Arc<InMemoryStepService>>,
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_steps(&OnboardingStep::ALL).await
    }

    /// Builds a harness with participants for `steps` only; a saga
    /// reaching an uncovered step stalls there.
    async fn with_steps(steps: &[OnboardingStep]) -> Self {
        let log = Arc::new(SagaLog::new());
        let bus = Arc::new(EventBus::with_log(log.clone()));
        let store = InMemorySagaStateStore::new();
        let orchestrator = Arc::new(SagaOrchestrator::new(bus.clone(), store.clone(), log.clone()));
        orchestrator.clone().register().await;

        let mut services = Vec::new();
        for step in steps.iter().copied() {
            let service = Arc::new(InMemoryStepService::new(step, bus.clone()));
            bus.subscribe(EventKind::StepRequested, service.clone()).await;
            bus.subscribe(EventKind::CompensationRequested, service.clone())
                .await;
            services.push(service);
        }

        Self {
            orchestrator,
            store,
            bus,
            log,
            services,
        }
    }

    fn service(&self, step: OnboardingStep) -> &Arc<InMemoryStepService> {
        self.services
            .iter()
            .find(|service| service.step() == step)
            .unwrap()
    }

    fn compensated_steps(&self, saga_id: common::SagaId) -> Vec<OnboardingStep> {
        self.log
            .entries_for_saga(saga_id)
            .into_iter()
            .filter(|entry| entry.event_kind == LogEventKind::StepCompensated)
            .filter_map(|entry| entry.step)
            .collect()
    }
}

fn valid_payload() -> serde_json::Value {
    serde_json::json!({
        "legal_name": "Acme Partners GmbH",
        "contact_email": "onboarding@acme.example",
        "country": "DE",
    })
}

struct Capture {
    events: std::sync::Mutex<Vec<Event>>,
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

#[tokio::test]
async fn test_happy_path_completes_all_steps() {
    let h = TestHarness::new().await;
    let partner_id = PartnerId::new();

    let saga_id = h
        .orchestrator
        .start(partner_id, valid_payload(), None)
        .await
        .unwrap();

    // Delivery is synchronous, so the saga has already run to the end.
    let state = h.store.get(saga_id).await.unwrap().unwrap();
    assert_eq!(state.status, SagaStatus::Completed);
    assert_eq!(state.completed_steps, OnboardingStep::ALL.to_vec());
    assert!(state.failed_steps.is_empty());
    assert_eq!(state.step_outputs.len(), 5);
    assert_eq!(
        state.step_outputs.get(&OnboardingStep::RegisterPartner),
        Some(&"PTR-0001".to_string())
    );

    // Every service executed exactly once, none compensated.
    for step in OnboardingStep::ALL {
        assert_eq!(h.service(step).execution_count(), 1, "{step}");
        assert_eq!(h.service(step).compensation_count(), 0, "{step}");
    }

    let counters = h.log.counters(saga_id);
    assert_eq!(counters.completed, 5);
    assert_eq!(counters.failed, 0);
    assert_eq!(counters.compensated, 0);
}

#[tokio::test]
async fn test_status_reflects_latest_state() {
    let h = TestHarness::new().await;
    let partner_id = PartnerId::new();

    h.orchestrator
        .start(partner_id, valid_payload(), None)
        .await
        .unwrap();

    let state = h.orchestrator.status(partner_id).await.unwrap();
    assert_eq!(state.status, SagaStatus::Completed);

    let missing = h.orchestrator.status(PartnerId::new()).await;
    assert!(matches!(missing, Err(SagaError::PartnerNotFound(_))));
}

#[tokio::test]
async fn test_first_step_failure_needs_no_compensation() {
    let h = TestHarness::new().await;
    h.service(OnboardingStep::RegisterPartner)
        .set_fail_on_execute(true);

    let saga_id = h
        .orchestrator
        .start(PartnerId::new(), valid_payload(), None)
        .await
        .unwrap();

    let state = h.store.get(saga_id).await.unwrap().unwrap();
    assert_eq!(state.status, SagaStatus::Compensated);
    assert!(state.completed_steps.is_empty());
    assert_eq!(state.failed_steps, vec![OnboardingStep::RegisterPartner]);

    // Nothing completed, so nothing was asked to undo.
    for step in OnboardingStep::ALL {
        assert_eq!(h.service(step).compensation_count(), 0, "{step}");
    }
}

#[tokio::test]
async fn test_midway_failure_compensates_in_reverse_order() {
    let h = TestHarness::new().await;
    h.service(OnboardingStep::VerifyDocuments)
        .set_fail_on_execute(true);

    let saga_id = h
        .orchestrator
        .start(PartnerId::new(), valid_payload(), None)
        .await
        .unwrap();

    let state = h.store.get(saga_id).await.unwrap().unwrap();
    assert_eq!(state.status, SagaStatus::Compensated);
    assert_eq!(
        state.completed_steps,
        vec![OnboardingStep::RegisterPartner, OnboardingStep::CreateContract]
    );
    assert_eq!(state.failed_steps, vec![OnboardingStep::VerifyDocuments]);
    assert!(state.pending_compensations.is_empty());

    // Completed steps are undone newest-first.
    assert_eq!(
        h.compensated_steps(saga_id),
        vec![OnboardingStep::CreateContract, OnboardingStep::RegisterPartner]
    );
    assert_eq!(
        h.service(OnboardingStep::CreateContract).compensation_count(),
        1
    );
    assert_eq!(
        h.service(OnboardingStep::RegisterPartner).compensation_count(),
        1
    );
    assert_eq!(
        h.service(OnboardingStep::EnableCampaigns).execution_count(),
        0
    );

    let counters = h.log.counters(saga_id);
    assert_eq!(counters.completed, 2);
    assert_eq!(counters.failed, 1);
    assert_eq!(counters.compensated, 2);
}

#[tokio::test]
async fn test_failed_compensation_still_settles_the_saga() {
    let h = TestHarness::new().await;
    h.service(OnboardingStep::VerifyDocuments)
        .set_fail_on_execute(true);
    h.service(OnboardingStep::CreateContract)
        .set_fail_on_compensate(true);

    let saga_id = h
        .orchestrator
        .start(PartnerId::new(), valid_payload(), None)
        .await
        .unwrap();

    // The failed undo is acknowledged and logged, not retried.
    let state = h.store.get(saga_id).await.unwrap().unwrap();
    assert_eq!(state.status, SagaStatus::Compensated);
    assert!(state.pending_compensations.is_empty());

    let failures: Vec<_> = h
        .log
        .entries_for_saga(saga_id)
        .into_iter()
        .filter(|entry| entry.event_kind == LogEventKind::CompensationFailed)
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].step, Some(OnboardingStep::CreateContract));
    assert!(
        failures[0]
            .error
            .as_deref()
            .unwrap()
            .contains("contract-service")
    );
}

#[tokio::test]
async fn test_invalid_payload_creates_no_saga() {
    let h = TestHarness::new().await;

    let result = h
        .orchestrator
        .start(
            PartnerId::new(),
            serde_json::json!({"legal_name": "Acme", "country": ""}),
            None,
        )
        .await;

    match result {
        Err(SagaError::InvalidPayload(message)) => {
            assert!(message.contains("contact_email"));
            assert!(message.contains("country"));
        }
        other => panic!("expected InvalidPayload, got {other:?}"),
    }
    assert_eq!(h.store.saga_count().await, 0);
    assert!(h.log.is_empty());
}

#[tokio::test]
async fn test_manual_compensation_unwinds_a_stalled_saga() {
    // No participant for EnableCampaigns: the saga parks after three steps.
    let h = TestHarness::with_steps(&[
        OnboardingStep::RegisterPartner,
        OnboardingStep::CreateContract,
        OnboardingStep::VerifyDocuments,
    ])
    .await;
    let partner_id = PartnerId::new();

    let saga_id = h
        .orchestrator
        .start(partner_id, valid_payload(), None)
        .await
        .unwrap();

    let state = h.store.get(saga_id).await.unwrap().unwrap();
    assert_eq!(state.status, SagaStatus::DocumentsVerified);

    let stalled = h.orchestrator.stalled(chrono::Duration::zero()).await.unwrap();
    assert_eq!(stalled.len(), 1);

    h.orchestrator
        .request_compensation(partner_id, "campaign service outage")
        .await
        .unwrap();

    let state = h.store.get(saga_id).await.unwrap().unwrap();
    assert_eq!(state.status, SagaStatus::Compensated);
    assert_eq!(
        h.compensated_steps(saga_id),
        vec![
            OnboardingStep::VerifyDocuments,
            OnboardingStep::CreateContract,
            OnboardingStep::RegisterPartner,
        ]
    );

    // A settled saga cannot be compensated again.
    let again = h
        .orchestrator
        .request_compensation(partner_id, "double tap")
        .await;
    assert!(matches!(again, Err(SagaError::AlreadyTerminal { .. })));
}

#[tokio::test]
async fn test_events_share_one_correlation_chain() {
    let h = TestHarness::new().await;
    let capture = Arc::new(Capture {
        events: std::sync::Mutex::new(Vec::new()),
    });
    for kind in [
        EventKind::StepRequested,
        EventKind::StepCompleted,
        EventKind::StepFailed,
        EventKind::CompensationRequested,
        EventKind::CompensationCompleted,
        EventKind::CompensationFailed,
        EventKind::SagaCompleted,
        EventKind::SagaCompensated,
    ] {
        h.bus.subscribe(kind, capture.clone()).await;
    }

    let correlation_id = CorrelationId::new();
    h.orchestrator
        .start(PartnerId::new(), valid_payload(), Some(correlation_id))
        .await
        .unwrap();

    // Handlers nest, so capture order is innermost-first; assert on the
    // chain structure rather than arrival order.
    let events = capture.events.lock().unwrap();
    // Five requests, five completions, one saga-completed announcement.
    assert_eq!(events.len(), 11);
    assert!(events.iter().all(|event| event.correlation_id == correlation_id));

    // Exactly one causal root: the opening step request.
    let roots: Vec<_> = events
        .iter()
        .filter(|event| event.causation_id.is_none())
        .collect();
    assert_eq!(roots.len(), 1);
    match &roots[0].body {
        EventBody::StepRequested(data) => {
            assert_eq!(data.step, OnboardingStep::RegisterPartner);
        }
        other => panic!("unexpected root: {other:?}"),
    }

    // Every other event points back at an event within the chain.
    let ids: std::collections::HashSet<_> =
        events.iter().map(|event| event.event_id).collect();
    assert!(
        events
            .iter()
            .filter_map(|event| event.causation_id)
            .all(|cause| ids.contains(&cause))
    );
}
