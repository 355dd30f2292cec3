//! The in-process event bus.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use saga_log::SagaLog;
use tokio::sync::RwLock;

use crate::{Event, EventKind, HandlerError};

/// Handles events delivered by the bus.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name recorded in log entries for deliveries to this handler.
    fn name(&self) -> &str;

    /// Processes one event.
    ///
    /// Returning an error tells the bus the delivery failed; it does not
    /// interrupt the saga. A handler that wants the saga to react must
    /// publish a failure event instead.
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// In-process typed publish/subscribe bus.
///
/// Delivery is synchronous within the publishing task: `publish` awaits
/// every registered handler, in registration order, before returning.
/// At-least-once, best-effort, no persistence of undelivered events.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    log: Option<Arc<SagaLog>>,
}

impl EventBus {
    /// Creates a bus that does not record deliveries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus that records publish/delivery activity in `log`.
    pub fn with_log(log: Arc<SagaLog>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            log: Some(log),
        }
    }

    /// Registers `handler` for events of `kind`.
    ///
    /// Handlers receive events in registration order.
    pub async fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(handler);
    }

    /// Number of handlers registered for `kind`.
    pub async fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .await
            .get(&kind)
            .map_or(0, |handlers| handlers.len())
    }

    /// Delivers `event` to every handler registered for its kind.
    ///
    /// A handler error is caught, traced, counted and recorded; it never
    /// prevents delivery to the remaining handlers and never reaches the
    /// publisher.
    #[tracing::instrument(
        skip(self, event),
        fields(kind = %event.kind(), saga_id = %event.saga_id())
    )]
    pub async fn publish(&self, event: &Event) {
        let saga_id = event.saga_id();
        let partner_id = event.partner_id();
        let step = event.step();

        metrics::counter!("bus_events_published_total", "kind" => event.kind().as_str())
            .increment(1);
        if let Some(log) = &self.log {
            log.event_published(saga_id, partner_id, step);
        }

        // Snapshot the list so handlers may subscribe or publish
        // re-entrantly during delivery.
        let handlers = {
            let registry = self.handlers.read().await;
            registry.get(&event.kind()).cloned().unwrap_or_default()
        };

        for handler in handlers {
            if let Some(log) = &self.log {
                log.event_received(saga_id, partner_id, step, handler.name());
            }

            match handler.handle(event).await {
                Ok(()) => {
                    if let Some(log) = &self.log {
                        log.event_processed(saga_id, partner_id, step, handler.name());
                    }
                }
                Err(error) => {
                    metrics::counter!(
                        "bus_handler_failures_total",
                        "handler" => handler.name().to_string()
                    )
                    .increment(1);
                    tracing::error!(
                        handler = handler.name(),
                        %error,
                        "event handler failed"
                    );
                    if let Some(log) = &self.log {
                        log.event_failed(saga_id, partner_id, step, handler.name(), error.message());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CorrelationId, OnboardingStep, PartnerId, SagaId};
    use saga_log::{LogEventKind, LogFilter};
    use std::sync::Mutex;

    use crate::EventBody;

    struct Recording {
        name: String,
        seen: Mutex<Vec<EventKind>>,
        fail: bool,
    }

    impl Recording {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                seen: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                seen: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn seen(&self) -> Vec<EventKind> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recording {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(event.kind());
            if self.fail {
                return Err(HandlerError::new("handler rejected the event"));
            }
            Ok(())
        }
    }

    fn step_requested() -> Event {
        Event::root(
            CorrelationId::new(),
            EventBody::step_requested(
                SagaId::new(),
                PartnerId::new(),
                OnboardingStep::RegisterPartner,
                serde_json::json!({}),
            ),
        )
    }

    #[tokio::test]
    async fn test_delivers_to_subscribers_in_order() {
        let bus = EventBus::new();
        let first = Recording::new("first");
        let second = Recording::new("second");
        bus.subscribe(EventKind::StepRequested, first.clone()).await;
        bus.subscribe(EventKind::StepRequested, second.clone())
            .await;

        bus.publish(&step_requested()).await;

        assert_eq!(first.seen(), vec![EventKind::StepRequested]);
        assert_eq!(second.seen(), vec![EventKind::StepRequested]);
        assert_eq!(bus.handler_count(EventKind::StepRequested).await, 2);
    }

    #[tokio::test]
    async fn test_routes_by_kind() {
        let bus = EventBus::new();
        let requested = Recording::new("requested");
        let completed = Recording::new("completed");
        bus.subscribe(EventKind::StepRequested, requested.clone())
            .await;
        bus.subscribe(EventKind::StepCompleted, completed.clone())
            .await;

        bus.publish(&step_requested()).await;

        assert_eq!(requested.seen().len(), 1);
        assert!(completed.seen().is_empty());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish(&step_requested()).await;
        assert_eq!(bus.handler_count(EventKind::StepRequested).await, 0);
    }

    #[tokio::test]
    async fn test_handler_error_does_not_stop_delivery() {
        let bus = EventBus::new();
        let failing = Recording::failing("failing");
        let after = Recording::new("after");
        bus.subscribe(EventKind::StepRequested, failing.clone())
            .await;
        bus.subscribe(EventKind::StepRequested, after.clone()).await;

        bus.publish(&step_requested()).await;

        assert_eq!(failing.seen().len(), 1);
        assert_eq!(after.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_deliveries_are_recorded_in_the_log() {
        let log = Arc::new(SagaLog::new());
        let bus = EventBus::with_log(log.clone());
        bus.subscribe(EventKind::StepRequested, Recording::new("partner-service"))
            .await;

        bus.publish(&step_requested()).await;

        let kinds: Vec<_> = log
            .recent(10)
            .into_iter()
            .rev()
            .map(|entry| entry.event_kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                LogEventKind::EventPublished,
                LogEventKind::EventReceived,
                LogEventKind::EventProcessed,
            ]
        );
    }

    #[tokio::test]
    async fn test_handler_failure_is_recorded_in_the_log() {
        let log = Arc::new(SagaLog::new());
        let bus = EventBus::with_log(log.clone());
        bus.subscribe(
            EventKind::StepRequested,
            Recording::failing("partner-service"),
        )
        .await;

        bus.publish(&step_requested()).await;

        let failures = log.filtered(&LogFilter::new().kind(LogEventKind::EventFailed));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].service, "partner-service");
        assert_eq!(
            failures[0].error.as_deref(),
            Some("handler rejected the event")
        );
    }
}
