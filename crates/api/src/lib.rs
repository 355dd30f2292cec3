//! HTTP API server for the partner onboarding saga.
//!
//! Exposes the onboarding lifecycle endpoints and the monitoring
//! dashboard, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_bus::EventBus;
use metrics_exporter_prometheus::PrometheusHandle;
use monitoring::{AlertRegistry, SagaAuditTrail, SagaMetrics};
use saga::{SagaOrchestrator, SagaStateStore, register_default_participants};
use saga_log::SagaLog;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::onboarding::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: SagaStateStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/partner-onboarding", post(routes::onboarding::start::<S>))
        .route("/{partner_id}/status", get(routes::onboarding::status::<S>))
        .route("/{partner_id}/compensate", post(routes::onboarding::compensate::<S>))
        .route("/dashboard/status", get(routes::dashboard::status::<S>))
        .route("/dashboard/performance", get(routes::dashboard::performance::<S>))
        .route("/dashboard/alerts", get(routes::dashboard::alerts::<S>))
        .route("/dashboard/alerts/{alert_id}/resolve", post(routes::dashboard::resolve_alert::<S>))
        .route("/dashboard/logs", get(routes::dashboard::logs::<S>))
        .route("/dashboard/trends", get(routes::dashboard::trends::<S>))
        .route("/dashboard/sagas/{saga_id}/timeline", get(routes::dashboard::timeline::<S>))
        .route(
            "/dashboard/sagas/{saga_id}/performance",
            get(routes::dashboard::saga_performance::<S>),
        )
        .route("/dashboard/sagas/{saga_id}/export", get(routes::dashboard::export::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the default onboarding stack: audit trail and metrics consumers
/// on the log, the event bus, the orchestrator and the in-memory step
/// services.
pub async fn create_default_state<S: SagaStateStore + Clone + 'static>(
    store: S,
    log: Arc<SagaLog>,
) -> Arc<AppState<S>> {
    let audit = Arc::new(SagaAuditTrail::new());
    let metrics = Arc::new(SagaMetrics::new(audit.clone()));
    for threshold in AlertRegistry::default_thresholds() {
        metrics.add_threshold(threshold);
    }
    log.add_consumer(audit.clone());
    log.add_consumer(metrics.clone());

    let bus = Arc::new(EventBus::with_log(log.clone()));
    let orchestrator = Arc::new(SagaOrchestrator::new(bus.clone(), store.clone(), log.clone()));
    orchestrator.clone().register().await;
    let participants = register_default_participants(&bus).await;

    Arc::new(AppState {
        orchestrator,
        store,
        bus,
        log,
        audit,
        metrics,
        participants,
    })
}
