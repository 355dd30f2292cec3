//! Partner onboarding endpoints: start, status, manual compensation.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CorrelationId, OnboardingStep, PartnerId, SagaId, SagaStatus};
use event_bus::EventBus;
use monitoring::{SagaAuditTrail, SagaMetrics};
use saga::{InMemoryStepService, SagaOrchestrator, SagaStateStore};
use saga_log::SagaLog;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: SagaStateStore> {
    pub orchestrator: Arc<SagaOrchestrator<S>>,
    pub store: S,
    pub bus: Arc<EventBus>,
    pub log: Arc<SagaLog>,
    pub audit: Arc<SagaAuditTrail>,
    pub metrics: Arc<SagaMetrics>,
    pub participants: Vec<Arc<InMemoryStepService>>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct StartOnboardingRequest {
    pub partner_data: serde_json::Value,
    pub correlation_id: Option<CorrelationId>,
}

#[derive(Deserialize)]
pub struct CompensateRequest {
    pub reason: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct StartOnboardingResponse {
    pub partner_id: PartnerId,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct OnboardingStatusResponse {
    pub partner_id: PartnerId,
    pub status: SagaStatus,
    pub completed_steps: Vec<OnboardingStep>,
    pub failed_steps: Vec<OnboardingStep>,
    pub correlation_id: CorrelationId,
}

#[derive(Serialize)]
pub struct CompensateResponse {
    pub partner_id: PartnerId,
    pub saga_id: SagaId,
    pub status: SagaStatus,
}

// -- Handlers --

/// POST /partner-onboarding — start a new onboarding saga.
#[tracing::instrument(skip(state, request))]
pub async fn start<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<StartOnboardingRequest>,
) -> Result<(StatusCode, Json<StartOnboardingResponse>), ApiError> {
    let partner_id = PartnerId::new();
    state
        .orchestrator
        .start(partner_id, request.partner_data, request.correlation_id)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartOnboardingResponse {
            partner_id,
            status: "initiated",
        }),
    ))
}

/// GET /:partner_id/status — current saga state for a partner.
#[tracing::instrument(skip(state))]
pub async fn status<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(partner_id): Path<PartnerId>,
) -> Result<Json<OnboardingStatusResponse>, ApiError> {
    let saga = state.orchestrator.status(partner_id).await?;

    Ok(Json(OnboardingStatusResponse {
        partner_id,
        status: saga.status,
        completed_steps: saga.completed_steps,
        failed_steps: saga.failed_steps,
        correlation_id: saga.correlation_id,
    }))
}

/// POST /:partner_id/compensate — manually unwind a partner's saga.
#[tracing::instrument(skip(state, request))]
pub async fn compensate<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(partner_id): Path<PartnerId>,
    Json(request): Json<CompensateRequest>,
) -> Result<(StatusCode, Json<CompensateResponse>), ApiError> {
    let saga_id = state
        .orchestrator
        .request_compensation(partner_id, &request.reason)
        .await?;
    let saga = state.orchestrator.status(partner_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CompensateResponse {
            partner_id,
            saga_id,
            status: saga.status,
        }),
    ))
}
