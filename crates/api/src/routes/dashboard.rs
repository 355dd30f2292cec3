//! Read-only dashboard endpoints over the monitoring stack, plus the
//! operator alert-resolution action.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::{AlertId, PartnerId, SagaId};
use monitoring::{Alert, PerformanceMetrics, SystemMetrics, Timeline, TimelineStatus};
use saga::{SagaState, SagaStateStore};
use saga_log::{LogEntry, LogEventKind, LogFilter, LogLevel};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::onboarding::AppState;

// -- Response types --

#[derive(Serialize)]
pub struct SagaSummary {
    pub saga_id: SagaId,
    pub partner_id: PartnerId,
    pub status: TimelineStatus,
    pub start_time: DateTime<Utc>,
    pub total_duration_ms: Option<i64>,
}

#[derive(Serialize)]
pub struct DashboardStatusResponse {
    pub system: SystemMetrics,
    pub active_alerts: usize,
    pub sagas: Vec<SagaSummary>,
}

#[derive(Serialize)]
pub struct PerformanceOverviewResponse {
    pub system: SystemMetrics,
    pub sagas: Vec<PerformanceMetrics>,
}

#[derive(Serialize)]
pub struct SagaPerformanceResponse {
    pub performance: PerformanceMetrics,
    pub recommendations: Vec<String>,
}

#[derive(Serialize)]
pub struct SagaExportResponse {
    pub saga: SagaState,
    pub timeline: Timeline,
    pub entries: Vec<LogEntry>,
    pub performance: PerformanceMetrics,
}

#[derive(Deserialize)]
pub struct LogsQuery {
    pub saga_id: Option<SagaId>,
    pub level: Option<LogLevel>,
    pub kind: Option<LogEventKind>,
    pub limit: Option<usize>,
}

// -- Handlers --

/// GET /dashboard/status — system snapshot plus one line per saga.
#[tracing::instrument(skip(state))]
pub async fn status<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<DashboardStatusResponse> {
    let system = state.metrics.collect();
    let sagas = state
        .audit
        .all_timelines()
        .into_iter()
        .map(|timeline| SagaSummary {
            saga_id: timeline.saga_id,
            partner_id: timeline.partner_id,
            status: timeline.status,
            start_time: timeline.start_time,
            total_duration_ms: timeline.total_duration_ms,
        })
        .collect();

    Json(DashboardStatusResponse {
        system,
        active_alerts: state.metrics.active_alerts().len(),
        sagas,
    })
}

/// GET /dashboard/performance — execution profile of every saga.
#[tracing::instrument(skip(state))]
pub async fn performance<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<PerformanceOverviewResponse> {
    let system = state.metrics.collect();
    let sagas = state
        .audit
        .all_timelines()
        .iter()
        .map(PerformanceMetrics::from_timeline)
        .collect();

    Json(PerformanceOverviewResponse { system, sagas })
}

/// GET /dashboard/alerts — currently unresolved alerts.
#[tracing::instrument(skip(state))]
pub async fn alerts<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Vec<Alert>> {
    Json(state.metrics.active_alerts())
}

/// GET /dashboard/logs — filtered saga log entries, newest first.
#[tracing::instrument(skip(state, query))]
pub async fn logs<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<LogEntry>> {
    let mut filter = LogFilter::new();
    if let Some(saga_id) = query.saga_id {
        filter = filter.saga(saga_id);
    }
    if let Some(level) = query.level {
        filter = filter.min_level(level);
    }
    if let Some(kind) = query.kind {
        filter = filter.kind(kind);
    }
    filter = filter.limit(query.limit.unwrap_or(100));

    Json(state.log.filtered(&filter))
}

/// GET /dashboard/trends — recorded system snapshots, oldest first.
#[tracing::instrument(skip(state))]
pub async fn trends<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Vec<SystemMetrics>> {
    Json(state.metrics.history())
}

/// GET /dashboard/sagas/:saga_id/timeline — reconstructed saga history.
#[tracing::instrument(skip(state))]
pub async fn timeline<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(saga_id): Path<SagaId>,
) -> Result<Json<Timeline>, ApiError> {
    let timeline = state
        .audit
        .timeline(saga_id)
        .ok_or_else(|| ApiError::NotFound(format!("No timeline for saga {saga_id}")))?;
    Ok(Json(timeline))
}

/// GET /dashboard/sagas/:saga_id/performance — profile plus advice.
#[tracing::instrument(skip(state))]
pub async fn saga_performance<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(saga_id): Path<SagaId>,
) -> Result<Json<SagaPerformanceResponse>, ApiError> {
    let performance = state.metrics.performance(saga_id)?;
    let recommendations = state.metrics.recommendations(saga_id)?;

    Ok(Json(SagaPerformanceResponse {
        performance,
        recommendations,
    }))
}

/// GET /dashboard/sagas/:saga_id/export — full audit trail as one JSON
/// document: state, timeline, raw entries and the performance profile.
#[tracing::instrument(skip(state))]
pub async fn export<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(saga_id): Path<SagaId>,
) -> Result<Json<SagaExportResponse>, ApiError> {
    let saga = state
        .store
        .get(saga_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Saga {saga_id} not found")))?;
    let timeline = state
        .audit
        .timeline(saga_id)
        .ok_or_else(|| ApiError::NotFound(format!("No timeline for saga {saga_id}")))?;
    let performance = state.metrics.performance(saga_id)?;

    Ok(Json(SagaExportResponse {
        saga,
        timeline,
        entries: state.log.entries_for_saga(saga_id),
        performance,
    }))
}

/// POST /dashboard/alerts/:alert_id/resolve — operator acknowledgement.
#[tracing::instrument(skip(state))]
pub async fn resolve_alert<S: SagaStateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(alert_id): Path<AlertId>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state.metrics.resolve_alert(alert_id)?;
    tracing::info!(alert_id = %alert_id, metric = %alert.metric, "Alert resolved");
    Ok(Json(alert))
}
