//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use monitoring::MonitoringError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga coordination error.
    Saga(SagaError),
    /// Monitoring query error.
    Monitoring(MonitoringError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Monitoring(err) => monitoring_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        SagaError::SagaNotFound(_) | SagaError::PartnerNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        SagaError::AlreadyTerminal { .. }
        | SagaError::AlreadyCompensating(_)
        | SagaError::InvalidTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
        SagaError::Store(_) | SagaError::Serialization(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn monitoring_error_to_response(err: MonitoringError) -> (StatusCode, String) {
    match &err {
        MonitoringError::TimelineNotFound(_) | MonitoringError::AlertNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        MonitoringError::AlertAlreadyResolved(_) => (StatusCode::CONFLICT, err.to_string()),
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<MonitoringError> for ApiError {
    fn from(err: MonitoringError) -> Self {
        ApiError::Monitoring(err)
    }
}
