//! Saga error types.

use common::{PartnerId, SagaId, SagaStatus};
use event_bus::HandlerError;
use thiserror::Error;

/// Errors that can occur during saga coordination.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No saga exists with the given id.
    #[error("Saga not found: {0}")]
    SagaNotFound(SagaId),

    /// No saga exists for the given partner.
    #[error("No saga found for partner: {0}")]
    PartnerNotFound(PartnerId),

    /// The business payload is missing required fields.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A status change outside the saga status graph was attempted.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// The saga's current status.
        from: SagaStatus,
        /// The rejected target status.
        to: SagaStatus,
    },

    /// The saga already reached a terminal status.
    #[error("Saga {saga_id} is already {status}")]
    AlreadyTerminal {
        /// The saga in question.
        saga_id: SagaId,
        /// Its terminal status.
        status: SagaStatus,
    },

    /// Compensation is already running for this saga.
    #[error("Saga {0} is already compensating")]
    AlreadyCompensating(SagaId),

    /// The state store failed.
    #[error("State store error: {0}")]
    Store(String),

    /// Failed to encode or decode saga data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SagaError> for HandlerError {
    fn from(error: SagaError) -> Self {
        HandlerError::new(error.to_string())
    }
}

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;
