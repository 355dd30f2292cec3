//! Saga log error types.

use thiserror::Error;

/// Errors that can occur while persisting or restoring log entries.
#[derive(Debug, Error)]
pub enum SagaLogError {
    /// The sink file could not be opened or read.
    #[error("Log file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted entry could not be decoded.
    #[error("Log entry decoding error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for saga log operations.
pub type Result<T> = std::result::Result<T, SagaLogError>;
