//! Error types for the monitoring crate.

use common::{AlertId, SagaId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitoringError {
    #[error("No timeline recorded for saga {0}")]
    TimelineNotFound(SagaId),

    #[error("Alert not found: {0}")]
    AlertNotFound(AlertId),

    #[error("Alert already resolved: {0}")]
    AlertAlreadyResolved(AlertId),
}

pub type Result<T> = std::result::Result<T, MonitoringError>;
