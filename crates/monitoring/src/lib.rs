//! Monitoring for partner onboarding sagas.
//!
//! Three read-side components consume the saga log stream:
//! [`SagaAuditTrail`] folds entries into per-saga timelines,
//! [`SagaMetrics`] derives performance profiles and system health
//! snapshots from those timelines, and its alert registry watches the
//! snapshots for threshold breaches. [`spawn_monitor`] drives periodic
//! collection in the background.

pub mod alerts;
pub mod audit;
pub mod error;
pub mod metrics;
pub mod monitor;

pub use alerts::{
    Alert, AlertRegistry, AlertSeverity, AlertThreshold, ComparisonOp, SystemMetricKind,
};
pub use audit::{
    ErrorSummary, SagaAuditTrail, Timeline, TimelineCompensation, TimelineEvent, TimelineStatus,
    TimelineStep,
};
pub use crate::metrics::{
    DEFAULT_HISTORY_CAPACITY, PerformanceMetrics, SagaMetrics, StepTiming, SystemMetrics,
};
pub use error::{MonitoringError, Result};
pub use monitor::spawn_monitor;
