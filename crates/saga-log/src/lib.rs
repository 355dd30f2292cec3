//! Append-only structured log for saga execution.
//!
//! Every saga, step, event and compensation occurrence is recorded here as
//! one immutable [`LogEntry`]. The log is the primary data source for the
//! audit trail and metrics:
//! - [`SagaLog`] appends entries, matches step durations, and keeps live
//!   per-saga [`StepCounters`]
//! - [`LogConsumer`]s receive every entry synchronously as it is appended
//! - [`JsonlSink`] mirrors entries to a line-delimited JSON file, and
//!   [`read_entries`] + [`SagaLog::restore`] replay one after a restart

pub mod entry;
pub mod error;
pub mod log;
pub mod sink;

pub use entry::{LogEntry, LogEventKind, LogLevel, SagaOutcome, StepResult};
pub use error::{Result, SagaLogError};
pub use log::{DEFAULT_CAPACITY, LogConsumer, LogFilter, SagaLog, StepCounters};
pub use sink::{JsonlSink, read_entries};
