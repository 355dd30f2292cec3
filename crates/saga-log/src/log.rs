//! The append-only saga log.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use common::{OnboardingStep, PartnerId, SagaId};
use serde::{Deserialize, Serialize};

use crate::sink::JsonlSink;
use crate::{LogEntry, LogEventKind, LogLevel, StepResult};

/// Default bound on in-memory entries.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Service name recorded for orchestrator-scoped entries.
pub const ORCHESTRATOR: &str = "saga-orchestrator";

/// Service name recorded for bus publish entries.
pub const EVENT_BUS: &str = "event-bus";

/// Receives every appended entry, synchronously, in append order.
///
/// Consumers are called outside the log's internal lock, so a consumer may
/// query the log (or append to it) from `accept` without deadlocking.
pub trait LogConsumer: Send + Sync {
    /// Called once per appended or restored entry.
    fn accept(&self, entry: &LogEntry);
}

/// Live per-saga step counters, updated as entries are appended.
///
/// A derived read model over the entries, which remain the source of truth.
/// Counters survive capacity eviction of the raw entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounters {
    /// Steps that completed successfully.
    pub completed: usize,
    /// Steps that failed.
    pub failed: usize,
    /// Steps that were compensated.
    pub compensated: usize,
}

/// Filter for querying log entries.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Keep entries at or above this level.
    pub min_level: Option<LogLevel>,
    /// Keep entries of exactly this kind.
    pub kind: Option<LogEventKind>,
    /// Keep entries belonging to this saga.
    pub saga_id: Option<SagaId>,
    /// Return at most this many entries.
    pub limit: Option<usize>,
}

impl LogFilter {
    /// Creates an empty filter matching every entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep entries at or above `level`.
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    /// Keep entries of exactly `kind`.
    pub fn kind(mut self, kind: LogEventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Keep entries belonging to `saga_id`.
    pub fn saga(mut self, saga_id: SagaId) -> Self {
        self.saga_id = Some(saga_id);
        self
    }

    /// Return at most `limit` entries.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(min) = self.min_level
            && entry.level < min
        {
            return false;
        }
        if let Some(kind) = self.kind
            && entry.event_kind != kind
        {
            return false;
        }
        if let Some(saga_id) = self.saga_id
            && entry.saga_id != saga_id
        {
            return false;
        }
        true
    }
}

#[derive(Default)]
struct LogState {
    entries: VecDeque<LogEntry>,
    pending_steps: HashMap<(SagaId, OnboardingStep), DateTime<Utc>>,
    counters: HashMap<SagaId, StepCounters>,
}

impl LogState {
    /// Folds one entry into the derived bookkeeping: pending step starts,
    /// duration matching, and per-saga counters.
    fn apply(&mut self, entry: &mut LogEntry) {
        match entry.event_kind {
            LogEventKind::StepStarted => {
                if let Some(step) = entry.step {
                    self.pending_steps
                        .insert((entry.saga_id, step), entry.timestamp);
                }
            }
            LogEventKind::StepCompleted
            | LogEventKind::StepFailed
            | LogEventKind::StepCompensated => {
                if let Some(step) = entry.step {
                    // Restored entries keep the duration they were written
                    // with; only fresh entries get one computed here.
                    if entry.duration_ms.is_none()
                        && let Some(started) =
                            self.pending_steps.remove(&(entry.saga_id, step))
                    {
                        entry.duration_ms =
                            Some((entry.timestamp - started).num_milliseconds());
                    }

                    let counters = self.counters.entry(entry.saga_id).or_default();
                    match entry.event_kind {
                        LogEventKind::StepCompleted => counters.completed += 1,
                        LogEventKind::StepFailed => counters.failed += 1,
                        _ => counters.compensated += 1,
                    }
                }
            }
            _ => {}
        }
    }
}

/// Append-only recorder of saga activity.
///
/// One recorder method exists per [`LogEventKind`]; each call builds one
/// immutable [`LogEntry`] with a generated id and UTC timestamp. The log
/// keeps a bounded in-memory window of entries (oldest evicted first),
/// optionally mirrors every fresh entry to a [`JsonlSink`], and fans every
/// entry out to registered [`LogConsumer`]s.
pub struct SagaLog {
    capacity: usize,
    state: RwLock<LogState>,
    consumers: RwLock<Vec<Arc<dyn LogConsumer>>>,
    sink: Option<JsonlSink>,
}

impl SagaLog {
    /// Creates a log bounded at [`DEFAULT_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a log bounded at `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: RwLock::new(LogState::default()),
            consumers: RwLock::new(Vec::new()),
            sink: None,
        }
    }

    /// Mirrors every fresh entry to `sink`.
    pub fn with_sink(mut self, sink: JsonlSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Registers a consumer; it receives every subsequent entry.
    pub fn add_consumer(&self, consumer: Arc<dyn LogConsumer>) {
        self.consumers.write().unwrap().push(consumer);
    }

    // Saga lifecycle.

    /// Records that a saga was created.
    pub fn saga_started(&self, saga_id: SagaId, partner_id: PartnerId) {
        self.record(
            LogEntry::new(saga_id, partner_id, LogLevel::Info, LogEventKind::SagaStarted)
                .service(ORCHESTRATOR),
            true,
        );
    }

    /// Records that every step completed and the saga is done.
    pub fn saga_completed(&self, saga_id: SagaId, partner_id: PartnerId) {
        self.record(
            LogEntry::new(saga_id, partner_id, LogLevel::Info, LogEventKind::SagaCompleted)
                .service(ORCHESTRATOR),
            true,
        );
    }

    /// Records that a saga failed.
    pub fn saga_failed(&self, saga_id: SagaId, partner_id: PartnerId, error: impl Into<String>) {
        self.record(
            LogEntry::new(saga_id, partner_id, LogLevel::Error, LogEventKind::SagaFailed)
                .service(ORCHESTRATOR)
                .result(StepResult::Failed)
                .error(error),
            true,
        );
    }

    /// Records that a saga finished compensating.
    pub fn saga_compensated(&self, saga_id: SagaId, partner_id: PartnerId) {
        self.record(
            LogEntry::new(
                saga_id,
                partner_id,
                LogLevel::Warn,
                LogEventKind::SagaCompensated,
            )
            .service(ORCHESTRATOR)
            .result(StepResult::Compensated),
            true,
        );
    }

    // Step execution.

    /// Records that a step was requested, starting its duration clock.
    pub fn step_started(&self, saga_id: SagaId, partner_id: PartnerId, step: OnboardingStep) {
        self.record(
            LogEntry::new(saga_id, partner_id, LogLevel::Info, LogEventKind::StepStarted).step(step),
            true,
        );
    }

    /// Records a successful step, with duration if its start was recorded.
    pub fn step_completed(&self, saga_id: SagaId, partner_id: PartnerId, step: OnboardingStep) {
        self.record(
            LogEntry::new(
                saga_id,
                partner_id,
                LogLevel::Info,
                LogEventKind::StepCompleted,
            )
            .step(step),
            true,
        );
    }

    /// Records a failed step, with duration if its start was recorded.
    pub fn step_failed(
        &self,
        saga_id: SagaId,
        partner_id: PartnerId,
        step: OnboardingStep,
        error: impl Into<String>,
    ) {
        self.record(
            LogEntry::new(saga_id, partner_id, LogLevel::Error, LogEventKind::StepFailed)
                .step(step)
                .result(StepResult::Failed)
                .error(error),
            true,
        );
    }

    /// Records that one completed step was undone.
    pub fn step_compensated(&self, saga_id: SagaId, partner_id: PartnerId, step: OnboardingStep) {
        self.record(
            LogEntry::new(
                saga_id,
                partner_id,
                LogLevel::Warn,
                LogEventKind::StepCompensated,
            )
            .step(step)
            .result(StepResult::Compensated),
            true,
        );
    }

    // Event-bus activity.

    /// Records that an event was published on the bus.
    pub fn event_published(
        &self,
        saga_id: SagaId,
        partner_id: PartnerId,
        step: Option<OnboardingStep>,
    ) {
        self.record(
            LogEntry::new(
                saga_id,
                partner_id,
                LogLevel::Debug,
                LogEventKind::EventPublished,
            )
            .maybe_step(step)
            .service(EVENT_BUS),
            true,
        );
    }

    /// Records that a handler received an event.
    pub fn event_received(
        &self,
        saga_id: SagaId,
        partner_id: PartnerId,
        step: Option<OnboardingStep>,
        handler: &str,
    ) {
        self.record(
            LogEntry::new(
                saga_id,
                partner_id,
                LogLevel::Debug,
                LogEventKind::EventReceived,
            )
            .maybe_step(step)
            .service(handler),
            true,
        );
    }

    /// Records that a handler finished processing an event.
    pub fn event_processed(
        &self,
        saga_id: SagaId,
        partner_id: PartnerId,
        step: Option<OnboardingStep>,
        handler: &str,
    ) {
        self.record(
            LogEntry::new(
                saga_id,
                partner_id,
                LogLevel::Debug,
                LogEventKind::EventProcessed,
            )
            .maybe_step(step)
            .service(handler),
            true,
        );
    }

    /// Records that a handler returned an error for an event.
    pub fn event_failed(
        &self,
        saga_id: SagaId,
        partner_id: PartnerId,
        step: Option<OnboardingStep>,
        handler: &str,
        error: impl Into<String>,
    ) {
        self.record(
            LogEntry::new(saga_id, partner_id, LogLevel::Error, LogEventKind::EventFailed)
                .maybe_step(step)
                .service(handler)
                .result(StepResult::Failed)
                .error(error),
            true,
        );
    }

    // Compensation progress.

    /// Records that a compensation run began.
    pub fn compensation_started(&self, saga_id: SagaId, partner_id: PartnerId) {
        self.record(
            LogEntry::new(
                saga_id,
                partner_id,
                LogLevel::Warn,
                LogEventKind::CompensationStarted,
            )
            .service(ORCHESTRATOR),
            true,
        );
    }

    /// Records that every requested compensation was acknowledged.
    pub fn compensation_completed(&self, saga_id: SagaId, partner_id: PartnerId) {
        self.record(
            LogEntry::new(
                saga_id,
                partner_id,
                LogLevel::Warn,
                LogEventKind::CompensationCompleted,
            )
            .service(ORCHESTRATOR)
            .result(StepResult::Compensated),
            true,
        );
    }

    /// Records that one step's compensation failed.
    pub fn compensation_failed(
        &self,
        saga_id: SagaId,
        partner_id: PartnerId,
        step: OnboardingStep,
        error: impl Into<String>,
    ) {
        self.record(
            LogEntry::new(
                saga_id,
                partner_id,
                LogLevel::Error,
                LogEventKind::CompensationFailed,
            )
            .step(step)
            .result(StepResult::Failed)
            .error(error),
            true,
        );
    }

    /// Replays previously persisted entries into memory and consumers.
    ///
    /// Restored entries keep their original ids, timestamps and durations
    /// and are not re-written to the sink.
    pub fn restore(&self, entries: Vec<LogEntry>) {
        for entry in entries {
            self.record(entry, false);
        }
    }

    // Queries.

    /// Number of entries currently held in memory.
    pub fn len(&self) -> usize {
        self.state.read().unwrap().entries.len()
    }

    /// Returns true if no entries are held in memory.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let state = self.state.read().unwrap();
        state.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Every in-memory entry for one saga, oldest first.
    pub fn entries_for_saga(&self, saga_id: SagaId) -> Vec<LogEntry> {
        let state = self.state.read().unwrap();
        state
            .entries
            .iter()
            .filter(|entry| entry.saga_id == saga_id)
            .cloned()
            .collect()
    }

    /// Entries matching `filter`, newest first.
    pub fn filtered(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let state = self.state.read().unwrap();
        let matching = state
            .entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .cloned();
        match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Live step counters for one saga.
    pub fn counters(&self, saga_id: SagaId) -> StepCounters {
        self.state
            .read()
            .unwrap()
            .counters
            .get(&saga_id)
            .copied()
            .unwrap_or_default()
    }

    fn record(&self, mut entry: LogEntry, fresh: bool) {
        {
            let mut state = self.state.write().unwrap();
            state.apply(&mut entry);
            while state.entries.len() >= self.capacity {
                state.entries.pop_front();
            }
            state.entries.push_back(entry.clone());
        }

        metrics::counter!("saga_log_entries_total", "kind" => entry.event_kind.as_str())
            .increment(1);

        if fresh && let Some(sink) = &self.sink {
            sink.write(&entry);
        }

        // Fan out with the state lock released so consumers may query the
        // log from `accept`.
        let consumers = self.consumers.read().unwrap().clone();
        for consumer in consumers {
            consumer.accept(&entry);
        }
    }
}

impl Default for SagaLog {
    fn default() -> Self {
        Self::new()
    }
}
