//! In-process typed publish/subscribe for saga choreography.
//!
//! The bus is the only channel between the orchestrator and the services
//! executing steps; failures travel as events like any other outcome:
//! - [`Event`] carries a correlation/causation chain rooted at the
//!   saga-start event
//! - [`EventBus::subscribe`] registers an [`EventHandler`] for one
//!   [`EventKind`]
//! - [`EventBus::publish`] delivers synchronously, in registration order,
//!   isolating handler errors

pub mod bus;
pub mod error;
pub mod event;

pub use bus::{EventBus, EventHandler};
pub use error::HandlerError;
pub use event::{
    CompensationCompletedData, CompensationRequestedData, Event, EventBody, EventKind, SagaRefData,
    StepCompletedData, StepFailedData, StepRequestedData,
};
