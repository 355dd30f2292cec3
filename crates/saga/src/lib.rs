//! Partner onboarding saga, coordinated by choreography.
//!
//! Five onboarding steps run as independent participant services that
//! communicate exclusively through the event bus. The
//! [`SagaOrchestrator`] tracks each saga's status, requests the next
//! step when one completes, and unwinds completed steps in reverse
//! order when one fails.

pub mod error;
pub mod onboarding;
pub mod orchestrator;
pub mod participants;
pub mod state;
pub mod store;

pub use error::{Result, SagaError};
pub use onboarding::{REQUIRED_FIELDS, validate_payload};
pub use orchestrator::SagaOrchestrator;
pub use participants::{InMemoryStepService, register_default_participants};
pub use state::SagaState;
pub use store::{InMemorySagaStateStore, SagaStateStore};
