//! Shared vocabulary for the partner onboarding saga.
//!
//! This crate holds the types every other crate speaks in:
//! - UUID-backed identifier newtypes ([`SagaId`], [`PartnerId`], [`EventId`],
//!   [`CorrelationId`])
//! - The canonical onboarding step order ([`OnboardingStep`])
//! - The saga status graph ([`SagaStatus`])

pub mod ids;
pub mod status;
pub mod step;

pub use ids::{AlertId, CorrelationId, EventId, PartnerId, SagaId};
pub use status::SagaStatus;
pub use step::OnboardingStep;
