//! Partner onboarding payload validation.

use crate::error::{Result, SagaError};

/// Business fields every onboarding payload must carry.
pub const REQUIRED_FIELDS: [&str; 3] = ["legal_name", "contact_email", "country"];

/// Validates the business payload before a saga is created.
///
/// The payload stays opaque to the orchestrator beyond this check; the
/// executing services interpret the rest.
pub fn validate_payload(payload: &serde_json::Value) -> Result<()> {
    let Some(object) = payload.as_object() else {
        return Err(SagaError::InvalidPayload(
            "payload must be a JSON object".to_string(),
        ));
    };

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| {
            !object
                .get(*field)
                .and_then(|value| value.as_str())
                .is_some_and(|value| !value.trim().is_empty())
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SagaError::InvalidPayload(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}
