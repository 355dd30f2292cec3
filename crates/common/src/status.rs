//! Saga status machine.

use serde::{Deserialize, Serialize};

/// The status of a partner onboarding saga in its lifecycle.
///
/// Status transitions:
/// ```text
/// Initiated ──► PartnerRegistered ──► ContractCreated ──► DocumentsVerified
///     │                │                    │                   │
///     │                │                    │                   ▼
///     │                │                    │            CampaignsEnabled
///     │                │                    │                   │
///     │                │                    │                   ▼
///     │                │                    │            RecruitmentSetup ──► Completed
///     │                │                    │                   │
///     └────────────────┴────────────────────┴───────────────────┘
///                      ▼
///                   Failed ──► Compensating ──► Compensated
/// ```
///
/// Any non-terminal status may move to `Failed`. `Completed` and
/// `Compensated` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    /// Saga has been created; no step has completed yet.
    #[default]
    Initiated,

    /// The partner record exists.
    PartnerRegistered,

    /// The partner contract has been created.
    ContractCreated,

    /// The partner's documents passed verification.
    DocumentsVerified,

    /// Marketing campaigns are enabled for the partner.
    CampaignsEnabled,

    /// Recruitment infrastructure is in place.
    RecruitmentSetup,

    /// Every step completed successfully (terminal).
    Completed,

    /// A step failed; compensation has not started yet.
    Failed,

    /// Compensating transactions are being executed.
    Compensating,

    /// Compensation finished; completed steps have been undone (terminal).
    Compensated,
}

impl SagaStatus {
    /// Forward progress chain, in order. `Failed`, `Compensating` and
    /// `Compensated` sit outside it.
    const FORWARD: [SagaStatus; 7] = [
        SagaStatus::Initiated,
        SagaStatus::PartnerRegistered,
        SagaStatus::ContractCreated,
        SagaStatus::DocumentsVerified,
        SagaStatus::CampaignsEnabled,
        SagaStatus::RecruitmentSetup,
        SagaStatus::Completed,
    ];

    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SagaStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            SagaStatus::Failed => true,
            SagaStatus::Compensating => *self == SagaStatus::Failed,
            SagaStatus::Compensated => *self == SagaStatus::Compensating,
            _ => {
                let position = Self::FORWARD.iter().position(|status| status == self);
                match position {
                    Some(index) => Self::FORWARD.get(index + 1) == Some(&next),
                    // Failed/Compensating never move forward again.
                    None => false,
                }
            }
        }
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Compensated)
    }

    /// Returns the status name as a string, matching its serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Initiated => "initiated",
            SagaStatus::PartnerRegistered => "partner_registered",
            SagaStatus::ContractCreated => "contract_created",
            SagaStatus::DocumentsVerified => "documents_verified",
            SagaStatus::CampaignsEnabled => "campaigns_enabled",
            SagaStatus::RecruitmentSetup => "recruitment_setup",
            SagaStatus::Completed => "completed",
            SagaStatus::Failed => "failed",
            SagaStatus::Compensating => "compensating",
            SagaStatus::Compensated => "compensated",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
