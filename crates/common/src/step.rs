//! The canonical onboarding pipeline.

use serde::{Deserialize, Serialize};

use crate::SagaStatus;

/// One step of the partner onboarding pipeline, in execution order.
///
/// The order is fixed: `RegisterPartner` → `CreateContract` →
/// `VerifyDocuments` → `EnableCampaigns` → `SetupRecruitment`. Each step is
/// owned by one service, and compensation walks the completed steps in the
/// reverse of this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    RegisterPartner,
    CreateContract,
    VerifyDocuments,
    EnableCampaigns,
    SetupRecruitment,
}

impl OnboardingStep {
    /// All steps in execution order.
    pub const ALL: [OnboardingStep; 5] = [
        OnboardingStep::RegisterPartner,
        OnboardingStep::CreateContract,
        OnboardingStep::VerifyDocuments,
        OnboardingStep::EnableCampaigns,
        OnboardingStep::SetupRecruitment,
    ];

    /// The first step of every onboarding saga.
    pub fn first() -> Self {
        OnboardingStep::RegisterPartner
    }

    /// Zero-based position of this step in the pipeline.
    pub fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|step| step == self)
            .unwrap_or_default()
    }

    /// The step that follows this one, or `None` for the last step.
    pub fn next(&self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Wire name of the step, matching its serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStep::RegisterPartner => "register_partner",
            OnboardingStep::CreateContract => "create_contract",
            OnboardingStep::VerifyDocuments => "verify_documents",
            OnboardingStep::EnableCampaigns => "enable_campaigns",
            OnboardingStep::SetupRecruitment => "setup_recruitment",
        }
    }

    /// Name of the service responsible for executing this step.
    pub fn service(&self) -> &'static str {
        match self {
            OnboardingStep::RegisterPartner => "partner-service",
            OnboardingStep::CreateContract => "contract-service",
            OnboardingStep::VerifyDocuments => "verification-service",
            OnboardingStep::EnableCampaigns => "campaign-service",
            OnboardingStep::SetupRecruitment => "recruitment-service",
        }
    }

    /// The saga status a saga reaches once this step has completed.
    pub fn completed_status(&self) -> SagaStatus {
        match self {
            OnboardingStep::RegisterPartner => SagaStatus::PartnerRegistered,
            OnboardingStep::CreateContract => SagaStatus::ContractCreated,
            OnboardingStep::VerifyDocuments => SagaStatus::DocumentsVerified,
            OnboardingStep::EnableCampaigns => SagaStatus::CampaignsEnabled,
            OnboardingStep::SetupRecruitment => SagaStatus::RecruitmentSetup,
        }
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OnboardingStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|step| step.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown onboarding step: {s}"))
    }
}
