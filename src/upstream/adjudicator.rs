use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{DecisionRequest, PrincipalContext, Tier};

/// The two possible outcomes a tier evaluator can reach (spec §6). Distinct
/// from [`crate::types::DecisionStatus`]: this is what one adjudication
/// model decided, before the decision engine folds it into a terminal
/// [`crate::types::Decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjudicationVerdict {
    Approve,
    Reject,
}

/// What a tier-specific adjudication model decided for one request
/// (spec §4.1 step 8, §6). The adjudicator only answers "should this
/// specific call proceed" — policy, budget, and risk have already run by
/// the time it is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AdjudicationOutcome {
    pub outcome: AdjudicationVerdict,
    pub reasoning: String,
    pub confidence: f64,
    pub agent_id: String,
}

impl AdjudicationOutcome {
    pub fn approved(&self) -> bool {
        matches!(self.outcome, AdjudicationVerdict::Approve)
    }
}

/// Pluggable interface onto the FAST and DEEP adjudication models
/// (spec §4.1, §6). Two wrappers sharing this one trait may differ only in
/// which underlying model they call; the protocol is identical, and the
/// decision engine selects between them purely by [`Tier`].
#[async_trait]
pub trait Adjudicator: Send + Sync {
    async fn evaluate(&self, tier: Tier, request: &DecisionRequest, context: &PrincipalContext) -> Result<AdjudicationOutcome>;
}
