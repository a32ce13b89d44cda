use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Adjudication tier selected for a request (spec §3, §4.1). FAST handles
/// low-cost, low-risk requests with a cheap/fast model; DEEP routes
/// everything else to a more careful (and presumably more expensive)
/// adjudicator. SYSTEM marks a decision that never reached tier routing at
/// all — rejected or errored by the engine itself (steps 1-6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Fast,
    Deep,
    System,
}

impl Tier {
    /// `cost < 1.0 AND risk_score < 5.0` routes to FAST; anything else to
    /// DEEP. Verbatim from `decision_engine.py::_route_and_decide`, with
    /// USDC and USD assumed 1:1 (spec §9 open question).
    pub fn route(estimated_cost: Decimal, risk_score: f64) -> Self {
        if estimated_cost < Decimal::ONE && risk_score < 5.0 {
            Tier::Fast
        } else {
            Tier::Deep
        }
    }
}

/// Terminal outcome class for a decision (spec §3). ESCALATED is part of
/// the closed outcome set but is never produced by the pipeline described
/// in §4.1 — it is reserved for adjudicator/engine extensions that route a
/// request to a human reviewer instead of resolving it automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Approved,
    Rejected,
    Escalated,
    Error,
}

/// Closed rejection-type enumeration (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionType {
    NoProvidersConfigured,
    UnauthorizedProvider,
    NoModelsConfigured,
    UnauthorizedModel,
    InsufficientBudget,
    PerRequestLimitExceeded,
    SystemDeny,
    InactivePolicy,
    ForbiddenOperation,
    OutsideAllowedHours,
    OutsideAllowedDays,
    RiskTooHigh,
    StructuralError,
    SystemError,
}

/// Terminal outcome of the decision pipeline for one request (spec §3, §4.1).
/// Immutable after construction: nothing in this crate mutates a `Decision`
/// once returned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Decision {
    #[serde(default = "new_decision_id")]
    pub decision_id: String,
    pub request_id: String,
    pub status: DecisionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_type: Option<RejectionType>,
    /// Free-text reasoning (spec §3's `reasoning`): the adjudicator's
    /// verbatim explanation when present, else the engine's own
    /// human-readable rejection/error message.
    pub reason: String,
    /// How confident the deciding party was in `status`. The engine sets
    /// this to `1.0` for its own deterministic rejections (steps 1-6) and
    /// copies the adjudicator's reported value for tier-routed outcomes.
    pub confidence: f64,

    pub risk_score: f64,
    pub tier: Tier,

    pub estimated_cost: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_cost: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_variance: Option<Decimal>,

    /// Every policy rule name the Policy Manager evaluated, whether or not
    /// it fired (spec §4.3's `policies_checked`).
    #[serde(default)]
    pub policies_checked: Vec<String>,
    /// Human-readable violation messages accumulated across the policy
    /// compliance step (spec §4.1 step 6).
    #[serde(default)]
    pub violations: Vec<String>,
    /// Agent acting on the principal's behalf, echoed from the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default = "new_receipt_id")]
    pub receipt_id: String,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn new_decision_id() -> String {
    format!("dec_{}", Uuid::new_v4().simple())
}

fn new_receipt_id() -> String {
    format!("rcpt_{}", Uuid::new_v4().simple())
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        matches!(self.status, DecisionStatus::Approved)
    }
}
