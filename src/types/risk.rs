use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Risk category derived from `RiskAssessment::score` (spec §3). Thresholds
/// are verbatim from `risk_detector.py`'s `RiskAssessmentResult.__post_init__`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    VeryLow,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskCategory {
    pub fn from_score(score: f64) -> Self {
        if score <= 2.0 {
            RiskCategory::VeryLow
        } else if score <= 4.0 {
            RiskCategory::Low
        } else if score <= 6.0 {
            RiskCategory::Medium
        } else if score <= 8.0 {
            RiskCategory::High
        } else {
            RiskCategory::Critical
        }
    }
}

/// Individual contributing factor to a risk score (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactorKind {
    CostSpike,
    HighCostNoBaseline,
    RateSpike,
    UnusualProvider,
    UnusualModel,
    UnusualTime,
    NewAgent,
    RepeatedRejections,
    BudgetExhaustion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub kind: RiskFactorKind,
    pub contribution: f64,
    pub detail: String,
}

/// Full risk assessment for a single request (spec §3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskAssessment {
    pub request_id: String,
    pub score: f64,
    pub category: RiskCategory,
    pub factors: Vec<RiskFactor>,
    pub factor_details: HashMap<String, serde_json::Value>,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default = "Utc::now")]
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn is_high_risk(&self) -> bool {
        self.score >= 7.0
    }
}
