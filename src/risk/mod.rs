//! Risk Detector (spec §4.5).
//!
//! Produces a [`RiskAssessment`] for a request by layering a sequence of
//! independent factor checks on top of a starting score of 1.0, each
//! additive and capped at 10.0 overall. Mirrors `risk_detector.py`'s
//! `assess_risk` pipeline of `_check_*` methods.

pub mod baseline;

pub use baseline::{BaselineDeviation, BaselineQuality, BaselineTracker};

use std::collections::HashMap;

use chrono::{Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;

use crate::types::{DailyActivity, RiskAssessment, RiskCategory, RiskFactor, RiskFactorKind, UserBaseline};

const MAX_SCORE: f64 = 10.0;
const BASE_SCORE: f64 = 1.0;

pub struct RiskDetector;

impl Default for RiskDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskDetector {
    pub fn new() -> Self {
        Self
    }

    /// Runs every factor check in sequence and folds the result into a
    /// single [`RiskAssessment`]. `baseline` is `None` when the upstream
    /// store has no history for this user/project yet.
    #[allow(clippy::too_many_arguments)]
    pub fn assess_risk(
        &self,
        request_id: &str,
        provider: &str,
        model: &str,
        estimated_cost: Decimal,
        activity: &DailyActivity,
        baseline: Option<&UserBaseline>,
        daily_spent: Decimal,
        daily_limit: Decimal,
    ) -> RiskAssessment {
        let mut score = BASE_SCORE;
        let mut factors = Vec::new();
        let mut factor_details: HashMap<String, serde_json::Value> = HashMap::new();

        self.check_cost_spike(baseline, estimated_cost, &mut score, &mut factors, &mut factor_details);
        self.check_high_cost_no_baseline(baseline, estimated_cost, &mut score, &mut factors, &mut factor_details);
        self.check_rate_spike(baseline, activity, &mut score, &mut factors, &mut factor_details);
        self.check_unusual_provider(baseline, provider, &mut score, &mut factors, &mut factor_details);
        self.check_unusual_model(baseline, model, &mut score, &mut factors, &mut factor_details);
        self.check_unusual_time(baseline, &mut score, &mut factors, &mut factor_details);
        self.check_new_agent(activity, &mut score, &mut factors, &mut factor_details);
        self.check_repeated_rejections(activity, &mut score, &mut factors, &mut factor_details);
        self.check_budget_exhaustion(
            daily_spent,
            daily_limit,
            activity.requests_today,
            &mut score,
            &mut factors,
            &mut factor_details,
        );

        let score = score.min(MAX_SCORE);
        let confidence = baseline.map(confidence_for_baseline).unwrap_or(0.5);
        let reasoning = if factors.is_empty() {
            "no elevated risk factors detected".to_string()
        } else {
            factors.iter().map(|f: &RiskFactor| f.detail.clone()).collect::<Vec<_>>().join("; ")
        };

        RiskAssessment {
            request_id: request_id.to_string(),
            score,
            category: RiskCategory::from_score(score),
            factors,
            factor_details,
            confidence,
            reasoning,
            assessed_at: Utc::now(),
        }
    }

    fn check_cost_spike(
        &self,
        baseline: Option<&UserBaseline>,
        estimated_cost: Decimal,
        score: &mut f64,
        factors: &mut Vec<RiskFactor>,
        details: &mut HashMap<String, serde_json::Value>,
    ) {
        let Some(baseline) = baseline else { return };
        if baseline.average_request_cost.is_zero() {
            return;
        }
        let deviation = ((estimated_cost - baseline.average_request_cost) / baseline.average_request_cost)
            .to_f64()
            .unwrap_or(0.0);
        if deviation > 3.0 {
            let contribution = deviation.min(3.0);
            *score += contribution;
            factors.push(RiskFactor {
                kind: RiskFactorKind::CostSpike,
                contribution,
                detail: format!("estimated cost {estimated_cost} is {deviation:.1}x the baseline mean {}", baseline.average_request_cost),
            });
            details.insert("cost_spike".into(), json!({"estimated": estimated_cost.to_string(), "deviation": deviation}));
        } else if deviation > 2.0 {
            let contribution = 1.5;
            *score += contribution;
            factors.push(RiskFactor {
                kind: RiskFactorKind::CostSpike,
                contribution,
                detail: format!("estimated cost {estimated_cost} is {deviation:.1}x the baseline mean {}", baseline.average_request_cost),
            });
            details.insert("cost_spike".into(), json!({"estimated": estimated_cost.to_string(), "deviation": deviation}));
        }
    }

    fn check_high_cost_no_baseline(
        &self,
        baseline: Option<&UserBaseline>,
        estimated_cost: Decimal,
        score: &mut f64,
        factors: &mut Vec<RiskFactor>,
        details: &mut HashMap<String, serde_json::Value>,
    ) {
        let insufficient = baseline.map(|b| !b.has_sufficient_data()).unwrap_or(true);
        if insufficient && estimated_cost > Decimal::from(10) {
            let contribution = 2.0;
            *score += contribution;
            factors.push(RiskFactor {
                kind: RiskFactorKind::HighCostNoBaseline,
                contribution,
                detail: format!("cost {estimated_cost} is high for a user/project with no established baseline"),
            });
            details.insert("high_cost_no_baseline".into(), json!({"estimated": estimated_cost.to_string()}));
        }
    }

    fn check_rate_spike(
        &self,
        baseline: Option<&UserBaseline>,
        activity: &DailyActivity,
        score: &mut f64,
        factors: &mut Vec<RiskFactor>,
        details: &mut HashMap<String, serde_json::Value>,
    ) {
        let Some(baseline) = baseline else { return };
        if baseline.average_requests_per_day <= 0.0 {
            return;
        }
        if activity.requests_today <= 100 {
            return;
        }
        let ratio = activity.requests_today as f64 / baseline.average_requests_per_day;
        if ratio > 3.0 {
            let contribution = 2.0;
            *score += contribution;
            factors.push(RiskFactor {
                kind: RiskFactorKind::RateSpike,
                contribution,
                detail: format!(
                    "{} requests today is {ratio:.1}x the baseline rate of {:.1}/day",
                    activity.requests_today, baseline.average_requests_per_day
                ),
            });
            details.insert("rate_spike".into(), json!({"ratio": ratio}));
        }
    }

    fn check_unusual_provider(
        &self,
        baseline: Option<&UserBaseline>,
        provider: &str,
        score: &mut f64,
        factors: &mut Vec<RiskFactor>,
        details: &mut HashMap<String, serde_json::Value>,
    ) {
        let Some(baseline) = baseline else { return };
        if baseline.has_sufficient_data() && !baseline.typical_providers.is_empty() && !baseline.typical_providers.contains(provider) {
            let contribution = 1.0;
            *score += contribution;
            factors.push(RiskFactor {
                kind: RiskFactorKind::UnusualProvider,
                contribution,
                detail: format!("provider '{provider}' is not among this user's typical providers"),
            });
            details.insert("unusual_provider".into(), json!({"provider": provider}));
        }
    }

    fn check_unusual_model(
        &self,
        baseline: Option<&UserBaseline>,
        model: &str,
        score: &mut f64,
        factors: &mut Vec<RiskFactor>,
        details: &mut HashMap<String, serde_json::Value>,
    ) {
        let Some(baseline) = baseline else { return };
        if baseline.has_sufficient_data() && !baseline.typical_models.is_empty() && !baseline.typical_models.contains(model) {
            let contribution = 0.5;
            *score += contribution;
            factors.push(RiskFactor {
                kind: RiskFactorKind::UnusualModel,
                contribution,
                detail: format!("model '{model}' is not among this user's typical models"),
            });
            details.insert("unusual_model".into(), json!({"model": model}));
        }
    }

    fn check_unusual_time(
        &self,
        baseline: Option<&UserBaseline>,
        score: &mut f64,
        factors: &mut Vec<RiskFactor>,
        details: &mut HashMap<String, serde_json::Value>,
    ) {
        let Some(baseline) = baseline else { return };
        if !baseline.has_sufficient_data() || baseline.typical_hours.is_empty() {
            return;
        }
        let hour = Utc::now().hour() as u8;
        if !baseline.typical_hours.contains(&hour) {
            let contribution = 0.5;
            *score += contribution;
            factors.push(RiskFactor {
                kind: RiskFactorKind::UnusualTime,
                contribution,
                detail: format!("hour {hour} UTC is outside this user's typical activity hours"),
            });
            details.insert("unusual_time".into(), json!({"hour": hour}));
        }
    }

    fn check_new_agent(
        &self,
        activity: &DailyActivity,
        score: &mut f64,
        factors: &mut Vec<RiskFactor>,
        details: &mut HashMap<String, serde_json::Value>,
    ) {
        if activity.is_new_agent {
            let contribution = 1.5;
            *score += contribution;
            factors.push(RiskFactor {
                kind: RiskFactorKind::NewAgent,
                contribution,
                detail: "acting agent has no prior approved history".to_string(),
            });
            details.insert("new_agent".into(), json!(true));
        }
    }

    fn check_repeated_rejections(
        &self,
        activity: &DailyActivity,
        score: &mut f64,
        factors: &mut Vec<RiskFactor>,
        details: &mut HashMap<String, serde_json::Value>,
    ) {
        let contribution = if activity.recent_rejections >= 5 {
            2.0
        } else if activity.recent_rejections >= 3 {
            1.0
        } else {
            return;
        };
        *score += contribution;
        factors.push(RiskFactor {
            kind: RiskFactorKind::RepeatedRejections,
            contribution,
            detail: format!("{} recent rejections precede this request", activity.recent_rejections),
        });
        details.insert("repeated_rejections".into(), json!(activity.recent_rejections));
    }

    /// Trigger: more than 90% of the daily budget already spent, and more
    /// than 50 requests made today (spec §4.5's `budget_exhaustion`).
    /// Mirrors `risk_detector.py:`'s daily-usage-fraction check rather than
    /// the low-balance/limit-reached flags the overall balance warning
    /// uses elsewhere.
    fn check_budget_exhaustion(
        &self,
        daily_spent: Decimal,
        daily_limit: Decimal,
        requests_today: u64,
        score: &mut f64,
        factors: &mut Vec<RiskFactor>,
        details: &mut HashMap<String, serde_json::Value>,
    ) {
        if daily_limit.is_zero() {
            return;
        }
        let usage_fraction = (daily_spent / daily_limit).to_f64().unwrap_or(0.0);
        if usage_fraction > 0.9 && requests_today > 50 {
            let contribution = 1.5;
            *score += contribution;
            factors.push(RiskFactor {
                kind: RiskFactorKind::BudgetExhaustion,
                contribution,
                detail: format!("{:.0}% of daily budget used across {requests_today} requests today", usage_fraction * 100.0),
            });
            details.insert("budget_exhaustion".into(), json!({"usage_fraction": usage_fraction, "requests_today": requests_today}));
        }
    }
}

fn confidence_for_baseline(baseline: &UserBaseline) -> f64 {
    match baseline.confidence_level() {
        "high" => 0.95,
        "medium" => 0.8,
        "low" => 0.6,
        _ => 0.4,
    }
}
