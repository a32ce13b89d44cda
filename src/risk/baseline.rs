//! Baseline Tracker (spec §4.5). Baselines themselves are computed upstream
//! (spec §1 Non-goals); this module only consumes, scores, and compares
//! against them.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::Result;
use crate::types::UserBaseline;
use crate::upstream::UpstreamStore;

/// Quality assessment of a fetched baseline, combining the confidence
/// bucket with a 25-point-per-dimension completeness score. Mirrors
/// `baseline_tracker.py::analyze_baseline_quality`.
#[derive(Debug, Clone)]
pub struct BaselineQuality {
    pub confidence: &'static str,
    pub completeness_score: u8,
    pub has_sufficient_data: bool,
}

/// Outcome of comparing a fresh observation against a baseline (spec §4.5).
/// Uses a deviation ladder distinct from `CostAnomalySeverity`:
/// within 1x average is normal, up to 2x is elevated, up to 3x is high,
/// up to 5x is severe, beyond that is extreme. Mirrors
/// `baseline_tracker.py::compare_to_baseline`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaselineDeviation {
    Normal,
    Elevated,
    High,
    Severe,
    Extreme,
}

impl BaselineDeviation {
    fn from_ratio(ratio: f64) -> Self {
        if ratio <= 1.0 {
            BaselineDeviation::Normal
        } else if ratio <= 2.0 {
            BaselineDeviation::Elevated
        } else if ratio <= 3.0 {
            BaselineDeviation::High
        } else if ratio <= 5.0 {
            BaselineDeviation::Severe
        } else {
            BaselineDeviation::Extreme
        }
    }
}

pub struct BaselineTracker {
    store: Arc<dyn UpstreamStore>,
}

impl BaselineTracker {
    pub fn new(store: Arc<dyn UpstreamStore>) -> Self {
        Self { store }
    }

    pub async fn get_baseline(&self, user_id: &str, project_id: &str) -> Result<Option<UserBaseline>> {
        self.store.fetch_baseline(user_id, project_id).await
    }

    /// 25 points each for: enough total requests, a non-trivial lookback
    /// window, a populated provider set, and a populated hour-of-day set.
    pub fn analyze_baseline_quality(&self, baseline: &UserBaseline) -> BaselineQuality {
        let mut score = 0u8;
        if baseline.has_sufficient_data() {
            score += 25;
        }
        if baseline.lookback_days >= 7 {
            score += 25;
        }
        if !baseline.typical_providers.is_empty() {
            score += 25;
        }
        if !baseline.typical_hours.is_empty() {
            score += 25;
        }

        BaselineQuality {
            confidence: baseline.confidence_level(),
            completeness_score: score,
            has_sufficient_data: baseline.has_sufficient_data(),
        }
    }

    pub fn get_baseline_summary(&self, baseline: &UserBaseline) -> String {
        format!(
            "{} requests over {} days, avg cost {}, {} known providers, confidence={}",
            baseline.total_requests,
            baseline.lookback_days,
            baseline.average_request_cost,
            baseline.typical_providers.len(),
            baseline.confidence_level(),
        )
    }

    /// Ratio of `observed` cost to `baseline.average_request_cost`,
    /// classified via [`BaselineDeviation::from_ratio`]. A zero-average
    /// baseline treats any nonzero spend as `Extreme`.
    pub fn compare_to_baseline(&self, baseline: &UserBaseline, observed_cost: Decimal) -> BaselineDeviation {
        if baseline.average_request_cost.is_zero() {
            return if observed_cost.is_zero() {
                BaselineDeviation::Normal
            } else {
                BaselineDeviation::Extreme
            };
        }

        let ratio = (observed_cost / baseline.average_request_cost)
            .to_string()
            .parse::<f64>()
            .unwrap_or(f64::MAX);
        BaselineDeviation::from_ratio(ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountStatus, BudgetStatus, DailyActivity, PricingEntry, PrincipalContext, SystemPolicy};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    struct FakeStore;
    #[async_trait]
    impl UpstreamStore for FakeStore {
        async fn fetch_system_policy(&self) -> Result<SystemPolicy> {
            unimplemented!()
        }
        async fn fetch_principal_context(&self, _u: &str, _p: &str) -> Result<PrincipalContext> {
            unimplemented!()
        }
        async fn fetch_budget_status(&self, _u: &str, _p: &str) -> Result<BudgetStatus> {
            unimplemented!()
        }
        async fn fetch_pricing(&self, _p: &str, _m: &str) -> Result<PricingEntry> {
            unimplemented!()
        }
        async fn fetch_baseline(&self, _u: &str, _p: &str) -> Result<Option<UserBaseline>> {
            unimplemented!()
        }
    }

    fn baseline() -> UserBaseline {
        UserBaseline {
            user_id: "u".into(),
            project_id: "p".into(),
            average_request_cost: dec!(0.10),
            cost_std_dev: dec!(0.02),
            average_requests_per_day: 40.0,
            typical_providers: HashSet::from(["openai".to_string()]),
            typical_models: HashSet::from(["gpt-4".to_string()]),
            typical_hours: HashSet::from([9, 10, 11]),
            total_requests: 150,
            lookback_days: 30,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn high_volume_baseline_scores_full_completeness() {
        let tracker = BaselineTracker::new(Arc::new(FakeStore));
        let quality = tracker.analyze_baseline_quality(&baseline());
        assert_eq!(quality.confidence, "high");
        assert_eq!(quality.completeness_score, 100);
    }

    #[test]
    fn cost_at_three_times_average_is_high_deviation() {
        let tracker = BaselineTracker::new(Arc::new(FakeStore));
        let deviation = tracker.compare_to_baseline(&baseline(), dec!(0.30));
        assert_eq!(deviation, BaselineDeviation::High);
    }

    #[test]
    fn cost_at_six_times_average_is_extreme() {
        let tracker = BaselineTracker::new(Arc::new(FakeStore));
        let deviation = tracker.compare_to_baseline(&baseline(), dec!(0.60));
        assert_eq!(deviation, BaselineDeviation::Extreme);
    }
}
