//! Budget Tracker (spec §4.3).
//!
//! Fetches and caches per-user budget status, and answers whether a given
//! request can be afforded. Failures fetching budget state are treated as
//! insufficient funds — this component never approves on ambiguous data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tracing::{instrument, warn};

use crate::error::Result;
use crate::types::{BudgetCheck, BudgetStatus, PolicySeverity, UserPolicy};
use crate::upstream::UpstreamStore;

const BUDGET_STATUS_TTL: Duration = Duration::from_secs(30);

struct CachedStatus {
    status: BudgetStatus,
    fetched_at: Instant,
}

pub struct BudgetTracker {
    store: Arc<dyn UpstreamStore>,
    cache: Mutex<HashMap<(String, String), CachedStatus>>,
}

impl BudgetTracker {
    pub fn new(store: Arc<dyn UpstreamStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_budget_status(&self, user_id: &str, project_id: &str) -> Result<BudgetStatus> {
        let key = (user_id.to_string(), project_id.to_string());
        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            if cached.fetched_at.elapsed() < BUDGET_STATUS_TTL {
                return Ok(cached.status.clone());
            }
        }

        let status = self.store.fetch_budget_status(user_id, project_id).await?;
        self.cache.lock().unwrap().insert(
            key,
            CachedStatus {
                status: status.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(status)
    }

    /// Fail-closed sufficiency check (spec §4.3, §8 property: ambiguous or
    /// failed fetches never approve). Mirrors
    /// `budget_tracker.py::check_sufficient_budget`.
    #[instrument(skip(self))]
    pub async fn check_sufficient_budget(&self, user_id: &str, project_id: &str, required: Decimal) -> BudgetCheck {
        match self.get_budget_status(user_id, project_id).await {
            Ok(status) => {
                let available = status.available_balance.min(status.daily_remaining()).min(status.monthly_remaining());
                BudgetCheck::new(available, required)
            }
            Err(err) => {
                warn!(error = %err, "budget fetch failed, denying by default");
                BudgetCheck::fetch_failed(required, format!("budget check failed: {err}"))
            }
        }
    }

    /// Projects the user's policy-declared per-request/daily/monthly
    /// limits against the already-fetched spend totals, accumulating every
    /// violated limit rather than stopping at the first — mirrors
    /// `budget_tracker.py::check_against_policy` (spec §8 property 6).
    pub fn check_against_policy(
        &self,
        policy: &UserPolicy,
        status: &BudgetStatus,
        request_cost: Decimal,
    ) -> Vec<(PolicySeverity, String)> {
        let mut violations = Vec::new();

        if request_cost > policy.per_request_limit {
            violations.push((
                PolicySeverity::High,
                format!("request cost {request_cost} exceeds per-request limit {}", policy.per_request_limit),
            ));
        }
        if status.daily_spent + request_cost > policy.daily_budget {
            violations.push((
                PolicySeverity::High,
                format!(
                    "projected daily spend {} exceeds daily budget {}",
                    status.daily_spent + request_cost,
                    policy.daily_budget
                ),
            ));
        }
        if status.monthly_spent + request_cost > policy.monthly_budget {
            violations.push((
                PolicySeverity::High,
                format!(
                    "projected monthly spend {} exceeds monthly budget {}",
                    status.monthly_spent + request_cost,
                    policy.monthly_budget
                ),
            ));
        }

        violations
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AccountStatus, DailyActivity, PricingEntry, PrincipalContext, SystemPolicy, UserBaseline,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    struct FakeStore {
        status: BudgetStatus,
    }

    #[async_trait]
    impl UpstreamStore for FakeStore {
        async fn fetch_system_policy(&self) -> Result<SystemPolicy> {
            unimplemented!()
        }
        async fn fetch_principal_context(&self, _u: &str, _p: &str) -> Result<PrincipalContext> {
            unimplemented!()
        }
        async fn fetch_budget_status(&self, _u: &str, _p: &str) -> Result<BudgetStatus> {
            Ok(self.status.clone())
        }
        async fn fetch_pricing(&self, _p: &str, _m: &str) -> Result<PricingEntry> {
            unimplemented!()
        }
        async fn fetch_baseline(&self, _u: &str, _p: &str) -> Result<Option<UserBaseline>> {
            Ok(None)
        }
    }

    fn status(available: Decimal) -> BudgetStatus {
        BudgetStatus {
            user_id: "u".into(),
            project_id: "p".into(),
            total_balance: dec!(100),
            available_balance: available,
            daily_limit: dec!(50),
            daily_spent: dec!(0),
            monthly_limit: dec!(1000),
            monthly_spent: dec!(0),
            daily_limit_reached: false,
            monthly_limit_reached: false,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sufficient_when_available_covers_required() {
        let store = Arc::new(FakeStore { status: status(dec!(10)) });
        let tracker = BudgetTracker::new(store);
        let check = tracker.check_sufficient_budget("u", "p", dec!(1)).await;
        assert!(check.sufficient);
    }

    #[tokio::test]
    async fn insufficient_when_required_exceeds_available() {
        let store = Arc::new(FakeStore { status: status(dec!(0.5)) });
        let tracker = BudgetTracker::new(store);
        let check = tracker.check_sufficient_budget("u", "p", dec!(1)).await;
        assert!(!check.sufficient);
        assert_eq!(check.shortfall, Some(dec!(0.5)));
    }

    #[tokio::test]
    async fn fetch_failure_denies_by_default() {
        struct FailingStore;
        #[async_trait]
        impl UpstreamStore for FailingStore {
            async fn fetch_system_policy(&self) -> Result<SystemPolicy> {
                unimplemented!()
            }
            async fn fetch_principal_context(&self, _u: &str, _p: &str) -> Result<PrincipalContext> {
                unimplemented!()
            }
            async fn fetch_budget_status(&self, _u: &str, _p: &str) -> Result<BudgetStatus> {
                Err(crate::error::GatewayError::UpstreamError("unreachable".into()))
            }
            async fn fetch_pricing(&self, _p: &str, _m: &str) -> Result<PricingEntry> {
                unimplemented!()
            }
            async fn fetch_baseline(&self, _u: &str, _p: &str) -> Result<Option<UserBaseline>> {
                Ok(None)
            }
        }

        let tracker = BudgetTracker::new(Arc::new(FailingStore));
        let check = tracker.check_sufficient_budget("u", "p", dec!(0.01)).await;
        assert!(!check.sufficient);
    }
}
