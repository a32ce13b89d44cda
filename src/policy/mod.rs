//! Policy Manager (spec §4.2).
//!
//! Layers a global system policy under each user/project policy and
//! produces a [`ComplianceResult`] that accumulates violations rather than
//! stopping at the first one — except for allow-list and inactive-policy
//! checks, which are terminal because nothing downstream of them is
//! meaningful to evaluate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{Datelike, Timelike, Utc};
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::types::{ComplianceResult, PolicySeverity, SystemPolicy, UserPolicy};
use crate::upstream::UpstreamStore;

/// How long a fetched system policy may be reused before being refetched.
/// User policies have no TTL: they are cached until explicitly purged via
/// [`PolicyManager::clear_cache`], since they change far less often and a
/// stale user policy is a correctness problem, not just a staleness one.
const SYSTEM_POLICY_TTL: Duration = Duration::from_secs(300);

struct CachedSystemPolicy {
    policy: SystemPolicy,
    fetched_at: Instant,
}

#[derive(Default)]
struct Cache {
    system: Option<CachedSystemPolicy>,
    user: HashMap<(String, String), UserPolicy>,
}

pub struct PolicyManager {
    store: Arc<dyn UpstreamStore>,
    cache: Mutex<Cache>,
}

impl PolicyManager {
    pub fn new(store: Arc<dyn UpstreamStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Public alias matching the spec's `load_system()` contract; used by
    /// the decision engine ahead of the full compliance check.
    pub async fn load_system(&self) -> Result<SystemPolicy> {
        self.load_system_policy().await
    }

    /// Public alias matching the spec's `load_user(principal, project)`
    /// contract; used by the decision engine for the step-3 allow-list
    /// check, ahead of the full compliance check in step 6.
    pub async fn load_user(&self, user_id: &str, project_id: &str) -> Result<UserPolicy> {
        self.load_user_policy(user_id, project_id).await
    }

    #[instrument(skip(self))]
    async fn load_system_policy(&self) -> Result<SystemPolicy> {
        if let Some(cached) = self.cache.lock().unwrap().system.as_ref() {
            if cached.fetched_at.elapsed() < SYSTEM_POLICY_TTL {
                return Ok(cached.policy.clone());
            }
        }

        let policy = self.store.fetch_system_policy().await?;
        self.cache.lock().unwrap().system = Some(CachedSystemPolicy {
            policy: policy.clone(),
            fetched_at: Instant::now(),
        });
        Ok(policy)
    }

    #[instrument(skip(self))]
    async fn load_user_policy(&self, user_id: &str, project_id: &str) -> Result<UserPolicy> {
        let key = (user_id.to_string(), project_id.to_string());
        if let Some(policy) = self.cache.lock().unwrap().user.get(&key) {
            return Ok(policy.clone());
        }

        let context = self.store.fetch_principal_context(user_id, project_id).await?;
        self.cache.lock().unwrap().user.insert(key, context.policy.clone());
        Ok(context.policy)
    }

    /// Evaluate a request against the system and user policy layers
    /// (spec §4.2). Mirrors `policy_manager.py::check_compliance`'s
    /// sequencing: provider allow-list, then model allow-list, then
    /// per-request limit, then active flag, then forbidden operations,
    /// then time-of-day/day-of-week restrictions.
    ///
    /// Allow-list checks are closed by construction (`UserPolicy::allows_provider`
    /// / `allows_model` already deny on an empty list) and terminal: there
    /// is nothing further worth evaluating once the provider or model
    /// itself is not permitted.
    #[instrument(skip(self, request_cost))]
    pub async fn check_compliance(
        &self,
        user_id: &str,
        project_id: &str,
        provider: &str,
        model: &str,
        operation: &str,
        request_cost: rust_decimal::Decimal,
    ) -> Result<ComplianceResult> {
        let system = self.load_system_policy().await?;
        let user = self.load_user_policy(user_id, project_id).await?;

        let mut result = ComplianceResult::default();

        if !system.is_active {
            result.add_violation(PolicySeverity::Critical, "system_policy", "system policy is inactive");
            return Ok(result);
        }
        if system.forbidden_providers.iter().any(|p| p == provider) {
            result.add_violation(
                PolicySeverity::Critical,
                "system_forbidden_provider",
                format!("provider '{provider}' is forbidden at the system level"),
            );
            return Ok(result);
        }
        if let Some(max) = system.max_request_cost {
            if request_cost > max {
                result.add_violation(
                    PolicySeverity::Critical,
                    "system_max_request_cost",
                    format!("request cost {request_cost} exceeds system cap {max}"),
                );
                return Ok(result);
            }
        }

        if !user.is_active {
            result.add_violation(PolicySeverity::Critical, "user_policy_inactive", "user policy is inactive");
            return Ok(result);
        }

        if !user.allows_provider(provider) {
            result.add_violation(
                PolicySeverity::Critical,
                "allowed_providers",
                format!("provider '{provider}' is not on the allow-list"),
            );
            return Ok(result);
        }
        if !user.allows_model(provider, model) {
            result.add_violation(
                PolicySeverity::Critical,
                "allowed_models",
                format!("model '{model}' is not on the allow-list for provider '{provider}'"),
            );
            return Ok(result);
        }

        if request_cost > user.per_request_limit {
            result.add_violation(
                PolicySeverity::High,
                "per_request_limit",
                format!("request cost {request_cost} exceeds per-request limit {}", user.per_request_limit),
            );
        }

        if !user.allows_operation(provider, model, operation) {
            result.add_violation(
                PolicySeverity::High,
                "forbidden_operations",
                format!("operation '{provider}.{model}.{operation}' is forbidden"),
            );
        }

        let now = Utc::now();
        if let Some(hours) = &user.allowed_hours {
            let hour = now.hour() as u8;
            if !hours.contains(&hour) {
                result.add_violation(
                    PolicySeverity::Medium,
                    "allowed_hours",
                    format!("hour {hour} UTC is outside the allowed window {hours:?}"),
                );
            }
        }
        if let Some(days) = &user.allowed_days {
            let weekday = now.weekday().num_days_from_monday() as u8;
            if !days.contains(&weekday) {
                result.add_violation(
                    PolicySeverity::Medium,
                    "allowed_days",
                    format!("weekday {weekday} is outside the allowed days {days:?}"),
                );
            }
        }

        debug!(compliant = result.compliant, violations = result.violations.len(), "policy evaluation complete");
        Ok(result)
    }

    pub fn get_allowed_providers(&self, user_id: &str, project_id: &str) -> Vec<String> {
        self.cache
            .lock()
            .unwrap()
            .user
            .get(&(user_id.to_string(), project_id.to_string()))
            .map(|p| p.allowed_providers.clone())
            .unwrap_or_default()
    }

    /// Purge all cached system and user policy. Intended for test setup
    /// and for reacting to an out-of-band "policy changed" signal.
    pub fn clear_cache(&self) {
        warn!("clearing policy cache");
        let mut cache = self.cache.lock().unwrap();
        cache.system = None;
        cache.user.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountStatus, BudgetStatus, DailyActivity, PricingEntry, PricingMode, PrincipalContext, UserBaseline};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct FakeStore {
        user_policy: UserPolicy,
    }

    #[async_trait]
    impl UpstreamStore for FakeStore {
        async fn fetch_system_policy(&self) -> Result<SystemPolicy> {
            Ok(SystemPolicy::default())
        }

        async fn fetch_principal_context(&self, user_id: &str, project_id: &str) -> Result<PrincipalContext> {
            Ok(PrincipalContext {
                user_id: user_id.to_string(),
                project_id: project_id.to_string(),
                policy: self.user_policy.clone(),
                activity: DailyActivity {
                    requests_today: 0,
                    spend_today: dec!(0),
                    rejections_today: 0,
                    recent_rejections: 0,
                    is_new_agent: false,
                },
                account_status: AccountStatus::Active,
            })
        }

        async fn fetch_budget_status(&self, _user_id: &str, _project_id: &str) -> Result<BudgetStatus> {
            unimplemented!()
        }

        async fn fetch_pricing(&self, _provider: &str, _model: &str) -> Result<PricingEntry> {
            unimplemented!()
        }

        async fn fetch_baseline(&self, _user_id: &str, _project_id: &str) -> Result<Option<UserBaseline>> {
            Ok(None)
        }
    }

    fn policy_with_providers(providers: Vec<&str>) -> UserPolicy {
        let mut allowed_models = HashMap::new();
        for p in &providers {
            allowed_models.insert(p.to_string(), vec!["gpt-4".to_string()]);
        }
        UserPolicy {
            user_id: "u1".into(),
            project_id: "p1".into(),
            policy_id: "pol1".into(),
            allowed_providers: providers.into_iter().map(String::from).collect(),
            allowed_models,
            forbidden_providers: vec![],
            forbidden_operations: vec![],
            per_request_limit: dec!(10),
            daily_budget: dec!(100),
            monthly_budget: dec!(3000),
            allowed_hours: None,
            allowed_days: None,
            max_risk_score: 7.0,
            auto_approve_risk_threshold: 3.0,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn empty_allow_list_denies_every_provider() {
        let store = Arc::new(FakeStore {
            user_policy: policy_with_providers(vec![]),
        });
        let manager = PolicyManager::new(store);
        let result = manager
            .check_compliance("u1", "p1", "openai", "gpt-4", "chat", dec!(0.01))
            .await
            .unwrap();
        assert!(!result.compliant);
        assert_eq!(result.primary_violation().unwrap().rule, "allowed_providers");
    }

    #[tokio::test]
    async fn allowed_provider_and_model_passes() {
        let store = Arc::new(FakeStore {
            user_policy: policy_with_providers(vec!["openai"]),
        });
        let manager = PolicyManager::new(store);
        let result = manager
            .check_compliance("u1", "p1", "openai", "gpt-4", "chat", dec!(0.01))
            .await
            .unwrap();
        assert!(result.compliant);
    }

    #[tokio::test]
    async fn per_request_limit_violation_does_not_short_circuit_time_checks() {
        let mut policy = policy_with_providers(vec!["openai"]);
        policy.per_request_limit = dec!(0.001);
        policy.allowed_hours = Some(vec![]); // impossible window, always violates
        let store = Arc::new(FakeStore { user_policy: policy });
        let manager = PolicyManager::new(store);
        let result = manager
            .check_compliance("u1", "p1", "openai", "gpt-4", "chat", dec!(1))
            .await
            .unwrap();
        assert!(!result.compliant);
        assert_eq!(result.violations.len(), 2);
    }
}
