use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BudgetStatus, PricingEntry, PrincipalContext, SystemPolicy, UserBaseline};

/// Narrow, read-mostly fetch interface onto whatever holds durable state
/// for users, policies, budgets, pricing, and baselines. This crate never
/// implements a concrete store: persistence is an external collaborator
/// (spec §1), reached only through this trait. Implementations are
/// expected to apply their own caching; the crate-level caches in
/// `policy`, `budget`, and `pricing` exist to bound call volume, not to
/// replace a backing store's own cache.
#[async_trait]
pub trait UpstreamStore: Send + Sync {
    async fn fetch_system_policy(&self) -> Result<SystemPolicy>;

    async fn fetch_principal_context(&self, user_id: &str, project_id: &str) -> Result<PrincipalContext>;

    async fn fetch_budget_status(&self, user_id: &str, project_id: &str) -> Result<BudgetStatus>;

    async fn fetch_pricing(&self, provider: &str, model: &str) -> Result<PricingEntry>;

    async fn fetch_baseline(&self, user_id: &str, project_id: &str) -> Result<Option<UserBaseline>>;
}
