use serde::{Deserialize, Serialize};

use super::baseline::DailyActivity;
use super::policy::UserPolicy;

/// Everything the decision engine needs to know about the caller, fetched
/// once per request from the upstream store (spec §3 Principal Context).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PrincipalContext {
    pub user_id: String,
    pub project_id: String,
    pub policy: UserPolicy,
    pub activity: DailyActivity,
    pub account_status: AccountStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
    Frozen,
}

impl PrincipalContext {
    pub fn is_usable(&self) -> bool {
        matches!(self.account_status, AccountStatus::Active)
    }
}
