use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Behavioral baseline for a user/project, consumed (not computed) by this
/// crate — baseline computation is an upstream responsibility (spec §1
/// Non-goals). Mirrors `UserBaseline` in the original system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UserBaseline {
    pub user_id: String,
    pub project_id: String,

    pub average_request_cost: Decimal,
    pub cost_std_dev: Decimal,

    pub average_requests_per_day: f64,

    pub typical_providers: HashSet<String>,
    pub typical_models: HashSet<String>,
    /// UTC hours of day (0-23) the user is typically active in.
    pub typical_hours: HashSet<u8>,

    pub total_requests: u64,
    pub lookback_days: u32,

    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl UserBaseline {
    /// Quality/confidence classification, mirroring
    /// `BaselineTracker.analyze_baseline_quality`.
    pub fn confidence_level(&self) -> &'static str {
        if self.total_requests >= 100 {
            "high"
        } else if self.total_requests >= 30 {
            "medium"
        } else if self.total_requests >= 10 {
            "low"
        } else {
            "insufficient"
        }
    }

    pub fn has_sufficient_data(&self) -> bool {
        self.total_requests >= 10
    }
}

/// Per-day spend bucket, used to detect rate spikes (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyActivity {
    pub requests_today: u64,
    pub spend_today: Decimal,
    pub rejections_today: u64,
    pub recent_rejections: u64,
    pub is_new_agent: bool,
}

pub type ProviderDistribution = HashMap<String, f64>;
