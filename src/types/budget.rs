use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time spending snapshot for a user/project, as fetched from the
/// upstream store (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetStatus {
    pub user_id: String,
    pub project_id: String,

    pub total_balance: Decimal,
    pub available_balance: Decimal,

    pub daily_limit: Decimal,
    pub daily_spent: Decimal,
    pub monthly_limit: Decimal,
    pub monthly_spent: Decimal,

    pub daily_limit_reached: bool,
    pub monthly_limit_reached: bool,

    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

impl BudgetStatus {
    /// `(total - available) / total >= 0.8`, verbatim from
    /// `budget_tracker.py::BudgetStatus`. A zero total balance is treated
    /// as not-yet-funded rather than a warning.
    pub fn low_balance_warning(&self) -> bool {
        if self.total_balance.is_zero() {
            return false;
        }
        let used = self.total_balance - self.available_balance;
        (used / self.total_balance) >= Decimal::new(8, 1)
    }

    pub fn daily_remaining(&self) -> Decimal {
        (self.daily_limit - self.daily_spent).max(Decimal::ZERO)
    }

    pub fn monthly_remaining(&self) -> Decimal {
        (self.monthly_limit - self.monthly_spent).max(Decimal::ZERO)
    }
}

/// Result of a single-request budget sufficiency check (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetCheck {
    pub sufficient: bool,
    pub available: Decimal,
    pub required: Decimal,
    pub shortfall: Option<Decimal>,
    pub message: String,
}

impl BudgetCheck {
    pub fn new(available: Decimal, required: Decimal) -> Self {
        let sufficient = available >= required;
        let shortfall = if sufficient { None } else { Some(required - available) };
        let message = if sufficient {
            format!("Sufficient budget: {available} available for {required} required")
        } else {
            format!(
                "Insufficient budget: {required} required but only {available} available (short {})",
                shortfall.unwrap_or(Decimal::ZERO)
            )
        };
        Self {
            sufficient,
            available,
            required,
            shortfall,
            message,
        }
    }

    /// Fail-closed constructor used when the upstream fetch itself failed;
    /// never treat an unknown budget as sufficient.
    pub fn fetch_failed(required: Decimal, reason: impl Into<String>) -> Self {
        Self {
            sufficient: false,
            available: Decimal::ZERO,
            required,
            shortfall: Some(required),
            message: reason.into(),
        }
    }
}
