use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Reserved,
    Committed,
    Failed,
}

/// A single up-front payment of the *estimated* cost, executed as one
/// blockchain transaction (spec §4.6). There is deliberately no second
/// transaction on settlement — see `payment::PaymentExecutor::commit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PaymentReservation {
    #[serde(default = "new_reservation_id")]
    pub reservation_id: String,
    pub request_id: String,
    pub user_id: String,
    pub project_id: String,

    pub estimated_amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,

    #[serde(default = "Utc::now")]
    pub reserved_at: DateTime<Utc>,
}

fn new_reservation_id() -> String {
    format!("resv_{}", Uuid::new_v4().simple())
}

/// Result of logging actual-vs-estimated variance after execution (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PaymentResult {
    #[serde(default = "new_payment_id")]
    pub payment_id: String,
    pub request_id: String,
    pub reservation_id: String,

    pub estimated_amount: Decimal,
    pub actual_amount: Decimal,
    /// `estimated - actual`. Positive means the user's up-front payment
    /// exceeded the true cost; negative means the provider cost more than
    /// was collected. Neither case triggers a second transaction.
    pub variance_amount: Decimal,
    pub variance_percent: f64,
    pub currency: String,

    pub status: PaymentStatus,
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_tx_hash: Option<String>,

    #[serde(default = "Utc::now")]
    pub completed_at: DateTime<Utc>,
}

fn new_payment_id() -> String {
    format!("pay_{}", Uuid::new_v4().simple())
}

impl PaymentResult {
    /// `variance_amount / estimated * 100` when `estimated > 0`, else `0`,
    /// verbatim from `payment_executor.py::commit_payment`.
    pub fn compute_variance(estimated: Decimal, actual: Decimal) -> (Decimal, f64) {
        let variance_amount = estimated - actual;
        let variance_percent = if estimated > Decimal::ZERO {
            (variance_amount / estimated * Decimal::from(100))
                .to_string()
                .parse::<f64>()
                .unwrap_or(0.0)
        } else {
            0.0
        };
        (variance_amount, variance_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn variance_matches_scenario_s5() {
        let (amount, percent) = PaymentResult::compute_variance(dec!(0.002), dec!(0.0025));
        assert_eq!(amount, dec!(-0.0005));
        assert!((percent - (-25.0)).abs() < 1e-9);
    }

    #[test]
    fn zero_estimate_yields_zero_percent() {
        let (_, percent) = PaymentResult::compute_variance(Decimal::ZERO, dec!(1));
        assert_eq!(percent, 0.0);
    }
}
