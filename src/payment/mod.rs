//! Payment Executor (spec §4.6).
//!
//! Reserves funds for the *estimated* cost of a request as a single
//! up-front transaction, then — once the provider call has actually run —
//! logs the variance between estimated and actual cost. There is no second
//! transaction on settlement: `commit` never moves funds again, it only
//! records how far the estimate was from reality. Mirrors
//! `payment_executor.py` exactly in this respect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tracing::{instrument, warn};

use crate::error::{GatewayError, Result};
use crate::types::{PaymentReservation, PaymentResult, PaymentStatus};
use crate::upstream::PaymentLedger;

pub struct PaymentExecutor {
    ledger: Arc<dyn PaymentLedger>,
    reservations: Mutex<HashMap<String, PaymentReservation>>,
}

impl PaymentExecutor {
    pub fn new(ledger: Arc<dyn PaymentLedger>) -> Self {
        Self {
            ledger,
            reservations: Mutex::new(HashMap::new()),
        }
    }

    /// Places the estimated amount on-chain and records the reservation.
    /// Returns [`GatewayError::InsufficientFundsError`] unchanged from the
    /// ledger so the decision engine can surface it as a terminal rejection.
    #[instrument(skip(self))]
    pub async fn reserve_payment(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: &str,
        estimated_amount: Decimal,
        currency: &str,
    ) -> Result<PaymentReservation> {
        let outcome = self.ledger.reserve(user_id, project_id, estimated_amount, currency).await?;

        let reservation = PaymentReservation {
            reservation_id: format!("resv_{}", uuid::Uuid::new_v4().simple()),
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            estimated_amount,
            currency: currency.to_string(),
            status: PaymentStatus::Reserved,
            tx_hash: Some(outcome.tx_hash),
            block_number: outcome.block_number,
            reserved_at: chrono::Utc::now(),
        };

        self.reservations.lock().unwrap().insert(reservation.reservation_id.clone(), reservation.clone());
        Ok(reservation)
    }

    /// Logs actual-vs-estimated variance for a previously reserved
    /// payment. No funds move here — only the up-front reservation ever
    /// touches the ledger (spec §4.6, §8 property 9).
    #[instrument(skip(self))]
    pub fn commit_payment(&self, reservation_id: &str, actual_amount: Decimal, provider: &str) -> Result<PaymentResult> {
        let reservation = self
            .reservations
            .lock()
            .unwrap()
            .get(reservation_id)
            .cloned()
            .ok_or_else(|| GatewayError::PaymentError(format!("no reservation found for {reservation_id}")))?;

        let (variance_amount, variance_percent) = PaymentResult::compute_variance(reservation.estimated_amount, actual_amount);
        if variance_percent.abs() > 50.0 {
            warn!(reservation_id, variance_percent, "large cost variance on settlement");
        }

        let mut reservations = self.reservations.lock().unwrap();
        if let Some(stored) = reservations.get_mut(reservation_id) {
            stored.status = PaymentStatus::Committed;
        }

        Ok(PaymentResult {
            payment_id: format!("pay_{}", uuid::Uuid::new_v4().simple()),
            request_id: reservation.request_id,
            reservation_id: reservation.reservation_id,
            estimated_amount: reservation.estimated_amount,
            actual_amount,
            variance_amount,
            variance_percent,
            currency: reservation.currency,
            status: PaymentStatus::Committed,
            provider: provider.to_string(),
            payment_tx_hash: reservation.tx_hash,
            completed_at: chrono::Utc::now(),
        })
    }

    pub fn get_payment_status(&self, reservation_id: &str) -> Option<PaymentStatus> {
        self.reservations.lock().unwrap().get(reservation_id).map(|r| r.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::ReservationOutcome;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FakeLedger {
        fail: bool,
    }

    #[async_trait]
    impl PaymentLedger for FakeLedger {
        async fn reserve(&self, _user_id: &str, _project_id: &str, _amount: Decimal, _currency: &str) -> Result<ReservationOutcome> {
            if self.fail {
                return Err(GatewayError::InsufficientFundsError { user_id: "u1".into() });
            }
            Ok(ReservationOutcome {
                tx_hash: "0xabc".into(),
                block_number: Some(1),
            })
        }

        async fn get_status(&self, _reservation_id: &str) -> Result<PaymentStatus> {
            Ok(PaymentStatus::Reserved)
        }
    }

    #[tokio::test]
    async fn reserve_then_commit_logs_variance_without_second_transaction() {
        let executor = PaymentExecutor::new(Arc::new(FakeLedger { fail: false }));
        let reservation = executor.reserve_payment("req1", "u1", "p1", dec!(0.002), "USD").await.unwrap();
        assert_eq!(reservation.status, PaymentStatus::Reserved);

        let result = executor.commit_payment(&reservation.reservation_id, dec!(0.0025), "openai").unwrap();
        assert_eq!(result.variance_amount, dec!(-0.0005));
        assert_eq!(result.status, PaymentStatus::Committed);
        assert_eq!(executor.get_payment_status(&reservation.reservation_id), Some(PaymentStatus::Committed));
    }

    #[tokio::test]
    async fn insufficient_funds_surfaces_as_gateway_error() {
        let executor = PaymentExecutor::new(Arc::new(FakeLedger { fail: true }));
        let err = executor.reserve_payment("req1", "u1", "p1", dec!(10), "USD").await.unwrap_err();
        assert!(matches!(err, GatewayError::InsufficientFundsError { .. }));
    }

    #[test]
    fn commit_without_reservation_is_a_payment_error() {
        let executor = PaymentExecutor::new(Arc::new(FakeLedger { fail: false }));
        let err = executor.commit_payment("missing", dec!(1), "openai").unwrap_err();
        assert!(matches!(err, GatewayError::PaymentError(_)));
    }
}
