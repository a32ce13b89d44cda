use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::types::PaymentStatus;

/// Outcome of actually placing funds on-chain for a reservation (spec §4.6).
#[derive(Debug, Clone)]
pub struct ReservationOutcome {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// Pluggable interface onto the blockchain/ledger that actually moves
/// money. This crate decides *when* to reserve and what to log on
/// settlement; it never holds keys or signs transactions itself.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Places a single up-front transaction for `amount`. Implementations
    /// return [`crate::error::GatewayError::InsufficientFundsError`] when
    /// the payer's on-chain balance can't cover it (mirrors the original
    /// system's HTTP 402 from the payment facilitator).
    async fn reserve(&self, user_id: &str, project_id: &str, amount: Decimal, currency: &str) -> Result<ReservationOutcome>;

    async fn get_status(&self, reservation_id: &str) -> Result<PaymentStatus>;
}
