//! Pluggable external interfaces (spec §6). Everything in this module is a
//! trait; concrete implementations (a database, a blockchain client, an
//! HTTP client to the provider APIs) live outside this crate.

pub mod adjudicator;
pub mod payment_ledger;
pub mod provider_gateway;
pub mod store;

pub use adjudicator::{Adjudicator, AdjudicationOutcome, AdjudicationVerdict};
pub use payment_ledger::{PaymentLedger, ReservationOutcome};
pub use provider_gateway::{ProviderCallOutcome, ProviderGateway};
pub use store::UpstreamStore;
