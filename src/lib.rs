//! An autonomous payment-gated API gateway.
//!
//! Every outbound call to a paid provider is routed through a decision
//! pipeline (structural validation, allow-list enforcement, cost
//! estimation, budget check, policy compliance, risk assessment, tier
//! routing, adjudication) before a cent of payment is reserved or a
//! request reaches the provider. [`engine::DecisionEngine`] implements
//! that pipeline; [`engine::Gateway`] composes it with payment reservation,
//! provider execution, and settlement for the single end-to-end entry
//! point most callers want.
//!
//! Every step along the way is written to a hash-chained audit log
//! ([`audit::AuditLogger`]) so that a tampered or missing entry is
//! detectable after the fact.

pub mod audit;
pub mod budget;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod payment;
pub mod policy;
pub mod pricing;
pub mod risk;
pub mod types;
pub mod upstream;

pub use audit::AuditLogger;
pub use budget::BudgetTracker;
pub use config::{Environment, GatewayConfig};
pub use engine::{DecisionEngine, Gateway};
pub use error::{GatewayError, Result};
pub use payment::PaymentExecutor;
pub use policy::PolicyManager;
pub use pricing::PricingEngine;
pub use risk::{BaselineTracker, RiskDetector};
pub use upstream::{Adjudicator, PaymentLedger, ProviderGateway, UpstreamStore};

pub use types::{
    AccountStatus, AuditEvent, AuditTrail, BudgetCheck, BudgetStatus, ComplianceReport,
    ComplianceResult, CostAnomaly, CostAnomalySeverity, CostEstimate, DailyActivity, Decision,
    DecisionRequest, DecisionStatus, EventResult, EventType, PaymentReservation, PaymentResult,
    PaymentStatus, PolicySeverity, PolicyViolation, PricingEntry, PricingMode, PricingTier,
    PrincipalContext, RejectionType, RiskAssessment, RiskCategory, RiskFactor, RiskFactorKind,
    SystemPolicy, Tier, TokenEstimate, UserBaseline, UserPolicy,
};
