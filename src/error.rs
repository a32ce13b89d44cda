//! Closed error taxonomy for the decision pipeline.
//!
//! Every error a caller can observe from this crate is a variant here.
//! Pipeline stages never return ad-hoc strings; they convert into one of
//! these so the engine can map errors onto a terminal decision
//! deterministically (see `engine::DecisionEngine::process`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("structural validation failed: {0}")]
    StructuralError(String),

    #[error("provider/model not on allow-list: {0}")]
    AllowListViolation(String),

    #[error("policy violation ({severity:?}): {message}")]
    PolicyViolation {
        severity: crate::types::policy::PolicySeverity,
        message: String,
    },

    #[error("insufficient budget: requires {required}, available {available}")]
    BudgetInsufficient {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("risk score {score} exceeds maximum {max}")]
    RiskTooHigh { score: f64, max: f64 },

    #[error("insufficient funds for user {user_id}")]
    InsufficientFundsError { user_id: String },

    #[error("payment error: {0}")]
    PaymentError(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("audit integrity error: {0}")]
    AuditIntegrityError(String),

    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl GatewayError {
    /// Maps this error onto the rejection-type enumeration used in audit
    /// events and API responses (spec §6).
    pub fn rejection_type(&self) -> &'static str {
        match self {
            GatewayError::StructuralError(_) => "STRUCTURAL_ERROR",
            GatewayError::AllowListViolation(_) => "UNAUTHORIZED_PROVIDER",
            GatewayError::PolicyViolation { severity, .. } => severity.rejection_hint(),
            GatewayError::BudgetInsufficient { .. } => "INSUFFICIENT_BUDGET",
            GatewayError::RiskTooHigh { .. } => "RISK_TOO_HIGH",
            GatewayError::InsufficientFundsError { .. } => "INSUFFICIENT_BUDGET",
            GatewayError::PaymentError(_) => "SYSTEM_ERROR",
            GatewayError::UpstreamError(_) => "SYSTEM_ERROR",
            GatewayError::AuditIntegrityError(_) => "SYSTEM_ERROR",
            GatewayError::ConfigError(_) => "SYSTEM_ERROR",
            GatewayError::Serialization(_) => "SYSTEM_ERROR",
            GatewayError::Io(_) => "SYSTEM_ERROR",
        }
    }
}
