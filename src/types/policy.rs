use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Severity ladder for policy violations (spec §4.2). Ordered so that
/// `max()` picks the highest-severity violation for rejection reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PolicySeverity {
    pub fn rejection_hint(&self) -> &'static str {
        match self {
            PolicySeverity::Critical => "SYSTEM_DENY",
            PolicySeverity::High => "PER_REQUEST_LIMIT_EXCEEDED",
            PolicySeverity::Medium => "OUTSIDE_ALLOWED_HOURS",
            PolicySeverity::Low => "POLICY_VIOLATION",
        }
    }
}

/// System-wide policy layer, applied before any user policy. Absence of a
/// system policy for a provider/operation is not a denial by itself; the
/// system layer only ever narrows what a user policy may already permit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SystemPolicy {
    pub forbidden_providers: Vec<String>,
    pub forbidden_operations: Vec<String>,
    pub max_request_cost: Option<rust_decimal::Decimal>,
    pub is_active: bool,
}

impl Default for SystemPolicy {
    fn default() -> Self {
        Self {
            forbidden_providers: Vec::new(),
            forbidden_operations: Vec::new(),
            max_request_cost: None,
            is_active: true,
        }
    }
}

/// Per-user/project policy (spec §3, §4.2). Allow-lists are closed:
/// an empty `allowed_providers` or missing entry in `allowed_models`
/// denies every request for that provider, full stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UserPolicy {
    pub user_id: String,
    pub project_id: String,
    #[serde(default)]
    pub policy_id: String,

    pub allowed_providers: Vec<String>,
    pub allowed_models: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub forbidden_providers: Vec<String>,
    #[serde(default)]
    pub forbidden_operations: Vec<String>,

    pub per_request_limit: rust_decimal::Decimal,
    pub daily_budget: rust_decimal::Decimal,
    pub monthly_budget: rust_decimal::Decimal,

    /// UTC hours (0-23) during which spending is allowed. `None` means no
    /// restriction.
    #[serde(default)]
    pub allowed_hours: Option<Vec<u8>>,
    /// Weekdays during which spending is allowed, `0 = Monday .. 6 = Sunday`
    /// (matches `chrono::Weekday::num_days_from_monday`). `None` means no
    /// restriction.
    #[serde(default)]
    pub allowed_days: Option<Vec<u8>>,

    pub max_risk_score: f64,
    pub auto_approve_risk_threshold: f64,

    #[serde(default)]
    pub is_active: bool,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl UserPolicy {
    pub fn allows_provider(&self, provider: &str) -> bool {
        !self.allowed_providers.is_empty()
            && self.allowed_providers.iter().any(|p| p == provider)
            && !self.forbidden_providers.iter().any(|p| p == provider)
    }

    pub fn allows_model(&self, provider: &str, model: &str) -> bool {
        match self.allowed_models.get(provider) {
            Some(models) if !models.is_empty() => models.iter().any(|m| m == model),
            _ => false,
        }
    }

    pub fn allows_operation(&self, provider: &str, model: &str, operation: &str) -> bool {
        let key = format!("{provider}.{model}.{operation}");
        !self.forbidden_operations.iter().any(|op| op == &key)
    }
}

/// Outcome of evaluating a request against the system and user policy
/// layers. Mirrors `ComplianceResult` in the original system: violations
/// accumulate across checks rather than short-circuiting on the first one,
/// except for allow-list and inactive-policy checks which are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub compliant: bool,
    pub violations: Vec<PolicyViolation>,
    pub warnings: Vec<String>,
}

impl Default for ComplianceResult {
    fn default() -> Self {
        Self {
            compliant: true,
            violations: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub severity: PolicySeverity,
    pub rule: String,
    pub message: String,
}

impl ComplianceResult {
    pub fn add_violation(&mut self, severity: PolicySeverity, rule: impl Into<String>, message: impl Into<String>) {
        self.compliant = false;
        self.violations.push(PolicyViolation {
            severity,
            rule: rule.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// The violation that should drive the rejection reason: highest
    /// severity first, first-seen among ties.
    pub fn primary_violation(&self) -> Option<&PolicyViolation> {
        self.violations.iter().max_by_key(|v| v.severity)
    }
}
