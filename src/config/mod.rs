//! Layered runtime configuration (spec §6).
//!
//! Resolved ambiguity (spec §9 open question): the original system carries
//! two overlapping `Config` classes — `agentic/src/config.py` (environment,
//! `BACKEND_API_URL`, `API_TIMEOUT`, per-tier thresholds) and
//! `backend/config/settings.py` (a `pydantic_settings` tree with database,
//! payment-network, and CORS fields belonging to the HTTP layer this crate
//! does not implement). `agentic/src/config.py` is the canonical schema: it
//! is the one the decision pipeline itself reads. The `backend` settings
//! tree is rejected outright — its fields belong to the HTTP transport and
//! persistence layers this crate treats as external collaborators
//! (spec §1).

use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

/// Every environment-variable-backed option named in spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GatewayConfig {
    #[serde(default)]
    pub environment: Environment,

    pub backend_base_url: String,

    #[serde(default = "default_api_timeout_seconds")]
    pub api_timeout_seconds: u64,

    #[serde(default = "default_audit_log_directory")]
    pub audit_log_directory: String,

    #[serde(default = "default_platform_fee_percent")]
    pub platform_fee_percent: Decimal,

    #[serde(default = "default_fast_tier_cost_cap")]
    pub decision_fast_tier_cost_cap: Decimal,

    #[serde(default = "default_fast_tier_risk_cap")]
    pub decision_fast_tier_risk_cap: f64,

    #[serde(default = "default_policy_cache_ttl_seconds")]
    pub policy_cache_ttl_seconds: u64,

    #[serde(default = "default_budget_cache_ttl_seconds")]
    pub budget_cache_ttl_seconds: u64,

    #[serde(default = "default_pricing_cache_ttl_seconds")]
    pub pricing_cache_ttl_seconds: u64,

    /// Opaque credential handed to whichever `Adjudicator` implementation
    /// is wired in; this crate never inspects its contents.
    #[serde(default)]
    pub adjudicator_credentials: Option<String>,
}

fn default_api_timeout_seconds() -> u64 {
    30
}
fn default_audit_log_directory() -> String {
    "./audit_logs".to_string()
}
fn default_platform_fee_percent() -> Decimal {
    Decimal::new(5, 0)
}
fn default_fast_tier_cost_cap() -> Decimal {
    Decimal::ONE
}
fn default_fast_tier_risk_cap() -> f64 {
    5.0
}
fn default_policy_cache_ttl_seconds() -> u64 {
    300
}
fn default_budget_cache_ttl_seconds() -> u64 {
    30
}
fn default_pricing_cache_ttl_seconds() -> u64 {
    300
}

impl GatewayConfig {
    /// `development` defaults to a local backend and a 30s timeout;
    /// `production` raises the timeout to 60s; `test` lowers it to 10s
    /// (spec §6), mirroring `ProductionConfig`/`TestConfig` in
    /// `agentic/src/config.py`.
    pub fn defaults_for(environment: Environment) -> Self {
        let (backend_base_url, api_timeout_seconds) = match environment {
            Environment::Development => ("http://localhost:5000/api".to_string(), 30),
            Environment::Production => ("https://api.gateway.internal/api".to_string(), 60),
            Environment::Test => ("http://localhost:5001/api".to_string(), 10),
        };

        Self {
            environment,
            backend_base_url,
            api_timeout_seconds,
            audit_log_directory: default_audit_log_directory(),
            platform_fee_percent: default_platform_fee_percent(),
            decision_fast_tier_cost_cap: default_fast_tier_cost_cap(),
            decision_fast_tier_risk_cap: default_fast_tier_risk_cap(),
            policy_cache_ttl_seconds: default_policy_cache_ttl_seconds(),
            budget_cache_ttl_seconds: default_budget_cache_ttl_seconds(),
            pricing_cache_ttl_seconds: default_pricing_cache_ttl_seconds(),
            adjudicator_credentials: None,
        }
    }

    /// Loads a `gateway.toml` (if present) overlaid with `GATEWAY_*`
    /// environment variables, matching the teacher's figment idiom.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let config: GatewayConfig = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GATEWAY_"))
            .extract()
            .map_err(ConfigError::Load)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.backend_base_url.is_empty() {
            return Err(ConfigError::Invalid {
                field: "backend_base_url".into(),
                reason: "must not be empty".into(),
            }
            .into());
        }
        if self.platform_fee_percent < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "platform_fee_percent".into(),
                reason: "must not be negative".into(),
            }
            .into());
        }
        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_seconds)
    }

    pub fn platform_fee_rate(&self) -> Decimal {
        self.platform_fee_percent / Decimal::from(100)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::defaults_for(Environment::Development)
    }
}
