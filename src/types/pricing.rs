use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-provider/model pricing, as fetched from the upstream store (spec §3).
/// Mirrors `PricingData` in the original system's four pricing modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PricingEntry {
    pub provider: String,
    pub model: String,
    pub mode: PricingMode,

    pub input_cost_per_1k: Decimal,
    pub output_cost_per_1k: Decimal,
    /// Used only by `PricingMode::FlatPerRequest`.
    pub flat_rate: Decimal,
    /// Used only by `PricingMode::Tiered`; sorted ascending by threshold.
    pub tiers: Vec<PricingTier>,

    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    PerToken,
    FlatPerRequest,
    Tiered,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTier {
    pub up_to_tokens: u64,
    pub input_cost_per_1k: Decimal,
    pub output_cost_per_1k: Decimal,
}

impl PricingEntry {
    /// Dispatches on `mode`, mirroring `PricingData.calculate_cost` exactly.
    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> Decimal {
        match self.mode {
            PricingMode::PerToken => {
                self.per_token_cost(input_tokens, output_tokens, &self.input_cost_per_1k, &self.output_cost_per_1k)
            }
            PricingMode::FlatPerRequest => self.flat_rate,
            PricingMode::Tiered => {
                let tier = self
                    .tiers
                    .iter()
                    .find(|t| input_tokens + output_tokens <= t.up_to_tokens)
                    .or_else(|| self.tiers.last());
                match tier {
                    Some(t) => self.per_token_cost(input_tokens, output_tokens, &t.input_cost_per_1k, &t.output_cost_per_1k),
                    None => self.per_token_cost(input_tokens, output_tokens, &self.input_cost_per_1k, &self.output_cost_per_1k),
                }
            }
            PricingMode::Hybrid => {
                self.flat_rate
                    + self.per_token_cost(input_tokens, output_tokens, &self.input_cost_per_1k, &self.output_cost_per_1k)
            }
        }
    }

    fn per_token_cost(&self, input_tokens: u64, output_tokens: u64, input_rate: &Decimal, output_rate: &Decimal) -> Decimal {
        let thousand = Decimal::from(1000);
        (Decimal::from(input_tokens) / thousand) * input_rate
            + (Decimal::from(output_tokens) / thousand) * output_rate
    }
}

/// Token estimate produced ahead of cost estimation (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TokenEstimate {
    pub input_tokens: u64,
    pub expected_output_tokens: u64,
    pub total_tokens: u64,
    pub confidence: f64,
    pub method: String,
}

/// Cost estimate returned to the decision engine before a request executes
/// (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CostEstimate {
    pub base_cost: Decimal,
    pub platform_fee: Decimal,
    pub total_cost: Decimal,
    pub tokens: TokenEstimate,
}

/// Anomaly classification between an estimated and an actual cost
/// (spec §4.4, severity ladder verbatim from `pricing_engine.py`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostAnomalySeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CostAnomaly {
    pub estimated: Decimal,
    pub actual: Decimal,
    pub deviation_percent: f64,
    pub severity: CostAnomalySeverity,
    pub is_significant: bool,
}
