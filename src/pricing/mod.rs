//! Pricing Engine (spec §4.4).
//!
//! Estimates token counts and cost ahead of execution, and classifies the
//! deviation between an estimate and the actual cost reported back after a
//! provider call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::instrument;

use crate::error::Result;
use crate::types::{CostAnomaly, CostAnomalySeverity, CostEstimate, PricingEntry, TokenEstimate};
use crate::upstream::UpstreamStore;

const PRICING_TTL: Duration = Duration::from_secs(300);

/// Default platform margin applied on top of the provider's own cost
/// (spec §4.4). Configurable per [`PricingEngine::with_platform_fee_rate`].
const DEFAULT_PLATFORM_FEE_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2); // 0.05

struct CachedPricing {
    entry: PricingEntry,
    fetched_at: Instant,
}

pub struct PricingEngine {
    store: Arc<dyn UpstreamStore>,
    cache: Mutex<HashMap<(String, String), CachedPricing>>,
    platform_fee_rate: Decimal,
}

impl PricingEngine {
    pub fn new(store: Arc<dyn UpstreamStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            platform_fee_rate: DEFAULT_PLATFORM_FEE_RATE,
        }
    }

    pub fn with_platform_fee_rate(mut self, rate: Decimal) -> Self {
        self.platform_fee_rate = rate;
        self
    }

    #[instrument(skip(self))]
    pub async fn get_provider_pricing(&self, provider: &str, model: &str) -> Result<PricingEntry> {
        let key = (provider.to_string(), model.to_string());
        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            if cached.fetched_at.elapsed() < PRICING_TTL {
                return Ok(cached.entry.clone());
            }
        }

        let entry = self.store.fetch_pricing(provider, model).await?;
        self.cache.lock().unwrap().insert(
            key,
            CachedPricing {
                entry: entry.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(entry)
    }

    /// Character-count heuristic used when no tokenizer is wired in
    /// (spec §4.4): `ceil(chars / 4) * 1.1` input tokens, confidence 0.8,
    /// method `"char_count"`, expected output defaulting to half the input.
    /// Mirrors `pricing_engine.py::estimate_tokens`.
    pub fn estimate_tokens(&self, prompt: &str, expected_output_tokens: Option<u64>) -> TokenEstimate {
        let chars = prompt.chars().count() as f64;
        let raw = (chars / 4.0).ceil() * 1.1;
        let input_tokens = raw.ceil() as u64;
        let expected_output_tokens = expected_output_tokens.unwrap_or_else(|| (input_tokens as f64 * 0.5).floor() as u64);

        TokenEstimate {
            input_tokens,
            expected_output_tokens,
            total_tokens: input_tokens + expected_output_tokens,
            confidence: 0.8,
            method: "char_count".to_string(),
        }
    }

    #[instrument(skip(self, prompt))]
    pub async fn estimate_cost(
        &self,
        provider: &str,
        model: &str,
        prompt: &str,
        expected_output_tokens: Option<u64>,
    ) -> Result<CostEstimate> {
        let pricing = self.get_provider_pricing(provider, model).await?;
        let tokens = self.estimate_tokens(prompt, expected_output_tokens);
        let base_cost = pricing.calculate_cost(tokens.input_tokens, tokens.expected_output_tokens);
        let platform_fee = base_cost * self.platform_fee_rate;

        Ok(CostEstimate {
            base_cost,
            platform_fee,
            total_cost: base_cost + platform_fee,
            tokens,
        })
    }

    /// Same as [`Self::estimate_cost`], but for the common case where the
    /// caller already supplied `estimated_tokens` directly on the request
    /// (spec §3 data model) rather than raw prompt text. `expected_output_tokens`
    /// defaults to half of `input_tokens` when absent, per spec §4.4.
    #[instrument(skip(self))]
    pub async fn estimate_cost_for_tokens(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        expected_output_tokens: Option<u64>,
    ) -> Result<CostEstimate> {
        let pricing = self.get_provider_pricing(provider, model).await?;
        let expected_output_tokens = expected_output_tokens.unwrap_or_else(|| (input_tokens as f64 * 0.5).floor() as u64);
        let tokens = TokenEstimate {
            input_tokens,
            expected_output_tokens,
            total_tokens: input_tokens + expected_output_tokens,
            confidence: 1.0,
            method: "caller_supplied".to_string(),
        };
        let base_cost = pricing.calculate_cost(tokens.input_tokens, tokens.expected_output_tokens);
        let platform_fee = base_cost * self.platform_fee_rate;

        Ok(CostEstimate {
            base_cost,
            platform_fee,
            total_cost: base_cost + platform_fee,
            tokens,
        })
    }

    /// Cost of an already-completed call, given the actual token counts
    /// (spec §4.6, used when logging settlement variance).
    pub async fn calculate_total_cost(&self, provider: &str, model: &str, input_tokens: u64, output_tokens: u64) -> Result<Decimal> {
        let pricing = self.get_provider_pricing(provider, model).await?;
        let base_cost = pricing.calculate_cost(input_tokens, output_tokens);
        Ok(base_cost + base_cost * self.platform_fee_rate)
    }

    /// Classifies how far `actual` diverged from `estimated`
    /// (spec §4.4): <20% none, <50% low, <100% medium, <200% high, else
    /// critical. Mirrors `pricing_engine.py::detect_cost_anomaly`.
    pub fn detect_cost_anomaly(&self, estimated: Decimal, actual: Decimal) -> CostAnomaly {
        let deviation_percent = if estimated > Decimal::ZERO {
            (((actual - estimated).abs() / estimated) * Decimal::from(100))
                .to_f64()
                .unwrap_or(0.0)
        } else if actual > Decimal::ZERO {
            100.0
        } else {
            0.0
        };

        let severity = if deviation_percent < 20.0 {
            CostAnomalySeverity::None
        } else if deviation_percent < 50.0 {
            CostAnomalySeverity::Low
        } else if deviation_percent < 100.0 {
            CostAnomalySeverity::Medium
        } else if deviation_percent < 200.0 {
            CostAnomalySeverity::High
        } else {
            CostAnomalySeverity::Critical
        };

        CostAnomaly {
            estimated,
            actual,
            deviation_percent,
            severity,
            is_significant: !matches!(severity, CostAnomalySeverity::None),
        }
    }

    /// Compares the per-token price of a model across the providers
    /// named in `providers`, skipping any that fail to resolve.
    pub async fn compare_provider_costs(
        &self,
        providers: &[&str],
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Vec<(String, Decimal)> {
        let mut comparison = Vec::new();
        for provider in providers {
            if let Ok(pricing) = self.get_provider_pricing(provider, model).await {
                comparison.push((provider.to_string(), pricing.calculate_cost(input_tokens, output_tokens)));
            }
        }
        comparison.sort_by(|a, b| a.1.cmp(&b.1));
        comparison
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }
}
