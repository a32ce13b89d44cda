use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::types::DecisionRequest;

/// Outcome of actually calling the upstream LLM provider, once a request
/// has cleared the pipeline and payment has been reserved (spec §4.1 step
/// "execution", §6).
#[derive(Debug, Clone)]
pub struct ProviderCallOutcome {
    pub actual_cost: Decimal,
    pub output_tokens: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Pluggable interface onto the upstream provider APIs (OpenAI, Anthropic,
/// etc). This crate never calls a provider directly; it only decides
/// whether a call should happen and pays for it.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn execute(&self, request: &DecisionRequest) -> Result<ProviderCallOutcome>;
}
