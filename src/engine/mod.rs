//! Decision Engine (spec §4.1): the orchestrator composing every other
//! component into the fixed ten-step pipeline. Grounded on
//! `decision_engine.py::process_request` / `_validate_provider_model` /
//! `_route_and_decide`.
//!
//! `DecisionEngine::process` never returns an error to its caller — every
//! internal failure is folded into a terminal [`Decision`] with
//! `tier = System` and either `status = Rejected` (steps 1, 3, 5, 6) or
//! `status = Error` (an unexpected upstream failure, e.g. step 2's context
//! load). Each step emits at least one audit event before returning.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::audit::AuditLogger;
use crate::budget::BudgetTracker;
use crate::error::{GatewayError, Result};
use crate::pricing::PricingEngine;
use crate::risk::{BaselineTracker, RiskDetector};
use crate::policy::PolicyManager;
use crate::types::{Decision, DecisionRequest, DecisionStatus, RejectionType, Tier};
use crate::upstream::{Adjudicator, UpstreamStore};

/// Names of every policy rule the engine intends to check in step 6,
/// recorded on the decision regardless of which ones actually fired
/// (spec §4.3's "every check appends to `policies_checked`").
const POLICY_RULES_CHECKED: &[&str] = &[
    "system_active",
    "system_forbidden_provider",
    "system_max_request_cost",
    "user_policy_inactive",
    "allowed_providers",
    "allowed_models",
    "per_request_limit",
    "forbidden_operations",
    "allowed_hours",
    "allowed_days",
];

pub struct DecisionEngine {
    store: Arc<dyn UpstreamStore>,
    policy: PolicyManager,
    budget: BudgetTracker,
    pricing: PricingEngine,
    risk: RiskDetector,
    baseline: BaselineTracker,
    adjudicator: Arc<dyn Adjudicator>,
    audit: Arc<AuditLogger>,
}

impl DecisionEngine {
    pub fn new(store: Arc<dyn UpstreamStore>, adjudicator: Arc<dyn Adjudicator>, audit: Arc<AuditLogger>) -> Self {
        Self {
            policy: PolicyManager::new(store.clone()),
            budget: BudgetTracker::new(store.clone()),
            pricing: PricingEngine::new(store.clone()),
            risk: RiskDetector::new(),
            baseline: BaselineTracker::new(store.clone()),
            store,
            adjudicator,
            audit,
        }
    }

    /// Runs the full ten-step pipeline for one request. Always returns a
    /// terminal [`Decision`]; never propagates a [`GatewayError`].
    #[instrument(skip(self, request), fields(request_id = %request.request_id))]
    pub async fn process(&self, request: DecisionRequest) -> Decision {
        match self.process_inner(&request).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(error = %err, "decision engine encountered an unexpected error");
                if let Err(log_err) = self.audit.log_error(
                    &request.request_id,
                    &request.user_id,
                    &request.project_id,
                    &err.to_string(),
                    json!({"exception_type": error_kind(&err)}),
                ) {
                    warn!(error = %log_err, "failed to log error event");
                }
                system_decision(&request, DecisionStatus::Error, Some(RejectionType::SystemError), format!("System error: {err}"), "decision engine encountered an error", 0.0)
            }
        }
    }

    async fn process_inner(&self, request: &DecisionRequest) -> Result<Decision> {
        // Step 1: structural validation.
        if let Err(message) = validate_structure(request) {
            self.audit.log_error(
                &request.request_id,
                &request.user_id,
                &request.project_id,
                &format!("Invalid request: {message}"),
                json!({"validation_error": message}),
            )?;
            return Ok(system_decision(
                request,
                DecisionStatus::Rejected,
                Some(RejectionType::StructuralError),
                format!("Invalid request: {message}"),
                "Request validation failed",
                1.0,
            ));
        }

        // Step 2: context load. Any failure here is a genuine system error,
        // not a rejection — it propagates via `?` to `process`.
        info!("loading principal context and system policy");
        let context = self.store.fetch_principal_context(&request.user_id, &request.project_id).await?;
        let _system_policy = self.policy.load_system().await?;

        // Step 3: allow-list check (critical), replayed in full in step 6.
        if let Some((rejection_type, message)) = check_allow_list(&context.policy, &request.api_provider, &request.model_name) {
            self.audit.log_policy_check(
                &request.request_id,
                &request.user_id,
                &request.project_id,
                &["provider_whitelist".to_string(), "model_whitelist".to_string()],
                json!({"validation": message}),
                false,
            )?;
            return Ok(system_decision(
                request,
                DecisionStatus::Rejected,
                Some(rejection_type),
                message,
                "Provider or model not in user's whitelist",
                1.0,
            ));
        }

        // Step 4: cost estimation.
        let cost_estimate = match request.estimated_tokens {
            Some(tokens) => {
                self.pricing
                    .estimate_cost_for_tokens(&request.api_provider, &request.model_name, tokens, request.expected_output_tokens)
                    .await?
            }
            None => {
                let prompt = request
                    .request_params
                    .get("prompt")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                self.pricing
                    .estimate_cost(&request.api_provider, &request.model_name, prompt, request.expected_output_tokens)
                    .await?
            }
        };
        let estimated_cost = cost_estimate.total_cost;

        // Step 5: budget check.
        let budget_check = self.budget.check_sufficient_budget(&request.user_id, &request.project_id, estimated_cost).await;
        if !budget_check.sufficient {
            self.audit.log_budget_check(
                &request.request_id,
                &request.user_id,
                &request.project_id,
                estimated_cost,
                budget_check.available,
                false,
            )?;
            return Ok(system_decision_with_cost(
                request,
                DecisionStatus::Rejected,
                Some(RejectionType::InsufficientBudget),
                format!("Insufficient budget: {} available, {} required", budget_check.available, estimated_cost),
                "Budget check failed",
                1.0,
                estimated_cost,
            ));
        }
        self.audit.log_budget_check(
            &request.request_id,
            &request.user_id,
            &request.project_id,
            estimated_cost,
            budget_check.available,
            true,
        )?;

        // Step 6: layered policy compliance (system, then user).
        let compliance = self
            .policy
            .check_compliance(
                &request.user_id,
                &request.project_id,
                &request.api_provider,
                &request.model_name,
                &request.operation_type,
                estimated_cost,
            )
            .await?;

        let policies_checked: Vec<String> = POLICY_RULES_CHECKED.iter().map(|s| s.to_string()).collect();
        self.audit.log_policy_check(
            &request.request_id,
            &request.user_id,
            &request.project_id,
            &policies_checked,
            serde_json::to_value(&compliance)?,
            compliance.compliant,
        )?;

        if !compliance.compliant {
            let primary = compliance.primary_violation();
            let rejection_type = primary.map(|v| rejection_type_from_rule(&v.rule)).unwrap_or(RejectionType::SystemDeny);
            let reason = primary.map(|v| v.message.clone()).unwrap_or_else(|| "policy violation".to_string());
            let mut decision = system_decision_with_cost(
                request,
                DecisionStatus::Rejected,
                Some(rejection_type),
                format!("Policy violation: {reason}"),
                "Policy compliance check failed",
                1.0,
                estimated_cost,
            );
            decision.policies_checked = policies_checked;
            decision.violations = compliance.violations.iter().map(|v| v.message.clone()).collect();
            return Ok(decision);
        }

        // Step 7: risk assessment. `check_sufficient_budget` only returns a
        // sufficiency verdict, so the raw status is re-fetched (a cache hit,
        // given step 5 just populated it) for the daily spend/limit the
        // budget-exhaustion factor needs.
        let baseline = self.baseline.get_baseline(&request.user_id, &request.project_id).await?;
        let status = self.budget.get_budget_status(&request.user_id, &request.project_id).await?;
        let risk_assessment = self.risk.assess_risk(
            &request.request_id,
            &request.api_provider,
            &request.model_name,
            estimated_cost,
            &context.activity,
            baseline.as_ref(),
            status.daily_spent,
            status.daily_limit,
        );

        self.audit.log_risk_assessment(
            &request.request_id,
            &request.user_id,
            &request.project_id,
            risk_assessment.score,
            serde_json::to_value(&risk_assessment.factors)?,
            risk_assessment.category.as_str(),
        )?;

        // Step 8: tier routing and adjudication.
        let tier = Tier::route(estimated_cost, risk_assessment.score);
        info!(?tier, %estimated_cost, risk_score = risk_assessment.score, "routing to adjudicator");
        let outcome = self.adjudicator.evaluate(tier, request, &context).await?;

        let status = if outcome.approved() { DecisionStatus::Approved } else { DecisionStatus::Rejected };
        let rejection_type = (!outcome.approved()).then_some(RejectionType::SystemDeny);

        // Step 9: AGENT_DECISION audit event.
        self.audit.log_agent_decision(
            &request.request_id,
            &request.user_id,
            &request.project_id,
            &outcome.agent_id,
            tier.as_str(),
            if outcome.approved() { "approve" } else { "reject" },
            &outcome.reasoning,
            json!({
                "risk_score": risk_assessment.score,
                "estimated_cost": estimated_cost.to_string(),
                "approval_confidence": outcome.confidence,
            }),
        )?;

        let mut decision = Decision {
            decision_id: format!("dec_{}", uuid::Uuid::new_v4().simple()),
            request_id: request.request_id.clone(),
            status,
            rejection_type,
            reason: outcome.reasoning.clone(),
            confidence: outcome.confidence,
            risk_score: risk_assessment.score,
            tier,
            estimated_cost,
            actual_cost: None,
            cost_variance: None,
            policies_checked,
            violations: Vec::new(),
            agent_id: Some(outcome.agent_id.clone()),
            transaction_hash: None,
            receipt_id: format!("rcpt_{}", uuid::Uuid::new_v4().simple()),
            timestamp: chrono::Utc::now(),
        };
        if request.agent_id.is_some() {
            decision.agent_id = request.agent_id.clone();
        }

        // Step 10: return the decision. Payment reservation, provider
        // execution, and settlement happen one layer up (see `Gateway`,
        // spec §4.1 step 10's "happens in the caller").
        Ok(decision)
    }
}

impl Tier {
    fn as_str(&self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Deep => "deep",
            Tier::System => "system",
        }
    }
}

fn validate_structure(request: &DecisionRequest) -> std::result::Result<(), String> {
    if request.request_id.trim().is_empty() {
        return Err("Missing required field: request_id".to_string());
    }
    if request.user_id.trim().is_empty() {
        return Err("Missing required field: user_id".to_string());
    }
    if request.project_id.trim().is_empty() {
        return Err("Missing required field: project_id".to_string());
    }
    if request.api_provider.trim().is_empty() {
        return Err("Missing required field: api_provider".to_string());
    }
    if request.model_name.trim().is_empty() {
        return Err("Missing required field: model_name".to_string());
    }
    if request.operation_type.trim().is_empty() {
        return Err("Missing required field: operation_type".to_string());
    }
    if let Some(tokens) = request.estimated_tokens {
        if tokens > 1_000_000 {
            return Err("Invalid token estimate: exceeds maximum (1M tokens)".to_string());
        }
    }
    Ok(())
}

/// Step 3, verbatim from `decision_engine.py::_validate_provider_model`:
/// four distinct sub-reasons in a fixed order.
fn check_allow_list(policy: &crate::types::UserPolicy, provider: &str, model: &str) -> Option<(RejectionType, String)> {
    if policy.allowed_providers.is_empty() {
        return Some((RejectionType::NoProvidersConfigured, "No providers configured for this project".to_string()));
    }
    if !policy.allowed_providers.iter().any(|p| p == provider) {
        return Some((
            RejectionType::UnauthorizedProvider,
            format!("Provider '{provider}' not in allowed list: {:?}", policy.allowed_providers),
        ));
    }
    let allowed_models = policy.allowed_models.get(provider).cloned().unwrap_or_default();
    if allowed_models.is_empty() {
        return Some((
            RejectionType::NoModelsConfigured,
            format!("No models configured for provider '{provider}'"),
        ));
    }
    if !allowed_models.iter().any(|m| m == model) {
        return Some((
            RejectionType::UnauthorizedModel,
            format!("Model '{model}' not in allowed list for '{provider}': {allowed_models:?}"),
        ));
    }
    None
}

/// Maps a [`crate::types::PolicyViolation::rule`] name onto the closed
/// rejection-type enumeration (spec §6), so the decision carries a precise
/// code even though several rules share one severity tier.
fn rejection_type_from_rule(rule: &str) -> RejectionType {
    match rule {
        "system_policy" | "system_forbidden_provider" | "system_max_request_cost" => RejectionType::SystemDeny,
        "user_policy_inactive" => RejectionType::InactivePolicy,
        "allowed_providers" => RejectionType::UnauthorizedProvider,
        "allowed_models" => RejectionType::UnauthorizedModel,
        "per_request_limit" => RejectionType::PerRequestLimitExceeded,
        "forbidden_operations" => RejectionType::ForbiddenOperation,
        "allowed_hours" => RejectionType::OutsideAllowedHours,
        "allowed_days" => RejectionType::OutsideAllowedDays,
        _ => RejectionType::SystemDeny,
    }
}

fn error_kind(err: &GatewayError) -> &'static str {
    match err {
        GatewayError::StructuralError(_) => "StructuralError",
        GatewayError::AllowListViolation(_) => "AllowListViolation",
        GatewayError::PolicyViolation { .. } => "PolicyViolation",
        GatewayError::BudgetInsufficient { .. } => "BudgetInsufficient",
        GatewayError::RiskTooHigh { .. } => "RiskTooHigh",
        GatewayError::InsufficientFundsError { .. } => "InsufficientFundsError",
        GatewayError::PaymentError(_) => "PaymentError",
        GatewayError::UpstreamError(_) => "UpstreamError",
        GatewayError::AuditIntegrityError(_) => "AuditIntegrityError",
        GatewayError::ConfigError(_) => "ConfigError",
        GatewayError::Serialization(_) => "Serialization",
        GatewayError::Io(_) => "Io",
    }
}

fn system_decision(
    request: &DecisionRequest,
    status: DecisionStatus,
    rejection_type: Option<RejectionType>,
    reason: String,
    reasoning: &str,
    confidence: f64,
) -> Decision {
    system_decision_with_cost(request, status, rejection_type, reason, reasoning, confidence, Decimal::ZERO)
}

fn system_decision_with_cost(
    request: &DecisionRequest,
    status: DecisionStatus,
    rejection_type: Option<RejectionType>,
    reason: String,
    reasoning: &str,
    confidence: f64,
    estimated_cost: Decimal,
) -> Decision {
    Decision {
        decision_id: format!("dec_{}", uuid::Uuid::new_v4().simple()),
        request_id: request.request_id.clone(),
        status,
        rejection_type,
        reason: format!("{reason} ({reasoning})"),
        confidence,
        risk_score: 0.0,
        tier: Tier::System,
        estimated_cost,
        actual_cost: None,
        cost_variance: None,
        policies_checked: Vec::new(),
        violations: Vec::new(),
        agent_id: request.agent_id.clone(),
        transaction_hash: None,
        receipt_id: format!("rcpt_{}", uuid::Uuid::new_v4().simple()),
        timestamp: chrono::Utc::now(),
    }
}

impl crate::types::RiskCategory {
    fn as_str(&self) -> &'static str {
        match self {
            crate::types::RiskCategory::VeryLow => "very_low",
            crate::types::RiskCategory::Low => "low",
            crate::types::RiskCategory::Medium => "medium",
            crate::types::RiskCategory::High => "high",
            crate::types::RiskCategory::Critical => "critical",
        }
    }
}

/// Composes the Decision Engine with payment reservation, upstream
/// provider execution, and settlement — the "surrounding Brain" spec.md
/// §4.1 step 10 describes as living outside the engine proper. This is the
/// top-level entry point a host process calls once per inbound request.
pub struct Gateway {
    engine: DecisionEngine,
    payment: crate::payment::PaymentExecutor,
    provider: Arc<dyn crate::upstream::ProviderGateway>,
    audit: Arc<AuditLogger>,
    currency: String,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn UpstreamStore>,
        adjudicator: Arc<dyn Adjudicator>,
        ledger: Arc<dyn crate::upstream::PaymentLedger>,
        provider: Arc<dyn crate::upstream::ProviderGateway>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            engine: DecisionEngine::new(store, adjudicator, audit.clone()),
            payment: crate::payment::PaymentExecutor::new(ledger),
            provider,
            audit,
            currency: "USDC".to_string(),
        }
    }

    /// Runs the decision pipeline and, if approved, reserves payment,
    /// executes the upstream call, and commits settlement. Every step
    /// still lands on the same request-id audit chain; a rejected or
    /// errored decision short-circuits before payment is ever touched.
    #[instrument(skip(self, request), fields(request_id = %request.request_id))]
    pub async fn handle(&self, request: DecisionRequest) -> Decision {
        self.audit
            .log_request_received(
                &request.request_id,
                &request.user_id,
                &request.project_id,
                request.agent_id.as_deref(),
                json!({
                    "api_provider": request.api_provider,
                    "model_name": request.model_name,
                    "operation_type": request.operation_type,
                }),
            )
            .ok();

        let mut decision = self.engine.process(request.clone()).await;
        if !decision.is_approved() {
            return decision;
        }

        let reservation = match self
            .payment
            .reserve_payment(&request.request_id, &request.user_id, &request.project_id, decision.estimated_cost, &self.currency)
            .await
        {
            Ok(reservation) => reservation,
            Err(err) => {
                self.audit
                    .log_error(&request.request_id, &request.user_id, &request.project_id, &err.to_string(), json!({"exception_type": "PaymentError"}))
                    .ok();
                decision.status = DecisionStatus::Rejected;
                decision.rejection_type = Some(RejectionType::InsufficientBudget);
                decision.reason = format!("Payment reservation failed: {err}");
                return decision;
            }
        };
        self.audit
            .log_payment_reserved(
                &request.request_id,
                &request.user_id,
                &request.project_id,
                reservation.estimated_amount,
                reservation.tx_hash.as_deref().unwrap_or(""),
                &reservation.reservation_id,
            )
            .ok();
        decision.transaction_hash = reservation.tx_hash.clone();

        let outcome = match self.provider.execute(&request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.audit
                    .log_api_call_failed(&request.request_id, &request.user_id, &request.project_id, &request.api_provider, &request.model_name, &err.to_string())
                    .ok();
                decision.actual_cost = Some(Decimal::ZERO);
                return decision;
            }
        };

        if outcome.success {
            self.audit
                .log_api_call_success(
                    &request.request_id,
                    &request.user_id,
                    &request.project_id,
                    &request.api_provider,
                    &request.model_name,
                    outcome.actual_cost,
                    json!({"output_tokens": outcome.output_tokens}),
                )
                .ok();
        } else {
            self.audit
                .log_api_call_failed(
                    &request.request_id,
                    &request.user_id,
                    &request.project_id,
                    &request.api_provider,
                    &request.model_name,
                    outcome.error.as_deref().unwrap_or("unknown provider error"),
                )
                .ok();
        }

        match self.payment.commit_payment(&reservation.reservation_id, outcome.actual_cost, &request.api_provider) {
            Ok(result) => {
                self.audit
                    .log_payment_completed(
                        &request.request_id,
                        &request.user_id,
                        &request.project_id,
                        result.estimated_amount,
                        result.actual_amount,
                        result.variance_amount,
                        result.variance_percent,
                    )
                    .ok();
                decision.actual_cost = Some(result.actual_amount);
                decision.cost_variance = Some(result.variance_amount);
            }
            Err(err) => {
                self.audit
                    .log_error(&request.request_id, &request.user_id, &request.project_id, &err.to_string(), json!({"exception_type": "PaymentError"}))
                    .ok();
            }
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AccountStatus, BudgetStatus, DailyActivity, PricingEntry, PricingMode, PrincipalContext,
        UserBaseline, UserPolicy,
    };
    use crate::upstream::{AdjudicationOutcome, AdjudicationVerdict, PaymentLedger, ProviderCallOutcome, ProviderGateway, ReservationOutcome};
    use crate::types::{PaymentStatus, SystemPolicy};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn open_policy() -> UserPolicy {
        let mut allowed_models = HashMap::new();
        allowed_models.insert("openai".to_string(), vec!["gpt-4".to_string()]);
        UserPolicy {
            user_id: "u1".into(),
            project_id: "p1".into(),
            policy_id: "pol1".into(),
            allowed_providers: vec!["openai".to_string()],
            allowed_models,
            forbidden_providers: vec![],
            forbidden_operations: vec![],
            per_request_limit: dec!(100),
            daily_budget: dec!(1000),
            monthly_budget: dec!(30000),
            allowed_hours: None,
            allowed_days: None,
            max_risk_score: 9.0,
            auto_approve_risk_threshold: 3.0,
            is_active: true,
            updated_at: chrono::Utc::now(),
        }
    }

    struct FakeStore {
        policy: UserPolicy,
        available: Decimal,
    }

    #[async_trait]
    impl UpstreamStore for FakeStore {
        async fn fetch_system_policy(&self) -> Result<SystemPolicy> {
            Ok(SystemPolicy::default())
        }

        async fn fetch_principal_context(&self, user_id: &str, project_id: &str) -> Result<PrincipalContext> {
            Ok(PrincipalContext {
                user_id: user_id.to_string(),
                project_id: project_id.to_string(),
                policy: self.policy.clone(),
                activity: DailyActivity {
                    requests_today: 0,
                    spend_today: Decimal::ZERO,
                    rejections_today: 0,
                    recent_rejections: 0,
                    is_new_agent: false,
                },
                account_status: AccountStatus::Active,
            })
        }

        async fn fetch_budget_status(&self, user_id: &str, project_id: &str) -> Result<BudgetStatus> {
            Ok(BudgetStatus {
                user_id: user_id.to_string(),
                project_id: project_id.to_string(),
                total_balance: dec!(1000),
                available_balance: self.available,
                daily_limit: dec!(1000),
                daily_spent: Decimal::ZERO,
                monthly_limit: dec!(30000),
                monthly_spent: Decimal::ZERO,
                daily_limit_reached: false,
                monthly_limit_reached: false,
                fetched_at: chrono::Utc::now(),
            })
        }

        async fn fetch_pricing(&self, provider: &str, model: &str) -> Result<PricingEntry> {
            Ok(PricingEntry {
                provider: provider.to_string(),
                model: model.to_string(),
                mode: PricingMode::PerToken,
                input_cost_per_1k: dec!(0.01),
                output_cost_per_1k: dec!(0.03),
                flat_rate: Decimal::ZERO,
                tiers: vec![],
                fetched_at: chrono::Utc::now(),
            })
        }

        async fn fetch_baseline(&self, _user_id: &str, _project_id: &str) -> Result<Option<UserBaseline>> {
            Ok(None)
        }
    }

    struct ApprovingAdjudicator;

    #[async_trait]
    impl Adjudicator for ApprovingAdjudicator {
        async fn evaluate(&self, _tier: Tier, _request: &DecisionRequest, _context: &PrincipalContext) -> Result<AdjudicationOutcome> {
            Ok(AdjudicationOutcome {
                outcome: AdjudicationVerdict::Approve,
                reasoning: "looks fine".to_string(),
                confidence: 0.9,
                agent_id: "fast-tier-agent".to_string(),
            })
        }
    }

    struct FakeLedger;

    #[async_trait]
    impl PaymentLedger for FakeLedger {
        async fn reserve(&self, _user_id: &str, _project_id: &str, _amount: Decimal, _currency: &str) -> Result<ReservationOutcome> {
            Ok(ReservationOutcome {
                tx_hash: "0xdeadbeef".to_string(),
                block_number: Some(42),
            })
        }

        async fn get_status(&self, _reservation_id: &str) -> Result<PaymentStatus> {
            Ok(PaymentStatus::Settled)
        }
    }

    struct FakeProvider {
        actual_cost: Decimal,
    }

    #[async_trait]
    impl ProviderGateway for FakeProvider {
        async fn execute(&self, _request: &DecisionRequest) -> Result<ProviderCallOutcome> {
            Ok(ProviderCallOutcome {
                actual_cost: self.actual_cost,
                output_tokens: 120,
                success: true,
                error: None,
            })
        }
    }

    fn request() -> DecisionRequest {
        DecisionRequest {
            request_id: "req-1".to_string(),
            user_id: "u1".to_string(),
            project_id: "p1".to_string(),
            agent_id: None,
            api_provider: "openai".to_string(),
            model_name: "gpt-4".to_string(),
            operation_type: "chat".to_string(),
            request_params: HashMap::new(),
            estimated_tokens: Some(1000),
            expected_output_tokens: Some(200),
            timestamp: chrono::Utc::now(),
            metadata: HashMap::new(),
        }
    }

    fn audit_logger() -> Arc<AuditLogger> {
        // Leaked on purpose: the logger only needs the directory to exist
        // for the lifetime of the test process, and these tests don't
        // inspect the files on disk.
        let dir = tempfile::tempdir().unwrap().into_path();
        Arc::new(AuditLogger::new(dir).unwrap())
    }

    #[tokio::test]
    async fn structural_error_rejects_before_any_upstream_call() {
        let store = Arc::new(FakeStore { policy: open_policy(), available: dec!(1000) });
        let engine = DecisionEngine::new(store, Arc::new(ApprovingAdjudicator), audit_logger());
        let mut bad_request = request();
        bad_request.request_id = String::new();

        let decision = engine.process(bad_request).await;
        assert_eq!(decision.status, DecisionStatus::Rejected);
        assert_eq!(decision.rejection_type, Some(RejectionType::StructuralError));
        assert_eq!(decision.tier, Tier::System);
    }

    #[tokio::test]
    async fn unauthorized_provider_is_rejected_at_the_allow_list_step() {
        let mut policy = open_policy();
        policy.allowed_providers = vec!["anthropic".to_string()];
        let store = Arc::new(FakeStore { policy, available: dec!(1000) });
        let engine = DecisionEngine::new(store, Arc::new(ApprovingAdjudicator), audit_logger());

        let decision = engine.process(request()).await;
        assert_eq!(decision.status, DecisionStatus::Rejected);
        assert_eq!(decision.rejection_type, Some(RejectionType::UnauthorizedProvider));
    }

    #[tokio::test]
    async fn insufficient_budget_is_rejected_before_policy_and_risk() {
        let store = Arc::new(FakeStore { policy: open_policy(), available: dec!(0) });
        let engine = DecisionEngine::new(store, Arc::new(ApprovingAdjudicator), audit_logger());

        let decision = engine.process(request()).await;
        assert_eq!(decision.status, DecisionStatus::Rejected);
        assert_eq!(decision.rejection_type, Some(RejectionType::InsufficientBudget));
        assert!(decision.estimated_cost > Decimal::ZERO);
    }

    #[tokio::test]
    async fn per_request_limit_violation_is_reported_precisely() {
        let mut policy = open_policy();
        policy.per_request_limit = dec!(0.0001);
        let store = Arc::new(FakeStore { policy, available: dec!(1000) });
        let engine = DecisionEngine::new(store, Arc::new(ApprovingAdjudicator), audit_logger());

        let decision = engine.process(request()).await;
        assert_eq!(decision.status, DecisionStatus::Rejected);
        assert_eq!(decision.rejection_type, Some(RejectionType::PerRequestLimitExceeded));
        assert_eq!(decision.violations.len(), 1);
    }

    #[tokio::test]
    async fn approved_request_is_routed_to_fast_tier_and_carries_a_confidence() {
        let store = Arc::new(FakeStore { policy: open_policy(), available: dec!(1000) });
        let engine = DecisionEngine::new(store, Arc::new(ApprovingAdjudicator), audit_logger());

        let decision = engine.process(request()).await;
        assert!(decision.is_approved());
        assert_eq!(decision.tier, Tier::Fast);
        assert_eq!(decision.confidence, 0.9);
        assert!(decision.actual_cost.is_none(), "the engine alone never sets actual_cost");
    }

    #[tokio::test]
    async fn gateway_reserves_payment_and_settles_after_an_approval() {
        let store = Arc::new(FakeStore { policy: open_policy(), available: dec!(1000) });
        let audit = audit_logger();
        let gateway = Gateway::new(
            store,
            Arc::new(ApprovingAdjudicator),
            Arc::new(FakeLedger),
            Arc::new(FakeProvider { actual_cost: dec!(5) }),
            audit.clone(),
        );

        let decision = gateway.handle(request()).await;
        assert!(decision.is_approved());
        assert_eq!(decision.transaction_hash.as_deref(), Some("0xdeadbeef"));
        assert_eq!(decision.actual_cost, Some(dec!(5)));

        let trail = audit.get_trail("req-1").unwrap().unwrap();
        assert!(trail.verify_integrity());
        assert!(trail.events.iter().any(|e| matches!(e.event_type, crate::types::EventType::PaymentCompleted)));
    }

    #[tokio::test]
    async fn gateway_never_reserves_payment_for_a_rejected_decision() {
        let store = Arc::new(FakeStore { policy: open_policy(), available: dec!(0) });
        let audit = audit_logger();
        let gateway = Gateway::new(
            store,
            Arc::new(ApprovingAdjudicator),
            Arc::new(FakeLedger),
            Arc::new(FakeProvider { actual_cost: dec!(5) }),
            audit.clone(),
        );

        let decision = gateway.handle(request()).await;
        assert!(!decision.is_approved());
        assert!(decision.transaction_hash.is_none());

        let trail = audit.get_trail("req-1").unwrap().unwrap();
        assert!(!trail.events.iter().any(|e| matches!(e.event_type, crate::types::EventType::PaymentReserved)));
    }
}
