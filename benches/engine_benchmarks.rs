//! Benchmarks for the hot paths of the decision pipeline: pricing
//! calculation, risk scoring, and a full end-to-end `DecisionEngine::process`
//! run against in-memory fakes (no network, no disk beyond a temp audit dir).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use payment_gateway::audit::AuditLogger;
use payment_gateway::error::Result;
use payment_gateway::types::{
    AccountStatus, BudgetStatus, DailyActivity, DecisionRequest, PricingEntry, PricingMode,
    PrincipalContext, SystemPolicy, UserBaseline, UserPolicy,
};
use payment_gateway::upstream::{AdjudicationOutcome, AdjudicationVerdict, Adjudicator, UpstreamStore};
use payment_gateway::{DecisionEngine, RiskDetector};

struct BenchStore;

#[async_trait]
impl UpstreamStore for BenchStore {
    async fn fetch_system_policy(&self) -> Result<SystemPolicy> {
        Ok(SystemPolicy::default())
    }

    async fn fetch_principal_context(&self, user_id: &str, project_id: &str) -> Result<PrincipalContext> {
        let mut allowed_models = HashMap::new();
        allowed_models.insert("openai".to_string(), vec!["gpt-4".to_string()]);
        Ok(PrincipalContext {
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            policy: UserPolicy {
                user_id: user_id.to_string(),
                project_id: project_id.to_string(),
                policy_id: "pol1".to_string(),
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
            },
            activity: DailyActivity {
                requests_today: 12,
                spend_today: dec!(1.5),
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
            available_balance: dec!(900),
            daily_limit: dec!(1000),
            daily_spent: dec!(50),
            monthly_limit: dec!(30000),
            monthly_spent: dec!(500),
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

struct BenchAdjudicator;

#[async_trait]
impl Adjudicator for BenchAdjudicator {
    async fn evaluate(
        &self,
        _tier: payment_gateway::types::Tier,
        _request: &DecisionRequest,
        _context: &PrincipalContext,
    ) -> Result<AdjudicationOutcome> {
        Ok(AdjudicationOutcome {
            outcome: AdjudicationVerdict::Approve,
            reasoning: "benchmark approval".to_string(),
            confidence: 0.95,
            agent_id: "bench-agent".to_string(),
        })
    }
}

fn bench_request() -> DecisionRequest {
    DecisionRequest {
        request_id: "bench-req".to_string(),
        user_id: "bench-user".to_string(),
        project_id: "bench-project".to_string(),
        agent_id: None,
        api_provider: "openai".to_string(),
        model_name: "gpt-4".to_string(),
        operation_type: "chat".to_string(),
        request_params: HashMap::new(),
        estimated_tokens: Some(1500),
        expected_output_tokens: Some(500),
        timestamp: chrono::Utc::now(),
        metadata: HashMap::new(),
    }
}

fn bench_pricing_calculation(c: &mut Criterion) {
    let entry = PricingEntry {
        provider: "openai".to_string(),
        model: "gpt-4".to_string(),
        mode: PricingMode::PerToken,
        input_cost_per_1k: dec!(0.01),
        output_cost_per_1k: dec!(0.03),
        flat_rate: Decimal::ZERO,
        tiers: vec![],
        fetched_at: chrono::Utc::now(),
    };

    let mut group = c.benchmark_group("pricing_calculate_cost");
    for tokens in [100u64, 1_000, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::new("tokens", tokens), tokens, |b, &tokens| {
            b.iter(|| black_box(entry.calculate_cost(tokens, tokens / 4)));
        });
    }
    group.finish();
}

fn bench_risk_assessment(c: &mut Criterion) {
    let detector = RiskDetector::new();
    let activity = DailyActivity {
        requests_today: 40,
        spend_today: dec!(12.5),
        rejections_today: 1,
        recent_rejections: 0,
        is_new_agent: false,
    };

    c.bench_function("risk_assess_risk", |b| {
        b.iter(|| {
            black_box(detector.assess_risk(
                "bench-req",
                "openai",
                "gpt-4",
                dec!(0.5),
                &activity,
                None,
                dec!(12.5),
                dec!(100),
            ))
        });
    });
}

fn bench_decision_pipeline(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let audit_dir = tempfile::tempdir().unwrap();
    let engine = DecisionEngine::new(
        Arc::new(BenchStore),
        Arc::new(BenchAdjudicator),
        Arc::new(AuditLogger::new(audit_dir.path()).unwrap()),
    );

    c.bench_function("decision_engine_process", |b| {
        b.to_async(&runtime).iter(|| {
            let engine = &engine;
            async move { black_box(engine.process(bench_request()).await) }
        });
    });
}

criterion_group!(
    benches,
    bench_pricing_calculation,
    bench_risk_assessment,
    bench_decision_pipeline,
);
criterion_main!(benches);
