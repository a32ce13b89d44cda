//! Operational entry point: brings up logging, the `/metrics` and health
//! endpoints, and loads the gateway's configuration. Wiring a concrete
//! [`payment_gateway::UpstreamStore`], [`payment_gateway::Adjudicator`],
//! [`payment_gateway::PaymentLedger`], and [`payment_gateway::ProviderGateway`]
//! is left to the embedding deployment (spec §1): this binary only proves
//! the ambient stack comes up cleanly and exposes the signals an operator
//! needs before those collaborators are wired in.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;

use payment_gateway::observability::{HealthChecker, MetricsRegistry, ObservabilityConfig};
use payment_gateway::{Environment, GatewayConfig};

#[derive(Parser, Debug)]
#[command(name = "payment-gateway", about = "Autonomous payment-gated API gateway")]
struct Cli {
    /// Path to a TOML config file layered under environment variables.
    #[arg(long, env = "GATEWAY_CONFIG_PATH")]
    config: Option<String>,

    /// Runtime environment, used for config defaults when `--config` is absent.
    #[arg(long, value_enum, default_value = "development")]
    environment: CliEnvironment,

    /// Address the `/health` and `/metrics` endpoints bind to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum CliEnvironment {
    Development,
    Test,
    Production,
}

impl From<CliEnvironment> for Environment {
    fn from(value: CliEnvironment) -> Self {
        match value {
            CliEnvironment::Development => Environment::Development,
            CliEnvironment::Test => Environment::Test,
            CliEnvironment::Production => Environment::Production,
        }
    }
}

struct AppState {
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthChecker>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let observability = ObservabilityConfig::default();
    payment_gateway::observability::init_tracing(&observability.tracing)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let config = match &cli.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::defaults_for(cli.environment.into()),
    };
    tracing::info!(environment = ?config.environment, backend = %config.backend_base_url, "gateway configuration loaded");

    let metrics = Arc::new(MetricsRegistry::new(observability.metrics.clone())?);
    let health = Arc::new(HealthChecker::new(observability.health.clone()));

    let state = Arc::new(AppState { metrics, health });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(readiness_handler))
        .route("/live", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!(addr = %cli.listen, "listening");
    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health.check_health().await;
    axum::Json(health)
}

async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.health.check_readiness().await {
        payment_gateway::observability::HealthStatus::Unhealthy => {
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        status => (StatusCode::OK, status.to_string()).into_response(),
    }
}

async fn liveness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, state.health.check_liveness().await.to_string())
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.export() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
