//! Observability stack: structured logging, tracing, metrics, and health
//! checks, wired the way the cost-ops service wires them and pointed at
//! this crate's own decision pipeline instead.

pub mod config;
pub mod health;
pub mod metrics;
pub mod tracing;

pub use config::{
    HealthConfig, LogFileConfig, LoggingConfig, LoggingFormat, ObservabilityConfig, OtlpConfig,
    TracingConfig, TracingFormat,
};
pub use health::{
    CacheHealthCheck, ComponentHealth, DatabaseHealthCheck, ExternalServiceHealthCheck,
    FunctionHealthCheck, HealthCheck, HealthChecker, HealthStatus, SystemHealth,
};
pub use metrics::{MetricsError, MetricsRegistry, Timer};
pub use tracing::{
    init_tracing, CorrelationId, RequestId, TraceContext, TraceContextLayer,
};

/// The two `MetricsConfig` structs below this module live at different
/// layers (the exporter's bind address vs. the bucket/endpoint shape used
/// by the rest of the observability stack) and are not interchangeable;
/// both names are kept distinct rather than re-exported unqualified here.
pub type ObservabilityMetricsConfig = config::MetricsConfig;

/// Bring up logging, tracing, and the metrics registry from one
/// [`ObservabilityConfig`]. Returns the registry so callers can pass it to
/// whatever exposes `/metrics`.
pub fn init_observability(
    config: &ObservabilityConfig,
) -> Result<MetricsRegistry, Box<dyn std::error::Error + Send + Sync>> {
    init_tracing(&config.tracing).map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { e.into() })?;
    let registry = MetricsRegistry::new(config.metrics.clone())?;
    Ok(registry)
}
