// Prometheus metrics for the decision pipeline

use prometheus::{
    Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder, Encoder, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::MetricsConfig;

/// Error type for metrics operations
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to register metric: {0}")]
    RegistrationError(String),

    #[error("Failed to record metric: {0}")]
    RecordError(String),

    #[error("Failed to export metrics: {0}")]
    ExportError(String),

    #[error("Metric not found: {0}")]
    NotFound(String),
}

/// Metrics for the decision pipeline: one counter/histogram per stage plus
/// a handful of cache and process gauges. Labels carry the pipeline outcome
/// (status, tier, rule) rather than HTTP- or storage-layer detail, since
/// nothing downstream of the gateway's own decision loop is observed here.
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    config: MetricsConfig,

    // Decision outcomes
    pub decisions_total: IntCounterVec,
    pub decision_pipeline_duration_seconds: HistogramVec,
    pub rejections_by_type_total: IntCounterVec,

    // Cost and risk
    pub estimated_cost_usd: HistogramVec,
    pub cost_variance_ratio: Histogram,
    pub risk_score: HistogramVec,
    pub cost_anomalies_total: IntCounterVec,

    // Policy and budget
    pub policy_violations_total: IntCounterVec,
    pub budget_checks_total: IntCounterVec,
    pub budget_low_balance_warnings_total: IntCounter,

    // Payment and provider execution
    pub payment_reservations_total: IntCounterVec,
    pub payment_settlements_total: IntCounterVec,
    pub provider_calls_total: IntCounterVec,
    pub provider_call_duration_seconds: HistogramVec,

    // Audit log
    pub audit_events_total: IntCounterVec,
    pub audit_chain_verifications_total: IntCounterVec,

    // Upstream caches (policy, pricing, budget, baseline)
    pub cache_hits_total: IntCounterVec,
    pub cache_misses_total: IntCounterVec,

    // Process-wide
    pub uptime_seconds: Gauge,
    pub build_info: IntCounterVec,
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new(config: MetricsConfig) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        macro_rules! register_counter_vec {
            ($name:expr, $help:expr, $labels:expr) => {{
                let metric = IntCounterVec::new(Opts::new($name, $help).namespace("payment_gateway"), $labels)
                    .map_err(|e| MetricsError::RegistrationError(e.to_string()))?;
                registry
                    .register(Box::new(metric.clone()))
                    .map_err(|e| MetricsError::RegistrationError(e.to_string()))?;
                metric
            }};
        }

        macro_rules! register_histogram_vec {
            ($name:expr, $help:expr, $labels:expr, $buckets:expr) => {{
                let metric = HistogramVec::new(
                    HistogramOpts::new($name, $help).namespace("payment_gateway").buckets($buckets),
                    $labels,
                )
                .map_err(|e| MetricsError::RegistrationError(e.to_string()))?;
                registry
                    .register(Box::new(metric.clone()))
                    .map_err(|e| MetricsError::RegistrationError(e.to_string()))?;
                metric
            }};
        }

        let decisions_total =
            register_counter_vec!("decisions_total", "Total decisions reached", &["status", "tier"]);

        let decision_pipeline_duration_seconds = register_histogram_vec!(
            "decision_pipeline_duration_seconds",
            "Time spent in a pipeline stage",
            &["stage"],
            config.latency_buckets.clone()
        );

        let rejections_by_type_total = register_counter_vec!(
            "rejections_by_type_total",
            "Total rejections by rejection type",
            &["rejection_type"]
        );

        let estimated_cost_usd = register_histogram_vec!(
            "estimated_cost_usd",
            "Estimated request cost in USD",
            &["provider", "model"],
            config.cost_buckets.clone()
        );

        let cost_variance_ratio = Histogram::with_opts(
            HistogramOpts::new("cost_variance_ratio", "Ratio of actual to estimated cost")
                .namespace("payment_gateway")
                .buckets(vec![0.5, 0.75, 0.9, 1.0, 1.1, 1.25, 1.5, 2.0, 5.0]),
        )
        .map_err(|e| MetricsError::RegistrationError(e.to_string()))?;
        registry
            .register(Box::new(cost_variance_ratio.clone()))
            .map_err(|e| MetricsError::RegistrationError(e.to_string()))?;

        let risk_score = register_histogram_vec!(
            "risk_score",
            "Composite risk score at assessment time",
            &["category"],
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]
        );

        let cost_anomalies_total =
            register_counter_vec!("cost_anomalies_total", "Total cost anomalies detected", &["severity"]);

        let policy_violations_total =
            register_counter_vec!("policy_violations_total", "Total policy violations by rule", &["rule", "severity"]);

        let budget_checks_total =
            register_counter_vec!("budget_checks_total", "Total budget sufficiency checks", &["sufficient"]);

        let budget_low_balance_warnings_total = IntCounter::new(
            "payment_gateway_budget_low_balance_warnings_total",
            "Total budget checks that crossed the low-balance threshold",
        )
        .map_err(|e| MetricsError::RegistrationError(e.to_string()))?;
        registry
            .register(Box::new(budget_low_balance_warnings_total.clone()))
            .map_err(|e| MetricsError::RegistrationError(e.to_string()))?;

        let payment_reservations_total =
            register_counter_vec!("payment_reservations_total", "Total payment reservation attempts", &["result"]);

        let payment_settlements_total =
            register_counter_vec!("payment_settlements_total", "Total payment settlement attempts", &["result"]);

        let provider_calls_total =
            register_counter_vec!("provider_calls_total", "Total upstream provider calls", &["provider", "success"]);

        let provider_call_duration_seconds = register_histogram_vec!(
            "provider_call_duration_seconds",
            "Upstream provider call duration",
            &["provider"],
            config.latency_buckets.clone()
        );

        let audit_events_total =
            register_counter_vec!("audit_events_total", "Total audit log events written", &["event_type", "result"]);

        let audit_chain_verifications_total = register_counter_vec!(
            "audit_chain_verifications_total",
            "Total audit hash-chain verifications",
            &["outcome"]
        );

        let cache_hits_total =
            register_counter_vec!("cache_hits_total", "Total upstream cache hits", &["cache_name"]);

        let cache_misses_total =
            register_counter_vec!("cache_misses_total", "Total upstream cache misses", &["cache_name"]);

        let uptime_seconds = Gauge::new("payment_gateway_uptime_seconds", "Process uptime in seconds")
            .map_err(|e| MetricsError::RegistrationError(e.to_string()))?;
        registry
            .register(Box::new(uptime_seconds.clone()))
            .map_err(|e| MetricsError::RegistrationError(e.to_string()))?;

        let build_info = register_counter_vec!("build_info", "Build information", &["version", "rustc_version"]);

        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION"), "unknown"])
            .inc();

        if config.include_process_metrics {
            let process_collector = prometheus::process_collector::ProcessCollector::for_self();
            registry
                .register(Box::new(process_collector))
                .map_err(|e| MetricsError::RegistrationError(e.to_string()))?;
        }

        Ok(Self {
            registry: Arc::new(registry),
            config,
            decisions_total,
            decision_pipeline_duration_seconds,
            rejections_by_type_total,
            estimated_cost_usd,
            cost_variance_ratio,
            risk_score,
            cost_anomalies_total,
            policy_violations_total,
            budget_checks_total,
            budget_low_balance_warnings_total,
            payment_reservations_total,
            payment_settlements_total,
            provider_calls_total,
            provider_call_duration_seconds,
            audit_events_total,
            audit_chain_verifications_total,
            cache_hits_total,
            cache_misses_total,
            uptime_seconds,
            build_info,
        })
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::ExportError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::ExportError(e.to_string()))
    }

    /// Get the underlying registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    histogram: Histogram,
}

impl Timer {
    /// Create a new timer
    pub fn new(histogram: Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }

    /// Observe the elapsed time and record it
    pub fn observe_duration(self) -> Duration {
        let duration = self.start.elapsed();
        self.histogram.observe(duration.as_secs_f64());
        duration
    }
}

/// Helper to create a timer from a histogram
pub fn start_timer(histogram: &Histogram) -> Timer {
    Timer::new(histogram.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registry_creation() {
        let config = MetricsConfig::default();
        let registry = MetricsRegistry::new(config);
        assert!(registry.is_ok());
    }

    #[test]
    fn test_decision_metrics() {
        let config = MetricsConfig::default();
        let registry = MetricsRegistry::new(config).unwrap();

        registry
            .decisions_total
            .with_label_values(&["approved", "fast"])
            .inc();
        registry
            .rejections_by_type_total
            .with_label_values(&["INSUFFICIENT_BUDGET"])
            .inc();

        let exported = registry.export().unwrap();
        assert!(exported.contains("payment_gateway_decisions_total"));
        assert!(exported.contains("payment_gateway_rejections_by_type_total"));
    }

    #[test]
    fn test_cost_and_risk_metrics() {
        let config = MetricsConfig::default();
        let registry = MetricsRegistry::new(config).unwrap();

        registry
            .estimated_cost_usd
            .with_label_values(&["openai", "gpt-4"])
            .observe(1.50);
        registry.cost_variance_ratio.observe(1.05);
        registry.risk_score.with_label_values(&["moderate"]).observe(4.5);

        let exported = registry.export().unwrap();
        assert!(exported.contains("payment_gateway_estimated_cost_usd"));
        assert!(exported.contains("payment_gateway_risk_score"));
    }

    #[test]
    fn test_policy_and_budget_metrics() {
        let config = MetricsConfig::default();
        let registry = MetricsRegistry::new(config).unwrap();

        registry
            .policy_violations_total
            .with_label_values(&["allowed_providers", "critical"])
            .inc();
        registry.budget_checks_total.with_label_values(&["false"]).inc();
        registry.budget_low_balance_warnings_total.inc();

        let exported = registry.export().unwrap();
        assert!(exported.contains("payment_gateway_policy_violations_total"));
        assert!(exported.contains("payment_gateway_budget_checks_total"));
    }

    #[test]
    fn test_payment_and_provider_metrics() {
        let config = MetricsConfig::default();
        let registry = MetricsRegistry::new(config).unwrap();

        registry
            .payment_reservations_total
            .with_label_values(&["success"])
            .inc();
        registry
            .provider_calls_total
            .with_label_values(&["openai", "true"])
            .inc();

        let exported = registry.export().unwrap();
        assert!(exported.contains("payment_gateway_payment_reservations_total"));
        assert!(exported.contains("payment_gateway_provider_calls_total"));
    }

    #[test]
    fn test_audit_and_cache_metrics() {
        let config = MetricsConfig::default();
        let registry = MetricsRegistry::new(config).unwrap();

        registry
            .audit_events_total
            .with_label_values(&["request_received", "success"])
            .inc();
        registry.cache_hits_total.with_label_values(&["policy"]).inc();
        registry.cache_misses_total.with_label_values(&["pricing"]).inc();

        let exported = registry.export().unwrap();
        assert!(exported.contains("payment_gateway_audit_events_total"));
        assert!(exported.contains("payment_gateway_cache_hits_total"));
    }

    #[test]
    fn test_timer() {
        let config = MetricsConfig::default();
        let registry = MetricsRegistry::new(config).unwrap();

        let histogram = registry
            .decision_pipeline_duration_seconds
            .with_label_values(&["policy_check"]);

        let timer = start_timer(&histogram);
        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.observe_duration();

        assert!(duration.as_millis() >= 10);
    }
}
