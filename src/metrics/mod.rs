//! Prometheus recorder setup for the `metrics` crate facade, kept separate
//! from [`crate::observability::metrics`]'s `prometheus`-crate registry:
//! this module wires the global `metrics::counter!`/`histogram!` macros used
//! ad hoc across the pipeline, while the observability registry owns the
//! named, typed metrics surfaced on `/metrics`.

pub mod recorder;

pub use recorder::{init_metrics, MetricsConfig as RecorderMetricsConfig};
