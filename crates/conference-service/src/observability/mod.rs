//! Observability: metrics sink and Prometheus exporter.

pub mod metrics;

pub use self::metrics::{MetricsSink, PrometheusMetrics};
