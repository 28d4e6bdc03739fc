//! Metrics for the conference service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `cs_` prefix for the conference service
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `type`: 3 values (conference, connect, queue)
//! - `status`: 4 leg statuses, or success/error for requests
//! - `outcome`: bounded by [`HealthCheckOutcome`](crate::handlers::HealthCheckOutcome)
//! - `operation`: bounded by code (create_bridge, conference_update, ...)
//!
//! Handlers never touch the global recorder directly; they record through an
//! injected [`MetricsSink`].

use crate::models::{ConferenceType, ConferencecallStatus};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Destination for service metrics.
pub trait MetricsSink: Send + Sync {
    fn conference_created(&self, conference_type: ConferenceType);

    fn conference_destroyed(&self, conference_type: ConferenceType);

    fn conferencecall_status(&self, status: ConferencecallStatus);

    fn health_check(&self, outcome: &'static str);

    fn call_control_request(&self, operation: &'static str, status: &'static str, duration: Duration);

    fn storage_query(&self, operation: &'static str, status: &'static str, duration: Duration);
}

/// Forwards to the `metrics` facade, scraped through the Prometheus exporter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl MetricsSink for PrometheusMetrics {
    fn conference_created(&self, conference_type: ConferenceType) {
        counter!("cs_conferences_created_total",
            "type" => conference_type.as_str()
        )
        .increment(1);
        gauge!("cs_conferences_active",
            "type" => conference_type.as_str()
        )
        .increment(1.0);
    }

    fn conference_destroyed(&self, conference_type: ConferenceType) {
        counter!("cs_conferences_destroyed_total",
            "type" => conference_type.as_str()
        )
        .increment(1);
        gauge!("cs_conferences_active",
            "type" => conference_type.as_str()
        )
        .decrement(1.0);
    }

    fn conferencecall_status(&self, status: ConferencecallStatus) {
        counter!("cs_conferencecall_transitions_total",
            "status" => status.as_str()
        )
        .increment(1);
    }

    fn health_check(&self, outcome: &'static str) {
        counter!("cs_health_checks_total",
            "outcome" => outcome
        )
        .increment(1);
    }

    fn call_control_request(&self, operation: &'static str, status: &'static str, duration: Duration) {
        histogram!("cs_call_control_request_duration_seconds",
            "operation" => operation
        )
        .record(duration.as_secs_f64());

        counter!("cs_call_control_requests_total",
            "operation" => operation,
            "status" => status
        )
        .increment(1);
    }

    fn storage_query(&self, operation: &'static str, status: &'static str, duration: Duration) {
        histogram!("cs_db_query_duration_seconds",
            "operation" => operation
        )
        .record(duration.as_secs_f64());

        counter!("cs_db_queries_total",
            "operation" => operation,
            "status" => status
        )
        .increment(1);
    }
}

/// Install the Prometheus recorder with an HTTP scrape listener.
///
/// Must run inside a Tokio runtime, before any metric is recorded.
///
/// # Errors
///
/// Returns error if the recorder is already installed or the listener
/// cannot be configured.
pub fn init_metrics_recorder(bind_address: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(bind_address)
        // DB query buckets (p99 < 50ms)
        .set_buckets_for_metric(
            Matcher::Prefix("cs_db_query".to_string()),
            &[0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        // Call-control buckets, HTTP-style
        .set_buckets_for_metric(
            Matcher::Prefix("cs_call_control".to_string()),
            &[0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set call-control buckets: {e}"))?
        .install()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}
