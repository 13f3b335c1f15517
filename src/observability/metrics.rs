//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define dispatch metrics (requests, latency, breaker state, selection skips)
//! - Expose a Prometheus-compatible endpoint when the binary enables it
//!
//! # Metrics
//! - `llm_lb_requests_total` (counter): dispatches by endpoint and outcome
//! - `llm_lb_request_duration_seconds` (histogram): upstream latency per endpoint
//! - `llm_lb_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `llm_lb_selection_skips_total` (counter): endpoints skipped because open
//! - `llm_lb_unavailable_total` (counter): selections that found no endpoint
//!
//! # Design Decisions
//! - The library only records through the `metrics` facade; installing a
//!   recorder is left to the application

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one finished dispatch.
pub fn record_request(endpoint: &str, outcome: &'static str, start: Instant) {
    ::metrics::counter!(
        "llm_lb_requests_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!(
        "llm_lb_request_duration_seconds",
        "endpoint" => endpoint.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_breaker_state(endpoint: &str, state: CircuitState) {
    ::metrics::gauge!("llm_lb_breaker_state", "endpoint" => endpoint.to_string()).set(match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    });
}

pub fn record_selection_skip(endpoint: &str) {
    ::metrics::counter!("llm_lb_selection_skips_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_unavailable() {
    ::metrics::counter!("llm_lb_unavailable_total").increment(1);
}
