//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_stage_calls_total` (counter): attempts by service, outcome
//! - `gateway_stage_call_duration_seconds` (histogram): per-attempt latency
//! - `gateway_retries_total` (counter): retries by service
//! - `gateway_circuit_rejections_total` (counter): fail-fast rejections
//! - `gateway_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_pipeline_runs_total` (counter): runs by mode, outcome
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_stage_call(service: &str, outcome: &str, start: Instant) {
    metrics::counter!(
        "gateway_stage_calls_total",
        "service" => service.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "gateway_stage_call_duration_seconds",
        "service" => service.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_retry(service: &str) {
    metrics::counter!("gateway_retries_total", "service" => service.to_string()).increment(1);
}

pub fn record_circuit_rejection(service: &str) {
    metrics::counter!("gateway_circuit_rejections_total", "service" => service.to_string())
        .increment(1);
}

pub fn record_circuit_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    metrics::gauge!("gateway_circuit_state", "service" => service.to_string()).set(value);
}

pub fn record_pipeline_run(mode: &'static str, stored: bool) {
    let outcome = if stored { "completed" } else { "halted" };
    metrics::counter!("gateway_pipeline_runs_total", "mode" => mode, "outcome" => outcome)
        .increment(1);
}
