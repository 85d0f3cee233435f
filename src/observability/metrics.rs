//! Prometheus metrics export.
//!
//! # Metrics
//! - `gateway_updates_total` (counter): completed update requests by classification
//! - `gateway_update_duration_seconds` (histogram): end-to-end latency
//! - `gateway_in_flight` (gauge): jobs holding a concurrency slot
//! - `gateway_queue_length` (gauge): requests waiting for a slot
//! - `gateway_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//!
//! # Design Decisions
//! - Optional: the scrape endpoint only runs when enabled in config
//! - Recording without an installed recorder is a no-op, so tests need no setup
//! - Separate from the JSON `/metrics` endpoint, which is the primary surface

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::gateway::Classification;
use crate::resilience::CircuitState;

/// Install the global recorder and start the scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_update(classification: Classification, latency: Duration) {
    counter!("gateway_updates_total", "classification" => classification.as_str()).increment(1);
    histogram!("gateway_update_duration_seconds").record(latency.as_secs_f64());
}

pub fn record_admission(in_flight: usize, queue_length: usize) {
    gauge!("gateway_in_flight").set(in_flight as f64);
    gauge!("gateway_queue_length").set(queue_length as f64);
}

pub fn record_circuit_state(state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("gateway_circuit_state").set(value);
}
