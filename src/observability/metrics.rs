//! Metrics collection and exposition.
//!
//! # Metrics
//! - `escrow_tx_submitted_total` (counter): broadcast transactions by function
//! - `escrow_scan_probes_total` (counter): scanner reads by outcome (hit, miss, error)
//! - `escrow_scan_matches_total` (counter): records delivered to scan consumers
//! - `escrow_operation_steps_total` (counter): persisted orchestrator steps by phase
//! - `escrow_rpc_health` (gauge): 1=primary reachable, 0=unreachable
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape listener. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_tx_submitted(function: &'static str) {
    counter!("escrow_tx_submitted_total", "function" => function).increment(1);
}

pub fn record_probe(outcome: &'static str) {
    counter!("escrow_scan_probes_total", "outcome" => outcome).increment(1);
}

pub fn record_scan_match() {
    counter!("escrow_scan_matches_total").increment(1);
}

pub fn record_step(phase: &'static str) {
    counter!("escrow_operation_steps_total", "phase" => phase).increment(1);
}

pub fn record_rpc_health(healthy: bool) {
    gauge!("escrow_rpc_health").set(if healthy { 1.0 } else { 0.0 });
}
