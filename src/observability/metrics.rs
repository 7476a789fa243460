//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_sessions_created_total` (counter): sessions constructed
//! - `gate_sessions_closed_total` (counter): sessions stopped
//! - `gate_sessions_evicted_total` (counter): sessions removed by the sweep
//! - `gate_sessions_active` (gauge): currently tracked sessions
//! - `gate_session_bytes_sent_total` / `gate_session_bytes_received_total`
//!   (counters): payload bytes through all sessions
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so library users pay nothing
//! - Exposition is Prometheus scrape via `metrics-exporter-prometheus`,
//!   enabled from config

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            describe_counter!("gate_sessions_created_total", "Sessions constructed");
            describe_counter!("gate_sessions_closed_total", "Sessions stopped");
            describe_counter!("gate_sessions_evicted_total", "Sessions evicted by the idle sweep");
            describe_gauge!("gate_sessions_active", "Currently tracked sessions");
            describe_counter!("gate_session_bytes_sent_total", "Payload bytes sent");
            describe_counter!("gate_session_bytes_received_total", "Payload bytes received");
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install metrics exporter");
        }
    }
}

pub fn record_session_created() {
    counter!("gate_sessions_created_total").increment(1);
}

pub fn record_session_closed() {
    counter!("gate_sessions_closed_total").increment(1);
}

pub fn record_session_evicted() {
    counter!("gate_sessions_evicted_total").increment(1);
}

pub fn record_sessions_active(count: usize) {
    gauge!("gate_sessions_active").set(count as f64);
}

pub fn record_bytes_sent(bytes: u64) {
    counter!("gate_session_bytes_sent_total").increment(bytes);
}

pub fn record_bytes_received(bytes: u64) {
    counter!("gate_session_bytes_received_total").increment(bytes);
}
