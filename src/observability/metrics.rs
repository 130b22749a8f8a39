//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ledger_submissions_total` (counter): broadcasts by outcome
//! - `ledger_resolutions_total` (counter): finality waits by outcome
//! - `ledger_finality_seconds` (histogram): time from resolve call to finality
//! - `ledger_live_handles` (gauge): registry population by object kind
//! - `ledger_outstanding_records` (gauge): boundary records not yet freed
//! - `ledger_rpc_failures_total` (counter): failed RPC calls by method
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
///
/// Must be called from within a Tokio runtime context.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::warn!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_submission(outcome: &'static str) {
    counter!("ledger_submissions_total", "outcome" => outcome).increment(1);
}

pub fn record_resolution(outcome: &'static str) {
    counter!("ledger_resolutions_total", "outcome" => outcome).increment(1);
}

pub fn record_finality_latency(seconds: f64) {
    histogram!("ledger_finality_seconds").record(seconds);
}

pub fn record_live_handles(kind: &'static str, count: usize) {
    gauge!("ledger_live_handles", "kind" => kind).set(count as f64);
}

pub fn record_outstanding_records(count: usize) {
    gauge!("ledger_outstanding_records").set(count as f64);
}

pub fn record_rpc_failure(method: &'static str) {
    counter!("ledger_rpc_failures_total", "method" => method).increment(1);
}
