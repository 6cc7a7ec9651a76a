//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lbmanager_messages_total` (counter): settled change events by outcome
//!   (`ack`, `nak`, `term`)
//! - `lbmanager_reconciliations_total` (counter): reconciliations by result
//!   (`success`, `retryable`, `permanent`, `fatal`)
//! - `lbmanager_dataplane_ready` (gauge): 1 when the last readiness probe passed
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Prometheus exposition on its own listener, off by default

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const MESSAGES_TOTAL: &str = "lbmanager_messages_total";
pub const RECONCILIATIONS_TOTAL: &str = "lbmanager_reconciliations_total";
pub const DATAPLANE_READY: &str = "lbmanager_dataplane_ready";

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_message(outcome: &'static str) {
    metrics::counter!(MESSAGES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_reconciliation(result: &'static str) {
    metrics::counter!(RECONCILIATIONS_TOTAL, "result" => result).increment(1);
}

pub fn set_dataplane_ready(ready: bool) {
    metrics::gauge!(DATAPLANE_READY).set(if ready { 1.0 } else { 0.0 });
}
