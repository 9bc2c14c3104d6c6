//! Metrics collection and exposition.
//!
//! # Metrics
//! - `goofy_responses_total` (counter): responses by outcome
//! - `goofy_transform_duration_seconds` (histogram): codec time by operation
//! - `goofy_transforms_in_flight` (gauge): transforms currently running
//! - `goofy_upstream_errors_total` (counter): failed upstream exchanges
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels are low-cardinality (outcome, operation name)

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

/// Count one finished response.
pub fn record_outcome(outcome: &'static str) {
    metrics::counter!("goofy_responses_total", "outcome" => outcome).increment(1);
}

/// Record how long one codec call took.
pub fn record_transform(operation: String, elapsed: Duration) {
    metrics::histogram!("goofy_transform_duration_seconds", "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// Marks one transform as running until dropped.
///
/// The gauge is decremented on drop, so a panicking codec still releases it.
#[must_use]
pub struct InFlight(());

impl InFlight {
    pub fn start() -> Self {
        metrics::gauge!("goofy_transforms_in_flight").increment(1.0);
        Self(())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::gauge!("goofy_transforms_in_flight").decrement(1.0);
    }
}

pub fn record_upstream_error() {
    metrics::counter!("goofy_upstream_errors_total").increment(1);
}
