//! Prometheus metrics (ambient observability stack).
//!
//! Exposes metrics at GET /metrics in Prometheus text format.
//! Uses the `metrics` crate with a Prometheus exporter.

use axum::{routing::get, Router};
use metrics::counter;
use std::sync::Arc;

/// Initialize the Prometheus metrics exporter and install it as the global recorder.
/// Returns the handle for rendering metrics on the /metrics endpoint.
pub fn init_metrics() -> metrics_exporter_prometheus::PrometheusHandle {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    builder
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder")
}

/// Create metrics route that can be merged into any Router
pub fn routes<S: Clone + Send + Sync + 'static>(
    handle: metrics_exporter_prometheus::PrometheusHandle,
) -> Router<S> {
    let handle = Arc::new(handle);
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Record an auth event (SIWE challenge issued, authenticate succeeded, ...).
pub fn record_auth_event(event_type: &str) {
    counter!("auth_events_total", "type" => event_type.to_string()).increment(1);
}

/// Record a refresh-token revocation.
pub fn record_token_revocation() {
    counter!("token_revocations_total").increment(1);
}
