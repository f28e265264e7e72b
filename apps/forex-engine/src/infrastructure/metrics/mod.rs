//! Prometheus Metrics Module
//!
//! Exposes engine metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Orders**: submissions, committed transitions by status, commit conflicts
//! - **Events**: published, resequenced, delivered by outcome, dropped
//! - **Connections**: live WebSocket connections, writer failures
//! - **Latency**: fill tick processing time
//!
//! # Integration
//!
//! Metrics are rendered at `GET /metrics` on the HTTP server. The services
//! record through [`crate::application::metrics`], which is a no-op until
//! [`init_metrics`] installs the recorder.

use std::sync::OnceLock;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Safe to call more than once; later calls return the first handle.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Order counters
    describe_counter!(
        "forex_engine_orders_submitted_total",
        "Total orders accepted by the gateway"
    );
    describe_counter!(
        "forex_engine_order_transitions_total",
        "Total committed order transitions by resulting status"
    );
    describe_counter!(
        "forex_engine_commit_conflicts_total",
        "Total optimistic-concurrency conflicts retried"
    );

    // Event counters
    describe_counter!(
        "forex_engine_events_published_total",
        "Total order events handed to the event bus"
    );
    describe_counter!(
        "forex_engine_events_resequenced_total",
        "Total events that arrived ahead of their predecessor and were buffered"
    );
    describe_counter!(
        "forex_engine_events_delivered_total",
        "Total per-connection deliveries by outcome"
    );
    describe_counter!(
        "forex_engine_events_dropped_total",
        "Total queued updates dropped because a connection fell behind"
    );

    // Connection metrics
    describe_gauge!(
        "forex_engine_websocket_connections",
        "Number of live WebSocket connections"
    );
    describe_counter!(
        "forex_engine_delivery_failures_total",
        "Total WebSocket writer failures"
    );

    // Latency histograms
    describe_histogram!(
        "forex_engine_tick_duration_seconds",
        "Time to process one fill tick"
    );
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_metrics().unwrap();
        init_metrics().unwrap();

        assert!(get_metrics_handle().is_some());
    }
}
