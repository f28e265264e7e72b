//! Engine metric recording.
//!
//! Thin wrappers over the `metrics` facade macros so the services name what
//! happened without knowing how it is exported. The Prometheus recorder and
//! metric descriptions live in the infrastructure layer.

use std::time::Duration;

use ::metrics::{counter, gauge, histogram};

use crate::application::ports::DeliveryOutcome;
use crate::domain::order::OrderStatus;

// =============================================================================
// Metric Recording Functions
// =============================================================================

const fn outcome_label(outcome: DeliveryOutcome) -> &'static str {
    match outcome {
        DeliveryOutcome::Queued => "queued",
        DeliveryOutcome::QueuedWithDrop => "queued_with_drop",
        DeliveryOutcome::Disconnected => "disconnected",
        DeliveryOutcome::UnknownConnection => "unknown_connection",
    }
}

/// Record an order accepted by the gateway.
pub fn record_order_submitted() {
    counter!("forex_engine_orders_submitted_total").increment(1);
}

/// Record a committed transition.
pub fn record_transition(status: OrderStatus) {
    counter!(
        "forex_engine_order_transitions_total",
        "status" => status.as_str()
    )
    .increment(1);
}

/// Record a commit conflict that is about to be retried.
pub fn record_commit_conflict() {
    counter!("forex_engine_commit_conflicts_total").increment(1);
}

/// Record an event handed to the bus.
pub fn record_event_published() {
    counter!("forex_engine_events_published_total").increment(1);
}

/// Record an event buffered until its predecessor arrives.
pub fn record_event_resequenced() {
    counter!("forex_engine_events_resequenced_total").increment(1);
}

/// Record one per-connection delivery.
pub fn record_delivery(outcome: DeliveryOutcome) {
    counter!(
        "forex_engine_events_delivered_total",
        "outcome" => outcome_label(outcome)
    )
    .increment(1);
}

/// Record updates dropped from a connection queue.
pub fn record_events_dropped(count: u64) {
    counter!("forex_engine_events_dropped_total").increment(count);
}

/// Update the live WebSocket connection count.
#[allow(clippy::cast_precision_loss)]
pub fn set_websocket_connections(count: usize) {
    gauge!("forex_engine_websocket_connections").set(count as f64);
}

/// Record a WebSocket writer failure.
pub fn record_delivery_failure() {
    counter!("forex_engine_delivery_failures_total").increment(1);
}

/// Record fill tick processing duration.
pub fn record_tick_duration(duration: Duration) {
    histogram!("forex_engine_tick_duration_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
