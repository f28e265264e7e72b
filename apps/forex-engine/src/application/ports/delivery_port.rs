//! Delivery Port (Driven Port)
//!
//! Hands a routed event to one connection's outbound queue.

use crate::domain::order::OrderEvent;
use crate::domain::subscription::ConnectionId;

/// What happened to one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Enqueued for the connection's writer.
    Queued,
    /// Enqueued, but an older update was dropped to make room.
    QueuedWithDrop,
    /// The connection exceeded its drop budget and was disconnected.
    Disconnected,
    /// No such live connection (already gone).
    UnknownConnection,
}

/// Per-connection delivery of order events.
///
/// Must not block: implementations enqueue and return.
pub trait DeliveryPort: Send + Sync {
    /// Enqueue `event` for `connection`.
    fn deliver(&self, connection: ConnectionId, event: &OrderEvent) -> DeliveryOutcome;
}

/// Delivery port that accepts and discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpDelivery;

impl DeliveryPort for NoOpDelivery {
    fn deliver(&self, _connection: ConnectionId, _event: &OrderEvent) -> DeliveryOutcome {
        DeliveryOutcome::Queued
    }
}
