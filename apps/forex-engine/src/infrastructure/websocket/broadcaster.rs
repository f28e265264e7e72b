//! WebSocket Broadcaster
//!
//! Owns the live connections and their outbound queues, and implements the
//! delivery port the event bus fans out through.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use thiserror::Error;

use super::queue::{DEFAULT_QUEUE_CAPACITY, OutboundQueue, PushOutcome};
use super::protocol::ServerMessage;
use crate::application::metrics;
use crate::application::ports::{DeliveryOutcome, DeliveryPort};
use crate::domain::order::OrderEvent;
use crate::domain::subscription::{ConnectionId, SubscriptionRegistry};

/// Failures while writing to a connection. Logged, never surfaced to the
/// order path.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The socket write failed.
    #[error("delivery to connection {connection} failed: {reason}")]
    ConnectionDeliveryFailure {
        /// Connection that failed.
        connection: ConnectionId,
        /// Transport error text.
        reason: String,
    },

    /// A message could not be encoded.
    #[error("failed to encode message for connection {connection}: {source}")]
    Encode {
        /// Connection the message was for.
        connection: ConnectionId,
        /// Encoder error.
        #[source]
        source: serde_json::Error,
    },
}

/// Broadcaster tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcasterConfig {
    /// Outbound queue capacity per connection.
    pub queue_capacity: usize,
    /// Drops tolerated before a connection is cut (0 = never cut).
    pub max_dropped: u64,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_dropped: 0,
        }
    }
}

/// Live WebSocket connections.
#[derive(Debug)]
pub struct WebSocketBroadcaster {
    registry: Arc<SubscriptionRegistry>,
    connections: RwLock<HashMap<ConnectionId, Arc<OutboundQueue>>>,
    next_id: AtomicU64,
    config: BroadcasterConfig,
}

impl WebSocketBroadcaster {
    /// Create a broadcaster that deregisters closed connections from
    /// `registry`.
    #[must_use]
    pub fn new(registry: Arc<SubscriptionRegistry>, config: BroadcasterConfig) -> Self {
        Self {
            registry,
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Broadcaster configuration.
    #[must_use]
    pub const fn config(&self) -> &BroadcasterConfig {
        &self.config
    }

    /// Subscription registry shared with the event bus.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Register a new connection and return its ID and queue.
    pub fn register(&self) -> (ConnectionId, Arc<OutboundQueue>) {
        let connection = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(OutboundQueue::new(self.config.queue_capacity));

        let count = {
            let mut connections = self.connections.write();
            connections.insert(connection, Arc::clone(&queue));
            connections.len()
        };
        metrics::set_websocket_connections(count);
        tracing::info!(connection, "WebSocket connection registered");

        (connection, queue)
    }

    /// Remove a connection: close its queue and drop all its subscriptions.
    ///
    /// Subscriptions are dropped even when the connection was already gone,
    /// so interest added after a forced disconnect never outlives it.
    /// Returns `false` if it was already gone.
    pub fn disconnect(&self, connection: ConnectionId, reason: &str) -> bool {
        let (queue, count) = {
            let mut connections = self.connections.write();
            let queue = connections.remove(&connection);
            (queue, connections.len())
        };
        self.registry.unsubscribe(connection);
        let Some(queue) = queue else {
            return false;
        };

        queue.close();
        metrics::set_websocket_connections(count);
        tracing::info!(
            connection,
            reason,
            dropped = queue.total_dropped(),
            "WebSocket connection closed"
        );
        true
    }

    /// Queue a reply for one connection.
    pub fn send(&self, connection: ConnectionId, message: ServerMessage) -> DeliveryOutcome {
        let Some(queue) = self.queue(connection) else {
            return DeliveryOutcome::UnknownConnection;
        };
        self.enqueue(connection, &queue, message)
    }

    /// Log a writer failure and cut the connection.
    pub fn report_failure(&self, connection: ConnectionId, error: &DeliveryError) {
        metrics::record_delivery_failure();
        tracing::warn!(connection, error = %error, "WebSocket delivery failed");
        self.disconnect(connection, "delivery failure");
    }

    /// Queue of a live connection.
    #[must_use]
    pub fn queue(&self, connection: ConnectionId) -> Option<Arc<OutboundQueue>> {
        self.connections.read().get(&connection).cloned()
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    fn enqueue(
        &self,
        connection: ConnectionId,
        queue: &OutboundQueue,
        message: ServerMessage,
    ) -> DeliveryOutcome {
        match queue.push(message) {
            PushOutcome::Queued => DeliveryOutcome::Queued,
            PushOutcome::Closed => DeliveryOutcome::UnknownConnection,
            PushOutcome::Dropped => {
                metrics::record_events_dropped(1);
                let dropped = queue.total_dropped();
                if self.config.max_dropped > 0 && dropped > self.config.max_dropped {
                    tracing::warn!(connection, dropped, "Connection too far behind, disconnecting");
                    self.disconnect(connection, "too many dropped updates");
                    DeliveryOutcome::Disconnected
                } else {
                    tracing::debug!(connection, dropped, "Outbound queue full, dropped oldest update");
                    DeliveryOutcome::QueuedWithDrop
                }
            }
        }
    }
}

impl DeliveryPort for WebSocketBroadcaster {
    fn deliver(&self, connection: ConnectionId, event: &OrderEvent) -> DeliveryOutcome {
        self.send(connection, ServerMessage::OrderUpdate(event.clone()))
    }
}
