//! Event Bus
//!
//! Fans committed order events out to interested connections.
//!
//! # Ordering
//!
//! Publishers call [`EventBus::publish`] right after their commit, but two
//! publishers for the same order can race between commit and publish. A
//! per-order sequencer restores commit order: it tracks the next version to
//! dispatch, buffers anything that arrives early and drops anything already
//! seen. Dispatch for one order happens under that order's sequencer lock,
//! so every connection's queue receives the order's events gap-free and in
//! version order. Different orders never share a lock beyond the map lookup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::metrics;
use crate::application::ports::{DeliveryOutcome, DeliveryPort};
use crate::domain::order::{OrderEvent, OrderId};
use crate::domain::subscription::SubscriptionRegistry;

// =============================================================================
// Sequencer
// =============================================================================

/// Restores per-order version order.
#[derive(Debug)]
struct OrderSequencer {
    next_version: u64,
    pending: BTreeMap<u64, OrderEvent>,
}

impl OrderSequencer {
    /// Versions start at 1: creation is not published.
    const fn new() -> Self {
        Self {
            next_version: 1,
            pending: BTreeMap::new(),
        }
    }

    /// Accept one event and return everything now ready, in order.
    fn accept(&mut self, event: OrderEvent) -> Vec<OrderEvent> {
        if event.version < self.next_version || self.pending.contains_key(&event.version) {
            tracing::warn!(
                order_id = %event.order_id,
                version = event.version,
                next_version = self.next_version,
                "Dropping duplicate order event"
            );
            return Vec::new();
        }

        if event.version > self.next_version {
            tracing::debug!(
                order_id = %event.order_id,
                version = event.version,
                next_version = self.next_version,
                "Buffering out-of-order event"
            );
            metrics::record_event_resequenced();
            self.pending.insert(event.version, event);
            return Vec::new();
        }

        let mut ready = vec![event];
        self.next_version += 1;
        while let Some(next) = self.pending.remove(&self.next_version) {
            ready.push(next);
            self.next_version += 1;
        }
        ready
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Routes committed events to subscribers in per-order version order.
pub struct EventBus {
    registry: Arc<SubscriptionRegistry>,
    delivery: Arc<dyn DeliveryPort>,
    sequencers: Mutex<HashMap<OrderId, Arc<Mutex<OrderSequencer>>>>,
}

impl EventBus {
    /// Create a bus routing through `registry` and delivering via `delivery`.
    pub fn new(registry: Arc<SubscriptionRegistry>, delivery: Arc<dyn DeliveryPort>) -> Self {
        Self {
            registry,
            delivery,
            sequencers: Mutex::new(HashMap::new()),
        }
    }

    /// Publish a committed event.
    ///
    /// Never fails. Delivery problems are counted and logged; they never
    /// affect the committed order.
    pub fn publish(&self, event: OrderEvent) {
        metrics::record_event_published();
        let order_id = event.order_id.clone();

        let sequencer = Arc::clone(
            self.sequencers
                .lock()
                .entry(order_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(OrderSequencer::new()))),
        );

        let mut finished = false;
        {
            let mut sequencer = sequencer.lock();
            for ready in sequencer.accept(event) {
                self.dispatch(&ready);
                finished |= ready.is_terminal();
            }
        }

        if finished {
            self.sequencers.lock().remove(&order_id);
        }
    }

    /// Orders with a live sequencer (events seen, not yet terminal).
    #[must_use]
    pub fn tracked_orders(&self) -> usize {
        self.sequencers.lock().len()
    }

    /// The registry this bus routes through.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    fn dispatch(&self, event: &OrderEvent) {
        let targets = self.registry.route(event);
        tracing::debug!(
            order_id = %event.order_id,
            status = %event.status,
            version = event.version,
            targets = targets.len(),
            "Dispatching order event"
        );

        for connection in targets {
            let outcome = self.delivery.deliver(connection, event);
            metrics::record_delivery(outcome);
            if outcome != DeliveryOutcome::Queued {
                tracing::debug!(connection, ?outcome, order_id = %event.order_id, "Delivery degraded");
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("tracked_orders", &self.tracked_orders())
            .finish_non_exhaustive()
    }
}
