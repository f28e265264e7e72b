//! Order events.
//!
//! One event per committed transition. Order creation is not an event:
//! versions seen by subscribers start at 1.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{AccountId, Order, OrderId, OrderStatus};

/// A committed order-state change, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    /// Order the change applies to.
    pub order_id: OrderId,
    /// Owning account.
    pub account_id: AccountId,
    /// Status after the change.
    pub status: OrderStatus,
    /// Quantity filled by this transition (zero for cancel/reject).
    #[serde(with = "rust_decimal::serde::float")]
    pub delta: Decimal,
    /// Cumulative filled quantity after the change.
    #[serde(with = "rust_decimal::serde::float")]
    pub filled_quantity: Decimal,
    /// Order version after the change.
    pub version: u64,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
    /// Reject reason, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OrderEvent {
    /// Build the event describing `order`'s current state.
    #[must_use]
    pub fn for_order(order: &Order, delta: Decimal) -> Self {
        Self {
            order_id: order.id().clone(),
            account_id: order.account_id().clone(),
            status: order.status(),
            delta,
            filled_quantity: order.filled_quantity(),
            version: order.version(),
            timestamp: order.updated_at(),
            reason: order.reject_reason().map(ToString::to_string),
        }
    }

    /// True if this is the order's last event.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
