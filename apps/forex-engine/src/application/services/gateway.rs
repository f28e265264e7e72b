//! Command Gateway
//!
//! Entry point for client commands. Validates input, talks to the store and
//! the engine, and returns order snapshots.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::metrics;
use crate::application::ports::{OrderFilter, OrderStore, commit_with_retry};
use crate::application::services::{EventBus, MatchingEngine};
use crate::domain::order::{
    AccountId, Instrument, Order, OrderCommand, OrderError, OrderId, OrderStateMachine, Side,
};

/// A new-order request, as received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOrder {
    /// Account placing the order.
    pub account: String,
    /// Currency pair, e.g. `EUR/USD` or `EURUSD`.
    pub instrument: String,
    /// `buy` or `sell`.
    pub side: String,
    /// Quantity, must be positive.
    pub quantity: Decimal,
    /// Limit price; omitted for market orders.
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Gateway tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Balance given to accounts on first use.
    pub default_balance: Decimal,
    /// Retries on version conflict before giving up.
    pub commit_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_balance: Decimal::from(100_000),
            commit_retries: 3,
        }
    }
}

/// Result of a bulk snapshot request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    /// Orders that exist, in request order.
    pub orders: Vec<Order>,
    /// Requested IDs that do not exist.
    pub not_found: Vec<OrderId>,
}

/// Client-facing order commands.
pub struct OrderGateway {
    store: Arc<dyn OrderStore>,
    engine: Arc<MatchingEngine>,
    bus: Arc<EventBus>,
    config: GatewayConfig,
}

impl OrderGateway {
    /// Create a gateway.
    pub fn new(
        store: Arc<dyn OrderStore>,
        engine: Arc<MatchingEngine>,
        bus: Arc<EventBus>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            store,
            engine,
            bus,
            config,
        }
    }

    /// Accept a new order.
    ///
    /// Returns the `PENDING` snapshot at version 0; the engine's first tick
    /// is already scheduled.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for malformed fields. Nothing is stored in that
    /// case.
    pub fn submit(&self, request: SubmitOrder) -> Result<Order, OrderError> {
        let account_id = AccountId::parse(&request.account)?;
        let instrument = Instrument::parse(&request.instrument)?;
        let side = Side::parse(&request.side)?;
        let order = Order::new(
            OrderId::generate(),
            account_id,
            instrument,
            side,
            request.quantity,
            request.price,
            Utc::now(),
        )?;

        self.store
            .provision_account(order.account_id(), self.config.default_balance);
        let order = self.store.insert(order)?;
        metrics::record_order_submitted();

        tracing::info!(
            order_id = %order.id(),
            account_id = %order.account_id(),
            instrument = %order.instrument(),
            side = %order.side(),
            quantity = %order.quantity(),
            "Order accepted"
        );

        self.engine.start(&order);
        Ok(order)
    }

    /// Cancel an order.
    ///
    /// # Errors
    ///
    /// - `NotFound` for unknown orders
    /// - `NotCancelable` if the order is already terminal
    /// - `Conflict` if retries are exhausted
    pub fn cancel(&self, order_id: &OrderId) -> Result<Order, OrderError> {
        let cancel =
            |current: &Order| OrderStateMachine::apply(current, &OrderCommand::Cancel, Utc::now());
        let (order, event) = commit_with_retry(
            self.store.as_ref(),
            order_id,
            self.config.commit_retries,
            &cancel,
        )?;

        metrics::record_transition(order.status());
        self.bus.publish(event);
        self.engine.release_unfilled(&order);

        tracing::info!(
            order_id = %order_id,
            filled = %order.filled_quantity(),
            version = order.version(),
            "Order canceled"
        );
        Ok(order)
    }

    /// Latest snapshot of an order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown orders.
    pub fn get(&self, order_id: &OrderId) -> Result<Order, OrderError> {
        self.store.get(order_id)
    }

    /// Orders matching `filter`, oldest first.
    #[must_use]
    pub fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        self.store.list(filter)
    }

    /// Fill the remaining quantity immediately.
    ///
    /// # Errors
    ///
    /// See [`MatchingEngine::execute`].
    pub fn execute(&self, order_id: &OrderId) -> Result<Order, OrderError> {
        self.engine.execute(order_id)
    }

    /// Snapshots for a set of orders, split into found and missing.
    #[must_use]
    pub fn snapshot(&self, order_ids: &[OrderId]) -> OrderSnapshot {
        let mut snapshot = OrderSnapshot::default();
        for id in order_ids {
            match self.store.get(id) {
                Ok(order) => snapshot.orders.push(order),
                Err(_) => snapshot.not_found.push(id.clone()),
            }
        }
        snapshot
    }
}

impl std::fmt::Debug for OrderGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
