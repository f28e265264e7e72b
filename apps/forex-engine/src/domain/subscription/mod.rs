//! Subscription Registry
//!
//! Tracks which WebSocket connections want updates for which orders and
//! accounts, and routes order events to them.
//!
//! # Design
//!
//! The registry keeps three indexes, each behind its own lock:
//! - order ID -> connections
//! - account ID -> connections
//! - connections subscribed to everything (admin view)
//!
//! Routing takes read locks only, so concurrent publishers never serialize
//! on the registry.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::order::{AccountId, OrderEvent, OrderId};

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a WebSocket connection.
pub type ConnectionId = u64;

/// What a connection wants to hear about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interest {
    /// Specific orders.
    pub order_ids: HashSet<OrderId>,
    /// Every order of these accounts.
    pub account_ids: HashSet<AccountId>,
    /// Every order in the system.
    pub all: bool,
}

impl Interest {
    /// Interest in specific orders.
    #[must_use]
    pub fn orders(ids: impl IntoIterator<Item = OrderId>) -> Self {
        Self {
            order_ids: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Interest in every order of specific accounts.
    #[must_use]
    pub fn accounts(ids: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            account_ids: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Interest in every order.
    #[must_use]
    pub fn everything() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    /// True if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order_ids.is_empty() && self.account_ids.is_empty() && !self.all
    }

    /// True if `event` falls within this interest.
    #[must_use]
    pub fn matches(&self, event: &OrderEvent) -> bool {
        self.all
            || self.order_ids.contains(&event.order_id)
            || self.account_ids.contains(&event.account_id)
    }
}

// =============================================================================
// Index (one key type)
// =============================================================================

/// Bidirectional connection <-> key index.
#[derive(Debug)]
struct InterestIndex<K> {
    by_connection: HashMap<ConnectionId, HashSet<K>>,
    by_key: HashMap<K, HashSet<ConnectionId>>,
}

impl<K> Default for InterestIndex<K> {
    fn default() -> Self {
        Self {
            by_connection: HashMap::new(),
            by_key: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> InterestIndex<K> {
    fn add<'a>(&mut self, connection: ConnectionId, keys: impl IntoIterator<Item = &'a K>)
    where
        K: 'a,
    {
        let connection_keys = self.by_connection.entry(connection).or_default();
        for key in keys {
            // Skip if already subscribed
            if !connection_keys.insert(key.clone()) {
                continue;
            }
            self.by_key.entry(key.clone()).or_default().insert(connection);
        }
        if connection_keys.is_empty() {
            self.by_connection.remove(&connection);
        }
    }

    fn remove<'a>(&mut self, connection: ConnectionId, keys: impl IntoIterator<Item = &'a K>)
    where
        K: 'a,
    {
        let Some(connection_keys) = self.by_connection.get_mut(&connection) else {
            return;
        };

        for key in keys {
            if !connection_keys.remove(key) {
                continue;
            }
            detach(&mut self.by_key, key, connection);
        }

        // Clean up empty connection entry
        if connection_keys.is_empty() {
            self.by_connection.remove(&connection);
        }
    }

    fn remove_connection(&mut self, connection: ConnectionId) -> bool {
        let Some(keys) = self.by_connection.remove(&connection) else {
            return false;
        };
        for key in &keys {
            detach(&mut self.by_key, key, connection);
        }
        true
    }

    fn lookup(&self, key: &K) -> Option<&HashSet<ConnectionId>> {
        self.by_key.get(key)
    }

    fn keys_of(&self, connection: ConnectionId) -> HashSet<K> {
        self.by_connection
            .get(&connection)
            .cloned()
            .unwrap_or_default()
    }

    fn key_count(&self) -> usize {
        self.by_key.len()
    }

    fn connections(&self) -> impl Iterator<Item = &ConnectionId> {
        self.by_connection.keys()
    }
}

fn detach<K: Eq + Hash>(
    by_key: &mut HashMap<K, HashSet<ConnectionId>>,
    key: &K,
    connection: ConnectionId,
) {
    if let Some(connections) = by_key.get_mut(key) {
        connections.remove(&connection);
        if connections.is_empty() {
            by_key.remove(key);
        }
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Maps connections to their interest and routes events to connections.
///
/// # Example
///
/// ```rust
/// use forex_engine::domain::order::{AccountId, OrderId};
/// use forex_engine::domain::subscription::{Interest, SubscriptionRegistry};
///
/// let registry = SubscriptionRegistry::new();
///
/// registry.subscribe(1, &Interest::orders([OrderId::new("o-1")]));
/// registry.subscribe(2, &Interest::accounts([AccountId::new("acc-1")]));
///
/// assert!(registry.interest(1).order_ids.contains(&OrderId::new("o-1")));
///
/// registry.unsubscribe(1);
/// assert!(registry.interest(1).is_empty());
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    orders: RwLock<InterestIndex<OrderId>>,
    accounts: RwLock<InterestIndex<AccountId>>,
    all: RwLock<HashSet<ConnectionId>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `interest` into the connection's existing interest.
    ///
    /// Returns the connection's full interest afterwards.
    pub fn subscribe(&self, connection: ConnectionId, interest: &Interest) -> Interest {
        if !interest.order_ids.is_empty() {
            self.orders.write().add(connection, &interest.order_ids);
        }
        if !interest.account_ids.is_empty() {
            self.accounts.write().add(connection, &interest.account_ids);
        }
        if interest.all {
            self.all.write().insert(connection);
        }
        self.interest(connection)
    }

    /// Remove part of a connection's interest.
    ///
    /// Returns what remains.
    pub fn remove_interest(&self, connection: ConnectionId, interest: &Interest) -> Interest {
        if !interest.order_ids.is_empty() {
            self.orders.write().remove(connection, &interest.order_ids);
        }
        if !interest.account_ids.is_empty() {
            self.accounts
                .write()
                .remove(connection, &interest.account_ids);
        }
        if interest.all {
            self.all.write().remove(&connection);
        }
        self.interest(connection)
    }

    /// Drop everything a connection subscribed to.
    ///
    /// Returns true if the connection had any interest.
    pub fn unsubscribe(&self, connection: ConnectionId) -> bool {
        let had_orders = self.orders.write().remove_connection(connection);
        let had_accounts = self.accounts.write().remove_connection(connection);
        let had_all = self.all.write().remove(&connection);
        had_orders || had_accounts || had_all
    }

    /// Connections that should receive `event`.
    #[must_use]
    pub fn route(&self, event: &OrderEvent) -> HashSet<ConnectionId> {
        let mut targets: HashSet<ConnectionId> = self.all.read().clone();

        if let Some(connections) = self.orders.read().lookup(&event.order_id) {
            targets.extend(connections);
        }
        if let Some(connections) = self.accounts.read().lookup(&event.account_id) {
            targets.extend(connections);
        }

        targets
    }

    /// Current interest of a connection (empty if unknown).
    #[must_use]
    pub fn interest(&self, connection: ConnectionId) -> Interest {
        Interest {
            order_ids: self.orders.read().keys_of(connection),
            account_ids: self.accounts.read().keys_of(connection),
            all: self.all.read().contains(&connection),
        }
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        let orders = self.orders.read();
        let accounts = self.accounts.read();
        let all = self.all.read();

        let connections: HashSet<ConnectionId> = orders
            .connections()
            .chain(accounts.connections())
            .chain(all.iter())
            .copied()
            .collect();

        SubscriptionStats {
            connection_count: connections.len(),
            order_count: orders.key_count(),
            account_count: accounts.key_count(),
            all_count: all.len(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStats {
    /// Connections with any interest.
    pub connection_count: usize,
    /// Distinct orders with at least one subscriber.
    pub order_count: usize,
    /// Distinct accounts with at least one subscriber.
    pub account_count: usize,
    /// Connections subscribed to everything.
    pub all_count: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::order::OrderStatus;

    fn event(order: &str, account: &str) -> OrderEvent {
        OrderEvent {
            order_id: OrderId::new(order),
            account_id: AccountId::new(account),
            status: OrderStatus::PartiallyFilled,
            delta: Decimal::ONE,
            filled_quantity: Decimal::ONE,
            version: 1,
            timestamp: Utc::now(),
            reason: None,
        }
    }

    #[test]
    fn route_by_order_id() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(1, &Interest::orders([OrderId::new("o-1")]));
        registry.subscribe(2, &Interest::orders([OrderId::new("o-2")]));

        let targets = registry.route(&event("o-1", "acc"));

        assert_eq!(targets, HashSet::from([1]));
    }

    #[test]
    fn route_by_account_id() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(1, &Interest::accounts([AccountId::new("acc-1")]));

        assert_eq!(registry.route(&event("any", "acc-1")), HashSet::from([1]));
        assert!(registry.route(&event("any", "acc-2")).is_empty());
    }

    #[test]
    fn route_is_union_without_duplicates() {
        let registry = SubscriptionRegistry::new();
        let mut interest = Interest::orders([OrderId::new("o-1")]);
        interest.account_ids.insert(AccountId::new("acc-1"));
        interest.all = true;
        registry.subscribe(1, &interest);
        registry.subscribe(2, &Interest::everything());
        registry.subscribe(3, &Interest::accounts([AccountId::new("acc-1")]));

        let targets = registry.route(&event("o-1", "acc-1"));

        assert_eq!(targets, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn subscribe_merges_interest() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(1, &Interest::orders([OrderId::new("o-1")]));
        let merged = registry.subscribe(1, &Interest::orders([OrderId::new("o-2")]));

        assert_eq!(merged.order_ids.len(), 2);
        assert!(!merged.all);
    }

    #[test]
    fn duplicate_subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(1, &Interest::orders([OrderId::new("o-1")]));
        registry.subscribe(1, &Interest::orders([OrderId::new("o-1")]));

        assert_eq!(registry.stats().order_count, 1);
        assert_eq!(registry.route(&event("o-1", "acc")).len(), 1);
    }

    #[test]
    fn remove_interest_keeps_the_rest() {
        let registry = SubscriptionRegistry::new();
        let mut interest = Interest::orders([OrderId::new("o-1"), OrderId::new("o-2")]);
        interest.all = true;
        registry.subscribe(1, &interest);

        let mut removal = Interest::orders([OrderId::new("o-1")]);
        removal.all = true;
        let remaining = registry.remove_interest(1, &removal);

        assert_eq!(remaining, Interest::orders([OrderId::new("o-2")]));
        assert!(registry.route(&event("o-1", "acc")).is_empty());
        assert_eq!(registry.route(&event("o-2", "acc")), HashSet::from([1]));
    }

    #[test]
    fn unsubscribe_cleans_up_every_index() {
        let registry = SubscriptionRegistry::new();
        let mut interest = Interest::orders([OrderId::new("o-1")]);
        interest.account_ids.insert(AccountId::new("acc-1"));
        interest.all = true;
        registry.subscribe(7, &interest);

        assert!(registry.unsubscribe(7));
        assert!(!registry.unsubscribe(7));
        assert!(registry.interest(7).is_empty());
        assert_eq!(registry.stats(), SubscriptionStats::default());
        assert!(registry.route(&event("o-1", "acc-1")).is_empty());
    }

    #[test]
    fn unsubscribe_leaves_other_connections() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(1, &Interest::orders([OrderId::new("o-1")]));
        registry.subscribe(2, &Interest::orders([OrderId::new("o-1")]));

        registry.unsubscribe(1);

        assert_eq!(registry.route(&event("o-1", "acc")), HashSet::from([2]));
    }

    #[test]
    fn stats_count_distinct_connections() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(1, &Interest::orders([OrderId::new("o-1")]));
        registry.subscribe(1, &Interest::accounts([AccountId::new("acc-1")]));
        registry.subscribe(2, &Interest::everything());

        let stats = registry.stats();
        assert_eq!(stats.connection_count, 2);
        assert_eq!(stats.order_count, 1);
        assert_eq!(stats.account_count, 1);
        assert_eq!(stats.all_count, 1);
    }

    #[test]
    fn empty_interest_is_noop() {
        let registry = SubscriptionRegistry::new();
        let interest = registry.subscribe(1, &Interest::default());
        assert!(interest.is_empty());
        assert_eq!(registry.stats().connection_count, 0);
    }

    #[test]
    fn interest_matches_event() {
        let interest = Interest::accounts([AccountId::new("acc-1")]);
        assert!(interest.matches(&event("o-9", "acc-1")));
        assert!(!interest.matches(&event("o-9", "acc-2")));
        assert!(Interest::everything().matches(&event("x", "y")));
    }
}
