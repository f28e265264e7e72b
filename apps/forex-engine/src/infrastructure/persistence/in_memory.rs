//! In-memory order store.
//!
//! Each order and each account sits behind its own mutex. The outer maps are
//! only locked long enough to find (or insert) the record, so writers to
//! different orders never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

use crate::application::ports::{OrderFilter, OrderMutation, OrderStore};
use crate::domain::account::Account;
use crate::domain::order::{AccountId, Order, OrderError, OrderEvent, OrderId};

type Shared<T> = Arc<Mutex<T>>;

/// In-memory implementation of [`OrderStore`].
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Shared<Order>>>,
    accounts: RwLock<HashMap<AccountId, Shared<Account>>>,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// True if no order has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    fn order_slot(&self, id: &OrderId) -> Result<Shared<Order>, OrderError> {
        self.orders
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| OrderError::order_not_found(id.as_str()))
    }

    fn account_slot(&self, id: &AccountId) -> Result<Shared<Account>, OrderError> {
        self.accounts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| OrderError::NotFound {
                entity: "account",
                id: id.to_string(),
            })
    }
}

impl OrderStore for InMemoryOrderStore {
    fn insert(&self, order: Order) -> Result<Order, OrderError> {
        let mut orders = self.orders.write();
        if orders.contains_key(order.id()) {
            return Err(OrderError::DuplicateOrderId {
                order_id: order.id().to_string(),
            });
        }
        orders.insert(order.id().clone(), Arc::new(Mutex::new(order.clone())));
        Ok(order)
    }

    fn get(&self, id: &OrderId) -> Result<Order, OrderError> {
        Ok(self.order_slot(id)?.lock().clone())
    }

    fn commit(
        &self,
        id: &OrderId,
        expected_version: u64,
        mutation: OrderMutation<'_>,
    ) -> Result<(Order, OrderEvent), OrderError> {
        let slot = self.order_slot(id)?;
        let mut current = slot.lock();

        if current.version() != expected_version {
            return Err(OrderError::Conflict {
                order_id: id.to_string(),
                expected: expected_version,
                actual: current.version(),
            });
        }

        let transition = mutation(&current)?;
        if transition.order.id() != id || transition.order.version() != expected_version + 1 {
            return Err(OrderError::Conflict {
                order_id: id.to_string(),
                expected: expected_version + 1,
                actual: transition.order.version(),
            });
        }

        *current = transition.order.clone();
        Ok((transition.order, transition.event))
    }

    fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        let slots: Vec<Shared<Order>> = self.orders.read().values().cloned().collect();
        let mut orders: Vec<Order> = slots
            .iter()
            .map(|slot| slot.lock().clone())
            .filter(|order| filter.matches(order))
            .collect();
        orders.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        orders
    }

    fn provision_account(&self, id: &AccountId, initial_balance: Decimal) -> Account {
        if let Ok(slot) = self.account_slot(id) {
            return slot.lock().clone();
        }

        let slot = Arc::clone(
            self.accounts
                .write()
                .entry(id.clone())
                .or_insert_with(|| {
                    tracing::info!(account_id = %id, balance = %initial_balance, "Account provisioned");
                    Arc::new(Mutex::new(Account::new(id.clone(), initial_balance)))
                }),
        );
        slot.lock().clone()
    }

    fn account(&self, id: &AccountId) -> Result<Account, OrderError> {
        Ok(self.account_slot(id)?.lock().clone())
    }

    fn reserve_margin(
        &self,
        account: &AccountId,
        order: &OrderId,
        amount: Decimal,
    ) -> Result<Decimal, OrderError> {
        self.account_slot(account)?.lock().reserve(order, amount)
    }

    fn release_margin(&self, account: &AccountId, order: &OrderId, fraction: Decimal) -> Decimal {
        self.account_slot(account)
            .map_or(Decimal::ZERO, |slot| slot.lock().release(order, fraction))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::commit_with_retry;
    use crate::domain::order::{
        ErrorKind, Instrument, OrderCommand, OrderStateMachine, OrderStatus, Side, Transition,
    };

    fn order_at(account: &str, offset_secs: i64) -> Order {
        Order::new(
            OrderId::generate(),
            AccountId::new(account),
            Instrument::parse("EUR/USD").unwrap(),
            Side::Buy,
            dec!(100),
            Some(dec!(1.0850)),
            Utc::now() + Duration::seconds(offset_secs),
        )
        .unwrap()
    }

    fn fill(quantity: Decimal) -> impl Fn(&Order) -> Result<Transition, OrderError> + Send + Sync {
        move |order: &Order| {
            OrderStateMachine::apply(order, &OrderCommand::Fill { quantity }, Utc::now())
        }
    }

    #[test]
    fn insert_then_get() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(order_at("acc", 0)).unwrap();

        assert_eq!(store.get(order.id()).unwrap(), order);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(order_at("acc", 0)).unwrap();

        let err = store.insert(order).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictError);
    }

    #[test]
    fn get_unknown_is_not_found() {
        let store = InMemoryOrderStore::new();
        let err = store.get(&OrderId::new("missing")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn commit_bumps_version_and_returns_event() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(order_at("acc", 0)).unwrap();

        let (committed, event) = store.commit(order.id(), 0, &fill(dec!(40))).unwrap();

        assert_eq!(committed.version(), 1);
        assert_eq!(committed.status(), OrderStatus::PartiallyFilled);
        assert_eq!(event.delta, dec!(40));
        assert_eq!(store.get(order.id()).unwrap(), committed);
    }

    #[test]
    fn stale_version_conflicts_and_leaves_order_untouched() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(order_at("acc", 0)).unwrap();
        store.commit(order.id(), 0, &fill(dec!(10))).unwrap();

        let err = store.commit(order.id(), 0, &fill(dec!(10))).unwrap_err();

        assert!(matches!(
            err,
            OrderError::Conflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
        assert_eq!(store.get(order.id()).unwrap().filled_quantity(), dec!(10));
    }

    #[test]
    fn failed_mutation_stores_nothing() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(order_at("acc", 0)).unwrap();

        let err = store.commit(order.id(), 0, &fill(dec!(500))).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(store.get(order.id()).unwrap().version(), 0);
    }

    #[test]
    fn list_filters_and_sorts_oldest_first() {
        let store = InMemoryOrderStore::new();
        let late = store.insert(order_at("a", 10)).unwrap();
        let early = store.insert(order_at("a", -10)).unwrap();
        store.insert(order_at("b", 0)).unwrap();

        let listed = store.list(&OrderFilter {
            account_id: Some(AccountId::new("a")),
            status: None,
        });

        let ids: Vec<&OrderId> = listed.iter().map(Order::id).collect();
        assert_eq!(ids, vec![early.id(), late.id()]);
        assert_eq!(store.list(&OrderFilter::default()).len(), 3);
    }

    #[test]
    fn provisioning_is_idempotent() {
        let store = InMemoryOrderStore::new();
        let id = AccountId::new("acc");

        let first = store.provision_account(&id, dec!(1000));
        let second = store.provision_account(&id, dec!(5));

        assert_eq!(first.balance(), dec!(1000));
        assert_eq!(second.balance(), dec!(1000));
    }

    #[test]
    fn margin_reserve_and_release() {
        let store = InMemoryOrderStore::new();
        let account = AccountId::new("acc");
        let order = OrderId::new("o-1");
        store.provision_account(&account, dec!(100));

        assert_eq!(store.reserve_margin(&account, &order, dec!(60)).unwrap(), dec!(60));
        let err = store
            .reserve_margin(&account, &OrderId::new("o-2"), dec!(60))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountConstraintError);

        assert_eq!(store.release_margin(&account, &order, Decimal::ONE), dec!(60));
        assert_eq!(store.account(&account).unwrap().available_margin(), dec!(100));
    }

    #[test]
    fn release_on_unknown_account_is_zero() {
        let store = InMemoryOrderStore::new();
        assert_eq!(
            store.release_margin(&AccountId::new("nobody"), &OrderId::new("o"), Decimal::ONE),
            Decimal::ZERO
        );
    }

    #[test]
    fn concurrent_writers_never_lose_a_fill() {
        let store = Arc::new(InMemoryOrderStore::new());
        let order = store.insert(order_at("acc", 0)).unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = order.id().clone();
                thread::spawn(move || commit_with_retry(store.as_ref(), &id, 50, &fill(dec!(10))))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let done = store.get(order.id()).unwrap();
        assert_eq!(done.status(), OrderStatus::Filled);
        assert_eq!(done.filled_quantity(), dec!(100));
        assert_eq!(done.version(), 10);
    }
}
