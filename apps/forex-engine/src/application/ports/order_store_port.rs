//! Order Store Port (Driven Port)
//!
//! The store is the single owner of order and account records. Callers get
//! clones; the only way to change an order is [`OrderStore::commit`].

use rust_decimal::Decimal;

use crate::application::metrics;
use crate::domain::account::Account;
use crate::domain::order::{AccountId, Order, OrderError, OrderEvent, OrderId, OrderStatus, Transition};

/// A state-machine step evaluated against the latest committed order.
pub type OrderMutation<'a> = &'a (dyn Fn(&Order) -> Result<Transition, OrderError> + Send + Sync);

/// Filter for [`OrderStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Only orders of this account.
    pub account_id: Option<AccountId>,
    /// Only orders in this status.
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    /// True if `order` passes the filter.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.account_id
            .as_ref()
            .is_none_or(|account| order.account_id() == account)
            && self.status.is_none_or(|status| order.status() == status)
    }
}

/// Authoritative storage for orders and accounts.
///
/// Implementations serialize writers per order; different orders never
/// contend with each other.
pub trait OrderStore: Send + Sync {
    /// Store a new order.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateOrderId` if the ID is taken.
    fn insert(&self, order: Order) -> Result<Order, OrderError>;

    /// Latest committed snapshot of an order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown IDs.
    fn get(&self, id: &OrderId) -> Result<Order, OrderError>;

    /// Atomically apply `mutation` to the order if its version is still
    /// `expected_version`.
    ///
    /// Returns the committed order and the event describing the change. The
    /// store never publishes the event itself.
    ///
    /// # Errors
    ///
    /// - `NotFound` for unknown IDs
    /// - `Conflict` if the stored version differs from `expected_version`
    /// - whatever `mutation` returns
    fn commit(
        &self,
        id: &OrderId,
        expected_version: u64,
        mutation: OrderMutation<'_>,
    ) -> Result<(Order, OrderEvent), OrderError>;

    /// Orders passing `filter`, oldest first.
    fn list(&self, filter: &OrderFilter) -> Vec<Order>;

    /// Fetch an account, creating it with `initial_balance` if it does not
    /// exist yet.
    fn provision_account(&self, id: &AccountId, initial_balance: Decimal) -> Account;

    /// Snapshot of an account.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown accounts.
    fn account(&self, id: &AccountId) -> Result<Account, OrderError>;

    /// Hold `amount` of margin on `account` for `order`. Idempotent per order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown accounts and `AccountConstraint` if
    /// available margin is insufficient.
    fn reserve_margin(
        &self,
        account: &AccountId,
        order: &OrderId,
        amount: Decimal,
    ) -> Result<Decimal, OrderError>;

    /// Release `fraction` of the margin held for `order`. Returns the
    /// released amount (zero if nothing was held).
    fn release_margin(&self, account: &AccountId, order: &OrderId, fraction: Decimal) -> Decimal;
}

/// Commit `mutation` against the latest version of the order, retrying on
/// version conflicts.
///
/// Each attempt re-reads the order, so the mutation is re-validated against
/// whatever another writer committed in between.
///
/// # Errors
///
/// Returns the first non-conflict error, or `Conflict` once `max_retries`
/// retries are used up.
pub fn commit_with_retry(
    store: &dyn OrderStore,
    id: &OrderId,
    max_retries: u32,
    mutation: OrderMutation<'_>,
) -> Result<(Order, OrderEvent), OrderError> {
    let mut attempt = 0;
    loop {
        let current = store.get(id)?;
        match store.commit(id, current.version(), mutation) {
            Err(OrderError::Conflict {
                expected, actual, ..
            }) if attempt < max_retries => {
                attempt += 1;
                metrics::record_commit_conflict();
                tracing::debug!(
                    order_id = %id,
                    expected,
                    actual,
                    attempt,
                    "Commit conflict, retrying against latest version"
                );
            }
            result => return result,
        }
    }
}
