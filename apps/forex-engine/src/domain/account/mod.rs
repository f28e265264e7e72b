//! Accounts and Margin
//!
//! Margin is held as one reservation per order. Available margin is the
//! balance minus every outstanding reservation; a reservation that would
//! take it below zero is refused.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::order::{AccountId, Order, OrderError, OrderId};

// =============================================================================
// Account
// =============================================================================

/// A simulated trading account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    id: AccountId,
    #[serde(with = "rust_decimal::serde::float")]
    balance: Decimal,
    reservations: HashMap<OrderId, Decimal>,
}

impl Account {
    /// Create an account with no reservations.
    #[must_use]
    pub fn new(id: AccountId, balance: Decimal) -> Self {
        Self {
            id,
            balance,
            reservations: HashMap::new(),
        }
    }

    /// Account ID.
    #[must_use]
    pub const fn id(&self) -> &AccountId {
        &self.id
    }

    /// Cash balance.
    #[must_use]
    pub const fn balance(&self) -> Decimal {
        self.balance
    }

    /// Sum of all outstanding reservations.
    #[must_use]
    pub fn reserved_margin(&self) -> Decimal {
        self.reservations.values().copied().sum()
    }

    /// Balance not held by any reservation.
    #[must_use]
    pub fn available_margin(&self) -> Decimal {
        self.balance - self.reserved_margin()
    }

    /// Margin held for `order`, if any.
    #[must_use]
    pub fn reservation(&self, order: &OrderId) -> Option<Decimal> {
        self.reservations.get(order).copied()
    }

    /// Hold `amount` of margin for `order`.
    ///
    /// Idempotent per order: if a reservation already exists it is returned
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AccountConstraint` if `amount` exceeds available margin.
    pub fn reserve(&mut self, order: &OrderId, amount: Decimal) -> Result<Decimal, OrderError> {
        if let Some(existing) = self.reservations.get(order) {
            return Ok(*existing);
        }

        let available = self.available_margin();
        if amount > available {
            return Err(OrderError::AccountConstraint {
                account_id: self.id.to_string(),
                message: format!(
                    "insufficient margin: required {amount}, available {available}"
                ),
            });
        }

        self.reservations.insert(order.clone(), amount);
        Ok(amount)
    }

    /// Release `fraction` (clamped to `[0, 1]`) of the margin held for
    /// `order`. Returns the amount released.
    pub fn release(&mut self, order: &OrderId, fraction: Decimal) -> Decimal {
        let fraction = fraction.clamp(Decimal::ZERO, Decimal::ONE);
        let Some(held) = self.reservations.get_mut(order) else {
            return Decimal::ZERO;
        };

        if fraction == Decimal::ONE {
            let released = *held;
            self.reservations.remove(order);
            return released;
        }

        let released = *held * fraction;
        *held -= released;
        released
    }
}

// =============================================================================
// Margin Policy
// =============================================================================

/// How much margin an order needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginPolicy {
    /// Fraction of notional held as margin.
    pub margin_rate: Decimal,
    /// Price assumed for market orders.
    pub reference_price: Decimal,
}

impl Default for MarginPolicy {
    fn default() -> Self {
        Self {
            margin_rate: Decimal::new(2, 2),
            reference_price: Decimal::ONE,
        }
    }
}

impl MarginPolicy {
    /// Margin required to carry `order`.
    ///
    /// # Errors
    ///
    /// Returns `AccountConstraint` if the notional or the margin overflows;
    /// no account can carry such an order.
    pub fn required_margin(&self, order: &Order) -> Result<Decimal, OrderError> {
        order
            .notional(self.reference_price)
            .and_then(|notional| notional.checked_mul(self.margin_rate))
            .ok_or_else(|| OrderError::AccountConstraint {
                account_id: order.account_id().to_string(),
                message: format!(
                    "insufficient margin: notional of {} x {} is out of range",
                    order.quantity(),
                    order.price().unwrap_or(self.reference_price)
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::order::{ErrorKind, Instrument, Side};

    fn account(balance: Decimal) -> Account {
        Account::new(AccountId::new("acc-1"), balance)
    }

    #[test]
    fn reserve_reduces_available_margin() {
        let mut acc = account(dec!(1000));
        let order = OrderId::new("o1");

        assert_eq!(acc.reserve(&order, dec!(300)).unwrap(), dec!(300));
        assert_eq!(acc.available_margin(), dec!(700));
        assert_eq!(acc.reserved_margin(), dec!(300));
        assert_eq!(acc.balance(), dec!(1000));
    }

    #[test]
    fn reserve_is_idempotent_per_order() {
        let mut acc = account(dec!(1000));
        let order = OrderId::new("o1");

        acc.reserve(&order, dec!(300)).unwrap();
        assert_eq!(acc.reserve(&order, dec!(500)).unwrap(), dec!(300));
        assert_eq!(acc.available_margin(), dec!(700));
    }

    #[test]
    fn reserve_refuses_to_go_negative() {
        let mut acc = account(dec!(100));
        acc.reserve(&OrderId::new("o1"), dec!(80)).unwrap();

        let err = acc.reserve(&OrderId::new("o2"), dec!(21)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountConstraintError);
        assert!(err.to_string().contains("insufficient margin"));
        assert_eq!(acc.available_margin(), dec!(20));
        assert!(acc.reservation(&OrderId::new("o2")).is_none());
    }

    #[test]
    fn release_fraction() {
        let mut acc = account(dec!(1000));
        let order = OrderId::new("o1");
        acc.reserve(&order, dec!(200)).unwrap();

        assert_eq!(acc.release(&order, dec!(0.25)), dec!(50));
        assert_eq!(acc.reservation(&order), Some(dec!(150)));

        assert_eq!(acc.release(&order, Decimal::ONE), dec!(150));
        assert!(acc.reservation(&order).is_none());
        assert_eq!(acc.available_margin(), dec!(1000));
    }

    #[test]
    fn release_unknown_order_is_noop() {
        let mut acc = account(dec!(1000));
        assert_eq!(acc.release(&OrderId::new("missing"), Decimal::ONE), Decimal::ZERO);
    }

    #[test]
    fn release_clamps_fraction() {
        let mut acc = account(dec!(1000));
        let order = OrderId::new("o1");
        acc.reserve(&order, dec!(200)).unwrap();

        assert_eq!(acc.release(&order, dec!(-1)), Decimal::ZERO);
        assert_eq!(acc.release(&order, dec!(3)), dec!(200));
    }

    #[test]
    fn required_margin_uses_rate_and_reference_price() {
        let policy = MarginPolicy {
            margin_rate: dec!(0.05),
            reference_price: dec!(1.2),
        };
        let market = Order::new(
            OrderId::new("o1"),
            AccountId::new("acc-1"),
            Instrument::parse("EURUSD").unwrap(),
            Side::Sell,
            dec!(1000),
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(policy.required_margin(&market).unwrap(), dec!(60));
    }

    #[test]
    fn required_margin_out_of_range_is_an_account_constraint() {
        let huge = Order::new(
            OrderId::new("o1"),
            AccountId::new("acc-1"),
            Instrument::parse("EURUSD").unwrap(),
            Side::Buy,
            dec!(1_000_000_000_000_000),
            Some(dec!(1_000_000_000_000_000)),
            Utc::now(),
        )
        .unwrap();

        let err = MarginPolicy::default().required_margin(&huge).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountConstraintError);
        assert!(err.to_string().contains("insufficient margin"));
    }
}
