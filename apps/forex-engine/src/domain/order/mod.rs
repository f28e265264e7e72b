//! Order Aggregate
//!
//! The order record, its identifiers and value objects, the events it emits
//! and the state machine that is the only path to mutating it.
//!
//! Fields of [`Order`] are private; status, filled quantity and version
//! change only through [`OrderStateMachine::apply`].

mod error;
mod event;
mod state_machine;
mod status;

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use error::{ErrorKind, OrderError};
pub use event::OrderEvent;
pub use state_machine::{OrderCommand, OrderStateMachine, Transition};
pub use status::OrderStatus;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique order identifier (UUID v4 string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trading account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a client-supplied account ID.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the ID is blank.
    pub fn parse(raw: &str) -> Result<Self, OrderError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(OrderError::validation("account", "must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Value Objects
// =============================================================================

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy the base currency.
    Buy,
    /// Sell the base currency.
    Sell,
}

impl Side {
    /// Parse a side, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for anything other than `buy` or `sell`.
    pub fn parse(raw: &str) -> Result<Self, OrderError> {
        match raw.trim().to_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(OrderError::validation(
                "side",
                format!("expected 'buy' or 'sell', got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}

/// Six-letter currency pair, e.g. `EURUSD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    /// Parse a currency pair. Accepts `eur/usd`, `EURUSD` and similar.
    ///
    /// # Errors
    ///
    /// Returns `Validation` unless the pair is six ASCII letters once the
    /// optional `/` separator is removed.
    pub fn parse(raw: &str) -> Result<Self, OrderError> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '/')
            .collect::<String>()
            .to_ascii_uppercase();

        if normalized.len() != 6 || !normalized.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(OrderError::validation(
                "instrument",
                format!("'{raw}' is not a six-letter currency pair"),
            ));
        }
        if normalized[..3] == normalized[3..] {
            return Err(OrderError::validation(
                "instrument",
                "base and quote currency must differ",
            ));
        }
        Ok(Self(normalized))
    }

    /// Borrow the pair string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base currency code.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.0[..3]
    }

    /// Quote currency code.
    #[must_use]
    pub fn quote(&self) -> &str {
        &self.0[3..]
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Order
// =============================================================================

/// A forex order and its lifecycle state.
///
/// Serializes as the client-facing snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    account_id: AccountId,
    instrument: Instrument,
    side: Side,
    #[serde(with = "rust_decimal::serde::float")]
    quantity: Decimal,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    price: Option<Decimal>,
    status: OrderStatus,
    #[serde(with = "rust_decimal::serde::float")]
    filled_quantity: Decimal,
    version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reject_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new `PENDING` order at version 0.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if quantity is not positive or a price is given
    /// that is not positive.
    pub fn new(
        id: OrderId,
        account_id: AccountId,
        instrument: Instrument,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if quantity <= Decimal::ZERO {
            return Err(OrderError::validation("quantity", "must be greater than zero"));
        }
        if let Some(price) = price
            && price <= Decimal::ZERO
        {
            return Err(OrderError::validation("price", "must be greater than zero"));
        }

        Ok(Self {
            id,
            account_id,
            instrument,
            side,
            quantity,
            price,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            version: 0,
            reject_reason: None,
            created_at,
            updated_at: created_at,
        })
    }

    /// Order ID.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    /// Owning account.
    #[must_use]
    pub const fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Currency pair.
    #[must_use]
    pub const fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Buy or sell.
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Requested quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Limit price, `None` for market orders.
    #[must_use]
    pub const fn price(&self) -> Option<Decimal> {
        self.price
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Cumulative filled quantity.
    #[must_use]
    pub const fn filled_quantity(&self) -> Decimal {
        self.filled_quantity
    }

    /// Quantity still open.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    /// Monotonic version, bumped by every committed transition.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Why the engine rejected the order, if it did.
    #[must_use]
    pub fn reject_reason(&self) -> Option<&str> {
        self.reject_reason.as_deref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last committed transition.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True for market orders.
    #[must_use]
    pub const fn is_market(&self) -> bool {
        self.price.is_none()
    }

    /// Order value, using `reference_price` for market orders.
    ///
    /// `None` if the product does not fit in a `Decimal`.
    #[must_use]
    pub fn notional(&self, reference_price: Decimal) -> Option<Decimal> {
        self.quantity
            .checked_mul(self.price.unwrap_or(reference_price))
    }

    /// Share of the order still unfilled, in `[0, 1]`.
    #[must_use]
    pub fn unfilled_fraction(&self) -> Decimal {
        self.remaining_quantity() / self.quantity
    }
}
