//! Fill Policy Port
//!
//! Strategy deciding what the simulated market does with an order on a tick.

use rust_decimal::Decimal;

use crate::domain::order::Order;

/// Outcome of one tick, as decided by a [`FillPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillDecision {
    /// Fill this much (the engine clamps to the remaining quantity).
    Fill(Decimal),
    /// Reject the order with a reason.
    Reject(String),
    /// Nothing happens this tick.
    Wait,
}

/// Pluggable fill/reject strategy.
pub trait FillPolicy: Send + Sync {
    /// Decide what happens to `order` on its `tick`-th tick.
    fn decide(&self, order: &Order, tick: u32) -> FillDecision;

    /// Short name, for logs.
    fn name(&self) -> &'static str;
}
