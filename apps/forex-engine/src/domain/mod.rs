//! Domain Layer - Orders, accounts and subscriptions.
//!
//! Pure types and rules with no I/O. Everything that can change an order
//! lives here; the layers above only decide *when* to change it.

/// Order aggregate, lifecycle state machine and events.
pub mod order;

/// Accounts and margin reservations.
pub mod account;

/// Subscription tracking and event routing.
pub mod subscription;
