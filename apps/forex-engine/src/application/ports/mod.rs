//! Application Ports
//!
//! Interfaces the services depend on and the infrastructure implements.
//!
//! ## Driven Ports (Outbound)
//!
//! - `OrderStore`: authoritative order and account records
//! - `DeliveryPort`: hands routed events to a live connection
//! - `TickScheduler`: defers matching-engine work items
//! - `FillPolicy`: decides what the simulated market does on each tick

mod delivery_port;
mod fill_policy_port;
mod order_store_port;
mod tick_scheduler_port;

pub use delivery_port::{DeliveryOutcome, DeliveryPort, NoOpDelivery};
pub use fill_policy_port::{FillDecision, FillPolicy};
pub use order_store_port::{OrderFilter, OrderMutation, OrderStore, commit_with_retry};
pub use tick_scheduler_port::{FillTick, TickScheduler};
