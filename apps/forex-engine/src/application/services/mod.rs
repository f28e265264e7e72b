//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `OrderGateway`: validates and executes client commands
//! - `MatchingEngine`: simulates fills tick by tick
//! - `EventBus`: sequences and routes committed events to connections
//! - Fill policies: random, immediate and scripted market behaviour

mod event_bus;
mod fill_policy;
mod gateway;
mod matching_engine;

pub use event_bus::EventBus;
pub use fill_policy::{
    ImmediateFillPolicy, NO_LIQUIDITY_REASON, RandomFillConfig, RandomFillPolicy,
    ScriptedFillPolicy,
};
pub use gateway::{GatewayConfig, OrderGateway, OrderSnapshot, SubmitOrder};
pub use matching_engine::{
    INSUFFICIENT_MARGIN_REASON, MatchingEngine, SimulationConfig, TickOutcome,
};
