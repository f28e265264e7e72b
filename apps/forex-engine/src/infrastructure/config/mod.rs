//! Configuration Module
//!
//! Configuration loading and dependency injection for the engine.

mod container;
mod settings;

pub use container::EngineContainer;
pub use settings::{
    AccountSettings, ConfigError, EngineConfig, FillPolicyKind, ServerSettings,
    SimulationSettings, WebSocketSettings,
};
