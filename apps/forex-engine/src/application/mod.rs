//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and the port interfaces
//! through which they reach storage, scheduling and connections.

/// Metric recording for the services.
pub mod metrics;

/// Port interfaces for storage, delivery, scheduling and fill strategy.
pub mod ports;

/// Gateway, matching engine, event bus and fill policies.
pub mod services;
