//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP/WebSocket surface.

/// Configuration and dependency injection.
pub mod config;

/// REST API, health and metrics endpoints.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Order store implementations.
pub mod persistence;

/// Fill tick schedulers.
pub mod scheduler;

/// Tracing subscriber and OpenTelemetry export.
pub mod telemetry;

/// WebSocket connections and event delivery.
pub mod websocket;
