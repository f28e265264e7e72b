#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Forex Engine - Simulated Order Lifecycle with Real-Time Broadcast
//!
//! Accepts forex orders over REST, drives them through a simulated market
//! tick by tick, and pushes every committed state change to WebSocket
//! subscribers in per-order version order.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: orders, the lifecycle state machine, accounts and margin,
//!   subscription routing
//!
//! - **Application**: ports and services
//!   - `ports`: order store, delivery, tick scheduler, fill policy
//!   - `services`: command gateway, matching engine, event bus, fill policies
//!
//! - **Infrastructure**: adapters
//!   - `persistence`: in-memory order store
//!   - `scheduler`: tokio and manual tick schedulers
//!   - `websocket`: per-connection queues, broadcaster, protocol
//!   - `http`: axum router, REST handlers, health and metrics
//!   - `config`: environment settings and dependency wiring
//!
//! # Data Flow
//!
//! ```text
//! REST ──► OrderGateway ──► OrderStore.commit ──► EventBus ──► Registry.route
//!               │                 ▲                              │
//!               ▼                 │                              ▼
//!          TickScheduler ──► MatchingEngine            WebSocketBroadcaster
//!                                                         │   │   │
//!                                                   conn 1  conn 2  conn N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Orders, accounts and subscriptions with no I/O.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and the network surface.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::account::{Account, MarginPolicy};
pub use domain::order::{
    AccountId, ErrorKind, Instrument, Order, OrderCommand, OrderError, OrderEvent, OrderId,
    OrderStateMachine, OrderStatus, Side,
};
pub use domain::subscription::{ConnectionId, Interest, SubscriptionRegistry, SubscriptionStats};

// Application services
pub use application::ports::{FillDecision, FillPolicy, FillTick, OrderFilter, OrderStore};
pub use application::services::{
    EventBus, ImmediateFillPolicy, MatchingEngine, OrderGateway, OrderSnapshot,
    RandomFillPolicy, ScriptedFillPolicy, SubmitOrder, TickOutcome,
};

// Infrastructure
pub use infrastructure::config::{ConfigError, EngineConfig, EngineContainer};
pub use infrastructure::http::{AppState, HttpServer, ServerError, router};
pub use infrastructure::persistence::InMemoryOrderStore;
pub use infrastructure::scheduler::{ManualTickScheduler, TokioTickScheduler};
pub use infrastructure::websocket::WebSocketBroadcaster;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
