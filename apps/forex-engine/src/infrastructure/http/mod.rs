//! HTTP Server
//!
//! Axum router serving the order REST API, the WebSocket endpoint and the
//! operational endpoints.
//!
//! # Endpoints
//!
//! - `POST /orders` - submit an order
//! - `GET /orders` - list orders, optionally by `account` and `status`
//! - `GET /orders/{id}` - latest snapshot
//! - `DELETE /orders/{id}` - cancel
//! - `POST /orders/{id}/execute` - fill the remainder now
//! - `GET /ws` - WebSocket order-update stream
//! - `GET /health`, `/healthz`, `/readyz`, `/metrics`

mod error;
mod health;
mod orders;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::{ApiError, status_for};
pub use health::HealthResponse;
pub use orders::ListOrdersQuery;

use crate::application::services::OrderGateway;
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::websocket::{WebSocketBroadcaster, ws_handler};

// =============================================================================
// State
// =============================================================================

/// Shared state for all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Client command entry point.
    pub gateway: Arc<OrderGateway>,
    /// Live WebSocket connections.
    pub broadcaster: Arc<WebSocketBroadcaster>,
    /// Connection interests.
    pub registry: Arc<SubscriptionRegistry>,
    /// Cancelled when the process begins shutting down.
    pub shutdown: CancellationToken,
    /// Engine version.
    pub version: &'static str,
    /// Process start.
    pub started_at: Instant,
}

impl AppState {
    /// Create handler state.
    #[must_use]
    pub fn new(
        gateway: Arc<OrderGateway>,
        broadcaster: Arc<WebSocketBroadcaster>,
        registry: Arc<SubscriptionRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            broadcaster,
            registry,
            shutdown,
            version: env!("CARGO_PKG_VERSION"),
            started_at: Instant::now(),
        }
    }
}

/// Build the router with every endpoint.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(orders::submit_order).get(orders::list_orders))
        .route(
            "/orders/{id}",
            get(orders::get_order).delete(orders::cancel_order),
        )
        .route("/orders/{id}/execute", post(orders::execute_order))
        .route("/ws", get(ws_handler))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/readyz", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

/// HTTP server for the engine.
pub struct HttpServer {
    listener: TcpListener,
    state: AppState,
}

impl HttpServer {
    /// Bind `addr`.
    ///
    /// # Errors
    ///
    /// Returns `BindFailed` if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, state: AppState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(addr, e.to_string()))?;
        Ok(Self { listener, state })
    }

    /// Address actually bound (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns `ServerFailed` if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::ServerFailed(e.to_string()))
    }

    /// Serve until the state's shutdown token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerFailed` if the server stops with an error.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = self.state.shutdown.clone();
        let app = router(self.state);

        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "HTTP server listening");
        }

        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .finish_non_exhaustive()
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the address.
    #[error("failed to bind HTTP server to {0}: {1}")]
    BindFailed(SocketAddr, String),
    /// Server encountered an error.
    #[error("HTTP server error: {0}")]
    ServerFailed(String),
}
