//! Health Check and Metrics Endpoints
//!
//! - `GET /health` - JSON status with connection and subscription counts
//! - `GET /healthz` - liveness probe (plain OK)
//! - `GET /readyz` - readiness probe; fails once shutdown has begun
//! - `GET /metrics` - Prometheus metrics in text format

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::application::ports::OrderFilter;
use crate::domain::subscription::SubscriptionStats;
use crate::infrastructure::metrics::get_metrics_handle;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `ok` while the process answers.
    pub status: &'static str,
    /// Engine version.
    pub version: &'static str,
    /// Seconds since start.
    pub uptime_secs: u64,
    /// Current server time.
    pub date: DateTime<Utc>,
    /// Live WebSocket connections.
    pub connections: usize,
    /// Subscription index sizes.
    pub subscriptions: SubscriptionStats,
    /// Orders known to the store.
    pub orders: usize,
}

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(build_health_response(&state))
}

/// `GET /healthz`
pub async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// `GET /readyz`
pub async fn readiness_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.shutdown.is_cancelled() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &AppState) -> HealthResponse {
    HealthResponse {
        status: "ok",
        version: state.version,
        uptime_secs: state.started_at.elapsed().as_secs(),
        date: Utc::now(),
        connections: state.broadcaster.connection_count(),
        subscriptions: state.registry.stats(),
        orders: state.gateway.list(&OrderFilter::default()).len(),
    }
}
