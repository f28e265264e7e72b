//! Forex Engine Binary
//!
//! Starts the simulated order engine: REST API, WebSocket order-update
//! stream and the fill tick loop.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin forex-engine
//! ```
//!
//! # Environment Variables
//!
//! - `FOREX_ENGINE_HOST` / `FOREX_ENGINE_PORT`: listen address (default: 0.0.0.0:8000)
//! - `FOREX_ENGINE_FILL_POLICY`: random | immediate (default: random)
//! - `FOREX_ENGINE_SEED`: RNG seed for the random policy
//! - `FOREX_ENGINE_TICK_INTERVAL_MS`: delay between fill ticks (default: 500)
//! - `FOREX_ENGINE_WS_QUEUE_CAPACITY`: per-connection queue size (default: 256)
//! - `FOREX_ENGINE_WS_MAX_DROPPED`: drops before disconnect, 0 = never (default: 0)
//! - `FOREX_ENGINE_DEFAULT_BALANCE`, `FOREX_ENGINE_MARGIN_RATE`, `FOREX_ENGINE_REFERENCE_PRICE`
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use forex_engine::infrastructure::http::HttpServer;
use forex_engine::infrastructure::scheduler::{TokioTickScheduler, spawn_tick_loop};
use forex_engine::infrastructure::telemetry;
use forex_engine::{EngineConfig, EngineContainer, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Forex Engine");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed, /metrics disabled");
    }

    let config = EngineConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let (scheduler, ticks) = TokioTickScheduler::channel(config.simulation.tick_interval);
    let container = EngineContainer::build(
        &config,
        Arc::new(scheduler),
        EngineContainer::fill_policy(&config),
    );
    let tick_loop = spawn_tick_loop(
        Arc::clone(&container.engine),
        ticks,
        shutdown_token.clone(),
    );

    let server = HttpServer::bind(
        config.server.socket_addr()?,
        container.app_state(shutdown_token.clone()),
    )
    .await?;
    let mut server_task = tokio::spawn(server.run());

    tracing::info!("Forex engine ready");

    tokio::select! {
        () = shutdown_signal() => {}
        result = &mut server_task => {
            shutdown_token.cancel();
            result??;
            anyhow::bail!("HTTP server stopped unexpectedly");
        }
    }

    shutdown_token.cancel();
    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        if let Ok(Err(e)) = server_task.await {
            tracing::error!(error = %e, "HTTP server error during shutdown");
        }
        let _ = tick_loop.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Shutdown timed out, exiting anyway");
    }

    tracing::info!("Forex engine stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &EngineConfig) {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        policy = config.simulation.policy.as_str(),
        seed = ?config.simulation.seed,
        tick_interval_ms = config.simulation.tick_interval.as_millis(),
        max_ticks = config.simulation.max_ticks,
        "Configuration loaded"
    );
    tracing::debug!(
        queue_capacity = config.websocket.queue_capacity,
        max_dropped = config.websocket.max_dropped,
        default_balance = %config.accounts.default_balance,
        margin_rate = %config.accounts.margin_rate,
        "Connection and account settings"
    );
}

/// Load .env from the current directory or the nearest ancestor that has one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
