//! Stream Relay Binary
//!
//! Starts the market data relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin stream-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `POLYGON_KEY`: Polygon API key
//!
//! ## Optional
//! - `POLYGON_WS_URL`: Vendor stream URL (default: wss://socket.polygon.io/stocks)
//! - `STREAM_RELAY_WS_PORT`: Viewer session WebSocket port (default: 8090)
//! - `STREAM_RELAY_HEALTH_PORT`: Health check HTTP port (default: 8091)
//! - `STREAM_RELAY_MAX_RECONNECT_ATTEMPTS`: Reconnect budget (default: 10)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: stream-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use stream_relay::infrastructure::polygon::{FeedConnection, FeedEvent};
use stream_relay::infrastructure::telemetry;
use stream_relay::{
    BroadcastRelay, HealthServer, HealthServerState, RelayConfig, RelayService, UpstreamFeed,
    WsServer, WsServerState, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[allow(clippy::expect_used)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting stream relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Feed connection actor and its event channel
    let (feed_events_tx, feed_events_rx) =
        mpsc::channel::<FeedEvent>(config.channels.feed_events_capacity);
    let (feed_actor, feed_handle, feed_state) = FeedConnection::new(
        config.feed_config(),
        feed_events_tx,
        shutdown_token.clone(),
    );
    tokio::spawn(feed_actor.run());

    // Relay service coordinating sessions, registry, and the feed
    let service = Arc::new(RelayService::new(
        Arc::new(feed_handle) as Arc<dyn UpstreamFeed>
    ));

    // Delivery task fanning feed events out to sessions
    let broadcast_relay = BroadcastRelay::new(
        Arc::clone(&service),
        feed_events_rx,
        shutdown_token.clone(),
    );
    tokio::spawn(broadcast_relay.run());

    // Viewer session server
    let ws_state = Arc::new(WsServerState::new(
        Arc::clone(&service),
        config.channels.session_buffer,
    ));
    let ws_server = WsServer::new(config.server.ws_port, ws_state, shutdown_token.clone());
    tokio::spawn(async move {
        if let Err(e) = ws_server.run().await {
            tracing::error!(error = %e, "Session server error");
        }
    });

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&service),
        feed_state,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Stream relay ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Stream relay stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        ws_port = config.server.ws_port,
        health_port = config.server.health_port,
        max_reconnect_attempts = config.feed.max_reconnect_attempts,
        "Configuration loaded"
    );
    tracing::debug!(polygon_url = %config.polygon_url, "Vendor stream endpoint");
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
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

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
