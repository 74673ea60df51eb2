//! Viewer Session Server
//!
//! WebSocket endpoint viewer sessions connect to. Each accepted socket
//! becomes one session: a bounded outbound channel feeds a writer task,
//! and the read loop parses commands and applies them through the relay
//! service. Disconnect, clean or not, releases the session and every
//! subscription it held.

/// Session wire message schema.
pub mod messages;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::services::RelayService;
use crate::domain::subscription::SessionId;
use crate::infrastructure::metrics;

use self::messages::ClientCommand;

// =============================================================================
// Server
// =============================================================================

/// Shared state for the session server.
pub struct WsServerState {
    service: Arc<RelayService>,
    session_buffer: usize,
}

impl WsServerState {
    /// Create session server state.
    #[must_use]
    pub const fn new(service: Arc<RelayService>, session_buffer: usize) -> Self {
        Self {
            service,
            session_buffer,
        }
    }
}

/// WebSocket server accepting viewer sessions.
pub struct WsServer {
    port: u16,
    state: Arc<WsServerState>,
    cancel: CancellationToken,
}

impl WsServer {
    /// Create a new session server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<WsServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the session server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `WsServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), WsServerError> {
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WsServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Session server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| WsServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Session server stopped");
        Ok(())
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

// =============================================================================
// Session Lifecycle
// =============================================================================

async fn handle_session(socket: WebSocket, state: Arc<WsServerState>) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel(state.session_buffer);
    let session = state.service.connect_session(outbound_tx).await;
    update_gauges(&state.service).await;

    let (mut sink, mut stream) = socket.split();

    // Writer drains the session's outbound channel onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize session message");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                handle_command(&state.service, session, &text).await;
            }
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    // Any disconnect path releases the session exactly once.
    state.service.release_session(session).await;
    writer.abort();
    update_gauges(&state.service).await;
    tracing::info!(%session, "Session disconnected");
}

async fn handle_command(service: &RelayService, session: SessionId, text: &str) {
    let cmd: ClientCommand = match serde_json::from_str(text) {
        Ok(cmd) => cmd,
        Err(e) => {
            tracing::debug!(%session, error = %e, "Ignoring malformed command");
            return;
        }
    };

    let symbol = match cmd.single_symbol() {
        Ok(symbol) => symbol,
        Err(reason) => {
            tracing::debug!(%session, %reason, "Rejecting command payload");
            return;
        }
    };

    let result = match cmd {
        ClientCommand::SubscribeOne(_) => {
            metrics::record_command("subscribe_one");
            service.subscribe_one(session, &symbol).await
        }
        ClientCommand::UnsubscribeOne(_) => {
            metrics::record_command("unsubscribe_one");
            service.unsubscribe_one(session, &symbol).await
        }
    };

    if let Err(e) = result {
        tracing::warn!(%session, %symbol, error = %e, "Command failed");
    }
    update_gauges(service).await;
}

async fn update_gauges(service: &RelayService) {
    let stats = service.stats().await;
    metrics::set_sessions(stats.sessions as f64);
    metrics::set_subscriptions(stats.symbols as f64);
}

// =============================================================================
// Errors
// =============================================================================

/// Session server errors.
#[derive(Debug, thiserror::Error)]
pub enum WsServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
