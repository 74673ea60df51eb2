//! Upstream Feed Connection
//!
//! Demand-driven WebSocket connection actor for the vendor stream. The
//! connection does not exist at startup: the first subscribe opens it,
//! later subscribes reuse it, and an explicit close (issued when the last
//! symbol is released) tears it down. Callers talk to the actor through
//! [`FeedHandle`], which implements the [`UpstreamFeed`] port with a
//! command channel and per-call reply channels.
//!
//! The actor keeps the union of subscribed symbols across reconnects, so a
//! restored connection is re-subscribed to exactly what the registry
//! holds. Reconnection is bounded; once the budget is exhausted the feed
//! is degraded and stays closed until the next subscribe arrives.

use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedError, SubscribeOutcome, UpstreamFeed};
use crate::domain::subscription::Symbol;

use super::codec;
use super::messages::{ControlRequest, PolygonMessage, channel_params, status};
use super::reconnect::ReconnectPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of the vendor connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket exists.
    Closed,
    /// Socket dial or authentication handshake in progress.
    Connecting,
    /// Authenticated and streaming.
    Open,
    /// Close frame sent, teardown in progress.
    Closing,
}

impl ConnectionState {
    /// Lowercase label for health reporting.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared view of the connection for health reporting.
#[derive(Debug)]
pub struct FeedState {
    state: parking_lot::RwLock<ConnectionState>,
    messages_received: AtomicU64,
    reconnect_attempts: AtomicU64,
}

impl FeedState {
    fn new() -> Self {
        Self {
            state: parking_lot::RwLock::new(ConnectionState::Closed),
            messages_received: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
        }
    }

    fn set(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn record_batch(&self, messages: usize) {
        self.messages_received
            .fetch_add(messages as u64, Ordering::Relaxed);
    }

    fn record_reconnect(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Total vendor messages received.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Total reconnection attempts made.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Commands and Events
// =============================================================================

enum FeedCommand {
    Subscribe {
        symbol: Symbol,
        reply: oneshot::Sender<Result<SubscribeOutcome, FeedError>>,
    },
    Unsubscribe {
        symbol: Symbol,
        reply: oneshot::Sender<Result<(), FeedError>>,
    },
    Close {
        reply: oneshot::Sender<Result<(), FeedError>>,
    },
}

/// Events emitted by the connection actor toward the delivery task.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Connected and authenticated; subscriptions restored.
    Connected,
    /// One decoded inbound frame.
    Batch(Vec<PolygonMessage>),
    /// The connection dropped unexpectedly.
    Disconnected,
    /// A reconnection attempt is about to be made.
    Reconnecting {
        /// Attempt number within the current budget.
        attempt: u32,
    },
    /// Reconnection budget exhausted or credential rejected; the feed
    /// stays closed until the next subscribe.
    Degraded {
        /// Human-readable cause.
        reason: String,
    },
    /// The connection was closed on request.
    Closed,
}

// =============================================================================
// Feed Handle
// =============================================================================

/// Cloneable handle implementing the upstream feed port against the actor.
#[derive(Clone)]
pub struct FeedHandle {
    commands: mpsc::Sender<FeedCommand>,
}

#[async_trait::async_trait]
impl UpstreamFeed for FeedHandle {
    async fn subscribe(&self, symbol: &Symbol) -> Result<SubscribeOutcome, FeedError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(FeedCommand::Subscribe {
                symbol: symbol.clone(),
                reply,
            })
            .await
            .map_err(|_| FeedError::ChannelClosed)?;
        rx.await.map_err(|_| FeedError::ChannelClosed)?
    }

    async fn unsubscribe(&self, symbol: &Symbol) -> Result<(), FeedError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(FeedCommand::Unsubscribe {
                symbol: symbol.clone(),
                reply,
            })
            .await
            .map_err(|_| FeedError::ChannelClosed)?;
        rx.await.map_err(|_| FeedError::ChannelClosed)?
    }

    async fn close(&self) -> Result<(), FeedError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(FeedCommand::Close { reply })
            .await
            .map_err(|_| FeedError::ChannelClosed)?;
        rx.await.map_err(|_| FeedError::ChannelClosed)?
    }
}

// =============================================================================
// Feed Configuration
// =============================================================================

/// Configuration for the feed connection actor.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Vendor WebSocket URL.
    pub url: String,
    /// API key presented during the handshake.
    pub api_key: String,
    /// Backoff schedule for connection attempts.
    pub reconnect: ReconnectPolicy,
    /// Interval between outbound pings on an open connection.
    pub ping_interval: Duration,
    /// Ceiling on the connect-plus-auth handshake.
    pub handshake_timeout: Duration,
}

impl FeedConfig {
    /// Create a configuration with default reconnect and timing knobs.
    #[must_use]
    pub fn new(url: String, api_key: String) -> Self {
        Self {
            url,
            api_key,
            reconnect: ReconnectPolicy::default(),
            ping_interval: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Feed Connection Actor
// =============================================================================

enum StreamEnd {
    Shutdown,
    ClosedByCommand,
    Lost,
}

/// The connection actor. Owns the socket, the subscribed-symbol union, and
/// the command queue; runs until cancelled.
pub struct FeedConnection {
    config: FeedConfig,
    commands: mpsc::Receiver<FeedCommand>,
    events: mpsc::Sender<FeedEvent>,
    state: Arc<FeedState>,
    cancel: CancellationToken,
    active: BTreeSet<Symbol>,
}

impl FeedConnection {
    /// Create the actor plus its handle and shared state view.
    #[must_use]
    pub fn new(
        config: FeedConfig,
        events: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> (Self, FeedHandle, Arc<FeedState>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(FeedState::new());
        let actor = Self {
            config,
            commands: command_rx,
            events,
            state: Arc::clone(&state),
            cancel,
            active: BTreeSet::new(),
        };
        (actor, FeedHandle { commands: command_tx }, state)
    }

    /// Hand an event to the delivery task without blocking the actor.
    ///
    /// The actor answers command replies from the same loop that emits
    /// events; it must never park on the delivery channel while a caller
    /// is awaiting a reply. A full channel drops the event instead.
    /// Returns `false` once the delivery task is gone.
    fn emit(&self, event: FeedEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Delivery channel full, dropping feed event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Run the actor until cancelled or every handle is dropped.
    ///
    /// While no connection exists the actor idles on the command queue.
    /// A subscribe opens the connection on demand; unsubscribe and close
    /// received while closed only adjust the symbol union.
    pub async fn run(mut self) {
        let cancel = self.cancel.clone();

        loop {
            self.state.set(ConnectionState::Closed);

            let cmd = tokio::select! {
                () = cancel.cancelled() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };

            match cmd {
                FeedCommand::Subscribe { symbol, reply } => {
                    self.active.insert(symbol.clone());
                    match self.open_with_retries().await {
                        Ok(ws) => {
                            let _ = reply.send(Ok(SubscribeOutcome::OpenedConnection));
                            self.emit(FeedEvent::Connected);
                            if self.drive(ws).await.is_break() {
                                break;
                            }
                        }
                        Err(e) => {
                            self.active.remove(&symbol);
                            let _ = reply.send(Err(e));
                        }
                    }
                }
                FeedCommand::Unsubscribe { symbol, reply } => {
                    self.active.remove(&symbol);
                    let _ = reply.send(Ok(()));
                }
                FeedCommand::Close { reply } => {
                    self.active.clear();
                    let _ = reply.send(Ok(()));
                }
            }
        }

        self.state.set(ConnectionState::Closed);
        tracing::info!("Feed connection actor stopped");
    }

    /// Stream on an open connection, reconnecting on loss, until shutdown,
    /// a close command, or a degraded verdict.
    async fn drive(&mut self, mut ws: WsStream) -> ControlFlow<()> {
        loop {
            match self.stream(&mut ws).await {
                StreamEnd::Shutdown => {
                    let _ = ws.close(None).await;
                    return ControlFlow::Break(());
                }
                StreamEnd::ClosedByCommand => {
                    self.emit(FeedEvent::Closed);
                    return ControlFlow::Continue(());
                }
                StreamEnd::Lost => {
                    self.emit(FeedEvent::Disconnected);
                    match self.open_with_retries().await {
                        Ok(new_ws) => {
                            ws = new_ws;
                            self.emit(FeedEvent::Connected);
                        }
                        Err(FeedError::ChannelClosed) => return ControlFlow::Break(()),
                        Err(e) => {
                            tracing::error!(error = %e, "Feed degraded");
                            return ControlFlow::Continue(());
                        }
                    }
                }
            }
        }
    }

    /// Connect, authenticate, and restore the subscription union, retrying
    /// per the backoff policy. Emits `Degraded` before giving up.
    async fn open_with_retries(&mut self) -> Result<WsStream, FeedError> {
        let cancel = self.cancel.clone();
        let mut attempt = 1;

        while !self.config.reconnect.exhausted(attempt) {
            if attempt > 1 {
                let delay = self.config.reconnect.delay_for(attempt - 1);
                self.state.record_reconnect();
                self.emit(FeedEvent::Reconnecting { attempt });
                tracing::info!(attempt, delay_ms = delay.as_millis(), "Retrying upstream connect");
                tokio::select! {
                    () = cancel.cancelled() => return Err(FeedError::ChannelClosed),
                    () = tokio::time::sleep(delay) => {}
                }
            }

            self.state.set(ConnectionState::Connecting);
            match self.open_once().await {
                Ok(ws) => {
                    self.state.set(ConnectionState::Open);
                    tracing::info!(symbols = self.active.len(), "Upstream feed open");
                    return Ok(ws);
                }
                // Credential rejection is not transient; do not burn the
                // retry budget on it.
                Err(FeedError::AuthFailed(msg)) => {
                    self.state.set(ConnectionState::Closed);
                    self.emit(FeedEvent::Degraded {
                        reason: format!("authentication failed: {msg}"),
                    });
                    return Err(FeedError::AuthFailed(msg));
                }
                Err(e) => {
                    self.state.set(ConnectionState::Closed);
                    tracing::warn!(attempt, error = %e, "Upstream connect attempt failed");
                }
            }

            attempt += 1;
        }

        self.emit(FeedEvent::Degraded {
            reason: "reconnection attempts exhausted".to_string(),
        });
        Err(FeedError::RetriesExhausted)
    }

    async fn open_once(&mut self) -> Result<WsStream, FeedError> {
        tracing::info!(url = %self.config.url, "Connecting to upstream feed");

        let (mut ws, _response) = tokio_tungstenite::connect_async(&self.config.url)
            .await
            .map_err(|e| FeedError::ConnectFailed(e.to_string()))?;

        tokio::time::timeout(self.config.handshake_timeout, self.handshake(&mut ws))
            .await
            .map_err(|_| FeedError::ConnectFailed("handshake timed out".to_string()))??;

        Ok(ws)
    }

    /// Status-driven handshake: wait for `connected`, present the key,
    /// wait for `auth_success`, then restore the subscription union.
    async fn handshake(&self, ws: &mut WsStream) -> Result<(), FeedError> {
        loop {
            let frame = ws
                .next()
                .await
                .ok_or_else(|| {
                    FeedError::ConnectFailed("connection closed during handshake".to_string())
                })?
                .map_err(|e| FeedError::ConnectFailed(e.to_string()))?;

            match frame {
                Message::Text(text) => {
                    for msg in codec::decode_frame(&text) {
                        let PolygonMessage::Status(s) = msg else {
                            continue;
                        };
                        match s.status.as_str() {
                            status::CONNECTED => {
                                let auth = ControlRequest::Auth {
                                    params: self.config.api_key.clone(),
                                };
                                send_control(ws, &auth).await?;
                            }
                            status::AUTH_SUCCESS => {
                                tracing::info!("Upstream feed authenticated");
                                self.restore_subscriptions(ws).await?;
                                return Ok(());
                            }
                            status::AUTH_FAILED => {
                                return Err(FeedError::AuthFailed(
                                    s.message
                                        .unwrap_or_else(|| "credential rejected".to_string()),
                                ));
                            }
                            other => {
                                tracing::debug!(status = other, "Ignoring handshake status");
                            }
                        }
                    }
                }
                Message::Ping(data) => {
                    let _ = ws.send(Message::Pong(data)).await;
                }
                Message::Close(_) => {
                    return Err(FeedError::ConnectFailed(
                        "server closed during handshake".to_string(),
                    ));
                }
                _ => {}
            }
        }
    }

    async fn restore_subscriptions(&self, ws: &mut WsStream) -> Result<(), FeedError> {
        if self.active.is_empty() {
            return Ok(());
        }
        let params = self
            .active
            .iter()
            .map(channel_params)
            .collect::<Vec<_>>()
            .join(",");
        tracing::debug!(%params, "Restoring upstream subscriptions");
        send_control(ws, &ControlRequest::Subscribe { params }).await
    }

    /// Pump one open connection: commands, inbound frames, and pings.
    async fn stream(&mut self, ws: &mut WsStream) -> StreamEnd {
        let cancel = self.cancel.clone();
        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval fires immediately; consume the first tick.
        ping.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => return StreamEnd::Shutdown,

                cmd = self.commands.recv() => match cmd {
                    None => return StreamEnd::Shutdown,
                    Some(FeedCommand::Subscribe { symbol, reply }) => {
                        if self.active.contains(&symbol) {
                            let _ = reply.send(Ok(SubscribeOutcome::JoinedExisting));
                            continue;
                        }
                        let frame = ControlRequest::Subscribe {
                            params: channel_params(&symbol),
                        };
                        match send_control(ws, &frame).await {
                            Ok(()) => {
                                self.active.insert(symbol);
                                let _ = reply.send(Ok(SubscribeOutcome::JoinedExisting));
                            }
                            Err(e) => {
                                let _ = reply.send(Err(e));
                                return StreamEnd::Lost;
                            }
                        }
                    }
                    Some(FeedCommand::Unsubscribe { symbol, reply }) => {
                        self.active.remove(&symbol);
                        let frame = ControlRequest::Unsubscribe {
                            params: channel_params(&symbol),
                        };
                        let result = send_control(ws, &frame).await;
                        let lost = result.is_err();
                        let _ = reply.send(result);
                        if lost {
                            return StreamEnd::Lost;
                        }
                    }
                    Some(FeedCommand::Close { reply }) => {
                        self.state.set(ConnectionState::Closing);
                        self.active.clear();
                        let _ = ws.close(None).await;
                        self.state.set(ConnectionState::Closed);
                        let _ = reply.send(Ok(()));
                        return StreamEnd::ClosedByCommand;
                    }
                },

                _ = ping.tick() => {
                    if ws.send(Message::Ping(vec![].into())).await.is_err() {
                        return StreamEnd::Lost;
                    }
                }

                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let batch = codec::decode_frame(&text);
                        if !batch.is_empty() {
                            self.state.record_batch(batch.len());
                            if !self.emit(FeedEvent::Batch(batch)) {
                                return StreamEnd::Shutdown;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::warn!("Upstream connection closed");
                        return StreamEnd::Lost;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Upstream connection error");
                        return StreamEnd::Lost;
                    }
                },
            }
        }
    }
}

async fn send_control(ws: &mut WsStream, frame: &ControlRequest) -> Result<(), FeedError> {
    let json = frame.to_json().map_err(|e| FeedError::Send(e.to_string()))?;
    ws.send(Message::Text(json.into()))
        .await
        .map_err(|e| FeedError::Send(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> FeedConfig {
        FeedConfig::new(
            "wss://example.invalid/stocks".to_string(),
            "test-key".to_string(),
        )
    }

    #[test]
    fn connection_state_labels() {
        assert_eq!(ConnectionState::Closed.as_str(), "closed");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Open.as_str(), "open");
        assert_eq!(ConnectionState::Closing.as_str(), "closing");
    }

    #[test]
    fn feed_state_starts_closed() {
        let (_actor, _handle, state) = FeedConnection::new(
            test_config(),
            mpsc::channel(8).0,
            CancellationToken::new(),
        );
        assert_eq!(state.connection_state(), ConnectionState::Closed);
        assert_eq!(state.messages_received(), 0);
        assert_eq!(state.reconnect_attempts(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_and_close_while_closed_are_noops() {
        let (events_tx, _events_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let (actor, handle, state) = FeedConnection::new(test_config(), events_tx, cancel.clone());
        let task = tokio::spawn(actor.run());

        handle.unsubscribe(&"AAPL".to_string()).await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(state.connection_state(), ConnectionState::Closed);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn emit_never_blocks_on_a_full_delivery_channel() {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let (actor, _handle, _state) =
            FeedConnection::new(test_config(), events_tx.clone(), CancellationToken::new());

        // Saturate the channel, then emit: the call must return instead of
        // parking the actor behind the stalled consumer.
        events_tx.send(FeedEvent::Disconnected).await.unwrap();
        assert!(actor.emit(FeedEvent::Reconnecting { attempt: 2 }));

        assert!(matches!(events_rx.recv().await, Some(FeedEvent::Disconnected)));
        // The overflowing event was dropped, not queued.
        assert!(events_rx.try_recv().is_err());

        drop(events_rx);
        assert!(!actor.emit(FeedEvent::Closed));
    }

    #[tokio::test]
    async fn handle_reports_channel_closed_after_shutdown() {
        let (events_tx, _events_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let (actor, handle, _state) = FeedConnection::new(test_config(), events_tx, cancel.clone());
        let task = tokio::spawn(actor.run());

        cancel.cancel();
        task.await.unwrap();

        let result = handle.close().await;
        assert!(matches!(result, Err(FeedError::ChannelClosed)));
    }
}
