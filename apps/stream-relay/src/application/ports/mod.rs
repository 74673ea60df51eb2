//! Port Interfaces
//!
//! Contracts between the relay's application services and the
//! infrastructure adapters that talk to external systems.
//!
//! The only driven port is [`UpstreamFeed`]: the registry issues
//! subscribe/unsubscribe/close calls through it and observes typed
//! success/failure results rather than exceptions. The production
//! implementation is the vendor WebSocket connection actor; tests supply
//! in-memory fakes.

use async_trait::async_trait;

use crate::domain::subscription::Symbol;

/// Outcome of a successful upstream subscribe.
///
/// Distinguishes whether the call opened a brand new vendor connection or
/// extended one that already existed, so session acknowledgements can say
/// which happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The vendor connection was closed; this subscribe opened it.
    OpenedConnection,
    /// The vendor connection already existed; the symbol was added to it.
    JoinedExisting,
}

/// Typed failure surfaced by the upstream feed boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    /// Initial connection to the vendor failed.
    #[error("upstream connection failed: {0}")]
    ConnectFailed(String),

    /// Vendor rejected the credential.
    #[error("upstream authentication failed: {0}")]
    AuthFailed(String),

    /// A control frame could not be delivered on the open connection.
    #[error("upstream send failed: {0}")]
    Send(String),

    /// Bounded reconnection attempts were exhausted.
    #[error("upstream reconnection attempts exhausted")]
    RetriesExhausted,

    /// The connection actor is gone (shutdown in progress).
    #[error("upstream feed channel closed")]
    ChannelClosed,
}

/// Driven port for the shared vendor stream connection.
///
/// Implementations own the connection lifecycle (Closed -> Connecting ->
/// Open -> Closing) and apply the queueing rules for calls that arrive
/// mid-handshake. All methods are invoked under the registry's single
/// logical writer, so implementations never see interleaved mutations for
/// the same registry transition.
#[async_trait]
pub trait UpstreamFeed: Send + Sync {
    /// Subscribe a symbol at the vendor, opening the connection if needed.
    async fn subscribe(&self, symbol: &Symbol) -> Result<SubscribeOutcome, FeedError>;

    /// Unsubscribe a symbol at the vendor.
    async fn unsubscribe(&self, symbol: &Symbol) -> Result<(), FeedError>;

    /// Tear the vendor connection down. Only called when the registry's
    /// symbol set has become empty; resolves once the connection is Closed.
    async fn close(&self) -> Result<(), FeedError>;
}
