//! Relay Service
//!
//! Coordinates viewer sessions, the subscription registry, and the upstream
//! feed. This is the single logical writer the design requires: every
//! registry mutation and the upstream call it triggers happen under one
//! async mutex, so two sessions racing on the same symbol always observe
//! each other's reference-count transitions atomically.
//!
//! Command acknowledgements are unicast to the requesting session only;
//! market data is the only traffic that fans out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::application::ports::{FeedError, SubscribeOutcome, UpstreamFeed};
use crate::domain::events::NormalizedEvent;
use crate::domain::subscription::{
    AddDependent, RemoveDependent, SessionId, Symbol, SymbolRegistry,
};
use crate::infrastructure::ws::messages::ServerMessage;

// =============================================================================
// Acknowledgement Reasons
// =============================================================================

/// Reason attached to a `subscribed` acknowledgement.
pub mod reason {
    /// The subscribe opened a brand new upstream connection.
    pub const OPENED_UPSTREAM: &str = "opened new upstream connection";
    /// The subscribe added the symbol to an existing upstream connection.
    pub const JOINED_UPSTREAM: &str = "joined existing upstream connection";
    /// Another session already held the symbol; no upstream call was needed.
    pub const UPSTREAM_ACTIVE: &str = "upstream connection already active";
    /// The session already held the symbol itself.
    pub const ALREADY_SUBSCRIBED: &str = "already subscribed";
    /// Reason attached to every `unsubscribed` acknowledgement.
    pub const MANUAL_UNSUBSCRIBE: &str = "manual unsubscribe";
}

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The upstream feed rejected or failed a control call.
    #[error("upstream feed error: {0}")]
    Feed(#[from] FeedError),
}

// =============================================================================
// Session State
// =============================================================================

/// Per-session bookkeeping: downstream handle plus desired-symbol set.
#[derive(Debug)]
struct SessionEntry {
    tx: mpsc::Sender<ServerMessage>,
    desired: HashSet<Symbol>,
}

/// Snapshot of relay occupancy for health reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    /// Connected viewer sessions.
    pub sessions: usize,
    /// Symbols with a positive reference count.
    pub symbols: usize,
}

/// Outcome of publishing one event to its fan-out set.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOutcome {
    /// Sessions the event was handed to.
    pub delivered: usize,
    /// Sessions skipped because their channel was full or closed.
    pub dropped: usize,
}

struct RelayInner {
    sessions: HashMap<SessionId, SessionEntry>,
    registry: SymbolRegistry,
}

// =============================================================================
// Relay Service
// =============================================================================

/// Session and subscription coordinator.
///
/// Owns the [`SymbolRegistry`] and the session table behind one mutex and
/// drives the [`UpstreamFeed`] port: subscribe on a symbol's 0 -> 1
/// transition, unsubscribe on 1 -> 0, close when the registry empties.
pub struct RelayService {
    feed: Arc<dyn UpstreamFeed>,
    inner: Mutex<RelayInner>,
}

impl RelayService {
    /// Create a relay service around an upstream feed handle.
    #[must_use]
    pub fn new(feed: Arc<dyn UpstreamFeed>) -> Self {
        Self {
            feed,
            inner: Mutex::new(RelayInner {
                sessions: HashMap::new(),
                registry: SymbolRegistry::new(),
            }),
        }
    }

    /// Register a new session with an empty desired set.
    pub async fn connect_session(&self, tx: mpsc::Sender<ServerMessage>) -> SessionId {
        let session = SessionId::generate();
        let mut inner = self.inner.lock().await;
        inner.sessions.insert(
            session,
            SessionEntry {
                tx,
                desired: HashSet::new(),
            },
        );
        tracing::info!(%session, "Session connected");
        session
    }

    /// Subscribe one symbol for a session.
    ///
    /// On the symbol's 0 -> 1 transition the upstream subscribe is issued
    /// first; if it fails, no registry entry is created, nothing is sent to
    /// the session, and the error is returned. A subscribe that arrives
    /// after the session was released is a no-op and cannot resurrect it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Feed`] when the upstream subscribe fails.
    pub async fn subscribe_one(
        &self,
        session: SessionId,
        symbol: &Symbol,
    ) -> Result<(), RelayError> {
        let mut inner = self.inner.lock().await;

        let Some(entry) = inner.sessions.get(&session) else {
            tracing::debug!(%session, symbol, "Subscribe for unknown session ignored");
            return Ok(());
        };

        if entry.desired.contains(symbol) {
            send_ack(
                &entry.tx,
                ServerMessage::Subscribed {
                    subscriptions: vec![symbol.clone()],
                    reason: Some(reason::ALREADY_SUBSCRIBED.to_string()),
                },
            );
            return Ok(());
        }

        let ack_reason = if inner.registry.is_active(symbol) {
            reason::UPSTREAM_ACTIVE
        } else {
            // Issue the upstream subscribe before touching the registry so a
            // failure leaves no dangling entry.
            match self.feed.subscribe(symbol).await {
                Ok(SubscribeOutcome::OpenedConnection) => reason::OPENED_UPSTREAM,
                Ok(SubscribeOutcome::JoinedExisting) => reason::JOINED_UPSTREAM,
                Err(e) => {
                    tracing::warn!(%session, symbol, error = %e, "Upstream subscribe failed");
                    return Err(e.into());
                }
            }
        };

        let outcome = inner.registry.add_dependent(session, symbol);
        debug_assert_ne!(outcome, AddDependent::AlreadyHeld);

        if let Some(entry) = inner.sessions.get_mut(&session) {
            entry.desired.insert(symbol.clone());
            send_ack(
                &entry.tx,
                ServerMessage::Subscribed {
                    subscriptions: vec![symbol.clone()],
                    reason: Some(ack_reason.to_string()),
                },
            );
        }

        tracing::debug!(
            %session,
            symbol,
            refcount = inner.registry.refcount(symbol),
            "Subscription added"
        );
        Ok(())
    }

    /// Unsubscribe one symbol for a session.
    ///
    /// A no-op when the session does not hold the symbol. On the symbol's
    /// 1 -> 0 transition the upstream unsubscribe is issued and, when the
    /// registry empties, the upstream connection is closed before this call
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Feed`] when an upstream call fails; the
    /// registry entry is removed regardless since the session no longer
    /// wants the symbol.
    pub async fn unsubscribe_one(
        &self,
        session: SessionId,
        symbol: &Symbol,
    ) -> Result<(), RelayError> {
        let mut inner = self.inner.lock().await;

        let held = inner
            .sessions
            .get(&session)
            .is_some_and(|e| e.desired.contains(symbol));
        if !held {
            return Ok(());
        }

        if let Some(entry) = inner.sessions.get_mut(&session) {
            entry.desired.remove(symbol);
        }

        let outcome = inner.registry.remove_dependent(session, symbol);
        let mut result = Ok(());

        if outcome == RemoveDependent::LastRemoved {
            if let Err(e) = self.feed.unsubscribe(symbol).await {
                tracing::warn!(%session, symbol, error = %e, "Upstream unsubscribe failed");
                result = Err(e.into());
            }
            if inner.registry.is_empty() {
                if let Err(e) = self.feed.close().await {
                    tracing::warn!(error = %e, "Upstream close failed");
                    result = Err(e.into());
                }
            }
        }

        if let Some(entry) = inner.sessions.get(&session) {
            send_ack(
                &entry.tx,
                ServerMessage::Unsubscribed {
                    subscriptions: vec![symbol.clone()],
                    reason: reason::MANUAL_UNSUBSCRIBE.to_string(),
                },
            );
        }

        result
    }

    /// Release a session, cascading removals for every symbol it holds.
    ///
    /// Idempotent: releasing an unknown or already-released session is a
    /// no-op. No acknowledgements are sent.
    pub async fn release_session(&self, session: SessionId) {
        let mut inner = self.inner.lock().await;

        let Some(entry) = inner.sessions.remove(&session) else {
            return;
        };

        let mut last_removed = Vec::new();
        for symbol in &entry.desired {
            if inner.registry.remove_dependent(session, symbol) == RemoveDependent::LastRemoved {
                last_removed.push(symbol.clone());
            }
        }

        for symbol in &last_removed {
            if let Err(e) = self.feed.unsubscribe(symbol).await {
                tracing::warn!(%session, symbol, error = %e, "Upstream unsubscribe failed");
            }
        }

        if !last_removed.is_empty() && inner.registry.is_empty() {
            if let Err(e) = self.feed.close().await {
                tracing::warn!(error = %e, "Upstream close failed");
            }
        }

        tracing::info!(%session, released = entry.desired.len(), "Session released");
    }

    /// Fan one normalized event out to every session holding its symbol.
    ///
    /// Uses `try_send` so a slow session can never stall the delivery task;
    /// a full or closed session channel drops the event for that session.
    pub async fn publish(&self, event: NormalizedEvent) -> PublishOutcome {
        let targets: Vec<mpsc::Sender<ServerMessage>> = {
            let inner = self.inner.lock().await;
            let Some(dependents) = inner.registry.dependents(&event.sym) else {
                return PublishOutcome::default();
            };
            dependents
                .iter()
                .filter_map(|id| inner.sessions.get(id).map(|e| e.tx.clone()))
                .collect()
        };

        let mut outcome = PublishOutcome::default();
        for tx in targets {
            if tx.try_send(ServerMessage::PolygonData(event.clone())).is_ok() {
                outcome.delivered += 1;
            } else {
                outcome.dropped += 1;
            }
        }
        outcome
    }

    /// Notify every session holding at least one symbol that the upstream
    /// feed is degraded (reconnection attempts exhausted).
    pub async fn notify_degraded(&self, feed_reason: &str) {
        let inner = self.inner.lock().await;
        for entry in inner.sessions.values() {
            if entry.desired.is_empty() {
                continue;
            }
            let mut symbols: Vec<_> = entry.desired.iter().cloned().collect();
            symbols.sort();
            send_ack(
                &entry.tx,
                ServerMessage::FeedDegraded {
                    symbols,
                    reason: feed_reason.to_string(),
                },
            );
        }
    }

    /// Aggregate subscription set, sorted (the `/subs` status payload).
    pub async fn active_symbols(&self) -> Vec<Symbol> {
        self.inner.lock().await.registry.active_symbols()
    }

    /// Occupancy snapshot for health reporting.
    pub async fn stats(&self) -> RelayStats {
        let inner = self.inner.lock().await;
        RelayStats {
            sessions: inner.sessions.len(),
            symbols: inner.registry.len(),
        }
    }
}

/// Best-effort unicast; a closed or full channel means the session is gone
/// or saturated and the acknowledgement is simply dropped.
fn send_ack(tx: &mpsc::Sender<ServerMessage>, msg: ServerMessage) {
    let _ = tx.try_send(msg);
}

// =============================================================================
// Tests
// =============================================================================
