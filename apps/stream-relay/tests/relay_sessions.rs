//! Session lifecycle integration tests.
//!
//! Exercises the relay service through its public API with an in-memory
//! upstream feed, covering shared subscriptions across sessions,
//! demand-driven connection teardown, and fan-out routing.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use stream_relay::{
    EventKind, FeedError, NormalizedEvent, RelayService, ServerMessage, SubscribeOutcome, Symbol,
    UpstreamFeed, reason,
};

// =============================================================================
// Test Feed
// =============================================================================

/// Records every upstream call the relay makes.
#[derive(Default)]
struct RecordingFeed {
    symbols: parking_lot::Mutex<BTreeSet<String>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl RecordingFeed {
    fn active(&self) -> BTreeSet<String> {
        self.symbols.lock().clone()
    }
}

#[async_trait]
impl UpstreamFeed for RecordingFeed {
    async fn subscribe(&self, symbol: &Symbol) -> Result<SubscribeOutcome, FeedError> {
        let mut symbols = self.symbols.lock();
        let outcome = if symbols.is_empty() {
            self.opens.fetch_add(1, Ordering::SeqCst);
            SubscribeOutcome::OpenedConnection
        } else {
            SubscribeOutcome::JoinedExisting
        };
        symbols.insert(symbol.clone());
        Ok(outcome)
    }

    async fn unsubscribe(&self, symbol: &Symbol) -> Result<(), FeedError> {
        self.symbols.lock().remove(symbol);
        Ok(())
    }

    async fn close(&self) -> Result<(), FeedError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn setup() -> (Arc<RecordingFeed>, RelayService) {
    let feed = Arc::new(RecordingFeed::default());
    let service = RelayService::new(Arc::clone(&feed) as Arc<dyn UpstreamFeed>);
    (feed, service)
}

fn sym(s: &str) -> Symbol {
    s.to_string()
}

async fn expect_subscribed(rx: &mut mpsc::Receiver<ServerMessage>) -> (Vec<String>, Option<String>) {
    match rx.recv().await.expect("ack expected") {
        ServerMessage::Subscribed {
            subscriptions,
            reason,
        } => (subscriptions, reason),
        other => panic!("expected subscribed ack, got {other:?}"),
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn overlapping_sessions_share_the_upstream_connection() {
    let (feed, service) = setup();
    let (tx1, mut rx1) = mpsc::channel(16);
    let (tx2, mut rx2) = mpsc::channel(16);

    let s1 = service.connect_session(tx1).await;
    let s2 = service.connect_session(tx2).await;

    // S1 subscribes AAPL, opening the connection.
    service.subscribe_one(s1, &sym("AAPL")).await.unwrap();
    let (subs, ack) = expect_subscribed(&mut rx1).await;
    assert_eq!(subs, vec!["AAPL".to_string()]);
    assert_eq!(ack.as_deref(), Some(reason::OPENED_UPSTREAM));

    // S2 subscribes AAPL (shared) and MSFT (new upstream channel).
    service.subscribe_one(s2, &sym("AAPL")).await.unwrap();
    let (_, ack) = expect_subscribed(&mut rx2).await;
    assert_eq!(ack.as_deref(), Some(reason::UPSTREAM_ACTIVE));

    service.subscribe_one(s2, &sym("MSFT")).await.unwrap();
    let (_, ack) = expect_subscribed(&mut rx2).await;
    assert_eq!(ack.as_deref(), Some(reason::JOINED_UPSTREAM));

    assert_eq!(feed.opens.load(Ordering::SeqCst), 1);
    assert_eq!(
        service.active_symbols().await,
        vec!["AAPL".to_string(), "MSFT".to_string()]
    );

    // S1 disconnects: AAPL survives because S2 still holds it.
    service.release_session(s1).await;
    assert_eq!(feed.active(), BTreeSet::from(["AAPL".into(), "MSFT".into()]));

    // S2 unsubscribes AAPL: the aggregate set shrinks to MSFT only.
    service.unsubscribe_one(s2, &sym("AAPL")).await.unwrap();
    assert_eq!(service.active_symbols().await, vec!["MSFT".to_string()]);
    assert_eq!(feed.active(), BTreeSet::from(["MSFT".into()]));
    assert_eq!(feed.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn last_release_closes_the_upstream_connection() {
    let (feed, service) = setup();
    let (tx, _rx) = mpsc::channel(16);

    let s1 = service.connect_session(tx).await;
    service.subscribe_one(s1, &sym("AAPL")).await.unwrap();
    service.subscribe_one(s1, &sym("MSFT")).await.unwrap();

    service.unsubscribe_one(s1, &sym("AAPL")).await.unwrap();
    assert_eq!(feed.closes.load(Ordering::SeqCst), 0);

    // Dropping the final symbol closes the connection before returning.
    service.unsubscribe_one(s1, &sym("MSFT")).await.unwrap();
    assert_eq!(feed.closes.load(Ordering::SeqCst), 1);
    assert!(service.active_symbols().await.is_empty());

    // A fresh subscribe reopens on demand.
    service.subscribe_one(s1, &sym("TSLA")).await.unwrap();
    assert_eq!(feed.opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn release_cascade_closes_when_it_empties_the_registry() {
    let (feed, service) = setup();
    let (tx, _rx) = mpsc::channel(16);

    let s1 = service.connect_session(tx).await;
    service.subscribe_one(s1, &sym("AAPL")).await.unwrap();
    service.subscribe_one(s1, &sym("MSFT")).await.unwrap();

    service.release_session(s1).await;
    assert!(feed.active().is_empty());
    assert_eq!(feed.closes.load(Ordering::SeqCst), 1);

    // Releasing again must not close twice.
    service.release_session(s1).await;
    assert_eq!(feed.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn acks_are_unicast_to_the_requesting_session() {
    let (_feed, service) = setup();
    let (tx1, mut rx1) = mpsc::channel(16);
    let (tx2, mut rx2) = mpsc::channel(16);

    let s1 = service.connect_session(tx1).await;
    let _s2 = service.connect_session(tx2).await;

    service.subscribe_one(s1, &sym("AAPL")).await.unwrap();
    let _ = expect_subscribed(&mut rx1).await;

    // The other session saw nothing.
    assert!(rx2.try_recv().is_err());

    service.unsubscribe_one(s1, &sym("AAPL")).await.unwrap();
    match rx1.recv().await.unwrap() {
        ServerMessage::Unsubscribed {
            subscriptions,
            reason: why,
        } => {
            assert_eq!(subscriptions, vec!["AAPL".to_string()]);
            assert_eq!(why, reason::MANUAL_UNSUBSCRIBE);
        }
        other => panic!("expected unsubscribed ack, got {other:?}"),
    }
    assert!(rx2.try_recv().is_err());
}

#[tokio::test]
async fn events_route_only_to_holding_sessions() {
    let (_feed, service) = setup();
    let (tx1, mut rx1) = mpsc::channel(16);
    let (tx2, mut rx2) = mpsc::channel(16);

    let s1 = service.connect_session(tx1).await;
    let s2 = service.connect_session(tx2).await;
    service.subscribe_one(s1, &sym("AAPL")).await.unwrap();
    service.subscribe_one(s2, &sym("AAPL")).await.unwrap();
    let _ = expect_subscribed(&mut rx1).await;
    let _ = expect_subscribed(&mut rx2).await;

    let event = NormalizedEvent::empty(EventKind::Trade, "AAPL".to_string());
    let outcome = service.publish(event).await;
    assert_eq!(outcome.delivered, 2);

    for rx in [&mut rx1, &mut rx2] {
        match rx.recv().await.unwrap() {
            ServerMessage::PolygonData(event) => assert_eq!(event.sym, "AAPL"),
            other => panic!("expected market data, got {other:?}"),
        }
    }

    // After S1 unsubscribes, only S2 receives.
    service.unsubscribe_one(s1, &sym("AAPL")).await.unwrap();
    let _ = rx1.recv().await; // unsubscribe ack

    let event = NormalizedEvent::empty(EventKind::Trade, "AAPL".to_string());
    let outcome = service.publish(event).await;
    assert_eq!(outcome.delivered, 1);
    assert!(matches!(
        rx2.recv().await.unwrap(),
        ServerMessage::PolygonData(_)
    ));
    assert!(rx1.try_recv().is_err());
}

#[tokio::test]
async fn saturated_session_drops_events_without_blocking() {
    let (_feed, service) = setup();
    // Buffer of one: the subscribe ack fills it.
    let (tx, _rx) = mpsc::channel(1);

    let s1 = service.connect_session(tx).await;
    service.subscribe_one(s1, &sym("AAPL")).await.unwrap();

    let event = NormalizedEvent::empty(EventKind::Trade, "AAPL".to_string());
    let outcome = service.publish(event).await;
    assert_eq!(outcome.delivered, 0);
    assert_eq!(outcome.dropped, 1);
}
