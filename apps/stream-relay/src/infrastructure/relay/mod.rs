//! Broadcast Relay
//!
//! Bridges the upstream connection actor to downstream sessions. Consumes
//! the actor's event stream on a dedicated task, normalizes market data,
//! and fans each event out through the relay service. Ingestion and
//! delivery share nothing but this channel, so a slow viewer can never
//! push back on the socket read loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::services::RelayService;
use crate::infrastructure::metrics;
use crate::infrastructure::normalize;
use crate::infrastructure::polygon::FeedEvent;

/// Delivery task driving fan-out from the feed event stream.
pub struct BroadcastRelay {
    service: Arc<RelayService>,
    events: mpsc::Receiver<FeedEvent>,
    cancel: CancellationToken,
}

impl BroadcastRelay {
    /// Create the delivery task.
    #[must_use]
    pub fn new(
        service: Arc<RelayService>,
        events: mpsc::Receiver<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            events,
            cancel,
        }
    }

    /// Run until cancelled or the event channel closes.
    pub async fn run(mut self) {
        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                FeedEvent::Batch(batch) => {
                    for msg in &batch {
                        let Some(event) = normalize::normalize(msg) else {
                            continue;
                        };
                        let outcome = self.service.publish(event).await;
                        metrics::record_events_delivered(outcome.delivered);
                        if outcome.dropped > 0 {
                            metrics::record_events_dropped(outcome.dropped);
                            tracing::debug!(dropped = outcome.dropped, "Slow sessions skipped");
                        }
                    }
                }
                FeedEvent::Connected => {
                    tracing::info!("Upstream feed connected");
                    metrics::record_feed_connected();
                }
                FeedEvent::Disconnected => {
                    tracing::warn!("Upstream feed disconnected");
                    metrics::record_feed_disconnected();
                }
                FeedEvent::Reconnecting { attempt } => {
                    tracing::info!(attempt, "Upstream feed reconnecting");
                    metrics::record_feed_reconnect();
                }
                FeedEvent::Degraded { reason } => {
                    tracing::error!(%reason, "Upstream feed degraded");
                    metrics::record_feed_degraded();
                    self.service.notify_degraded(&reason).await;
                }
                FeedEvent::Closed => {
                    tracing::info!("Upstream feed closed");
                }
            }
        }

        tracing::info!("Broadcast relay stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================
