//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Events**: Counts of events delivered and dropped
//! - **Feed**: Upstream connection lifecycle counters
//! - **Sessions**: Viewer session and subscription gauges
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            #[allow(clippy::expect_used)]
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "relay_events_delivered_total",
        "Total normalized events delivered to viewer sessions"
    );
    describe_counter!(
        "relay_events_dropped_total",
        "Total events dropped due to slow viewer sessions"
    );

    describe_counter!(
        "relay_feed_connects_total",
        "Times the upstream feed reached the open state"
    );
    describe_counter!(
        "relay_feed_disconnects_total",
        "Times the upstream feed dropped unexpectedly"
    );
    describe_counter!(
        "relay_feed_reconnects_total",
        "Upstream reconnection attempts"
    );
    describe_counter!(
        "relay_feed_degraded_total",
        "Times the upstream feed was declared degraded"
    );

    describe_counter!(
        "relay_commands_total",
        "Viewer session commands received by action"
    );
    describe_gauge!("relay_sessions", "Connected viewer sessions");
    describe_gauge!(
        "relay_subscriptions",
        "Symbols with at least one subscribed session"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record events delivered to viewer sessions.
pub fn record_events_delivered(count: usize) {
    counter!("relay_events_delivered_total").increment(count as u64);
}

/// Record events dropped because a session channel was full.
pub fn record_events_dropped(count: usize) {
    counter!("relay_events_dropped_total").increment(count as u64);
}

/// Record the upstream feed reaching the open state.
pub fn record_feed_connected() {
    counter!("relay_feed_connects_total").increment(1);
}

/// Record an unexpected upstream disconnect.
pub fn record_feed_disconnected() {
    counter!("relay_feed_disconnects_total").increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_feed_reconnect() {
    counter!("relay_feed_reconnects_total").increment(1);
}

/// Record the upstream feed being declared degraded.
pub fn record_feed_degraded() {
    counter!("relay_feed_degraded_total").increment(1);
}

/// Record one viewer session command.
pub fn record_command(action: &'static str) {
    counter!("relay_commands_total", "action" => action).increment(1);
}

/// Update the connected session gauge.
pub fn set_sessions(count: f64) {
    gauge!("relay_sessions").set(count);
}

/// Update the active subscription gauge.
pub fn set_subscriptions(count: f64) {
    gauge!("relay_subscriptions").set(count);
}
