//! Event Normalization
//!
//! Maps decoded vendor messages into the canonical flat event record.
//! Vendor epoch timestamps are unit-ambiguous; values above 10^12 are
//! treated as milliseconds and anything smaller as seconds. Each event
//! carries the raw timestamp plus derived ISO-8601 renderings in UTC and
//! America/New_York.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::America::New_York;

use crate::domain::events::{EventKind, NormalizedEvent};
use crate::infrastructure::polygon::messages::PolygonMessage;

/// Epoch values above this are milliseconds, below it seconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Interpret a unit-ambiguous epoch timestamp.
fn datetime_from_epoch(ts: i64) -> Option<DateTime<Utc>> {
    if ts > MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(ts).single()
    } else {
        Utc.timestamp_opt(ts, 0).single()
    }
}

/// Render the UTC and America/New_York forms of an epoch timestamp.
#[must_use]
pub fn render_timestamps(ts: i64) -> (Option<String>, Option<String>) {
    match datetime_from_epoch(ts) {
        Some(utc) => {
            let eastern = utc.with_timezone(&New_York);
            (Some(utc.to_rfc3339()), Some(eastern.to_rfc3339()))
        }
        None => (None, None),
    }
}

/// Normalize one vendor message into the canonical event record.
///
/// Status frames and any market data message without a usable symbol
/// produce `None` and are dropped from delivery.
#[must_use]
pub fn normalize(msg: &PolygonMessage) -> Option<NormalizedEvent> {
    match msg {
        PolygonMessage::Trade(trade) => {
            if trade.sym.is_empty() {
                tracing::trace!("Dropping trade without symbol");
                return None;
            }
            let mut event = NormalizedEvent::empty(EventKind::Trade, trade.sym.clone());
            event.t = trade.t;
            event.p = trade.p;
            if let Some(ts) = trade.t {
                let (utc, et) = render_timestamps(ts);
                event.t_utc = utc;
                event.t_et = et;
            }
            Some(event)
        }
        PolygonMessage::MinuteAggregate(am) => {
            if am.sym.is_empty() {
                tracing::trace!("Dropping aggregate without symbol");
                return None;
            }
            let mut event = NormalizedEvent::empty(EventKind::MinuteAggregate, am.sym.clone());
            // An aggregate's conventional timestamp is its window end.
            event.t = am.e.or(am.s);
            event.o = am.o;
            event.h = am.h;
            event.l = am.l;
            event.c = am.c;
            event.v = am.v;
            event.av = am.av;
            event.op = am.op;
            event.vw = am.vw;
            event.a = am.a;
            event.z = am.z;
            event.s = am.s;
            event.e = am.e;
            event.otc = am.otc;
            if let Some(ts) = event.t {
                let (utc, et) = render_timestamps(ts);
                event.t_utc = utc;
                event.t_et = et;
            }
            Some(event)
        }
        PolygonMessage::Status(_) => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
