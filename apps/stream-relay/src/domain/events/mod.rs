//! Normalized Event Types
//!
//! The canonical event record every vendor message variant is mapped into
//! before fan-out. Vendor messages are heterogeneous (trades carry a price,
//! minute aggregates carry an OHLCV window); the normalized record is one
//! flat schema where every kind-specific field is independently optional.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::subscription::Symbol;

/// Kind of normalized market data event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Individual trade tick.
    #[serde(rename = "T")]
    Trade,
    /// Minute-level OHLCV aggregate bar.
    #[serde(rename = "AM")]
    MinuteAggregate,
}

impl EventKind {
    /// Wire code for the event kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "T",
            Self::MinuteAggregate => "AM",
        }
    }
}

/// One canonical market data event.
///
/// `t` is the vendor's raw epoch timestamp, carried untouched; `t_utc` and
/// `t_et` are the derived ISO-8601 renderings in UTC and America/New_York.
/// For minute aggregates the conventional timestamp is the window end; for
/// trades it is the event's own timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Event kind code ("T" or "AM").
    pub ev: EventKind,

    /// Ticker symbol.
    pub sym: Symbol,

    /// Raw epoch timestamp as received (unit-ambiguous: seconds or millis).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<i64>,

    /// Derived UTC ISO-8601 timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_utc: Option<String>,

    /// Derived America/New_York ISO-8601 timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_et: Option<String>,

    /// Trade price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<Decimal>,

    /// Window open price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub o: Option<Decimal>,

    /// Window high price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<Decimal>,

    /// Window low price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l: Option<Decimal>,

    /// Window close price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c: Option<Decimal>,

    /// Window volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<u64>,

    /// Accumulated volume for the day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub av: Option<u64>,

    /// Official opening price for the day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<Decimal>,

    /// Volume-weighted average price for the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vw: Option<Decimal>,

    /// Volume-weighted average price for the day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a: Option<Decimal>,

    /// Average trade size for the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<u64>,

    /// Window start epoch timestamp (milliseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<i64>,

    /// Window end epoch timestamp (milliseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<i64>,

    /// Whether the aggregate covers OTC trading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otc: Option<bool>,
}

impl NormalizedEvent {
    /// Create an event with every optional field empty.
    #[must_use]
    pub fn empty(ev: EventKind, sym: Symbol) -> Self {
        Self {
            ev,
            sym,
            t: None,
            t_utc: None,
            t_et: None,
            p: None,
            o: None,
            h: None,
            l: None,
            c: None,
            v: None,
            av: None,
            op: None,
            vw: None,
            a: None,
            z: None,
            s: None,
            e: None,
            otc: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_wire_codes() {
        assert_eq!(EventKind::Trade.as_str(), "T");
        assert_eq!(EventKind::MinuteAggregate.as_str(), "AM");
        assert_eq!(serde_json::to_string(&EventKind::Trade).unwrap(), "\"T\"");
        assert_eq!(
            serde_json::to_string(&EventKind::MinuteAggregate).unwrap(),
            "\"AM\""
        );
    }

    #[test]
    fn absent_fields_are_omitted_on_the_wire() {
        let event = NormalizedEvent::empty(EventKind::Trade, "AAPL".to_string());
        let json = serde_json::to_value(&event).unwrap();

        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["ev"], "T");
        assert_eq!(obj["sym"], "AAPL");
    }

    #[test]
    fn populated_fields_serialize() {
        let mut event = NormalizedEvent::empty(EventKind::MinuteAggregate, "MSFT".to_string());
        event.t = Some(1_700_000_000_000);
        event.v = Some(1200);
        event.otc = Some(false);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["ev"], "AM");
        assert_eq!(json["t"], 1_700_000_000_000_i64);
        assert_eq!(json["v"], 1200);
        assert_eq!(json["otc"], false);
    }
}
