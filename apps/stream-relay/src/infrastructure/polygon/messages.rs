//! Vendor Wire Messages
//!
//! Typed schema for the Polygon stocks WebSocket cluster. Inbound frames
//! are JSON arrays of heterogeneous messages discriminated by `ev`;
//! outbound control frames are single objects discriminated by `action`
//! with a comma-separated `params` channel list.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::subscription::Symbol;

// =============================================================================
// Inbound Messages
// =============================================================================

/// One trade tick (`ev == "T"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Ticker symbol.
    pub sym: Symbol,
    /// Trade price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<Decimal>,
    /// Trade size in shares.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Exchange identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<u64>,
    /// Event epoch timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<i64>,
    /// Trade condition codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c: Option<Vec<u32>>,
}

/// One minute-level OHLCV aggregate (`ev == "AM"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMessage {
    /// Ticker symbol.
    pub sym: Symbol,
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
    /// Window open price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub o: Option<Decimal>,
    /// Window close price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c: Option<Decimal>,
    /// Window high price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<Decimal>,
    /// Window low price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l: Option<Decimal>,
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

/// A lifecycle status frame (`ev == "status"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Machine-readable status code.
    pub status: String,
    /// Human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Status codes the handshake cares about.
pub mod status {
    /// Socket accepted, authentication expected next.
    pub const CONNECTED: &str = "connected";
    /// Credential accepted.
    pub const AUTH_SUCCESS: &str = "auth_success";
    /// Credential rejected.
    pub const AUTH_FAILED: &str = "auth_failed";
}

/// One decoded vendor message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ev")]
pub enum PolygonMessage {
    /// Trade tick.
    #[serde(rename = "T")]
    Trade(TradeMessage),
    /// Minute aggregate bar.
    #[serde(rename = "AM")]
    MinuteAggregate(AggregateMessage),
    /// Connection lifecycle status.
    #[serde(rename = "status")]
    Status(StatusMessage),
}

impl PolygonMessage {
    /// Symbol the message concerns, when it is market data.
    #[must_use]
    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Trade(t) => Some(&t.sym),
            Self::MinuteAggregate(a) => Some(&a.sym),
            Self::Status(_) => None,
        }
    }
}

// =============================================================================
// Outbound Control Frames
// =============================================================================

/// A control frame sent to the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlRequest {
    /// Present the API credential.
    Auth {
        /// The API key.
        params: String,
    },
    /// Subscribe the listed channels.
    Subscribe {
        /// Comma-separated channel list.
        params: String,
    },
    /// Unsubscribe the listed channels.
    Unsubscribe {
        /// Comma-separated channel list.
        params: String,
    },
}

impl ControlRequest {
    /// Serialize to the JSON text the vendor expects.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails, which cannot happen for
    /// these variants in practice.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Channel list covering both feeds a relay subscription implies.
#[must_use]
pub fn channel_params(symbol: &Symbol) -> String {
    format!("T.{symbol},AM.{symbol}")
}

// =============================================================================
// Tests
// =============================================================================
