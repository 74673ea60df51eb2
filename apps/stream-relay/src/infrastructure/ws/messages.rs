//! Viewer Session Wire Messages
//!
//! JSON message schema spoken over each downstream WebSocket session.
//! Inbound commands are tagged by `action`, outbound messages by `event`.
//! Acknowledgements carry the symbol list echoed back; market data is the
//! normalized event serialized flat at the top level next to the tag.

use serde::{Deserialize, Serialize};

use crate::domain::events::NormalizedEvent;
use crate::domain::subscription::Symbol;

// =============================================================================
// Inbound Commands
// =============================================================================

/// Command payload: the list of symbols the command applies to.
///
/// The single-symbol contract is enforced after parsing, not by the schema,
/// so an over-long list can be rejected with a descriptive reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionsPayload {
    /// Symbols named by the command.
    pub subscriptions: Vec<Symbol>,
}

/// A command received from a viewer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Add one symbol to the session's desired set.
    SubscribeOne(SubscriptionsPayload),
    /// Remove one symbol from the session's desired set.
    UnsubscribeOne(SubscriptionsPayload),
}

impl ClientCommand {
    /// Extract the single symbol a command names.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the payload does not contain
    /// exactly one symbol or the symbol is blank.
    pub fn single_symbol(&self) -> Result<Symbol, String> {
        let payload = match self {
            Self::SubscribeOne(p) | Self::UnsubscribeOne(p) => p,
        };
        match payload.subscriptions.as_slice() {
            [symbol] if !symbol.trim().is_empty() => Ok(symbol.trim().to_string()),
            [_] => Err("symbol must be non-empty".to_string()),
            [] => Err("subscriptions list is empty".to_string()),
            _ => Err("exactly one symbol per command".to_string()),
        }
    }
}

// =============================================================================
// Outbound Messages
// =============================================================================

/// A message sent to a viewer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Unicast acknowledgement of a subscribe command.
    Subscribed {
        /// Symbols the acknowledgement covers.
        subscriptions: Vec<Symbol>,
        /// Optional human-readable context for the outcome.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Unicast acknowledgement of an unsubscribe command.
    Unsubscribed {
        /// Symbols the acknowledgement covers.
        subscriptions: Vec<Symbol>,
        /// Why the symbols were removed.
        reason: String,
    },
    /// One normalized market data event.
    PolygonData(NormalizedEvent),
    /// The upstream feed gave up reconnecting; listed symbols are stale.
    FeedDegraded {
        /// The session's own held symbols at the time of degradation.
        symbols: Vec<Symbol>,
        /// Why the feed is degraded.
        reason: String,
    },
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::events::EventKind;

    #[test]
    fn subscribe_command_parses() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"action":"subscribe_one","subscriptions":["AAPL"]}"#)
                .unwrap();
        assert_eq!(cmd.single_symbol().unwrap(), "AAPL");
    }

    #[test]
    fn unsubscribe_command_parses() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"action":"unsubscribe_one","subscriptions":["MSFT"]}"#)
                .unwrap();
        assert!(matches!(cmd, ClientCommand::UnsubscribeOne(_)));
        assert_eq!(cmd.single_symbol().unwrap(), "MSFT");
    }

    #[test_case(r#"["AAPL"]"#, Ok("AAPL") ; "single symbol")]
    #[test_case(r#"[" tsla "]"#, Ok("tsla") ; "whitespace trimmed")]
    #[test_case(r#"["AAPL","MSFT"]"#, Err(()) ; "multiple symbols rejected")]
    #[test_case(r#"[]"#, Err(()) ; "empty list rejected")]
    #[test_case(r#"["  "]"#, Err(()) ; "blank symbol rejected")]
    fn single_symbol_validation(subscriptions: &str, expected: Result<&str, ()>) {
        let json = format!(r#"{{"action":"subscribe_one","subscriptions":{subscriptions}}}"#);
        let cmd: ClientCommand = serde_json::from_str(&json).unwrap();
        match expected {
            Ok(symbol) => assert_eq!(cmd.single_symbol().unwrap(), symbol),
            Err(()) => assert!(cmd.single_symbol().is_err()),
        }
    }

    #[test]
    fn subscribed_ack_serializes_with_event_tag() {
        let msg = ServerMessage::Subscribed {
            subscriptions: vec!["AAPL".to_string()],
            reason: Some("opened new upstream connection".to_string()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "subscribed");
        assert_eq!(json["subscriptions"][0], "AAPL");
        assert_eq!(json["reason"], "opened new upstream connection");
    }

    #[test]
    fn subscribed_ack_omits_absent_reason() {
        let msg = ServerMessage::Subscribed {
            subscriptions: vec!["AAPL".to_string()],
            reason: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn market_data_serializes_flat() {
        let mut event = NormalizedEvent::empty(EventKind::Trade, "AAPL".to_string());
        event.t = Some(1_700_000_000_000);

        let json = serde_json::to_value(ServerMessage::PolygonData(event)).unwrap();
        assert_eq!(json["event"], "polygon_data");
        assert_eq!(json["ev"], "T");
        assert_eq!(json["sym"], "AAPL");
        assert_eq!(json["t"], 1_700_000_000_000_i64);
    }
}
