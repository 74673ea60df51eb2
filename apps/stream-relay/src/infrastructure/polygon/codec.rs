//! Frame Codec
//!
//! Decodes one inbound WebSocket text frame into vendor messages. Frames
//! are normally JSON arrays; a bare object is accepted as a one-element
//! batch. Decoding is per element: a malformed or unrecognized element is
//! logged and skipped so one bad record never drops its whole batch.

use super::messages::PolygonMessage;

/// Decode a text frame into the messages it carries.
#[must_use]
pub fn decode_frame(text: &str) -> Vec<PolygonMessage> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Discarding unparseable upstream frame");
            return Vec::new();
        }
    };

    let elements = match value {
        serde_json::Value::Array(items) => items,
        obj @ serde_json::Value::Object(_) => vec![obj],
        other => {
            tracing::warn!(?other, "Discarding non-object upstream frame");
            return Vec::new();
        }
    };

    let mut messages = Vec::with_capacity(elements.len());
    for element in elements {
        match serde_json::from_value::<PolygonMessage>(element) {
            Ok(msg) => messages.push(msg),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unrecognized upstream message");
            }
        }
    }
    messages
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_batch() {
        let frame = r#"[
            {"ev":"status","status":"connected","message":"Connected Successfully"},
            {"ev":"T","sym":"AAPL","p":189.41,"t":1700000000000},
            {"ev":"AM","sym":"MSFT","o":370.1,"c":370.4,"s":1700000000000,"e":1700000060000}
        ]"#;
        let messages = decode_frame(frame);
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], PolygonMessage::Status(_)));
        assert!(matches!(messages[1], PolygonMessage::Trade(_)));
        assert!(matches!(messages[2], PolygonMessage::MinuteAggregate(_)));
    }

    #[test]
    fn accepts_bare_object_frame() {
        let messages = decode_frame(r#"{"ev":"T","sym":"AAPL","t":1700000000000}"#);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn skips_bad_elements_without_dropping_batch() {
        let frame = r#"[
            {"ev":"XX","sym":"AAPL"},
            {"ev":"T","sym":"AAPL","t":1700000000000},
            42
        ]"#;
        let messages = decode_frame(frame);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], PolygonMessage::Trade(_)));
    }

    #[test]
    fn unparseable_frame_yields_empty_batch() {
        assert!(decode_frame("not json").is_empty());
        assert!(decode_frame("\"just a string\"").is_empty());
    }
}
