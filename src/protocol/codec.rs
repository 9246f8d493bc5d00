// src/protocol/codec.rs

//! JSON framing for the execution session.
//!
//! Text and binary frames share one ceiling, large enough for big row
//! batches and job descriptions.

use crate::errors::{BridgeError, Result};
use crate::protocol::messages::{ControlMessage, RemoteEvent};

/// Largest single frame accepted or produced, in bytes.
pub const MAX_FRAME_BYTES: usize = 500_000;

/// Encode an outbound control message as a text frame payload.
pub fn encode_control(message: &ControlMessage) -> Result<String> {
    let text = serde_json::to_string(message)?;
    if text.len() > MAX_FRAME_BYTES {
        return Err(BridgeError::FrameTooLarge {
            size: text.len(),
            limit: MAX_FRAME_BYTES,
        });
    }
    Ok(text)
}

/// Decode an inbound frame payload (text or binary) into an event.
///
/// An empty or undecodable payload is an `InvalidDispatch`.
pub fn decode_event(payload: &[u8]) -> Result<RemoteEvent> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(BridgeError::InvalidDispatch("empty message".to_string()));
    }
    if payload.len() > MAX_FRAME_BYTES {
        return Err(BridgeError::FrameTooLarge {
            size: payload.len(),
            limit: MAX_FRAME_BYTES,
        });
    }
    serde_json::from_slice(payload)
        .map_err(|e| BridgeError::InvalidDispatch(format!("undecodable message: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{RemoteStatus, StopMessage};
    use crate::protocol::Scope;

    #[test]
    fn decodes_operation_status() {
        let event =
            decode_event(br#"{"type":"status","scope":{"operation":"sort"},"status":"running"}"#)
                .unwrap();
        assert_eq!(
            event,
            RemoteEvent::Status {
                scope: Scope::operation("sort"),
                status: RemoteStatus::Running,
            }
        );
    }

    #[test]
    fn decodes_job_wide_scope_and_defaults() {
        let event = decode_event(br#"{"type":"stop"}"#).unwrap();
        assert_eq!(
            event,
            RemoteEvent::Stop {
                reason: String::new(),
                errors: vec![],
            }
        );

        let event = decode_event(
            br#"{"type":"error","scope":"job_wide","message":"boom"}"#,
        )
        .unwrap();
        assert!(matches!(event, RemoteEvent::Error { scope: Scope::JobWide, .. }));
    }

    #[test]
    fn empty_and_garbage_payloads_are_invalid_dispatch() {
        assert!(matches!(decode_event(b""), Err(BridgeError::InvalidDispatch(_))));
        assert!(matches!(decode_event(b"  \n"), Err(BridgeError::InvalidDispatch(_))));
        assert!(matches!(
            decode_event(b"{\"type\":\"nope\"}"),
            Err(BridgeError::InvalidDispatch(_))
        ));
    }

    #[test]
    fn oversized_control_message_is_rejected() {
        let message = ControlMessage::Stop(StopMessage::new("x".repeat(MAX_FRAME_BYTES)));
        match encode_control(&message) {
            Err(BridgeError::FrameTooLarge { size, limit }) => {
                assert!(size > limit);
                assert_eq!(limit, MAX_FRAME_BYTES);
            }
            other => panic!("expected FrameTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn stop_message_carries_type_tag() {
        let text = encode_control(&ControlMessage::Stop(StopMessage::safe("user request"))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "stop");
        assert_eq!(value["safe"], true);
    }
}
