//! JSON encoding for push events.
//!
//! WebSocket clients receive one text frame per event:
//!
//! ```text
//! {"event":"newMessage","data":{"sender":"me","text":"hi","time":1700000000000}}
//! ```

use relay_core::PushEvent;

use crate::error::ProtocolError;
use crate::wire_types::{NewMessagePayload, PushFrame, NEW_MESSAGE_EVENT};

/// Build the wire frame for a push event.
pub fn push_frame(event: &PushEvent) -> PushFrame {
    match event {
        PushEvent::NewMessage(msg) => PushFrame {
            event: event.name().to_string(),
            data: NewMessagePayload::from(msg.as_ref()),
        },
    }
}

/// Encode a push event as a JSON text frame.
pub fn encode_push(event: &PushEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&push_frame(event))?)
}

/// Decode a JSON text frame back into a push frame (client side).
pub fn decode_push(raw: &str) -> Result<PushFrame, ProtocolError> {
    let frame: PushFrame = serde_json::from_str(raw)?;
    if frame.event != NEW_MESSAGE_EVENT {
        return Err(ProtocolError::UnknownEvent(frame.event));
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relay_core::{Message, ParticipantId, RecipientSelector};

    use super::*;

    #[test]
    fn push_payload_carries_sender_text_and_time_only() {
        let msg = Message {
            sender: ParticipantId::parse("me").unwrap(),
            recipient: RecipientSelector::Participant(ParticipantId::parse("friend").unwrap()),
            text: "hi".to_string(),
            time: 1_700_000_000_000,
            seq: 3,
        };
        let encoded = encode_push(&PushEvent::NewMessage(Arc::new(msg))).unwrap();

        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "event": "newMessage",
                "data": { "sender": "me", "text": "hi", "time": 1_700_000_000_000u64 }
            })
        );

        let frame = decode_push(&encoded).unwrap();
        assert_eq!(frame.data.text, "hi");
    }

    #[test]
    fn unknown_events_are_rejected() {
        let raw = r#"{"event":"typing","data":{"sender":"me","text":"","time":0}}"#;
        assert!(matches!(decode_push(raw), Err(ProtocolError::UnknownEvent(_))));
        assert!(matches!(decode_push("not json"), Err(ProtocolError::Json(_))));
    }
}
