// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Wire payload definitions and serialization.
//!
//! One payload is a JSON object:
//!
//! ```text
//! {"type": "text" | "audio" | "image", "content": "...", "timestamp": 1700000000000}
//! ```
//!
//! `content` is the text body for `text` and a local resource reference for
//! `audio`/`image`. The sender's timestamp is trusted as-is.

use serde::Deserialize;
use serde_json::json;

use crate::error::DecodeError;
use crate::message::{Direction, Message, MessageKind};

/// A decoded payload before it is stamped into a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: i64,
}

impl WireMessage {
    /// Turn the payload into a history message tagged as received.
    pub fn into_received(self) -> Message {
        Message::new(self.kind, self.content, self.timestamp, Direction::Received)
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            kind: message.kind,
            content: message.payload.clone(),
            timestamp: message.timestamp,
        }
    }
}

/// Loose shape used for parsing so that an unknown `type` can be told apart
/// from a structurally broken payload.
#[derive(Deserialize)]
struct RawPayload {
    #[serde(rename = "type")]
    message_type: String,
    content: Option<String>,
    timestamp: Option<i64>,
}

/// Encode a message into its wire payload (without framing).
pub fn encode(message: &Message) -> Vec<u8> {
    json!({
        "type": message.kind.as_str(),
        "content": message.payload,
        "timestamp": message.timestamp,
    })
    .to_string()
    .into_bytes()
}

/// Decode one wire payload.
pub fn decode(bytes: &[u8]) -> Result<WireMessage, DecodeError> {
    let raw: RawPayload =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let kind = MessageKind::parse(&raw.message_type)
        .ok_or_else(|| DecodeError::UnknownType(raw.message_type.clone()))?;

    let content = raw
        .content
        .ok_or_else(|| DecodeError::Malformed("missing field `content`".to_string()))?;
    let timestamp = raw
        .timestamp
        .ok_or_else(|| DecodeError::Malformed("missing field `timestamp`".to_string()))?;

    Ok(WireMessage {
        kind,
        content,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_shape() {
        let msg = Message::text("Hello, World!", 1000, Direction::Sent);
        let json = String::from_utf8(encode(&msg)).unwrap();

        assert!(json.contains("\"type\":\"text\""));
        assert!(json.contains("\"content\":\"Hello, World!\""));
        assert!(json.contains("\"timestamp\":1000"));
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_roundtrip_all_kinds() {
        let cases = [
            (MessageKind::Text, "hello"),
            (MessageKind::Audio, "file:///data/audio/rec-1.m4a"),
            (MessageKind::Image, "content://media/external/images/42"),
        ];

        for (kind, content) in cases {
            let msg = Message::new(kind, content, 1_700_000_000_000, Direction::Sent);
            let decoded = decode(&encode(&msg)).unwrap();
            assert_eq!(decoded, WireMessage::from(&msg));
        }
    }

    #[test]
    fn test_decode_not_json() {
        assert!(matches!(
            decode(b"not-json"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(decode(b""), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode(&[0xff, 0xfe, 0x00]),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_unknown_type() {
        let result = decode(br#"{"type":"video","content":"x","timestamp":1}"#);
        assert_eq!(result, Err(DecodeError::UnknownType("video".to_string())));

        let result = decode(br#"{"type":"video"}"#);
        assert_eq!(result, Err(DecodeError::UnknownType("video".to_string())));
    }

    #[test]
    fn test_decode_missing_fields() {
        assert!(matches!(
            decode(br#"{"type":"text","timestamp":1}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(br#"{"type":"text","content":"x"}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(br#"{"content":"x","timestamp":1}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_empty_text() {
        let decoded = decode(br#"{"type":"text","content":"","timestamp":5}"#).unwrap();
        assert_eq!(decoded.kind, MessageKind::Text);
        assert_eq!(decoded.content, "");

        let message = decoded.into_received();
        assert_eq!(message.direction, Direction::Received);
        assert_eq!(message.timestamp, 5);
    }

    #[test]
    fn test_decode_tolerates_trailing_newline() {
        let decoded = decode(b"{\"type\":\"text\",\"content\":\"yo\",\"timestamp\":2000}\n").unwrap();
        assert_eq!(decoded.content, "yo");
    }
}
