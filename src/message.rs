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

//! Conversation message model.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Kind of content a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Audio,
    Image,
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Image => "image",
        }
    }

    /// Parse from the wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "audio" => Some(Self::Audio),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Handed to the transport by this device. Not a delivery receipt.
    Sent,
    /// Decoded from the transport.
    Received,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "me",
            Self::Received => "peer",
        }
    }
}

/// A single entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    /// Text body, or a local resource reference for audio and image.
    pub payload: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub direction: Direction,
}

impl Message {
    /// Create a message with a fresh id.
    pub fn new(
        kind: MessageKind,
        payload: impl Into<String>,
        timestamp: i64,
        direction: Direction,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            payload: payload.into(),
            timestamp,
            direction,
        }
    }

    pub fn text(payload: impl Into<String>, timestamp: i64, direction: Direction) -> Self {
        Self::new(MessageKind::Text, payload, timestamp, direction)
    }

    pub fn is_sent(&self) -> bool {
        self.direction == Direction::Sent
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        for kind in [MessageKind::Text, MessageKind::Audio, MessageKind::Image] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::parse("video"), None);
        assert_eq!(MessageKind::parse("TEXT"), None);
    }

    #[test]
    fn test_new_messages_get_unique_ids() {
        let a = Message::text("hi", 1000, Direction::Sent);
        let b = Message::text("hi", 1000, Direction::Sent);
        assert_ne!(a.id, b.id);
        assert!(a.is_sent());
    }
}
