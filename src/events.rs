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

//! Events a session reports to its owner.

use crate::device::DeviceIdentity;
use crate::error::DecodeError;
use crate::message::Message;
use crate::session::SessionState;

/// Notifications emitted by a [`crate::session::Session`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// State transition.
    StateChanged {
        device: DeviceIdentity,
        state: SessionState,
    },
    /// A message from the peer was decoded and added to history.
    MessageReceived(Message),
    /// An inbound payload could not be decoded and was dropped.
    PayloadDropped(DecodeError),
    /// History could not be written; in-memory history stays authoritative.
    PersistFailed(String),
}

impl SessionEvent {
    /// One-line description for logs and status lines.
    pub fn summary(&self) -> String {
        match self {
            SessionEvent::StateChanged { device, state } => {
                format!("{}: {}", device, state.as_str())
            }
            SessionEvent::MessageReceived(message) => format!(
                "received {} ({} bytes)",
                message.kind.as_str(),
                message.payload.len()
            ),
            SessionEvent::PayloadDropped(e) => format!("dropped payload: {}", e),
            SessionEvent::PersistFailed(e) => format!("history not saved: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Direction;

    #[test]
    fn test_summary() {
        let event = SessionEvent::StateChanged {
            device: DeviceIdentity::new("Printer", "AA:BB:CC:DD:EE:FF"),
            state: SessionState::Connected,
        };
        assert_eq!(event.summary(), "Printer (AA:BB:CC:DD:EE:FF): Connected");

        let event = SessionEvent::MessageReceived(Message::text("yo", 1, Direction::Received));
        assert_eq!(event.summary(), "received text (2 bytes)");
    }
}
