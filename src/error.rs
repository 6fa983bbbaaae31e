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

//! Error types shared by the session, codec, transport and history layers.

use thiserror::Error;

/// Reasons a connect attempt can fail.
///
/// Surfaced to the user as an actionable alert.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("bluetooth permission denied")]
    PermissionDenied,

    #[error("bluetooth is disabled")]
    BluetoothDisabled,

    #[error("bluetooth is not available on this system")]
    BluetoothUnavailable,
}

/// Inbound payload could not be turned into a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),
}

/// Transport-level failures seen by a writer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),
}

/// History persistence failures. Never fatal to a session.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("history database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("history record error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("session is not connected")]
    NotConnected,

    #[error("a connect attempt is already in progress")]
    ConnectInProgress,

    #[error("a session for {0} is already active")]
    AlreadyActive(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
