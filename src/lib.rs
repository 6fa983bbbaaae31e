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

//! BlueChat: text, audio and photo chat between two devices over a classic
//! Bluetooth serial link.

pub mod bluetooth;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod message;
pub mod session;
pub mod storage;
pub mod timeline;

pub use device::DeviceIdentity;
pub use error::{ConnectError, DecodeError, PersistError, SessionError, TransportError};
pub use events::SessionEvent;
pub use message::{Direction, Message, MessageKind};
pub use session::{Session, SessionOptions, SessionRegistry, SessionState};
pub use storage::HistoryStore;
