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

//! Bluetooth communication module.
//!
//! Wire codec, stream framing and the transport seam used by sessions.
//! The BlueZ-backed RFCOMM connector and discovery live behind the `bluez`
//! feature.

pub mod protocol;
pub mod reassembler;
pub mod transport;

#[cfg(feature = "bluez")]
mod discovery;
#[cfg(feature = "bluez")]
mod rfcomm;

pub use protocol::{decode, encode, WireMessage};
pub use reassembler::{MessageReassembler, DEFAULT_MAX_FRAME};
pub use transport::{Connector, Link, StreamTransport, Transport, TransportEvent};

#[cfg(feature = "bluez")]
pub use discovery::Discovery;
#[cfg(feature = "bluez")]
pub use rfcomm::{RfcommConnector, DEFAULT_RFCOMM_CHANNEL, SPP_UUID};
