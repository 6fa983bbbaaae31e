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

//! RFCOMM (Serial Port Profile) client connector.

use async_trait::async_trait;
use bluer::rfcomm::{SocketAddr, Stream};
use bluer::{Adapter, Address};
use std::io;
use tracing::{info, warn};
use uuid::Uuid;

use super::discovery::{ensure_powered, open_adapter};
use super::transport::{Connector, Link, StreamTransport};
use crate::device::DeviceIdentity;
use crate::error::ConnectError;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Default RFCOMM channel.
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Connects to a remote device's serial port service.
pub struct RfcommConnector {
    adapter: Adapter,
    channel: u8,
    max_frame: usize,
}

impl RfcommConnector {
    /// Create a connector on the default adapter.
    pub async fn new(channel: u8, max_frame: usize) -> Result<Self, ConnectError> {
        let adapter = open_adapter().await?;
        Ok(Self {
            adapter,
            channel,
            max_frame,
        })
    }
}

fn map_io_error(err: io::Error) -> ConnectError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => ConnectError::PermissionDenied,
        _ => ConnectError::DeviceUnreachable(err.to_string()),
    }
}

#[async_trait]
impl Connector for RfcommConnector {
    async fn connect(&self, device: &DeviceIdentity) -> Result<Link, ConnectError> {
        ensure_powered(&self.adapter).await?;

        let address: Address = device.normalized_address().parse().map_err(|_| {
            ConnectError::DeviceUnreachable(format!("invalid address: {}", device.address))
        })?;

        info!(
            "Opening RFCOMM channel {} to {} (SPP {})",
            self.channel, device, SPP_UUID
        );
        let stream = Stream::connect(SocketAddr::new(address, self.channel))
            .await
            .map_err(|e| {
                warn!("RFCOMM connect to {} failed: {}", device, e);
                map_io_error(e)
            })?;

        info!("Connected to {}", device);
        Ok(StreamTransport::spawn(stream, self.max_frame))
    }
}
