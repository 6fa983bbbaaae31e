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

//! Device discovery through BlueZ.

use bluer::{Adapter, AdapterEvent, Address, ErrorKind};
use futures::{pin_mut, StreamExt};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::device::DeviceIdentity;
use crate::error::ConnectError;

/// Map a BlueZ error onto the user-facing connect taxonomy.
pub(crate) fn map_bluer_error(err: bluer::Error) -> ConnectError {
    match err.kind {
        ErrorKind::NotReady => ConnectError::BluetoothDisabled,
        ErrorKind::NotAuthorized | ErrorKind::NotPermitted => ConnectError::PermissionDenied,
        ErrorKind::NotFound | ErrorKind::NotAvailable => ConnectError::BluetoothUnavailable,
        _ => ConnectError::DeviceUnreachable(err.to_string()),
    }
}

/// Open the default adapter and make sure it is usable.
pub(crate) async fn open_adapter() -> Result<Adapter, ConnectError> {
    let session = bluer::Session::new().await.map_err(|e| {
        warn!("BlueZ session unavailable: {}", e);
        ConnectError::BluetoothUnavailable
    })?;

    let adapter = session.default_adapter().await.map_err(map_bluer_error)?;
    info!("Using Bluetooth adapter: {}", adapter.name());

    Ok(adapter)
}

/// Fail with `BluetoothDisabled` when the adapter is powered off.
pub(crate) async fn ensure_powered(adapter: &Adapter) -> Result<(), ConnectError> {
    if adapter.is_powered().await.map_err(map_bluer_error)? {
        Ok(())
    } else {
        Err(ConnectError::BluetoothDisabled)
    }
}

/// Enumerates bonded and nearby devices.
pub struct Discovery {
    adapter: Adapter,
}

impl Discovery {
    /// Create a discovery handle on the default adapter.
    pub async fn new() -> Result<Self, ConnectError> {
        let adapter = open_adapter().await?;
        Ok(Self { adapter })
    }

    /// Devices already bonded with this adapter.
    pub async fn paired_devices(&self) -> Result<Vec<DeviceIdentity>, ConnectError> {
        ensure_powered(&self.adapter).await?;

        let mut devices = Vec::new();
        for addr in self.adapter.device_addresses().await.map_err(map_bluer_error)? {
            let device = self.adapter.device(addr).map_err(map_bluer_error)?;
            if device.is_paired().await.unwrap_or(false) {
                devices.push(self.identity(addr).await);
            }
        }

        info!("Found {} paired device(s)", devices.len());
        Ok(devices)
    }

    /// Devices seen during a discovery window of `duration`.
    pub async fn scan(&self, duration: Duration) -> Result<Vec<DeviceIdentity>, ConnectError> {
        ensure_powered(&self.adapter).await?;

        info!("Scanning for devices for {:?}...", duration);
        let events = self.adapter.discover_devices().await.map_err(map_bluer_error)?;
        pin_mut!(events);

        let deadline = tokio::time::Instant::now() + duration;
        let mut seen = BTreeSet::new();

        loop {
            match tokio::time::timeout_at(deadline, events.next()).await {
                Ok(Some(AdapterEvent::DeviceAdded(addr))) => {
                    debug!("Discovered {}", addr);
                    seen.insert(addr);
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }

        let mut devices = Vec::with_capacity(seen.len());
        for addr in seen {
            devices.push(self.identity(addr).await);
        }

        info!("Scan finished, {} device(s) found", devices.len());
        Ok(devices)
    }

    async fn identity(&self, addr: Address) -> DeviceIdentity {
        let name = match self.adapter.device(addr) {
            Ok(device) => device.alias().await.unwrap_or_else(|_| addr.to_string()),
            Err(_) => addr.to_string(),
        };
        DeviceIdentity::new(name, addr.to_string())
    }
}
