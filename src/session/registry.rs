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

//! Registry of active sessions, one per device.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::device::DeviceIdentity;
use crate::error::SessionError;

/// Tracks which devices currently have an active session.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static SessionRegistry {
        static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SessionRegistry::new)
    }

    /// Claim `device`. Fails if another session already holds it.
    pub fn acquire(&self, device: &DeviceIdentity) -> Result<SessionLease, SessionError> {
        let key = device.storage_key();
        if !self.active.lock().insert(key.clone()) {
            return Err(SessionError::AlreadyActive(device.normalized_address()));
        }

        debug!("Session lease acquired for {}", device);
        Ok(SessionLease {
            active: self.active.clone(),
            key,
        })
    }

    pub fn is_active(&self, device: &DeviceIdentity) -> bool {
        self.active.lock().contains(&device.storage_key())
    }
}

/// Exclusive claim on a device; released on drop.
#[derive(Debug)]
pub struct SessionLease {
    active: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
        debug!("Session lease released for {}", self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected() {
        let registry = SessionRegistry::new();
        let device = DeviceIdentity::new("Printer", "AA:BB:CC:DD:EE:FF");
        let same = DeviceIdentity::new("Other name", "aa:bb:cc:dd:ee:ff");

        let lease = registry.acquire(&device).unwrap();
        assert!(registry.is_active(&device));
        assert!(matches!(
            registry.acquire(&same),
            Err(SessionError::AlreadyActive(_))
        ));

        drop(lease);
        assert!(!registry.is_active(&device));
        assert!(registry.acquire(&same).is_ok());
    }

    #[test]
    fn test_address_spellings_share_a_lease() {
        let registry = SessionRegistry::new();
        let colons = DeviceIdentity::new("Printer", "AA:BB:CC:DD:EE:FF");
        let plain = DeviceIdentity::new("Printer", "AABBCCDDEEFF");

        let _lease = registry.acquire(&colons).unwrap();
        assert!(registry.is_active(&plain));
        assert!(matches!(
            registry.acquire(&plain),
            Err(SessionError::AlreadyActive(addr)) if addr == "AA:BB:CC:DD:EE:FF"
        ));
    }

    #[test]
    fn test_distinct_devices() {
        let registry = SessionRegistry::new();
        let _a = registry
            .acquire(&DeviceIdentity::new("A", "11:11:11:11:11:11"))
            .unwrap();
        let _b = registry
            .acquire(&DeviceIdentity::new("B", "22:22:22:22:22:22"))
            .unwrap();
    }
}
