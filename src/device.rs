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

//! Remote device identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A remote Bluetooth endpoint as seen by discovery.
///
/// The hardware address is the stable part and keys the history partition;
/// the name is for display only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub name: String,
    pub address: String,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Address normalized to upper-case `AA:BB:CC:DD:EE:FF`, so that
    /// `aa-bb-...`, `AABBCC...` and `AA:BB:...` name the same device.
    /// Anything that is not a 48-bit address is only trimmed and upper-cased.
    pub fn normalized_address(&self) -> String {
        let trimmed = self.address.trim();
        let hex = self.hex_digits();
        let well_formed = trimmed
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == ':' || c == '-');

        if well_formed && hex.len() == 12 {
            hex.as_bytes()
                .chunks(2)
                .map(|pair| String::from_utf8_lossy(pair).into_owned())
                .collect::<Vec<_>>()
                .join(":")
        } else {
            trimmed.to_ascii_uppercase()
        }
    }

    /// Deterministic storage key for this device's history partition.
    /// Also the session registry key.
    pub fn storage_key(&self) -> String {
        format!("history_{}", self.hex_digits())
    }

    fn hex_digits(&self) -> String {
        self.address
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.normalized_address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_is_deterministic() {
        let a = DeviceIdentity::new("Printer", "AA:BB:CC:DD:EE:FF");
        let b = DeviceIdentity::new("Renamed", "aa-bb-cc-dd-ee-ff");

        assert_eq!(a.storage_key(), "history_AABBCCDDEEFF");
        assert_eq!(a.storage_key(), b.storage_key());
        assert_eq!(a.normalized_address(), b.normalized_address());
    }

    #[test]
    fn test_separator_free_address() {
        let plain = DeviceIdentity::new("Printer", "aabbccddeeff");
        let colons = DeviceIdentity::new("Printer", "AA:BB:CC:DD:EE:FF");

        assert_eq!(plain.normalized_address(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(plain.storage_key(), colons.storage_key());
    }

    #[test]
    fn test_display() {
        let device = DeviceIdentity::new("Printer", "aa:bb:cc:dd:ee:ff");
        assert_eq!(device.to_string(), "Printer (AA:BB:CC:DD:EE:FF)");
    }
}
