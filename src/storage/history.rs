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

//! Per-device history storage using SQLite.
//!
//! Each device owns one row holding its whole partition as a JSON array of
//! [`HistoryRecord`]s. Every mutation rewrites the row in a single statement,
//! so a failed write leaves the previous snapshot in place.

use chrono::{Local, TimeZone};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::conversation::Conversation;
use crate::device::DeviceIdentity;
use crate::error::PersistError;
use crate::message::{now_millis, Direction, Message, MessageKind};

/// Persisted form of a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    /// Text body; empty for audio and image entries.
    #[serde(rename = "texto")]
    pub text: String,
    pub device_id: String,
    pub timestamp: i64,
    pub is_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
}

impl HistoryRecord {
    pub fn from_message(message: &Message, device: &DeviceIdentity) -> Self {
        let (text, audio_path, image_uri) = match message.kind {
            MessageKind::Text => (message.payload.clone(), None, None),
            MessageKind::Audio => (String::new(), Some(message.payload.clone()), None),
            MessageKind::Image => (String::new(), None, Some(message.payload.clone())),
        };

        Self {
            id: message.id.clone(),
            text,
            device_id: device.normalized_address(),
            timestamp: message.timestamp,
            is_sent: message.is_sent(),
            audio_path,
            image_uri,
        }
    }

    pub fn into_message(self) -> Message {
        let (kind, payload) = match (self.audio_path, self.image_uri) {
            (Some(path), _) => (MessageKind::Audio, path),
            (None, Some(uri)) => (MessageKind::Image, uri),
            (None, None) => (MessageKind::Text, self.text),
        };

        Message {
            id: self.id,
            kind,
            payload,
            timestamp: self.timestamp,
            direction: if self.is_sent {
                Direction::Sent
            } else {
                Direction::Received
            },
        }
    }
}

/// History database manager.
#[derive(Clone)]
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    /// Create or open the history database in `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self, PersistError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("history.db");
        info!("Opening history database: {:?}", db_path);

        Self::with_connection(Connection::open(&db_path)?)
    }

    /// Volatile store, mostly for tests.
    pub fn in_memory() -> Result<Self, PersistError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS partitions (
                key TEXT PRIMARY KEY,
                address TEXT NOT NULL,
                device_name TEXT NOT NULL,
                records TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Load a device's history, oldest first. Empty if nothing was persisted.
    pub fn load(&self, device: &DeviceIdentity) -> Result<Vec<Message>, PersistError> {
        let records: Option<String> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT records FROM partitions WHERE key = ?1",
                [device.storage_key()],
                |row| row.get(0),
            )
            .optional()?
        };

        let Some(records) = records else {
            debug!("No history for {}", device);
            return Ok(Vec::new());
        };

        let records: Vec<HistoryRecord> = serde_json::from_str(&records)?;
        let conversation =
            Conversation::from_messages(records.into_iter().map(HistoryRecord::into_message));

        debug!("Loaded {} message(s) for {}", conversation.len(), device);
        Ok(conversation.into_messages())
    }

    /// Replace the device's whole partition with `messages`.
    pub fn persist(&self, device: &DeviceIdentity, messages: &[Message]) -> Result<(), PersistError> {
        let records: Vec<HistoryRecord> = messages
            .iter()
            .map(|m| HistoryRecord::from_message(m, device))
            .collect();
        let json = serde_json::to_string(&records)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO partitions (key, address, device_name, records, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
                address = excluded.address,
                device_name = excluded.device_name,
                records = excluded.records,
                updated_at = excluded.updated_at",
            params![
                device.storage_key(),
                device.normalized_address(),
                device.name,
                json,
                now_millis()
            ],
        )?;

        debug!("Persisted {} message(s) for {}", records.len(), device);
        Ok(())
    }

    /// Append one message and persist the partition.
    ///
    /// Returns `false` if a message with the same id was already stored.
    pub fn append(&self, device: &DeviceIdentity, message: Message) -> Result<bool, PersistError> {
        let mut conversation = Conversation::from_messages(self.load(device)?);
        if !conversation.insert(message) {
            return Ok(false);
        }
        self.persist(device, conversation.messages())?;
        Ok(true)
    }

    /// Text messages containing `query`, oldest first.
    pub fn search(&self, device: &DeviceIdentity, query: &str) -> Result<Vec<Message>, PersistError> {
        let needle = query.to_lowercase();
        Ok(self
            .load(device)?
            .into_iter()
            .filter(|m| m.kind == MessageKind::Text && m.payload.to_lowercase().contains(&needle))
            .collect())
    }

    /// Export a device's history to a text file. Returns the number of lines.
    pub fn export(&self, device: &DeviceIdentity, path: &Path) -> Result<usize, PersistError> {
        let messages = self.load(device)?;
        let mut content = String::new();

        for message in &messages {
            let when = match Local.timestamp_millis_opt(message.timestamp).single() {
                Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
                None => message.timestamp.to_string(),
            };
            content.push_str(&format!(
                "[{}] {} {}: {}\n",
                when,
                message.direction.as_str(),
                message.kind.as_str(),
                message.payload
            ));
        }

        std::fs::write(path, content)?;
        info!("Exported {} entries to {:?}", messages.len(), path);
        Ok(messages.len())
    }

    /// Remove a device's history.
    pub fn clear(&self, device: &DeviceIdentity) -> Result<(), PersistError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM partitions WHERE key = ?1",
            [device.storage_key()],
        )?;
        info!("History cleared for {}", device);
        Ok(())
    }

    /// Devices that have a persisted partition, most recently updated first.
    pub fn devices(&self) -> Result<Vec<DeviceIdentity>, PersistError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT device_name, address FROM partitions ORDER BY updated_at DESC, key ASC",
        )?;

        let devices = stmt
            .query_map([], |row| {
                Ok(DeviceIdentity::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn printer() -> DeviceIdentity {
        DeviceIdentity::new("Printer", "AA:BB:CC:DD:EE:FF")
    }

    #[test]
    fn test_load_empty() {
        let store = HistoryStore::in_memory().unwrap();
        assert!(store.load(&printer()).unwrap().is_empty());
    }

    #[test]
    fn test_append_keeps_timestamp_order() {
        let store = HistoryStore::in_memory().unwrap();
        let device = printer();

        for ts in [3000, 1000, 2000] {
            store
                .append(&device, Message::text(ts.to_string(), ts, Direction::Sent))
                .unwrap();
        }

        let loaded: Vec<i64> = store
            .load(&device)
            .unwrap()
            .iter()
            .map(|m| m.timestamp)
            .collect();
        assert_eq!(loaded, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_append_dedups_by_id() {
        let store = HistoryStore::in_memory().unwrap();
        let device = printer();
        let message = Message::text("hi", 1000, Direction::Sent);

        assert!(store.append(&device, message.clone()).unwrap());
        assert!(!store.append(&device, message).unwrap());
        assert_eq!(store.load(&device).unwrap().len(), 1);
    }

    #[test]
    fn test_partitions_are_independent() {
        let store = HistoryStore::in_memory().unwrap();
        let a = printer();
        let b = DeviceIdentity::new("Phone", "11:22:33:44:55:66");

        store.append(&a, Message::text("to a", 1, Direction::Sent)).unwrap();
        store.append(&b, Message::text("to b", 2, Direction::Sent)).unwrap();

        assert_eq!(store.load(&a).unwrap()[0].payload, "to a");
        assert_eq!(store.load(&b).unwrap()[0].payload, "to b");
        assert_eq!(store.devices().unwrap().len(), 2);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let device = printer();
        let audio = Message::new(
            MessageKind::Audio,
            "/data/rec.m4a",
            2000,
            Direction::Received,
        );

        {
            let store = HistoryStore::new(dir.path()).unwrap();
            store.append(&device, Message::text("hi", 1000, Direction::Sent)).unwrap();
            store.append(&device, audio.clone()).unwrap();
        }

        let store = HistoryStore::new(dir.path()).unwrap();
        let loaded = store.load(&device).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1], audio);
    }

    #[test]
    fn test_record_format() {
        let device = printer();
        let image = Message::new(MessageKind::Image, "content://img/1", 10, Direction::Sent);
        let json = serde_json::to_value(HistoryRecord::from_message(&image, &device)).unwrap();

        assert_eq!(json["texto"], "");
        assert_eq!(json["deviceId"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(json["isSent"], true);
        assert_eq!(json["imageUri"], "content://img/1");
        assert!(json.get("audioPath").is_none());

        let text = Message::text("hi", 1000, Direction::Sent);
        let json = serde_json::to_value(HistoryRecord::from_message(&text, &device)).unwrap();
        assert_eq!(json["texto"], "hi");
        assert_eq!(json["timestamp"], 1000);
        assert!(json.get("imageUri").is_none());
    }

    #[test]
    fn test_record_roundtrip_preserves_kind() {
        let device = printer();
        for kind in [MessageKind::Text, MessageKind::Audio, MessageKind::Image] {
            let message = Message::new(kind, "ref", 5, Direction::Received);
            let back = HistoryRecord::from_message(&message, &device).into_message();
            assert_eq!(back, message);
        }
    }

    #[test]
    fn test_search() {
        let store = HistoryStore::in_memory().unwrap();
        let device = printer();

        store.append(&device, Message::text("Hello world", 1, Direction::Sent)).unwrap();
        store.append(&device, Message::text("hello there", 2, Direction::Received)).unwrap();
        store.append(&device, Message::text("Goodbye", 3, Direction::Sent)).unwrap();

        let results = store.search(&device, "Hello").unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_export_and_clear() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        let device = printer();

        store.append(&device, Message::text("hi", 1000, Direction::Sent)).unwrap();
        store.append(&device, Message::text("yo", 2000, Direction::Received)).unwrap();

        let path = dir.path().join("export.txt");
        assert_eq!(store.export(&device, &path).unwrap(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].ends_with("me text: hi"));
        assert!(lines[1].ends_with("peer text: yo"));

        store.clear(&device).unwrap();
        assert!(store.load(&device).unwrap().is_empty());
        assert!(store.devices().unwrap().is_empty());
    }
}
