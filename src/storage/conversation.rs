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

//! In-memory history partition for one device.

use std::collections::HashSet;

use crate::message::Message;

/// Messages exchanged with one device, unique by id and kept in
/// timestamp-ascending order. Equal timestamps keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    ids: HashSet<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted or otherwise unordered messages.
    /// Later duplicates of an id are dropped.
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut conversation = Self::new();
        for message in messages {
            if conversation.ids.insert(message.id.clone()) {
                conversation.messages.push(message);
            }
        }
        conversation.resort();
        conversation
    }

    /// Add a message and re-sort. Returns `false` if the id is already present.
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        self.resort();
        true
    }

    /// Full stable sort. Runs in linear time on the already-sorted prefix.
    fn resort(&mut self) {
        self.messages.sort_by_key(|m| m.timestamp);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
