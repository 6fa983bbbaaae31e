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

//! Chat session with one remote device.
//!
//! A [`Session`] binds a [`DeviceIdentity`] to one live transport. While
//! connected it runs two independent paths over the same in-memory history:
//! outbound sends on the caller's task, and an inbound listener task that
//! decodes every payload the transport delivers.

mod registry;
mod state;

pub use registry::{SessionLease, SessionRegistry};
pub use state::{FailureReason, SessionState};

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bluetooth::protocol;
use crate::bluetooth::{Connector, Link, Transport, TransportEvent};
use crate::device::DeviceIdentity;
use crate::error::{ConnectError, SessionError, SessionResult, TransportError};
use crate::events::SessionEvent;
use crate::message::{now_millis, Direction, Message, MessageKind};
use crate::storage::{Conversation, HistoryStore};

/// Source of "now" in milliseconds since the epoch.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Session construction options.
#[derive(Clone)]
pub struct SessionOptions {
    pub registry: SessionRegistry,
    pub clock: Clock,
    pub events: Option<mpsc::Sender<SessionEvent>>,
    /// `None` waits for the platform indefinitely.
    pub connect_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            registry: SessionRegistry::global().clone(),
            clock: Arc::new(now_millis),
            events: None,
            connect_timeout: None,
        }
    }
}

struct Partition {
    conversation: Conversation,
    /// Cleared when the stored partition could not be read, so that a bad
    /// snapshot is never overwritten by a partial in-memory one.
    persist: bool,
}

struct Active {
    generation: u64,
    transport: Arc<dyn Transport>,
    listener: Option<JoinHandle<()>>,
    _lease: SessionLease,
}

struct Shared {
    device: DeviceIdentity,
    store: HistoryStore,
    state: RwLock<SessionState>,
    partition: Mutex<Partition>,
    active: Mutex<Option<Active>>,
    generation: AtomicU64,
    events: Option<mpsc::Sender<SessionEvent>>,
}

impl Shared {
    async fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    async fn transition(&self, state: SessionState) {
        *self.state.write() = state.clone();
        info!("Session {}: {}", self.device, state.as_str());
        self.emit(SessionEvent::StateChanged {
            device: self.device.clone(),
            state,
        })
        .await;
    }

    /// Add a message to history and persist the partition.
    /// Returns `false` for a duplicate id.
    async fn record(&self, message: Message) -> bool {
        let persisted = {
            let mut partition = self.partition.lock();
            if !partition.conversation.insert(message) {
                return false;
            }
            if partition.persist {
                self.store
                    .persist(&self.device, partition.conversation.messages())
            } else {
                Ok(())
            }
        };

        if let Err(e) = persisted {
            warn!("Failed to persist history for {}: {}", self.device, e);
            self.emit(SessionEvent::PersistFailed(e.to_string())).await;
        }
        true
    }

    async fn handle_payload(&self, bytes: &[u8]) {
        match protocol::decode(bytes) {
            Ok(wire) => {
                let message = wire.into_received();
                info!(
                    "Received {} from {}",
                    message.kind.as_str(),
                    self.device
                );
                if self.record(message.clone()).await {
                    self.emit(SessionEvent::MessageReceived(message)).await;
                }
            }
            Err(e) => {
                warn!("Dropping inbound payload from {}: {}", self.device, e);
                self.emit(SessionEvent::PayloadDropped(e)).await;
            }
        }
    }

    /// Close the active link and move to `next`.
    ///
    /// With `generation` set, only that link is torn down; a listener of an
    /// older link must not close a newer one.
    async fn teardown(&self, generation: Option<u64>, next: SessionState, abort_listener: bool) -> bool {
        let active = {
            let mut slot = self.active.lock();
            let stale = matches!(
                (slot.as_ref(), generation),
                (Some(active), Some(g)) if active.generation != g
            );
            if stale {
                None
            } else {
                slot.take()
            }
        };

        let Some(mut active) = active else {
            return false;
        };

        if abort_listener {
            if let Some(listener) = active.listener.take() {
                listener.abort();
            }
        }
        active.transport.close().await;
        drop(active);

        self.transition(next).await;
        true
    }
}

/// Held for the length of a connect attempt. If the attempt is dropped
/// before it settles, the session falls back to `Disconnected`.
struct ConnectAttempt<'a> {
    shared: &'a Shared,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.state.write();
        if *state != SessionState::Connecting {
            return;
        }
        *state = SessionState::Disconnected;
        drop(state);

        info!("Session {}: connect cancelled", self.shared.device);
        if let Some(tx) = &self.shared.events {
            let _ = tx.try_send(SessionEvent::StateChanged {
                device: self.shared.device.clone(),
                state: SessionState::Disconnected,
            });
        }
    }
}

/// Inbound path: runs until the transport closes or fails.
async fn listen(shared: Arc<Shared>, generation: u64, mut events: mpsc::Receiver<TransportEvent>) {
    debug!("Inbound listener started for {}", shared.device);

    let next = loop {
        match events.recv().await {
            Some(TransportEvent::Payload(bytes)) => shared.handle_payload(&bytes).await,
            Some(TransportEvent::Closed) | None => break SessionState::Disconnected,
            Some(TransportEvent::Error(e)) => {
                break SessionState::Failed(FailureReason::Transport(e))
            }
        }
    };

    shared.teardown(Some(generation), next, false).await;
    debug!("Inbound listener stopped for {}", shared.device);
}

/// A conversation with one remote device over one transport.
pub struct Session {
    shared: Arc<Shared>,
    registry: SessionRegistry,
    clock: Clock,
    connect_timeout: Option<Duration>,
}

impl Session {
    /// Create a disconnected session with default options.
    pub fn new(device: DeviceIdentity, store: HistoryStore) -> Self {
        Self::with_options(device, store, SessionOptions::default())
    }

    pub fn with_options(device: DeviceIdentity, store: HistoryStore, options: SessionOptions) -> Self {
        let shared = Arc::new(Shared {
            device,
            store,
            state: RwLock::new(SessionState::Disconnected),
            partition: Mutex::new(Partition {
                conversation: Conversation::new(),
                persist: true,
            }),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            events: options.events,
        });

        Self {
            shared,
            registry: options.registry,
            clock: options.clock,
            connect_timeout: options.connect_timeout,
        }
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.shared.device
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.read().clone()
    }

    /// Timestamp-sorted snapshot of the history.
    pub fn history(&self) -> Vec<Message> {
        self.shared.partition.lock().conversation.messages().to_vec()
    }

    /// Open a link to the device and start listening.
    ///
    /// Only one attempt may be outstanding, and only one session per device
    /// may be active in the registry. Dropping the future mid-attempt leaves
    /// the session `Disconnected`.
    pub async fn connect(&self, connector: &dyn Connector) -> SessionResult<()> {
        let rejected = {
            let mut state = self.shared.state.write();
            if state.can_connect() {
                *state = SessionState::Connecting;
                None
            } else if *state == SessionState::Connecting {
                Some(SessionError::ConnectInProgress)
            } else {
                Some(SessionError::AlreadyActive(
                    self.shared.device.normalized_address(),
                ))
            }
        };
        if let Some(e) = rejected {
            return Err(e);
        }
        let _attempt = ConnectAttempt {
            shared: &self.shared,
        };
        self.shared.transition(SessionState::Connecting).await;

        let lease = match self.registry.acquire(&self.shared.device) {
            Ok(lease) => lease,
            Err(e) => {
                warn!("Refusing second session for {}", self.shared.device);
                self.shared.transition(SessionState::Disconnected).await;
                return Err(e);
            }
        };

        let link = match self.open_link(connector).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Connect to {} failed: {}", self.shared.device, e);
                self.shared
                    .transition(SessionState::Failed(FailureReason::Connect(e.clone())))
                    .await;
                return Err(e.into());
            }
        };

        self.load_history();

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Link { transport, events } = link;
        *self.shared.active.lock() = Some(Active {
            generation,
            transport,
            listener: None,
            _lease: lease,
        });
        self.shared.transition(SessionState::Connected).await;

        let listener = tokio::spawn(listen(self.shared.clone(), generation, events));
        let mut slot = self.shared.active.lock();
        match slot.as_mut() {
            Some(active) if active.generation == generation => active.listener = Some(listener),
            // Link already gone; the listener is finishing on its own.
            _ => drop(listener),
        }

        Ok(())
    }

    async fn open_link(&self, connector: &dyn Connector) -> Result<Link, ConnectError> {
        let device = &self.shared.device;
        match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connector.connect(device))
                .await
                .unwrap_or_else(|_| {
                    Err(ConnectError::DeviceUnreachable(format!(
                        "no response within {:?}",
                        limit
                    )))
                }),
            None => connector.connect(device).await,
        }
    }

    fn load_history(&self) {
        let (messages, persist) = match self.shared.store.load(&self.shared.device) {
            Ok(messages) => (messages, true),
            Err(e) => {
                warn!(
                    "Could not load history for {}, continuing without persistence: {}",
                    self.shared.device, e
                );
                (Vec::new(), false)
            }
        };

        info!(
            "Loaded {} message(s) for {}",
            messages.len(),
            self.shared.device
        );
        let mut partition = self.shared.partition.lock();
        partition.conversation = Conversation::from_messages(messages);
        partition.persist = persist;
    }

    /// Send a message.
    ///
    /// The message is stamped `Sent` and stored before it is written, so it
    /// stays in history even when the write fails. Nothing is retried.
    pub async fn send(&self, kind: MessageKind, content: impl Into<String>) -> SessionResult<Message> {
        let (transport, generation) = {
            if !self.shared.state.read().is_connected() {
                return Err(SessionError::NotConnected);
            }
            let active = self.shared.active.lock();
            let active = active.as_ref().ok_or(SessionError::NotConnected)?;
            (active.transport.clone(), active.generation)
        };

        let message = Message::new(kind, content, (self.clock)(), Direction::Sent);
        self.shared.record(message.clone()).await;

        if let Err(e) = transport.write(&protocol::encode(&message)).await {
            warn!("Send to {} failed: {}", self.shared.device, e);
            if let TransportError::Io(io) = &e {
                let reason = FailureReason::Transport(io.to_string());
                self.shared
                    .teardown(Some(generation), SessionState::Failed(reason), true)
                    .await;
            }
            return Err(e.into());
        }

        debug!("Sent {} to {}", message.kind.as_str(), self.shared.device);
        Ok(message)
    }

    pub async fn send_text(&self, text: impl Into<String>) -> SessionResult<Message> {
        self.send(MessageKind::Text, text).await
    }

    /// Close the link. A failed session returns to `Disconnected`.
    pub async fn disconnect(&self) {
        if self
            .shared
            .teardown(None, SessionState::Disconnected, true)
            .await
        {
            return;
        }

        let failed = matches!(*self.shared.state.read(), SessionState::Failed(_));
        if failed {
            self.shared.transition(SessionState::Disconnected).await;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let active = self.shared.active.lock().take();
        if let Some(mut active) = active {
            if let Some(listener) = active.listener.take() {
                listener.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;

    struct BrokenTransport;

    #[async_trait]
    impl Transport for BrokenTransport {
        async fn write(&self, _payload: &[u8]) -> Result<(), TransportError> {
            Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "link lost",
            )))
        }

        async fn close(&self) {}
    }

    /// Connects to a transport whose writes always fail. The inbound sender is
    /// kept so the listener stays idle.
    struct BrokenConnector {
        inbound: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
    }

    #[async_trait]
    impl Connector for BrokenConnector {
        async fn connect(&self, _device: &DeviceIdentity) -> Result<Link, ConnectError> {
            let (tx, rx) = mpsc::channel(4);
            self.inbound.lock().push(tx);
            Ok(Link {
                transport: Arc::new(BrokenTransport),
                events: rx,
            })
        }
    }

    fn session() -> Session {
        let options = SessionOptions {
            registry: SessionRegistry::new(),
            clock: Arc::new(|| 42),
            ..SessionOptions::default()
        };
        Session::with_options(
            DeviceIdentity::new("Phone", "11:22:33:44:55:66"),
            HistoryStore::in_memory().unwrap(),
            options,
        )
    }

    #[tokio::test]
    async fn test_failed_write_keeps_message_and_fails_session() {
        let session = session();
        let connector = BrokenConnector {
            inbound: Mutex::new(Vec::new()),
        };
        session.connect(&connector).await.unwrap();

        let result = session.send_text("lost").await;
        assert!(matches!(
            result,
            Err(SessionError::Transport(TransportError::Io(_)))
        ));

        let history = session.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].payload, "lost");
        assert_eq!(history[0].direction, Direction::Sent);
        assert_eq!(history[0].timestamp, 42);

        assert!(matches!(session.state(), SessionState::Failed(FailureReason::Transport(_))));

        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_inbound_error_fails_session() {
        let session = session();
        let connector = BrokenConnector {
            inbound: Mutex::new(Vec::new()),
        };
        session.connect(&connector).await.unwrap();

        let tx = connector.inbound.lock().pop().unwrap();
        tx.send(TransportEvent::Payload(
            br#"{"type":"text","content":"yo","timestamp":7}"#.to_vec(),
        ))
        .await
        .unwrap();
        tx.send(TransportEvent::Error("connection reset".into()))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while session.state().is_connected() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(
            session.state(),
            SessionState::Failed(FailureReason::Transport("connection reset".into()))
        );
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].direction, Direction::Received);
    }
}
