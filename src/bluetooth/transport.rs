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

//! Byte-stream transport to a single remote device.
//!
//! A [`Connector`] produces a [`Link`]: a writable [`Transport`] handle and a
//! receiver of [`TransportEvent`]s. Each `Payload` event is exactly one
//! payload as written by the peer; framing stays inside the transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::reassembler::{self, MessageReassembler};
use crate::device::DeviceIdentity;
use crate::error::{ConnectError, TransportError};

/// Events emitted by a transport's inbound side.
#[derive(Debug)]
pub enum TransportEvent {
    /// One complete payload.
    Payload(Vec<u8>),
    /// Remote closed the stream.
    Closed,
    /// Read failed; the stream is unusable.
    Error(String),
}

/// Outbound half of a connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one payload.
    async fn write(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Close the connection. Later writes fail with [`TransportError::Closed`].
    async fn close(&self);
}

/// A live connection: outbound handle plus inbound events.
pub struct Link {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens links to remote devices.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, device: &DeviceIdentity) -> Result<Link, ConnectError>;
}

/// Newline-framed transport over any async byte stream.
pub struct StreamTransport<S> {
    writer: tokio::sync::Mutex<Option<WriteHalf<S>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    max_frame: usize,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Split the stream, start the read loop and return the link.
    pub fn spawn(stream: S, max_frame: usize) -> Link {
        let (reader, writer) = tokio::io::split(stream);
        let (event_tx, event_rx) = mpsc::channel(32);

        let reader_task = tokio::spawn(read_loop(reader, max_frame, event_tx));

        let transport = Arc::new(Self {
            writer: tokio::sync::Mutex::new(Some(writer)),
            reader_task: Mutex::new(Some(reader_task)),
            max_frame,
        });

        Link {
            transport,
            events: event_rx,
        }
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        let framed = reassembler::frame(payload, self.max_frame)?;

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;

        writer.write_all(&framed).await?;
        writer.flush().await?;
        debug!("Wrote {} bytes", framed.len());
        Ok(())
    }

    async fn close(&self) {
        let reader_task = self.reader_task.lock().take();
        if let Some(task) = reader_task {
            task.abort();
        }

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown error ignored: {}", e);
            }
            info!("Transport closed");
        }
    }
}

impl<S> Drop for StreamTransport<S> {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Read loop: reassemble frames and forward them until EOF or error.
async fn read_loop<S>(
    mut reader: ReadHalf<S>,
    max_frame: usize,
    event_tx: mpsc::Sender<TransportEvent>,
) where
    S: AsyncRead,
{
    let mut reassembler = MessageReassembler::new(max_frame);
    let mut buf = [0u8; 1024];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                if reassembler.is_in_progress() {
                    debug!(
                        "Discarding {} bytes of unterminated frame",
                        reassembler.buffer_size()
                    );
                }
                info!("Connection closed by remote");
                let _ = event_tx.send(TransportEvent::Closed).await;
                break;
            }
            Ok(n) => {
                for frame in reassembler.push(&buf[..n]) {
                    if event_tx.send(TransportEvent::Payload(frame)).await.is_err() {
                        debug!("Event receiver dropped, stopping read loop");
                        return;
                    }
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_write_is_framed() {
        let (local, mut remote) = duplex(1024);
        let link = StreamTransport::spawn(local, 1024);

        link.transport.write(b"{\"a\":1}").await.unwrap();

        let mut buf = [0u8; 64];
        let n = remote.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"{\"a\":1}\n");
    }

    #[tokio::test]
    async fn test_inbound_chunks_are_reassembled() {
        let (local, mut remote) = duplex(1024);
        let mut link = StreamTransport::spawn(local, 1024);

        remote.write_all(b"first\nsec").await.unwrap();
        remote.write_all(b"ond\n").await.unwrap();

        match link.events.recv().await {
            Some(TransportEvent::Payload(p)) => assert_eq!(p, b"first"),
            other => panic!("unexpected event: {:?}", other),
        }
        match link.events.recv().await {
            Some(TransportEvent::Payload(p)) => assert_eq!(p, b"second"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_close_emits_closed() {
        let (local, remote) = duplex(1024);
        let mut link = StreamTransport::spawn(local, 1024);

        drop(remote);

        assert!(matches!(
            link.events.recv().await,
            Some(TransportEvent::Closed)
        ));
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (local, _remote) = duplex(1024);
        let link = StreamTransport::spawn(local, 1024);

        link.transport.close().await;

        assert!(matches!(
            link.transport.write(b"late").await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_oversized_write_rejected() {
        let (local, _remote) = duplex(1024);
        let link = StreamTransport::spawn(local, 4);

        assert!(matches!(
            link.transport.write(b"too long").await,
            Err(TransportError::FrameTooLarge { .. })
        ));
    }
}
