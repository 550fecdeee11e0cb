//! TCP client role: one persistent connection to a server
//!
//! Lifecycle: `Connecting → Connected → Disconnected`. Failing to connect is
//! returned to the caller; once connected, a closed or reset stream makes
//! `pull` and `push` report [`SyncError::PeerDisconnected`], which ends the
//! engine loop. No reconnection is attempted.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use super::frame::ClipboardCodec;
use super::{SyncChannel, TcpConfig};
use crate::error::{SyncError, SyncResult};
use crate::types::{ClipboardValue, Inbound};

/// Frames read from the server but not yet pulled
const INBOUND_CHANNEL_CAPACITY: usize = 32;

/// Client side of the TCP transport
pub struct TcpClient {
    server_addr: SocketAddr,
    writer: FramedWrite<OwnedWriteHalf, ClipboardCodec>,
    inbound: mpsc::Receiver<ClipboardValue>,
    reader_task: JoinHandle<()>,
    config: TcpConfig,
}

impl TcpClient {
    /// Connect to a server. Failure here is fatal for a client run.
    pub async fn connect(server_addr: SocketAddr, config: TcpConfig) -> SyncResult<Self> {
        debug!(server = %server_addr, "Connecting");
        let stream = TcpStream::connect(server_addr)
            .await
            .map_err(|source| SyncError::Connect {
                addr: server_addr,
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(server = %server_addr, error = %e, "Could not disable Nagle");
        }
        info!(server = %server_addr, "Connected to clipboard server");

        let (read_half, write_half) = stream.into_split();
        let reader = FramedRead::new(read_half, ClipboardCodec::new(config.max_frame_length));
        let writer = FramedWrite::new(write_half, ClipboardCodec::new(config.max_frame_length));

        let (inbound_tx, inbound) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let reader_task = tokio::spawn(read_loop(server_addr, reader, inbound_tx));

        Ok(Self {
            server_addr,
            writer,
            inbound,
            reader_task,
            config,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Whether the server side of the stream is still open
    pub fn is_connected(&self) -> bool {
        !self.reader_task.is_finished()
    }

    /// Flush and close the connection.
    ///
    /// A server that stopped reading gets `write_timeout` to take the
    /// buffered data before the stream is dropped.
    pub async fn close(mut self) {
        match tokio::time::timeout(self.config.write_timeout, self.writer.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(server = %self.server_addr, error = %e, "Error closing connection"),
            Err(_) => debug!(server = %self.server_addr, "Gave up flushing connection"),
        }
        self.reader_task.abort();
    }

    fn map_write_error(&self, err: SyncError) -> SyncError {
        match err {
            SyncError::Io(source) => match source.kind() {
                std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::UnexpectedEof => SyncError::PeerDisconnected(self.server_addr),
                _ => SyncError::Transport {
                    peer: self.server_addr,
                    source,
                },
            },
            other => other,
        }
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl SyncChannel for TcpClient {
    async fn push(&mut self, value: &ClipboardValue) -> SyncResult<()> {
        if !self.is_connected() {
            return Err(SyncError::PeerDisconnected(self.server_addr));
        }
        let sent =
            tokio::time::timeout(self.config.write_timeout, self.writer.send(value.clone())).await;
        match sent {
            Ok(Ok(())) => {
                debug!(server = %self.server_addr, bytes = value.len(), "Sent clipboard frame");
                Ok(())
            }
            Ok(Err(e)) => Err(self.map_write_error(e)),
            Err(_) => Err(SyncError::Transport {
                peer: self.server_addr,
                source: std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "server is not reading; frame not sent",
                ),
            }),
        }
    }

    async fn pull(&mut self) -> SyncResult<Option<Inbound>> {
        match tokio::time::timeout(self.config.recv_timeout, self.inbound.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(value)) => Ok(Some(Inbound::new(value))),
            Ok(None) => Err(SyncError::PeerDisconnected(self.server_addr)),
        }
    }
}

async fn read_loop(
    server_addr: SocketAddr,
    mut reader: FramedRead<tokio::net::tcp::OwnedReadHalf, ClipboardCodec>,
    inbound: mpsc::Sender<ClipboardValue>,
) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(value) => {
                debug!(server = %server_addr, bytes = value.len(), "Received clipboard frame");
                if inbound.send(value).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(server = %server_addr, error = %e, "Connection to server failed");
                return;
            }
        }
    }
    info!(server = %server_addr, "Server closed the connection");
}
