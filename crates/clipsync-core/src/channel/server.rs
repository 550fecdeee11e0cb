//! TCP server role: many peers, one shared clipboard value
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  TcpServer                                                      │
//! │  ├── accept task                                                │
//! │  │   └── JoinSet of peer workers (one per connection)           │
//! │  ├── registry: Mutex<HashMap<PeerId, PeerConnection>>           │
//! │  │   └── outbound queue per peer, read by its worker            │
//! │  └── inbound: mpsc::Receiver<Inbound>                           │
//! │      └── every frame from every peer, tagged with its PeerId    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A peer's frames reach the engine through `pull`. When the engine finds a
//! value new, it applies it locally and calls `relay`, which queues it for
//! every other active peer. The sender never gets its own value back.
//!
//! Connection lifecycle: `Accepted → Active → Closed`. A closed or failing
//! connection only ends its own worker; the server keeps running.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::frame::ClipboardCodec;
use super::{SyncChannel, TcpConfig};
use crate::error::SyncResult;
use crate::types::{ClipboardValue, Inbound, PeerId};

/// Frames from all peers waiting for the engine
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Values waiting to be written to one peer
const OUTBOUND_QUEUE_CAPACITY: usize = 32;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Connection state of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Registered, worker not yet running
    Accepted,
    /// Worker running; receives broadcasts
    Active,
    /// Stream ended; about to be removed
    Closed,
}

/// One accepted connection as seen by the broadcaster
#[derive(Debug, Clone)]
pub struct PeerConnection {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub state: PeerState,
    pub connected_at: Instant,
    outbound: mpsc::Sender<ClipboardValue>,
}

impl PeerConnection {
    fn new(id: PeerId, addr: SocketAddr, outbound: mpsc::Sender<ClipboardValue>) -> Self {
        Self {
            id,
            addr,
            state: PeerState::Accepted,
            connected_at: Instant::now(),
            outbound,
        }
    }
}

/// Shared set of connected peers
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<Mutex<HashMap<PeerId, PeerConnection>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of peers currently receiving broadcasts
    pub fn peer_count(&self) -> usize {
        self.peers
            .lock()
            .values()
            .filter(|p| p.state == PeerState::Active)
            .count()
    }

    /// Snapshot of every registered connection
    pub fn peers(&self) -> Vec<PeerConnection> {
        self.peers.lock().values().cloned().collect()
    }

    /// Registered connections in any state
    fn len(&self) -> usize {
        self.peers.lock().len()
    }

    fn insert(&self, peer: PeerConnection) {
        self.peers.lock().insert(peer.id, peer);
    }

    fn set_state(&self, id: &PeerId, state: PeerState) {
        if let Some(peer) = self.peers.lock().get_mut(id) {
            peer.state = state;
        }
    }

    fn remove(&self, id: &PeerId) -> Option<PeerConnection> {
        self.peers.lock().remove(id)
    }

    /// Queue `value` for every active peer except `except`.
    ///
    /// Returns the number of peers the value was queued for. A peer whose
    /// queue is full is skipped with a warning rather than stalling the
    /// others.
    pub fn broadcast(&self, value: &ClipboardValue, except: Option<PeerId>) -> usize {
        let targets: Vec<(PeerId, SocketAddr, mpsc::Sender<ClipboardValue>)> = self
            .peers
            .lock()
            .values()
            .filter(|p| p.state == PeerState::Active && Some(p.id) != except)
            .map(|p| (p.id, p.addr, p.outbound.clone()))
            .collect();

        let mut queued = 0;
        for (id, addr, outbound) in targets {
            match outbound.try_send(value.clone()) {
                Ok(()) => queued += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(peer = %addr, %id, "Peer is not keeping up; dropping update");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(peer = %addr, %id, "Peer worker already stopped");
                }
            }
        }
        queued
    }
}

/// Server side of the TCP transport
pub struct TcpServer {
    local_addr: SocketAddr,
    registry: PeerRegistry,
    inbound: mpsc::Receiver<Inbound>,
    config: TcpConfig,
    cancel: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
}

impl TcpServer {
    /// Bind `addr` and start accepting peers.
    ///
    /// The server stops when `cancel` (or [`TcpServer::shutdown`]) fires.
    pub async fn bind(
        addr: SocketAddr,
        config: TcpConfig,
        cancel: &CancellationToken,
    ) -> SyncResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let registry = PeerRegistry::new();
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let cancel = cancel.child_token();

        info!(addr = %local_addr, max_peers = config.max_peers, "Clipboard server listening");

        let accept_task = tokio::spawn(accept_loop(
            listener,
            registry.clone(),
            inbound_tx,
            config.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            local_addr,
            registry,
            inbound,
            config,
            cancel,
            accept_task: Some(accept_task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to the peer set, usable after the server moved into an engine
    pub fn registry(&self) -> PeerRegistry {
        self.registry.clone()
    }

    /// Stop accepting, close every peer connection and wait for the workers.
    pub async fn shutdown(mut self) {
        info!(addr = %self.local_addr, "Shutting down clipboard server");
        self.cancel.cancel();
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Accept task failed");
            }
        }
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SyncChannel for TcpServer {
    async fn push(&mut self, value: &ClipboardValue) -> SyncResult<()> {
        let queued = self.registry.broadcast(value, None);
        debug!(peers = queued, bytes = value.len(), "Broadcast local clipboard");
        Ok(())
    }

    async fn pull(&mut self) -> SyncResult<Option<Inbound>> {
        let inbound = &mut self.inbound;
        let next = async move {
            match inbound.recv().await {
                Some(inbound) => inbound,
                // Accept loop gone: nothing will ever arrive
                None => std::future::pending().await,
            }
        };
        Ok(tokio::time::timeout(self.config.recv_timeout, next).await.ok())
    }

    async fn relay(&mut self, inbound: &Inbound) -> SyncResult<()> {
        let queued = self.registry.broadcast(&inbound.value, inbound.origin);
        debug!(peers = queued, bytes = inbound.value.len(), "Relayed peer update");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: PeerRegistry,
    inbound_tx: mpsc::Sender<Inbound>,
    config: TcpConfig,
    cancel: CancellationToken,
) {
    let mut workers = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if registry.len() >= config.max_peers {
                        warn!(peer = %addr, max_peers = config.max_peers, "Peer limit reached; refusing connection");
                        continue;
                    }

                    let id = PeerId::new();
                    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
                    registry.insert(PeerConnection::new(id, addr, outbound_tx));
                    info!(peer = %addr, %id, "Peer connected");

                    workers.spawn(peer_worker(
                        PeerLink { id, addr, stream },
                        outbound_rx,
                        inbound_tx.clone(),
                        registry.clone(),
                        config.clone(),
                        cancel.child_token(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },

            Some(joined) = workers.join_next(), if !workers.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Peer worker failed");
                }
            }
        }
    }

    debug!(workers = workers.len(), "Waiting for peer workers to close");
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Peer worker failed");
        }
    }
    debug!("Accept loop stopped");
}

/// An accepted stream and the identity it was registered under
struct PeerLink {
    id: PeerId,
    addr: SocketAddr,
    stream: TcpStream,
}

/// Per-connection loop: forwards inbound frames, writes queued broadcasts.
async fn peer_worker(
    link: PeerLink,
    mut outbound: mpsc::Receiver<ClipboardValue>,
    inbound: mpsc::Sender<Inbound>,
    registry: PeerRegistry,
    config: TcpConfig,
    cancel: CancellationToken,
) {
    let PeerLink { id, addr, stream } = link;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %addr, error = %e, "Could not disable Nagle");
    }

    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, ClipboardCodec::new(config.max_frame_length));
    let mut writer = FramedWrite::new(write_half, ClipboardCodec::new(config.max_frame_length));

    registry.set_state(&id, PeerState::Active);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(peer = %addr, "Closing peer connection for shutdown");
                break;
            }

            queued = outbound.recv() => {
                let Some(value) = queued else { break };
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!(peer = %addr, "Abandoning write for shutdown");
                        break;
                    }

                    sent = tokio::time::timeout(config.write_timeout, writer.send(value)) => match sent {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            warn!(peer = %addr, %id, error = %e, "Failed to write to peer");
                            break;
                        }
                        Err(_) => {
                            warn!(
                                peer = %addr,
                                %id,
                                timeout_ms = config.write_timeout.as_millis() as u64,
                                "Peer stopped reading; dropping connection"
                            );
                            break;
                        }
                    }
                }
            }

            frame = tokio::time::timeout(config.recv_timeout, reader.next()) => match frame {
                Err(_) => trace!(peer = %addr, "No data from peer"),
                Ok(Some(Ok(value))) => {
                    debug!(peer = %addr, bytes = value.len(), "Received clipboard frame");
                    // The engine may have stopped pulling already
                    let handed = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => false,
                        sent = inbound.send(Inbound::from_peer(value, id)) => sent.is_ok(),
                    };
                    if !handed {
                        break;
                    }
                }
                Ok(Some(Err(e))) => {
                    warn!(peer = %addr, %id, error = %e, "Dropping peer after read error");
                    break;
                }
                Ok(None) => {
                    info!(peer = %addr, %id, "Peer disconnected");
                    break;
                }
            }
        }
    }

    registry.set_state(&id, PeerState::Closed);
    // Flush what is buffered unless shutting down; a peer that stopped
    // reading only gets `write_timeout` to take it
    tokio::select! {
        biased;

        _ = cancel.cancelled() => {}

        closed = tokio::time::timeout(config.write_timeout, writer.close()) => match closed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!(peer = %addr, error = %e, "Error closing peer stream"),
            Err(_) => trace!(peer = %addr, "Gave up flushing peer stream"),
        }
    }
    registry.remove(&id);
}
