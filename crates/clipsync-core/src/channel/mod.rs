//! Transports that carry clipboard values between endpoints
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncChannel                                                    │
//! │  ├── push(value)   send a local change outward                  │
//! │  ├── pull()        bounded wait for the next remote value       │
//! │  └── relay(value)  forward an applied remote value (fan-out)    │
//! │                                                                 │
//! │  FileSyncChannel   one shared file, notify events + mtime poll  │
//! │  TcpServer         many peers, re-broadcasts between them       │
//! │  TcpClient         one persistent connection to a server        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Channels never decide whether a value is new. Every pulled value goes
//! through the engine's [`ChangeTracker`](crate::ChangeTracker) first.

use std::future::Future;
use std::time::Duration;

use crate::error::SyncResult;
use crate::types::{ClipboardValue, Inbound};

pub mod client;
pub mod file;
pub mod frame;
pub mod server;

pub use client::TcpClient;
pub use file::{FileChannelConfig, FileSyncChannel, SharedFileState};
pub use frame::{ClipboardCodec, DEFAULT_MAX_FRAME_LENGTH};
pub use server::{PeerConnection, PeerRegistry, PeerState, TcpServer};

/// Default bound on a single `pull` wait over TCP
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Default cap on concurrently connected server peers
pub const DEFAULT_MAX_PEERS: usize = 256;

/// Default bound on writing one frame to a peer that is not reading
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Options shared by [`TcpServer`] and [`TcpClient`]
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Longest a `pull` waits for a frame before reporting nothing
    pub recv_timeout: Duration,
    /// Longest a single frame write may take before the peer is dropped
    pub write_timeout: Duration,
    /// Largest frame payload accepted or sent
    pub max_frame_length: usize,
    /// Server only: further connections are refused at this many peers
    pub max_peers: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            max_peers: DEFAULT_MAX_PEERS,
        }
    }
}

/// A bidirectional path to the remote side of the sync.
pub trait SyncChannel: Send {
    /// Send a locally changed value to the remote side.
    fn push(&mut self, value: &ClipboardValue) -> impl Future<Output = SyncResult<()>> + Send;

    /// Wait a bounded time for the next remote value.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. Must be cancel-safe:
    /// dropping the future before it completes loses no value.
    fn pull(&mut self) -> impl Future<Output = SyncResult<Option<Inbound>>> + Send;

    /// Forward a pulled value that was applied locally to the other remotes.
    ///
    /// Only meaningful for channels with several remote ends.
    fn relay(&mut self, inbound: &Inbound) -> impl Future<Output = SyncResult<()>> + Send {
        let _ = inbound;
        async { Ok(()) }
    }
}
