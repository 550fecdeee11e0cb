//! Error types for clipboard synchronization

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for clipsync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// The platform clipboard could not be read or written
    #[error("Clipboard access error: {0}")]
    ClipboardAccess(String),

    /// Initial connection to a server failed
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The remote end of a client connection closed or reset the stream
    #[error("Peer {0} disconnected")]
    PeerDisconnected(SocketAddr),

    /// I/O failure on an established peer connection
    #[error("Transport error with {peer}: {source}")]
    Transport {
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A frame could not be decoded into clipboard text
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Shared file could not be read or written
    #[error("Storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem watcher could not be installed
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether this error means the channel can no longer deliver anything.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SyncError::PeerDisconnected(_))
    }
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;
