//! clipsync core library
//!
//! Keeps one clipboard value consistent between endpoints that cannot share
//! a clipboard directly.
//!
//! ## Overview
//!
//! A VM host and guest can sync through a file in a shared folder; hosts on
//! a network sync over TCP, with one server fanning updates out to any
//! number of clients. Either way, each process runs one [`SyncEngine`] that
//! polls the local clipboard and exchanges values through a
//! [`SyncChannel`].
//!
//! ## Echo suppression
//!
//! Every value, local or remote, passes through the process's single
//! [`ChangeTracker`] before it is propagated. A value we pushed is already
//! recorded when it comes back, so it is dropped instead of bouncing between
//! endpoints forever.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use clipsync_core::{
//!     ArboardClipboard, ChangeTracker, EngineConfig, FileChannelConfig, FileSyncChannel,
//!     SyncEngine,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let clipboard = Arc::new(ArboardClipboard::new()?);
//!     let channel = FileSyncChannel::open("/mnt/shared/clipboard.txt", FileChannelConfig::default())?;
//!     let tracker = Arc::new(ChangeTracker::new());
//!
//!     let mut engine = SyncEngine::new(clipboard, channel, tracker, EngineConfig::default());
//!     engine.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod clipboard;
pub mod engine;
pub mod error;
pub mod tracker;
pub mod types;

// Re-exports
#[cfg(feature = "arboard")]
pub use clipboard::ArboardClipboard;
pub use channel::{
    ClipboardCodec, FileChannelConfig, FileSyncChannel, PeerConnection, PeerRegistry, PeerState,
    SharedFileState, SyncChannel, TcpClient, TcpConfig, TcpServer,
};
pub use clipboard::{ClipboardSource, CommandClipboard, MemoryClipboard};
pub use engine::{EngineConfig, StopReason, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use tracker::ChangeTracker;
pub use types::*;
