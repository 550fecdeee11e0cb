//! Shared-file transport for host/guest pairs
//!
//! Both sides point at the same file (e.g. a VM shared folder). A local
//! change rewrites the whole file; a remote change is detected two ways:
//!
//! 1. **Event path**: a `notify` watcher on the parent directory wakes the
//!    channel when the file is created or modified.
//! 2. **Poll fallback**: every poll interval the file's modification time is
//!    compared with the last one seen, for shared folders whose host-side
//!    writes never raise notifications in the guest.
//!
//! Both paths return the file content as-is; the engine's change tracker
//! discards duplicates, including the notification caused by our own write.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::SyncChannel;
use crate::error::{SyncError, SyncResult};
use crate::types::{ClipboardValue, Inbound};

/// Default interval of the modification-time poll
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pending wake-ups from the watcher; one is enough to trigger a read
const EVENT_CHANNEL_CAPACITY: usize = 1;

/// Options for [`FileSyncChannel`]
#[derive(Debug, Clone)]
pub struct FileChannelConfig {
    /// How often the modification time is checked
    pub poll_interval: Duration,
}

impl Default for FileChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What the channel knows about the shared file
#[derive(Debug, Clone)]
pub struct SharedFileState {
    pub path: PathBuf,
    /// Modification time of the last version read or written by us
    pub last_seen_mtime: Option<SystemTime>,
}

impl SharedFileState {
    fn new(path: PathBuf) -> Self {
        let last_seen_mtime = modified(&path).ok();
        Self {
            path,
            last_seen_mtime,
        }
    }

    fn is_newer(&self, mtime: SystemTime) -> bool {
        self.last_seen_mtime.map_or(true, |seen| mtime > seen)
    }

    fn mark_seen(&mut self) {
        if let Ok(mtime) = modified(&self.path) {
            self.last_seen_mtime = Some(mtime);
        }
    }
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

/// Current file content; unreadable or missing files read as empty.
async fn read_content(path: &Path) -> ClipboardValue {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned().into(),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Shared file unreadable; treating as empty"
            );
            ClipboardValue::empty()
        }
    }
}

/// Sync channel over one shared file
pub struct FileSyncChannel {
    state: SharedFileState,
    events: mpsc::Receiver<()>,
    poll: Interval,
    _watcher: RecommendedWatcher,
}

impl FileSyncChannel {
    /// Start watching `path`.
    ///
    /// The current modification time becomes the baseline, so content that
    /// is already in the file is not treated as a remote change. Must be
    /// called from within a Tokio runtime.
    pub fn open(path: impl Into<PathBuf>, config: FileChannelConfig) -> SyncResult<Self> {
        let path = path.into();
        let state = SharedFileState::new(path.clone());

        let file_name = path.file_name().map(|name| name.to_os_string());
        let watch_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_file {
                        // Full means a wake-up is already pending
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => warn!(error = %e, "File watcher error"),
            },
            Config::default(),
        )?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        let mut poll = tokio::time::interval(config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            path = %path.display(),
            poll_ms = config.poll_interval.as_millis() as u64,
            "Watching shared file"
        );

        Ok(Self {
            state,
            events,
            poll,
            _watcher: watcher,
        })
    }

    pub fn state(&self) -> &SharedFileState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.state.path
    }

    async fn on_event(&mut self) -> Option<Inbound> {
        let value = read_content(&self.state.path).await;
        self.state.mark_seen();
        debug!(path = %self.state.path.display(), bytes = value.len(), "Shared file changed (event)");
        Some(Inbound::new(value))
    }

    async fn on_poll(&mut self) -> Option<Inbound> {
        let mtime = match modified(&self.state.path) {
            Ok(mtime) => mtime,
            Err(e) => {
                debug!(path = %self.state.path.display(), error = %e, "Shared file not available");
                return None;
            }
        };
        if !self.state.is_newer(mtime) {
            return None;
        }

        let value = read_content(&self.state.path).await;
        self.state.last_seen_mtime = Some(mtime);
        debug!(path = %self.state.path.display(), bytes = value.len(), "Shared file changed (poll)");
        Some(Inbound::new(value))
    }
}

impl SyncChannel for FileSyncChannel {
    async fn push(&mut self, value: &ClipboardValue) -> SyncResult<()> {
        let written = tokio::fs::write(&self.state.path, value.as_bytes()).await;
        // A failed write may still have truncated the file; that is our own
        // change, not a remote one
        self.state.mark_seen();
        if let Err(source) = written {
            while self.events.try_recv().is_ok() {}
            return Err(SyncError::Storage {
                path: self.state.path.clone(),
                source,
            });
        }
        debug!(path = %self.state.path.display(), bytes = value.len(), "Shared file rewritten");
        Ok(())
    }

    async fn pull(&mut self) -> SyncResult<Option<Inbound>> {
        tokio::select! {
            Some(()) = self.events.recv() => Ok(self.on_event().await),
            _ = self.poll.tick() => Ok(self.on_poll().await),
        }
    }
}
