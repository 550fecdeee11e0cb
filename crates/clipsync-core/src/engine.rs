//! The clipboard synchronization loop
//!
//! ```text
//!   local clipboard ──read──► ChangeTracker ──Changed──► channel.push
//!   local clipboard ◄─write── ChangeTracker ◄─Changed─── channel.pull
//!                                                └─────► channel.relay
//! ```
//!
//! Every tick the local clipboard is read and pushed if the tracker reports
//! a change. Between ticks the engine waits on the channel; a pulled value
//! is written to the clipboard only if the tracker reports a change, which is
//! what stops our own pushes from coming back as remote updates.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::channel::SyncChannel;
use crate::clipboard::ClipboardSource;
use crate::error::{SyncError, SyncResult};
use crate::tracker::ChangeTracker;
use crate::types::{ClipboardValue, Inbound};

/// Default cadence of the local clipboard check
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Options for [`SyncEngine`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the local clipboard is read
    pub interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// Why [`SyncEngine::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cancellation token fired
    Cancelled,
    /// The remote end went away (client lost its server)
    ChannelClosed,
}

/// Drives one clipboard against one channel
pub struct SyncEngine<C> {
    clipboard: Arc<dyn ClipboardSource>,
    channel: C,
    tracker: Arc<ChangeTracker>,
    config: EngineConfig,
    /// Last clipboard read error, to avoid repeating the same warning each tick
    last_read_error: Option<String>,
}

impl<C: SyncChannel> SyncEngine<C> {
    pub fn new(
        clipboard: Arc<dyn ClipboardSource>,
        channel: C,
        tracker: Arc<ChangeTracker>,
        config: EngineConfig,
    ) -> Self {
        Self {
            clipboard,
            channel,
            tracker,
            config,
            last_read_error: None,
        }
    }

    pub fn tracker(&self) -> &Arc<ChangeTracker> {
        &self.tracker
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Give back the channel, e.g. to shut a server down after `run`
    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Local → remote: push the clipboard if it changed.
    ///
    /// Returns whether a value was pushed. Clipboard and storage failures are
    /// logged and swallowed; only a lost connection is returned as an error.
    pub async fn sync_local(&mut self) -> SyncResult<bool> {
        let clipboard = self.clipboard.clone();
        let candidate = match read_clipboard(clipboard).await {
            Ok(value) => {
                if self.last_read_error.take().is_some() {
                    info!("Clipboard readable again");
                }
                value
            }
            Err(e) => {
                self.report_read_error(e);
                return Ok(false);
            }
        };

        if !self.tracker.observe(&candidate).is_changed() {
            return Ok(false);
        }

        match self.channel.push(&candidate).await {
            Ok(()) => {
                info!(
                    bytes = candidate.len(),
                    preview = %candidate.preview(),
                    "Pushed local clipboard change"
                );
                Ok(true)
            }
            Err(e) => {
                self.tracker.revert(&candidate);
                if e.is_disconnect() {
                    return Err(e);
                }
                warn!(error = %e, "Failed to push local clipboard change; retrying next tick");
                Ok(false)
            }
        }
    }

    /// Remote → local: apply a pulled value if it is new.
    ///
    /// Returns whether the clipboard was written. A new value is relayed to
    /// the other peers even when the local write fails.
    pub async fn apply_remote(&mut self, inbound: Inbound) -> SyncResult<bool> {
        if !self.tracker.observe(&inbound.value).is_changed() {
            trace!(bytes = inbound.value.len(), "Ignoring already synchronized value");
            return Ok(false);
        }

        let clipboard = self.clipboard.clone();
        let written = match write_clipboard(clipboard, inbound.value.clone()).await {
            Ok(()) => {
                info!(
                    bytes = inbound.value.len(),
                    preview = %inbound.value.preview(),
                    "Applied remote clipboard change"
                );
                true
            }
            Err(e) => {
                self.tracker.revert(&inbound.value);
                warn!(error = %e, "Failed to apply remote clipboard change");
                false
            }
        };

        if let Err(e) = self.channel.relay(&inbound).await {
            if e.is_disconnect() {
                return Err(e);
            }
            warn!(error = %e, "Failed to relay clipboard change");
        }
        Ok(written)
    }

    /// Run until `cancel` fires or the channel closes.
    pub async fn run(&mut self, cancel: CancellationToken) -> SyncResult<StopReason> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.config.interval.as_millis() as u64, "Clipboard sync started");

        loop {
            let step = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Clipboard sync stopped");
                    return Ok(StopReason::Cancelled);
                }

                _ = ticker.tick() => self.sync_local().await.map(|_| ()),

                pulled = self.channel.pull() => match pulled {
                    Ok(Some(inbound)) => self.apply_remote(inbound).await.map(|_| ()),
                    Ok(None) => Ok(()),
                    Err(e) => Err(e),
                },
            };

            if let Err(e) = step {
                if e.is_disconnect() {
                    info!(error = %e, "Remote end closed; stopping clipboard sync");
                    return Ok(StopReason::ChannelClosed);
                }
                return Err(e);
            }
        }
    }

    fn report_read_error(&mut self, err: SyncError) {
        let message = err.to_string();
        if self.last_read_error.as_deref() == Some(message.as_str()) {
            debug!(error = %message, "Clipboard still unreadable");
        } else {
            warn!(error = %message, "Failed to read local clipboard");
            self.last_read_error = Some(message);
        }
    }
}

async fn read_clipboard(clipboard: Arc<dyn ClipboardSource>) -> SyncResult<ClipboardValue> {
    tokio::task::spawn_blocking(move || clipboard.read())
        .await
        .map_err(|e| SyncError::ClipboardAccess(format!("clipboard task failed: {e}")))?
}

async fn write_clipboard(
    clipboard: Arc<dyn ClipboardSource>,
    value: ClipboardValue,
) -> SyncResult<()> {
    tokio::task::spawn_blocking(move || clipboard.write(&value))
        .await
        .map_err(|e| SyncError::ClipboardAccess(format!("clipboard task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::clipboard::MemoryClipboard;

    /// Channel that records pushes and replays scripted pulls
    #[derive(Default)]
    struct ScriptedChannel {
        pushed: Vec<ClipboardValue>,
        relayed: Vec<Inbound>,
        incoming: VecDeque<SyncResult<Option<Inbound>>>,
        fail_pushes: usize,
    }

    impl SyncChannel for ScriptedChannel {
        async fn push(&mut self, value: &ClipboardValue) -> SyncResult<()> {
            if self.fail_pushes > 0 {
                self.fail_pushes -= 1;
                return Err(SyncError::Io(std::io::Error::other("push failed")));
            }
            self.pushed.push(value.clone());
            Ok(())
        }

        async fn pull(&mut self) -> SyncResult<Option<Inbound>> {
            match self.incoming.pop_front() {
                Some(next) => next,
                None => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(None)
                }
            }
        }

        async fn relay(&mut self, inbound: &Inbound) -> SyncResult<()> {
            self.relayed.push(inbound.clone());
            Ok(())
        }
    }

    fn engine(
        clipboard: &Arc<MemoryClipboard>,
        channel: ScriptedChannel,
    ) -> SyncEngine<ScriptedChannel> {
        SyncEngine::new(
            clipboard.clone(),
            channel,
            Arc::new(ChangeTracker::new()),
            EngineConfig {
                interval: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn test_local_change_is_pushed_once() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let mut engine = engine(&clipboard, ScriptedChannel::default());

        assert!(!engine.sync_local().await.unwrap());

        clipboard.set("copied");
        assert!(engine.sync_local().await.unwrap());
        assert!(!engine.sync_local().await.unwrap());

        assert_eq!(engine.channel().pushed, vec![ClipboardValue::from("copied")]);
    }

    #[tokio::test]
    async fn test_echo_of_pushed_value_is_not_written() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let mut engine = engine(&clipboard, ScriptedChannel::default());

        clipboard.set("mine");
        engine.sync_local().await.unwrap();

        let applied = engine
            .apply_remote(Inbound::new("mine".into()))
            .await
            .unwrap();
        assert!(!applied);
        assert!(clipboard.writes().is_empty());
        assert!(engine.channel().relayed.is_empty());
    }

    #[tokio::test]
    async fn test_remote_change_is_written_and_relayed() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let mut engine = engine(&clipboard, ScriptedChannel::default());

        assert!(engine
            .apply_remote(Inbound::new("theirs".into()))
            .await
            .unwrap());
        assert_eq!(clipboard.get().as_str(), "theirs");
        assert_eq!(engine.channel().relayed.len(), 1);

        // The written value reads back as unchanged: no push
        assert!(!engine.sync_local().await.unwrap());
        assert!(engine.channel().pushed.is_empty());
    }

    #[tokio::test]
    async fn test_failed_push_is_retried() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let channel = ScriptedChannel {
            fail_pushes: 1,
            ..ScriptedChannel::default()
        };
        let mut engine = engine(&clipboard, channel);

        clipboard.set("retry me");
        assert!(!engine.sync_local().await.unwrap());
        assert!(engine.sync_local().await.unwrap());
        assert_eq!(engine.channel().pushed, vec![ClipboardValue::from("retry me")]);
    }

    #[tokio::test]
    async fn test_unwritable_clipboard_still_relays() {
        let clipboard = Arc::new(MemoryClipboard::with_value("X"));
        let mut engine = SyncEngine::new(
            clipboard.clone(),
            ScriptedChannel::default(),
            Arc::new(ChangeTracker::with_value("X".into())),
            EngineConfig::default(),
        );
        clipboard.set_fail_writes(true);

        let inbound = Inbound::new("Y".into());
        assert!(!engine.apply_remote(inbound.clone()).await.unwrap());
        assert_eq!(engine.channel().relayed, vec![inbound]);
        assert_eq!(engine.tracker().last_known().as_str(), "X");

        // The untouched local value is not mistaken for a new copy
        assert!(!engine.sync_local().await.unwrap());
        assert!(engine.channel().pushed.is_empty());
    }

    #[tokio::test]
    async fn test_remote_value_applies_once_clipboard_recovers() {
        let clipboard = Arc::new(MemoryClipboard::with_value("X"));
        let mut engine = engine(&clipboard, ScriptedChannel::default());
        clipboard.set_fail_writes(true);
        assert!(!engine.apply_remote(Inbound::new("Y".into())).await.unwrap());

        clipboard.set_fail_writes(false);
        assert!(engine.apply_remote(Inbound::new("Y".into())).await.unwrap());
        assert_eq!(clipboard.get().as_str(), "Y");
    }

    #[tokio::test]
    async fn test_failed_push_keeps_synchronized_value() {
        let clipboard = Arc::new(MemoryClipboard::with_value("new"));
        let channel = ScriptedChannel {
            fail_pushes: 1,
            ..ScriptedChannel::default()
        };
        let mut engine = SyncEngine::new(
            clipboard.clone(),
            channel,
            Arc::new(ChangeTracker::with_value("old".into())),
            EngineConfig::default(),
        );

        assert!(!engine.sync_local().await.unwrap());
        assert_eq!(engine.tracker().last_known().as_str(), "old");

        // The value everyone already has must not overwrite the unsent copy
        let applied = engine
            .apply_remote(Inbound::new("old".into()))
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(clipboard.get().as_str(), "new");
        assert!(clipboard.writes().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_clipboard_is_skipped() {
        let clipboard = Arc::new(MemoryClipboard::with_value("hidden"));
        let mut engine = engine(&clipboard, ScriptedChannel::default());
        clipboard.set_fail_reads(true);

        assert!(!engine.sync_local().await.unwrap());
        assert!(!engine.sync_local().await.unwrap());
        assert!(engine.channel().pushed.is_empty());

        clipboard.set_fail_reads(false);
        assert!(engine.sync_local().await.unwrap());
        assert_eq!(engine.channel().pushed, vec![ClipboardValue::from("hidden")]);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let mut engine = engine(&clipboard, ScriptedChannel::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(engine.run(cancel).await.unwrap(), StopReason::Cancelled);
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let mut channel = ScriptedChannel::default();
        channel.incoming.push_back(Ok(Some(Inbound::new("last".into()))));
        channel
            .incoming
            .push_back(Err(SyncError::PeerDisconnected("127.0.0.1:1".parse().unwrap())));
        let mut engine = engine(&clipboard, channel);

        let reason = engine.run(CancellationToken::new()).await.unwrap();
        assert_eq!(reason, StopReason::ChannelClosed);
        assert_eq!(clipboard.get().as_str(), "last");
    }
}
