//! Shared glue for the clipsync binaries
//!
//! Both entry points parse their arguments, set up logging, build a
//! clipboard backend, seed the change tracker and run one engine until
//! Ctrl-C. Only the channel differs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, ValueEnum};
use clipsync_core::{
    ChangeTracker, ClipboardSource, CommandClipboard, EngineConfig, StopReason,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default paste command for the `command` backend
pub const DEFAULT_PASTE_CMD: &str = "wl-paste --no-newline";

/// Default copy command for the `command` backend
pub const DEFAULT_COPY_CMD: &str = "wl-copy";

/// Where the local clipboard is read from and written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Platform clipboard (X11, Wayland, macOS, Windows)
    Arboard,
    /// External paste/copy commands
    Command,
}

/// Flags shared by both binaries
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Local clipboard check interval in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: u64,

    /// Clipboard backend
    #[arg(long, value_enum, default_value_t = Backend::Arboard)]
    pub backend: Backend,

    /// Command printing the clipboard (command backend)
    #[arg(long, default_value = DEFAULT_PASTE_CMD)]
    pub paste_cmd: String,

    /// Command reading new clipboard text from stdin (command backend)
    #[arg(long, default_value = DEFAULT_COPY_CMD)]
    pub copy_cmd: String,
}

impl CommonArgs {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            interval: Duration::from_millis(self.interval_ms),
        }
    }
}

/// Parse arguments, exiting 1 on usage errors and 0 for help/version.
pub fn parse_args<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Setup logging based on verbosity level
pub fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Build the clipboard backend selected on the command line
pub fn make_clipboard(args: &CommonArgs) -> Result<Arc<dyn ClipboardSource>> {
    let clipboard: Arc<dyn ClipboardSource> = match args.backend {
        Backend::Arboard => Arc::new(clipsync_core::ArboardClipboard::new()?),
        Backend::Command => Arc::new(CommandClipboard::new(&args.paste_cmd, &args.copy_cmd)?),
    };
    Ok(clipboard)
}

/// Tracker seeded with the current clipboard, so whatever is already there
/// at startup is not broadcast. An unreadable clipboard seeds empty.
pub async fn seed_tracker(clipboard: &Arc<dyn ClipboardSource>) -> Arc<ChangeTracker> {
    let source = clipboard.clone();
    let current = tokio::task::spawn_blocking(move || source.read()).await;

    let tracker = match current {
        Ok(Ok(value)) => ChangeTracker::with_value(value),
        Ok(Err(e)) => {
            warn!(error = %e, "Could not read clipboard at startup");
            ChangeTracker::new()
        }
        Err(e) => {
            warn!(error = %e, "Clipboard task failed at startup");
            ChangeTracker::new()
        }
    };
    Arc::new(tracker)
}

/// Token cancelled on the first Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    cancel_on(tokio::signal::ctrl_c())
}

/// Token cancelled once `signal` resolves successfully.
///
/// If the signal cannot be listened for, the token is left alone and the
/// run continues until stopped some other way.
pub fn cancel_on<F>(signal: F) -> CancellationToken
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!("Interrupted; shutting down");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });
    cancel
}

/// Log how a run ended
pub fn report_stop(reason: StopReason) {
    match reason {
        StopReason::Cancelled => info!("Stopped"),
        StopReason::ChannelClosed => info!("Server closed the connection; exiting"),
    }
}
