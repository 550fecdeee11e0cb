//! clipsync over a shared file
//!
//! Run one instance on each side of a shared folder, both pointing at the
//! same file:
//!
//! ```bash
//! # VM guest
//! clipsync-file /mnt/shared/clipboard.txt
//!
//! # Host, with external clipboard commands and faster polling
//! clipsync-file ~/vm-share/clipboard.txt --backend command --poll-ms 250
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use clipsync_cli::{
    cancel_on_ctrl_c, make_clipboard, parse_args, report_stop, seed_tracker, setup_logging,
    CommonArgs,
};
use clipsync_core::{FileChannelConfig, FileSyncChannel, SyncEngine};
use tracing::info;

/// Sync the clipboard through a file both endpoints can reach
#[derive(Parser)]
#[command(name = "clipsync-file")]
#[command(version)]
#[command(about = "Sync the clipboard through a shared file")]
struct Cli {
    /// Shared file (must already exist)
    path: PathBuf,

    /// Modification-time poll interval in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    poll_ms: u64,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = parse_args();
    setup_logging(cli.common.verbose);

    if !cli.path.is_file() {
        anyhow::bail!("Invalid path: {}", cli.path.display());
    }

    let clipboard = make_clipboard(&cli.common)?;
    let tracker = seed_tracker(&clipboard).await;
    let channel = FileSyncChannel::open(
        &cli.path,
        FileChannelConfig {
            poll_interval: Duration::from_millis(cli.poll_ms),
        },
    )?;

    info!(path = %cli.path.display(), "Starting file clipboard sync");
    let mut engine = SyncEngine::new(clipboard, channel, tracker, cli.common.engine_config());
    let reason = engine.run(cancel_on_ctrl_c()).await?;
    report_stop(reason);

    Ok(())
}
