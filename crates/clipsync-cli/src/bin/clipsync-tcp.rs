//! clipsync over TCP
//!
//! One server, any number of clients. A change on any endpoint reaches all
//! the others.
//!
//! ```bash
//! # On the machine everyone can reach
//! clipsync-tcp server --port 12345
//!
//! # On each other machine
//! clipsync-tcp client --host 192.168.1.10 --port 12345
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use clipsync_cli::{
    cancel_on_ctrl_c, make_clipboard, parse_args, report_stop, seed_tracker, setup_logging,
    CommonArgs,
};
use clipsync_core::channel::{DEFAULT_MAX_FRAME_LENGTH, DEFAULT_MAX_PEERS};
use clipsync_core::{SyncEngine, TcpClient, TcpConfig, TcpServer};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Accept clients and fan updates out between them
    Server,
    /// Connect to a server
    Client,
}

/// Sync the clipboard between machines over TCP
#[derive(Parser)]
#[command(name = "clipsync-tcp")]
#[command(version)]
#[command(about = "Sync the clipboard between machines over TCP")]
struct Cli {
    /// Run as server or client
    #[arg(value_enum)]
    mode: Mode,

    /// Address to listen on (server) or connect to (client)
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// TCP port
    #[arg(long, default_value_t = 12345)]
    port: u16,

    /// How long one receive waits before the loop checks the clipboard again
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: u64,

    /// Most clients the server keeps at once
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_PEERS,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    max_peers: usize,

    #[command(flatten)]
    common: CommonArgs,
}

impl Cli {
    fn tcp_config(&self) -> TcpConfig {
        TcpConfig {
            recv_timeout: Duration::from_millis(self.timeout_ms),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            max_peers: self.max_peers,
            ..TcpConfig::default()
        }
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Failed to resolve {}:{}", host, port))?
        .next()
        .with_context(|| format!("No address found for {}:{}", host, port))
}

async fn run_server(cli: Cli, addr: SocketAddr) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    let server = TcpServer::bind(addr, cli.tcp_config(), &cancel)
        .await
        .with_context(|| format!("Failed to listen on {}", addr))?;
    println!("Listening on {}", server.local_addr());

    let clipboard = make_clipboard(&cli.common)?;
    let tracker = seed_tracker(&clipboard).await;
    let mut engine = SyncEngine::new(clipboard, server, tracker, cli.common.engine_config());

    let result = engine.run(cancel).await;
    engine.into_channel().shutdown().await;
    report_stop(result?);
    Ok(())
}

async fn run_client(cli: Cli, addr: SocketAddr) -> Result<()> {
    let client = TcpClient::connect(addr, cli.tcp_config())
        .await
        .with_context(|| format!("Failed to connect to server at {}", addr))?;
    println!("Connected to {}", client.server_addr());

    let clipboard = make_clipboard(&cli.common)?;
    let tracker = seed_tracker(&clipboard).await;
    let mut engine = SyncEngine::new(clipboard, client, tracker, cli.common.engine_config());

    let reason = engine.run(cancel_on_ctrl_c()).await?;
    engine.into_channel().close().await;
    report_stop(reason);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = parse_args();
    setup_logging(cli.common.verbose);

    let addr = resolve(&cli.host, cli.port).await?;
    info!(mode = ?cli.mode, %addr, "Starting TCP clipboard sync");

    match cli.mode {
        Mode::Server => run_server(cli, addr).await,
        Mode::Client => run_client(cli, addr).await,
    }
}
