use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use ticklist_lib::server::{self, DocumentStore, ServerState};

/// Document store server: one JSON snapshot per user, shared-token auth,
/// conditional fetch. Put a TLS-terminating reverse proxy in front for
/// anything reachable from the internet.
#[derive(Parser)]
#[command(name = "ticklist-server", version)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Directory for stored documents [env: TICKLIST_DATA_DIR]
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Shared secret; clients send it as X-Token [env: TICKLIST_TOKEN]
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let data_dir = args
        .data_dir
        .or_else(|| std::env::var_os("TICKLIST_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./ticklist_data"));
    let token = args
        .token
        .or_else(|| std::env::var("TICKLIST_TOKEN").ok())
        .filter(|t| !t.is_empty());

    if token.is_none() {
        log::warn!("No token configured; the store accepts unauthenticated requests");
    }

    let store = DocumentStore::new(data_dir.clone())
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("Invalid host/port")?;

    let state = ServerState {
        store: Arc::new(store),
        token,
    };

    server::run(addr, state).await.context("Server failed")?;
    Ok(())
}
