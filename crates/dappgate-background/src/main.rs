//! `dappgate` host
//!
//! Runs the background authority behind a line-delimited JSON transport on
//! stdin/stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};

use dappgate_background::approval::{ApprovalBroker, BrokerConfig};
use dappgate_background::broadcast::NotificationBroadcaster;
use dappgate_background::host::{self, HostChannel, HostRouter};
use dappgate_background::network::NetworkManager;
use dappgate_background::permission::PermissionStore;
use dappgate_background::rpc::RpcDispatcher;
use dappgate_background::signer::PlaceholderSigner;
use dappgate_background::storage::{Database, KeyValueStore};

#[derive(Parser, Debug)]
#[command(name = "dappgate-host")]
#[command(version, about = "dappgate background host - origin permissions and RPC dispatch")]
struct Args {
    /// Database file path
    #[arg(long, env = "DAPPGATE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Directory searched for `.dappgate/settings.json`
    #[arg(long, env = "DAPPGATE_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    /// Seconds an approval prompt stays open
    #[arg(long, env = "DAPPGATE_APPROVAL_TIMEOUT")]
    approval_timeout: Option<u64>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, env = "DAPPGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "DAPPGATE_LOG_JSON")]
    log_json: bool,

    /// Outbound frame queue capacity
    #[arg(long, default_value_t = 256)]
    queue_capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = dappgate_core::config::load_config(args.project_dir.as_deref())
        .context("Failed to load configuration")?;
    if let Some(path) = args.db_path {
        config.host.database_path = Some(path);
    }
    if let Some(secs) = args.approval_timeout {
        config.approval.timeout_secs = secs;
    }
    if let Some(level) = args.log_level {
        config.host.log_level = level;
    }
    config.host.log_json |= args.log_json;

    let log_filter = format!(
        "dappgate_background={level},dappgate_host={level}",
        level = config.host.log_level
    );
    dappgate_core::tracing_init::init_tracing(&log_filter, config.host.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        approval_timeout_secs = config.approval.timeout_secs,
        "Starting dappgate-host"
    );

    let db_path = match config.host.database_path.clone() {
        Some(path) => path,
        None => dappgate_core::config::database_path()
            .context("Could not determine config directory")?,
    };
    info!(path = %db_path.display(), "Opening database");
    let db = Database::open(&db_path).await?;
    let kv: Arc<dyn KeyValueStore> = Arc::new(db);

    let store = Arc::new(PermissionStore::load(Arc::clone(&kv)).await?);
    let networks = Arc::new(NetworkManager::load(kv).await?);

    let (channel, frames_rx) = HostChannel::new(args.queue_capacity);
    let broker = Arc::new(ApprovalBroker::new(
        Arc::clone(&store),
        Arc::new(channel.clone()),
        BrokerConfig::from(&config.approval),
    ));
    let broadcaster = Arc::new(NotificationBroadcaster::new(
        Arc::clone(&store),
        Arc::new(channel.clone()),
        config.broadcast.delivery_timeout(),
    ));
    let dispatcher = Arc::new(RpcDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&broker),
        Arc::clone(&networks),
        Arc::clone(&broadcaster),
        Arc::new(PlaceholderSigner),
    ));
    let router = Arc::new(HostRouter::new(
        channel,
        dispatcher,
        broker,
        store,
        networks,
        broadcaster,
    ));

    let writer = tokio::spawn(host::write_frames(frames_rx, tokio::io::stdout()));
    let reader = host::read_commands(router, BufReader::new(tokio::io::stdin()));

    tokio::select! {
        result = reader => {
            if let Err(e) = result {
                warn!(error = %e, "Input stream failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Give queued responses a moment to drain.
    let _ = tokio::time::timeout(Duration::from_secs(1), writer).await;
    info!("dappgate-host stopped");
    Ok(())
}
