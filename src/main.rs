// ABOUTME: CLI entry point for rdbsync
// ABOUTME: Synchronizes the CentOS CI ResultsDB to the Fedora ResultsDB, once or on an interval

use anyhow::{bail, Context, Result};
use clap::Parser;
use rdbsync::config::{DEFAULT_CENTOS_URL, DEFAULT_FEDORA_URL, DEFAULT_MESSAGE_ID_KEY};
use rdbsync::resultsdb::{ResultsDbClient, DEFAULT_TIMEOUT_SECS};
use rdbsync::sync::{
    sanitize_url, CursorStore, FileCursorStore, MemoryCursorStore, PassStats, ResultsDbSink,
    ResultsDbSource, SyncEngine,
};
use rdbsync::SyncConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Synchronize the CentOS CI ResultsDB to the Fedora ResultsDB.
#[derive(Parser)]
#[command(name = "rdbsync")]
#[command(version)]
struct Cli {
    /// The URL to the CentOS CI ResultsDB API
    #[arg(long, env = "RDBSYNC_CENTOS_URL", default_value = DEFAULT_CENTOS_URL)]
    centos_url: String,
    /// The URL to the Fedora ResultsDB API
    #[arg(long, env = "RDBSYNC_FEDORA_URL", default_value = DEFAULT_FEDORA_URL)]
    fedora_url: String,
    /// The timeout for HTTP requests in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
    /// If provided, run continuously, sleeping this many seconds after each pass
    #[arg(long)]
    poll_interval: Option<u64>,
    /// Number of results to request per page from CentOS CI
    #[arg(long, default_value_t = 50)]
    page_size: u32,
    /// Submit time to start from when no cursor has been stored yet
    #[arg(long)]
    since: Option<String>,
    /// Result data key holding the message id
    #[arg(long, default_value = DEFAULT_MESSAGE_ID_KEY)]
    message_id_key: String,
    /// Auth token for creating results in the Fedora ResultsDB
    #[arg(long, env = "RDBSYNC_FEDORA_TOKEN", hide_env_values = true)]
    fedora_token: Option<String>,
    /// File containing the auth token for the Fedora ResultsDB
    #[arg(long)]
    fedora_token_file: Option<PathBuf>,
    /// Where to store the sync cursor (defaults to ~/.rdbsync/cursor.json)
    #[arg(long)]
    cursor_file: Option<PathBuf>,
    /// With no stored cursor, start from the newest result already copied to Fedora
    #[arg(long)]
    bootstrap_from_destination: bool,
    /// Log what would be created without writing to Fedora or advancing the stored cursor
    #[arg(long)]
    dry_run: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let token = match (&cli.fedora_token, &cli.fedora_token_file) {
        (Some(token), _) => Some(token.clone()),
        (None, Some(path)) => Some(load_token(path)?),
        (None, None) => None,
    };
    if token.is_none() && !cli.dry_run {
        tracing::warn!("No Fedora ResultsDB auth token provided; result creation may be rejected");
    }

    let timeout = Duration::from_secs(cli.timeout);
    let centos = ResultsDbClient::new(&cli.centos_url, None, timeout)
        .context("Failed to set up the CentOS CI ResultsDB client")?;
    let fedora = ResultsDbClient::new(&cli.fedora_url, token, timeout)
        .context("Failed to set up the Fedora ResultsDB client")?;

    let config = SyncConfig {
        source_url: cli.centos_url.clone(),
        destination_url: cli.fedora_url.clone(),
        poll_interval: cli.poll_interval.map(Duration::from_secs),
        page_size: cli.page_size,
        start_since: cli.since.clone(),
        message_id_key: cli.message_id_key.clone(),
        bootstrap_from_destination: cli.bootstrap_from_destination,
    };

    let source = ResultsDbSource::new(centos, config.page_size, &config.message_id_key);
    let sink = ResultsDbSink::new(fedora, cli.dry_run);

    let cursor_path = match cli.cursor_file {
        Some(path) => path,
        None => FileCursorStore::default_path()?,
    };
    let mut file_store = FileCursorStore::new(&cursor_path, &config.source_url);

    tracing::info!(
        "Syncing {} -> {} (cursor: {:?})",
        sanitize_url(&config.source_url),
        sanitize_url(&config.destination_url),
        cursor_path
    );

    let polling = config.is_polling();
    let stats = if cli.dry_run {
        // Start from the real cursor but never write it back
        let stored = file_store
            .load()
            .await
            .context("Cannot continue without a known sync position")?;
        drive(config, source, sink, MemoryCursorStore::new(stored)).await?
    } else {
        drive(config, source, sink, file_store).await?
    };

    if polling {
        return Ok(());
    }

    if let Some((message_id, reason)) = &stats.failed {
        bail!("Failed to submit {}: {}", message_id, reason);
    }
    if let Some(reason) = &stats.source_error {
        bail!("Sync pass ended early: {}", reason);
    }
    if stats.cancelled {
        bail!("Sync pass interrupted after {} records", stats.handled());
    }

    tracing::info!("Sync complete!");
    Ok(())
}

async fn drive<C: CursorStore>(
    config: SyncConfig,
    source: ResultsDbSource,
    sink: ResultsDbSink,
    store: C,
) -> Result<PassStats> {
    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    // Set up Ctrl+C handler
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx_clone.send(());
        }
    });

    let mut engine = SyncEngine::new(config, source, sink, store);
    let stats = engine
        .run(shutdown_rx)
        .await
        .context("Cannot continue without a known sync position")?;

    drop(shutdown_tx);
    Ok(stats)
}

fn load_token(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read token file {}", path.display()))?;
    let token = contents.trim().to_string();
    if token.is_empty() {
        bail!("token file {} is empty", path.display());
    }
    Ok(token)
}
