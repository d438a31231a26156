//! Walk a historical block range of one chain into the event store.

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use indexflow_indexer::backfill::{Backfill, BlockTarget};
use indexflow_indexer::config::Config;
use indexflow_indexer::listener::BlockProcessor;
use indexflow_indexer::logging::init_logging;
use indexflow_indexer::storage::Storage;

#[derive(Debug, Parser)]
#[command(name = "indexflow-backfill", version, about = "Backfill chain events into the IndexFlow store")]
struct Args {
    /// Chain key from the configuration, e.g. sepolia
    #[arg(long)]
    chain: String,

    /// First block; defaults to the cursor minus the reorg depth, or the deploy block
    #[arg(long)]
    from: Option<u64>,

    /// Last block number or `latest`
    #[arg(long, default_value = "latest")]
    to: BlockTarget,

    /// Path to configuration file
    #[arg(short, long, default_value = "indexer.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config).context("Failed to load configuration")?;
    init_logging(&config.logging, args.debug)?;

    let chain = config
        .chain(&args.chain)
        .with_context(|| format!("Unknown chain '{}'", args.chain))?;

    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?;
    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let processor = BlockProcessor::from_config(chain, &config.rpc, storage.clone())?;
    let backfill = Backfill::new(processor, &config.sync, config.sync.start_block_for(chain));

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, stopping after the current batch");
            signal_token.cancel();
        }
    });

    let result = backfill.run(args.from, args.to, &token).await;
    storage.close().await;
    let report = result?;

    info!(
        chain = %report.chain,
        from = report.from,
        to = report.to,
        blocks = report.blocks,
        batches = report.batches,
        cursor = ?report.cursor,
        logs = report.stats.logs,
        transfers = report.stats.transfers,
        staking = report.stats.staking,
        poi = report.stats.poi,
        contributions = report.stats.contributions,
        interrupted = report.interrupted,
        "Backfill report"
    );

    if report.interrupted {
        anyhow::bail!("Backfill interrupted at {:?}", report.cursor);
    }
    Ok(())
}
