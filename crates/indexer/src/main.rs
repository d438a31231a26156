//! IndexFlow Indexer - multi-chain EVM log ingestion
//!
//! This binary provides:
//! - One polling listener per configured chain
//! - Cursor and table count reporting
//! - Database initialization
//! - One-off wallet evaluation against the indexed data
//!
//! Historical ranges are walked by the separate `indexflow-backfill` binary.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use indexflow_indexer::config::{Config, LoggingConfig};
use indexflow_indexer::evaluation::{EvaluateRequest, EvaluationService};
use indexflow_indexer::listener::{BlockProcessor, Listener};
use indexflow_indexer::logging::init_logging;
use indexflow_indexer::shutdown::{shutdown_signal, shutdown_tasks, ManagedTask};
use indexflow_indexer::storage::Storage;
use indexflow_indexer::{UsageWindowInput, UsageWindowType};

#[derive(Parser)]
#[command(name = "indexflow-indexer")]
#[command(version, about = "IndexFlow multi-chain log indexer", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "indexer.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the listeners
    Run {
        /// Only run the listener for this chain
        #[arg(long)]
        chain: Option<String>,
    },

    /// Show cursors and table counts
    Status,

    /// Evaluate one wallet against a configured campaign
    Evaluate {
        /// Campaign id
        #[arg(long)]
        campaign: String,

        /// Wallet address
        #[arg(long)]
        wallet: String,

        /// Window type: last_7_days, last_14_days, last_30_days or custom
        #[arg(long, default_value = "last_30_days", value_parser = parse_window_type)]
        window: UsageWindowType,

        /// Window start in Unix seconds (custom windows)
        #[arg(long)]
        start: Option<i64>,

        /// Window end in Unix seconds, defaults to now
        #[arg(long)]
        end: Option<i64>,

        /// Block the evaluation is pinned to, defaults to the chain head
        #[arg(long)]
        as_of_block: Option<u64>,
    },

    /// Initialize the database
    InitDb {
        /// Database URL
        #[arg(long, default_value = "sqlite://indexflow.db")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run { chain: None }) {
        Commands::Run { chain } => {
            let config = load_config(&cli.config, cli.debug)?;
            run_listeners(config, chain.as_deref()).await
        }
        Commands::Status => {
            let config = load_config(&cli.config, cli.debug)?;
            show_status(&config).await
        }
        Commands::Evaluate {
            campaign,
            wallet,
            window,
            start,
            end,
            as_of_block,
        } => {
            let config = load_config(&cli.config, cli.debug)?;
            let request = EvaluateRequest {
                wallet,
                campaign_id: campaign,
                window: UsageWindowInput {
                    window_type: window,
                    start,
                    end: Some(end.unwrap_or_else(|| chrono::Utc::now().timestamp())),
                },
                as_of_block,
            };
            evaluate_wallet(&config, &request).await
        }
        Commands::InitDb { database_url } => {
            init_logging(&LoggingConfig::default(), cli.debug)?;
            init_database(&database_url).await
        }
    }
}

fn load_config(path: &str, debug: bool) -> Result<Config> {
    let config = Config::from_file(path).context("Failed to load configuration")?;
    init_logging(&config.logging, debug)?;

    info!("IndexFlow Indexer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", path);
    Ok(config)
}

async fn connect(config: &Config) -> Result<Storage> {
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

    Ok(storage)
}

/// Spawn one listener per chain and wait for a shutdown signal.
async fn run_listeners(config: Config, only: Option<&str>) -> Result<()> {
    let chains: Vec<_> = match only {
        Some(id) => {
            let chain = config
                .chain(id)
                .with_context(|| format!("Unknown chain '{}'", id))?;
            vec![chain.clone()]
        }
        None => config.chains.clone(),
    };

    if chains.is_empty() {
        bail!("No chains configured");
    }

    let storage = connect(&config).await?;
    info!("Database initialized");

    let token = CancellationToken::new();
    let mut tasks = Vec::with_capacity(chains.len());

    for chain in &chains {
        let processor = BlockProcessor::from_config(chain, &config.rpc, storage.clone())?;
        let listener = Listener::new(processor, config.sync.clone());

        info!(
            chain = %chain.id,
            network = %chain.network,
            targets = chain.targets().len(),
            batch_size = config.sync.batch_size,
            poll_interval_secs = config.sync.poll_interval_secs,
            "Starting listener"
        );

        let child = token.child_token();
        let handle = tokio::spawn(async move { listener.run(child).await });
        tasks.push(ManagedTask::new(format!("listener:{}", chain.id), handle));
    }

    info!(
        "Indexer is running with {} listener(s). Press Ctrl+C to stop.",
        tasks.len()
    );

    shutdown_signal()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    let timeout = Duration::from_secs(config.sync.shutdown_timeout_secs);
    let clean = shutdown_tasks(&token, tasks, timeout).await;
    storage.close().await;

    if !clean {
        bail!("Listeners did not shut down cleanly");
    }
    Ok(())
}

async fn show_status(config: &Config) -> Result<()> {
    let storage = connect(config).await?;
    let stats = storage.stats().await?;

    println!("IndexFlow Indexer Status");
    println!("========================");
    println!();
    println!("Database: {}", config.database.url);
    println!("  Transfers:      {}", stats.transfer_count);
    println!("  Staking events: {}", stats.staking_count);
    println!("  PoI events:     {}", stats.poi_count);
    println!("  Contributions:  {}", stats.contribution_count);
    println!();
    println!("Cursors:");

    if stats.cursors.is_empty() {
        println!("  (none)");
    }
    for cursor in &stats.cursors {
        let head = cursor
            .current_chain_head
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        let lag = cursor
            .current_chain_head
            .map(|h| h.saturating_sub(cursor.last_processed_block).to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<12} last={:<12} head={:<12} lag={:<8} updated_at={}",
            cursor.chain_id, cursor.last_processed_block, head, lag, cursor.updated_at
        );
    }

    for chain in &config.chains {
        if !stats.cursors.iter().any(|c| c.chain_id == chain.id) {
            warn!(chain = %chain.id, "Chain has no cursor yet");
        }
    }

    storage.close().await;
    Ok(())
}

fn parse_window_type(value: &str) -> Result<UsageWindowType> {
    [
        UsageWindowType::Last7Days,
        UsageWindowType::Last14Days,
        UsageWindowType::Last30Days,
        UsageWindowType::Custom,
    ]
    .into_iter()
    .find(|window| window.as_str().eq_ignore_ascii_case(value.trim()))
    .with_context(|| format!("Unknown window type '{}'", value))
}

async fn evaluate_wallet(config: &Config, request: &EvaluateRequest) -> Result<()> {
    let storage = connect(config).await?;
    let service = EvaluationService::from_config(config, storage.clone())?;

    let result = service.evaluate_wallet(request).await;
    storage.close().await;

    let result = result.context("Evaluation failed")?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = Storage::new(database_url, None, None)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    info!("Database initialized successfully");
    storage.close().await;

    Ok(())
}
