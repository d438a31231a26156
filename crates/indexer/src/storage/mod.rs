//! Storage layer for the IndexFlow indexer.
//!
//! This module provides database operations for:
//! - Cursors (per-chain ingestion watermark, never regresses)
//! - Events (transfers, staking, proof-of-indexing, contributions)
//! - Wallet activity aggregation for usage evaluation

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub mod activity;
pub mod events;
pub mod sync;
pub mod types;

pub use types::*;

/// Database storage for the indexer.
///
/// Provides async access to SQLite database with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// The database file is created if it doesn't exist. Migrations are not
    /// run; call [`Storage::run_migrations`] once after connecting.
    ///
    /// # Example
    /// ```no_run
    /// # use indexflow_indexer::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://indexflow.db", None, None).await?;
    /// storage.run_migrations().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        // WAL lets the listener and a backfill write concurrently.
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Create a new storage instance with a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let database_url = format!("sqlite://{}", path.display());
        Self::new(&database_url, None, None).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        Ok(DatabaseStats {
            transfer_count: self.count_events(EventKind::Transfer).await?,
            staking_count: self.count_events(EventKind::Staking).await?,
            poi_count: self.count_events(EventKind::ProofOfIndexing).await?,
            contribution_count: self.count_events(EventKind::Contribution).await?,
            cursors: self.list_cursors().await?,
        })
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Rows in `transfers`
    pub transfer_count: u64,

    /// Rows in `staking_events`
    pub staking_count: u64,

    /// Rows in `poi_events`
    pub poi_count: u64,

    /// Rows in `contributions`
    pub contribution_count: u64,

    /// Every chain cursor
    pub cursors: Vec<Cursor>,
}
