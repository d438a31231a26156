//! Cursor storage operations.
//!
//! `last_processed_block` only ever moves forward: a persist with an older
//! block than the stored one keeps the stored watermark.

use super::{Cursor, Storage};
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl Storage {
    /// Get the cursor of a chain, if one was ever persisted.
    pub async fn get_cursor(&self, chain_id: &str) -> Result<Option<Cursor>> {
        let row = sqlx::query(
            r#"
            SELECT chain_id, last_processed_block, current_chain_head, updated_at
            FROM cursors
            WHERE chain_id = ?
            "#,
        )
        .bind(chain_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch cursor for {}", chain_id))?;

        Ok(row.map(Self::row_to_cursor))
    }

    /// Persist a processed block for a chain and return the stored cursor.
    ///
    /// The watermark becomes `max(stored, block)`. A `None` head keeps the
    /// previously observed head.
    pub async fn persist_cursor(
        &self,
        chain_id: &str,
        block: u64,
        chain_head: Option<u64>,
    ) -> Result<Cursor> {
        let now = chrono::Utc::now().timestamp();

        let row = sqlx::query(
            r#"
            INSERT INTO cursors (chain_id, last_processed_block, current_chain_head, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(chain_id) DO UPDATE SET
                last_processed_block = MAX(cursors.last_processed_block, excluded.last_processed_block),
                current_chain_head = COALESCE(excluded.current_chain_head, cursors.current_chain_head),
                updated_at = excluded.updated_at
            RETURNING chain_id, last_processed_block, current_chain_head, updated_at
            "#,
        )
        .bind(chain_id)
        .bind(block as i64)
        .bind(chain_head.map(|h| h as i64))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to persist cursor for {} at block {}", chain_id, block))?;

        Ok(Self::row_to_cursor(row))
    }

    /// List every cursor ordered by chain.
    pub async fn list_cursors(&self) -> Result<Vec<Cursor>> {
        let rows = sqlx::query(
            r#"
            SELECT chain_id, last_processed_block, current_chain_head, updated_at
            FROM cursors
            ORDER BY chain_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list cursors")?;

        Ok(rows.into_iter().map(Self::row_to_cursor).collect())
    }

    fn row_to_cursor(row: SqliteRow) -> Cursor {
        Cursor {
            chain_id: row.get("chain_id"),
            last_processed_block: row.get::<i64, _>("last_processed_block") as u64,
            current_chain_head: row
                .get::<Option<i64>, _>("current_chain_head")
                .map(|h| h as u64),
            updated_at: row.get("updated_at"),
        }
    }
}
