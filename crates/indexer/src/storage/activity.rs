//! Wallet activity queries over indexed transfers.

use super::{Storage, WalletActivity};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use sqlx::Row;

const DAY_MS: i64 = 86_400_000;

impl Storage {
    /// Whether any transfer was ever indexed for a chain.
    pub async fn has_transfers(&self, chain_id: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM transfers WHERE chain_id = ? LIMIT 1")
                .bind(chain_id)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("Failed to probe transfers for {}", chain_id))?;

        Ok(found.is_some())
    }

    /// Whether any transfer of the given contracts falls in `[start_ms, end_ms]`.
    pub async fn has_transfers_in_scope(
        &self,
        chain_id: &str,
        contracts: &[Address],
        start_ms: i64,
        end_ms: i64,
    ) -> Result<bool> {
        if contracts.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            r#"
            SELECT 1 FROM transfers
            WHERE chain_id = ?
              AND contract_address IN ({})
              AND timestamp_ms BETWEEN ? AND ?
            LIMIT 1
            "#,
            placeholders(contracts.len())
        );

        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(chain_id);
        for contract in contracts {
            query = query.bind(contract.as_slice());
        }

        let found = query
            .bind(start_ms)
            .bind(end_ms)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to probe scoped transfers for {}", chain_id))?;

        Ok(found.is_some())
    }

    /// Aggregate a wallet's transfers (as sender or recipient) of the given
    /// contracts within `[start_ms, end_ms]`.
    ///
    /// Days are UTC day buckets of the transfer timestamp.
    pub async fn wallet_activity(
        &self,
        chain_id: &str,
        contracts: &[Address],
        wallet: Address,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<WalletActivity> {
        if contracts.is_empty() {
            return Ok(WalletActivity::default());
        }

        let sql = format!(
            r#"
            SELECT
                COUNT(*) AS tx_count,
                COUNT(DISTINCT timestamp_ms / {day_ms}) AS days_active,
                COUNT(DISTINCT contract_address) AS unique_contracts
            FROM transfers
            WHERE chain_id = ?
              AND contract_address IN ({contracts})
              AND timestamp_ms BETWEEN ? AND ?
              AND (from_address = ? OR to_address = ?)
            "#,
            day_ms = DAY_MS,
            contracts = placeholders(contracts.len())
        );

        let mut query = sqlx::query(&sql).bind(chain_id);
        for contract in contracts {
            query = query.bind(contract.as_slice());
        }

        let row = query
            .bind(start_ms)
            .bind(end_ms)
            .bind(wallet.as_slice())
            .bind(wallet.as_slice())
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to aggregate activity of {} on {}", wallet, chain_id))?;

        Ok(WalletActivity {
            tx_count: row.get::<i64, _>("tx_count") as u64,
            days_active: row.get::<i64, _>("days_active") as u64,
            unique_contracts: row.get::<i64, _>("unique_contracts") as u64,
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
