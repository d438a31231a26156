//! Event storage operations.
//!
//! Every write is an upsert keyed by `(chain_id, tx_hash, log_index)`, so
//! re-ingesting a range never produces duplicates.

use super::{
    ContributionRecord, EventKind, IngestedEvent, PoiRecord, StakingRecord, Storage,
    TransferRecord,
};
use anyhow::{Context, Result};

impl Storage {
    /// Upsert any decoded event.
    pub async fn upsert_event(
        &self,
        chain_id: &str,
        event: &IngestedEvent,
        timestamp_ms: i64,
    ) -> Result<()> {
        match event {
            IngestedEvent::Transfer(e) => self.upsert_transfer(chain_id, e, timestamp_ms).await,
            IngestedEvent::Staking(e) => self.upsert_staking(chain_id, e, timestamp_ms).await,
            IngestedEvent::ProofOfIndexing(e) => self.upsert_poi(chain_id, e, timestamp_ms).await,
            IngestedEvent::Contribution(e) => {
                self.upsert_contribution(chain_id, e, timestamp_ms).await
            }
        }
    }

    /// Upsert an ERC-20 transfer.
    pub async fn upsert_transfer(
        &self,
        chain_id: &str,
        record: &TransferRecord,
        timestamp_ms: i64,
    ) -> Result<()> {
        let meta = &record.meta;

        sqlx::query(
            r#"
            INSERT INTO transfers (
                chain_id, tx_hash, log_index, block_number, contract_address,
                from_address, to_address, value, timestamp_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chain_id, tx_hash, log_index) DO UPDATE SET
                block_number = excluded.block_number,
                contract_address = excluded.contract_address,
                from_address = excluded.from_address,
                to_address = excluded.to_address,
                value = excluded.value,
                timestamp_ms = excluded.timestamp_ms
            "#,
        )
        .bind(chain_id)
        .bind(meta.tx_hash.as_slice())
        .bind(meta.log_index as i64)
        .bind(meta.block_number as i64)
        .bind(meta.contract.as_slice())
        .bind(record.from.as_slice())
        .bind(record.to.as_slice())
        .bind(&record.value)
        .bind(timestamp_ms)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to upsert transfer {}:{} on {}",
                meta.tx_hash, meta.log_index, chain_id
            )
        })?;

        Ok(())
    }

    /// Upsert a staking pool action.
    pub async fn upsert_staking(
        &self,
        chain_id: &str,
        record: &StakingRecord,
        timestamp_ms: i64,
    ) -> Result<()> {
        let meta = &record.meta;

        sqlx::query(
            r#"
            INSERT INTO staking_events (
                chain_id, tx_hash, log_index, block_number, contract_address,
                user_address, amount, event_type, timestamp_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chain_id, tx_hash, log_index) DO UPDATE SET
                block_number = excluded.block_number,
                contract_address = excluded.contract_address,
                user_address = excluded.user_address,
                amount = excluded.amount,
                event_type = excluded.event_type,
                timestamp_ms = excluded.timestamp_ms
            "#,
        )
        .bind(chain_id)
        .bind(meta.tx_hash.as_slice())
        .bind(meta.log_index as i64)
        .bind(meta.block_number as i64)
        .bind(meta.contract.as_slice())
        .bind(record.user.as_slice())
        .bind(&record.amount)
        .bind(record.event_type.as_str())
        .bind(timestamp_ms)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to upsert staking event {}:{} on {}",
                meta.tx_hash, meta.log_index, chain_id
            )
        })?;

        Ok(())
    }

    /// Upsert a proof-of-indexing submission.
    pub async fn upsert_poi(
        &self,
        chain_id: &str,
        record: &PoiRecord,
        timestamp_ms: i64,
    ) -> Result<()> {
        let meta = &record.meta;

        sqlx::query(
            r#"
            INSERT INTO poi_events (
                chain_id, tx_hash, log_index, block_number, contract_address,
                operator, target_chain_id, from_block, to_block, proof_hash, timestamp_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chain_id, tx_hash, log_index) DO UPDATE SET
                block_number = excluded.block_number,
                contract_address = excluded.contract_address,
                operator = excluded.operator,
                target_chain_id = excluded.target_chain_id,
                from_block = excluded.from_block,
                to_block = excluded.to_block,
                proof_hash = excluded.proof_hash,
                timestamp_ms = excluded.timestamp_ms
            "#,
        )
        .bind(chain_id)
        .bind(meta.tx_hash.as_slice())
        .bind(meta.log_index as i64)
        .bind(meta.block_number as i64)
        .bind(meta.contract.as_slice())
        .bind(record.operator.as_slice())
        .bind(record.target_chain_id.as_slice())
        .bind(record.from_block as i64)
        .bind(record.to_block as i64)
        .bind(record.proof_hash.as_slice())
        .bind(timestamp_ms)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to upsert proof of indexing {}:{} on {}",
                meta.tx_hash, meta.log_index, chain_id
            )
        })?;

        Ok(())
    }

    /// Upsert a contribution record.
    pub async fn upsert_contribution(
        &self,
        chain_id: &str,
        record: &ContributionRecord,
        timestamp_ms: i64,
    ) -> Result<()> {
        let meta = &record.meta;

        sqlx::query(
            r#"
            INSERT INTO contributions (
                chain_id, tx_hash, log_index, block_number, contract_address,
                user_address, contribution_type, weight, timestamp_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chain_id, tx_hash, log_index) DO UPDATE SET
                block_number = excluded.block_number,
                contract_address = excluded.contract_address,
                user_address = excluded.user_address,
                contribution_type = excluded.contribution_type,
                weight = excluded.weight,
                timestamp_ms = excluded.timestamp_ms
            "#,
        )
        .bind(chain_id)
        .bind(meta.tx_hash.as_slice())
        .bind(meta.log_index as i64)
        .bind(meta.block_number as i64)
        .bind(meta.contract.as_slice())
        .bind(record.user.as_slice())
        .bind(&record.contribution_type)
        .bind(&record.weight)
        .bind(timestamp_ms)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to upsert contribution {}:{} on {}",
                meta.tx_hash, meta.log_index, chain_id
            )
        })?;

        Ok(())
    }

    /// Count rows of one event table.
    pub async fn count_events(&self, kind: EventKind) -> Result<u64> {
        // Table names come from a closed enum, never from input.
        let query = format!("SELECT COUNT(*) FROM {}", kind.table());

        let count: i64 = sqlx::query_scalar(&query)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", kind.table()))?;

        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EventMeta, StakingEventType};
    use alloy::primitives::{Address, B256};
    use sqlx::Row;
    use tempfile::NamedTempFile;

    async fn setup() -> (Storage, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path()).await.unwrap();
        storage.run_migrations().await.unwrap();
        (storage, temp_db)
    }

    fn meta(block: u64, tx: u8, log_index: u64) -> EventMeta {
        EventMeta {
            block_number: block,
            tx_hash: B256::repeat_byte(tx),
            log_index,
            contract: Address::repeat_byte(0xcc),
        }
    }

    fn transfer(block: u64, tx: u8, log_index: u64, value: &str) -> IngestedEvent {
        IngestedEvent::Transfer(TransferRecord {
            meta: meta(block, tx, log_index),
            from: Address::repeat_byte(0x01),
            to: Address::repeat_byte(0x02),
            value: value.to_string(),
        })
    }

    #[tokio::test]
    async fn test_transfer_upsert_is_idempotent() {
        let (storage, _db) = setup().await;

        let event = transfer(10, 0xaa, 0, "1000");
        for _ in 0..3 {
            storage
                .upsert_event("sepolia", &event, 1_700_000_000_000)
                .await
                .unwrap();
        }

        assert_eq!(storage.count_events(EventKind::Transfer).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_identity_includes_chain_and_log_index() {
        let (storage, _db) = setup().await;

        storage
            .upsert_event("sepolia", &transfer(10, 0xaa, 0, "1"), 0)
            .await
            .unwrap();
        storage
            .upsert_event("sepolia", &transfer(10, 0xaa, 1, "1"), 0)
            .await
            .unwrap();
        storage
            .upsert_event("base", &transfer(10, 0xaa, 0, "1"), 0)
            .await
            .unwrap();

        assert_eq!(storage.count_events(EventKind::Transfer).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_fields() {
        let (storage, _db) = setup().await;

        storage
            .upsert_event("sepolia", &transfer(10, 0xaa, 0, "1"), 1_000)
            .await
            .unwrap();
        storage
            .upsert_event("sepolia", &transfer(10, 0xaa, 0, "2"), 2_000)
            .await
            .unwrap();

        let row = sqlx::query("SELECT value, timestamp_ms FROM transfers")
            .fetch_one(storage.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("value"), "2");
        assert_eq!(row.get::<i64, _>("timestamp_ms"), 2_000);
    }

    #[tokio::test]
    async fn test_big_values_survive_as_decimal_strings() {
        let (storage, _db) = setup().await;

        let huge = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        storage
            .upsert_event("sepolia", &transfer(1, 0x01, 0, huge), 0)
            .await
            .unwrap();

        let value: String = sqlx::query_scalar("SELECT value FROM transfers")
            .fetch_one(storage.pool())
            .await
            .unwrap();
        assert_eq!(value, huge);
    }

    #[tokio::test]
    async fn test_every_kind_lands_in_its_table() {
        let (storage, _db) = setup().await;

        let events = vec![
            transfer(1, 0x01, 0, "5"),
            IngestedEvent::Staking(StakingRecord {
                meta: meta(1, 0x01, 1),
                user: Address::repeat_byte(0x03),
                amount: "7".to_string(),
                event_type: StakingEventType::RewardClaimed,
            }),
            IngestedEvent::ProofOfIndexing(PoiRecord {
                meta: meta(1, 0x01, 2),
                operator: Address::repeat_byte(0x04),
                target_chain_id: B256::repeat_byte(0x05),
                from_block: 100,
                to_block: 200,
                proof_hash: B256::repeat_byte(0x06),
                timestamp: 1_700_000_000,
            }),
            IngestedEvent::Contribution(ContributionRecord {
                meta: meta(1, 0x01, 3),
                user: Address::repeat_byte(0x07),
                contribution_type: "dataset".to_string(),
                weight: "3".to_string(),
                timestamp: 1_700_000_000,
            }),
        ];

        for event in &events {
            storage.upsert_event("sepolia", event, 0).await.unwrap();
        }

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.transfer_count, 1);
        assert_eq!(stats.staking_count, 1);
        assert_eq!(stats.poi_count, 1);
        assert_eq!(stats.contribution_count, 1);

        let event_type: String = sqlx::query_scalar("SELECT event_type FROM staking_events")
            .fetch_one(storage.pool())
            .await
            .unwrap();
        assert_eq!(event_type, "REWARD_CLAIMED");
    }
}
