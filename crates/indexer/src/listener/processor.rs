//! Decode and persist logic shared by backfill and the listener.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use anyhow::{Context, Result};
use tracing::{debug, error, warn};

use super::events::{
    decode_log, topic0, ContributionRecorded, DecodeError, ProofSubmitted, Transfer,
    STAKING_TOPICS,
};
use super::provider::{ChainClient, ChainSource};
use crate::config::{ChainConfig, RpcConfig};
use crate::retry::{with_retry, RetryError, RetryPolicy};
use crate::storage::{normalize_timestamp_ms, Cursor, EventKind, IngestedEvent, Storage};

/// Which contract a topic filter watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Token contract.
    Token,
    /// Staking pool.
    Staking,
    /// Proof-of-indexing registry.
    ProofOfIndexing,
    /// Contribution registry.
    Contributions,
}

impl TargetKind {
    /// Event topics emitted by this kind of contract.
    pub fn topics(&self) -> Vec<B256> {
        match self {
            Self::Token => vec![Transfer::SIGNATURE_HASH],
            Self::Staking => STAKING_TOPICS.to_vec(),
            Self::ProofOfIndexing => vec![ProofSubmitted::SIGNATURE_HASH],
            Self::Contributions => vec![ContributionRecorded::SIGNATURE_HASH],
        }
    }

    /// Short name for logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Staking => "staking",
            Self::ProofOfIndexing => "poi",
            Self::Contributions => "contributions",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic filter for one contract, active from its deploy block on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTarget {
    /// Contract kind.
    pub kind: TargetKind,
    /// Contract address.
    pub address: Address,
    /// Topics matched at position 0.
    pub topics: Vec<B256>,
    /// First block the contract can emit logs in.
    pub deploy_block: u64,
}

impl TopicTarget {
    /// Target for `address` with the topics of `kind`.
    pub fn new(kind: TargetKind, address: Address, deploy_block: u64) -> Self {
        Self {
            kind,
            address,
            topics: kind.topics(),
            deploy_block,
        }
    }

    /// Clip `[from, to]` to blocks at or after the deploy block.
    pub fn clip(&self, from: u64, to: u64) -> Option<(u64, u64)> {
        let from = from.max(self.deploy_block);
        (from <= to).then_some((from, to))
    }

    /// `eth_getLogs` filter for `[from, to]`.
    pub fn filter(&self, from: u64, to: u64) -> Filter {
        Filter::new()
            .address(self.address)
            .event_signature(self.topics.clone())
            .from_block(from)
            .to_block(to)
    }
}

/// Counters for one processed range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Logs returned by the node.
    pub logs: u64,
    /// Transfers written.
    pub transfers: u64,
    /// Staking events written.
    pub staking: u64,
    /// PoI submissions written.
    pub poi: u64,
    /// Contributions written.
    pub contributions: u64,
}

impl BatchStats {
    fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::Transfer => self.transfers += 1,
            EventKind::Staking => self.staking += 1,
            EventKind::ProofOfIndexing => self.poi += 1,
            EventKind::Contribution => self.contributions += 1,
        }
    }

    /// Events written across all kinds.
    pub fn events(&self) -> u64 {
        self.transfers + self.staking + self.poi + self.contributions
    }

    /// Add another batch.
    pub fn merge(&mut self, other: &BatchStats) {
        self.logs += other.logs;
        self.transfers += other.transfers;
        self.staking += other.staking;
        self.poi += other.poi;
        self.contributions += other.contributions;
    }
}

/// Fetches, decodes and upserts the logs of one chain.
pub struct BlockProcessor {
    chain: String,
    source: Arc<dyn ChainSource>,
    storage: Storage,
    targets: Vec<TopicTarget>,
    storage_retry: RetryPolicy,
}

impl BlockProcessor {
    /// Create a processor for the chain served by `source`.
    pub fn new(
        source: Arc<dyn ChainSource>,
        storage: Storage,
        targets: Vec<TopicTarget>,
        storage_retry: RetryPolicy,
    ) -> Self {
        Self {
            chain: source.chain().to_string(),
            source,
            storage,
            targets,
            storage_retry,
        }
    }

    /// Build a processor over a live RPC client for `chain`.
    pub fn from_config(chain: &ChainConfig, rpc: &RpcConfig, storage: Storage) -> Result<Self> {
        let client = ChainClient::from_config(chain, rpc)
            .with_context(|| format!("Failed to create RPC client for {}", chain.id))?;

        Ok(Self::new(
            Arc::new(client),
            storage,
            chain.targets(),
            rpc.storage_retry_policy(),
        ))
    }

    /// Chain key.
    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Chain access.
    pub fn source(&self) -> &Arc<dyn ChainSource> {
        &self.source
    }

    /// Storage handle.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Configured topic filters.
    pub fn targets(&self) -> &[TopicTarget] {
        &self.targets
    }

    /// Ingest `[from, to]` with one `getLogs` per active target.
    ///
    /// Block timestamps are fetched lazily and memoized for the range.
    pub async fn process_range(&self, from: u64, to: u64) -> Result<BatchStats> {
        let mut stats = BatchStats::default();
        let mut timestamps: HashMap<u64, u64> = HashMap::new();

        for target in &self.targets {
            let Some((start, end)) = target.clip(from, to) else {
                continue;
            };

            let logs = self.fetch(target, start, end).await?;
            stats.logs += logs.len() as u64;

            for log in &logs {
                let Some(event) = self.decode(log)? else {
                    continue;
                };

                let timestamp = match event.own_timestamp() {
                    Some(ts) => ts,
                    None => {
                        let block = event.meta().block_number;
                        match timestamps.get(&block) {
                            Some(ts) => *ts,
                            None => {
                                let ts = self.source.block_timestamp(block).await?;
                                timestamps.insert(block, ts);
                                ts
                            }
                        }
                    }
                };

                self.persist(&event, timestamp).await?;
                stats.record(event.kind());
            }
        }

        Ok(stats)
    }

    /// Ingest a single block: one timestamp fetch, then one `getLogs` per
    /// active target scoped to `[block, block]`.
    pub async fn process_block(&self, block: u64) -> Result<BatchStats> {
        let mut stats = BatchStats::default();
        let block_timestamp = self.source.block_timestamp(block).await?;

        for target in &self.targets {
            if block < target.deploy_block {
                continue;
            }

            let logs = self.fetch(target, block, block).await?;
            stats.logs += logs.len() as u64;

            for log in &logs {
                let Some(event) = self.decode(log)? else {
                    continue;
                };

                let timestamp = event.own_timestamp().unwrap_or(block_timestamp);
                self.persist(&event, timestamp).await?;
                stats.record(event.kind());
            }
        }

        Ok(stats)
    }

    /// Persist the cursor, retrying with the storage policy.
    pub async fn commit_cursor(&self, block: u64, head: Option<u64>) -> Result<Cursor> {
        with_retry(&self.storage_retry, "persist cursor", || {
            self.storage.persist_cursor(&self.chain, block, head)
        })
        .await
        .map_err(RetryError::into_anyhow)
    }

    async fn fetch(&self, target: &TopicTarget, from: u64, to: u64) -> Result<Vec<Log>> {
        self.source
            .logs(&target.filter(from, to))
            .await
            .with_context(|| {
                format!(
                    "Failed to fetch {} logs for {} blocks {}..={}",
                    target.kind, self.chain, from, to
                )
            })
    }

    /// Decode a log. Removed logs and foreign topics are skipped; a decode
    /// failure of one of our topics fails the batch.
    fn decode(&self, log: &Log) -> Result<Option<IngestedEvent>> {
        if log.removed {
            debug!(
                chain = %self.chain,
                tx_hash = ?log.transaction_hash,
                log_index = ?log.log_index,
                "Skipping removed log"
            );
            return Ok(None);
        }

        match decode_log(log) {
            Ok(event) => Ok(Some(event)),
            Err(DecodeError::UnknownTopic(topic)) => {
                warn!(
                    chain = %self.chain,
                    %topic,
                    address = %log.inner.address,
                    "Skipping log with unexpected topic"
                );
                Ok(None)
            }
            Err(e) => {
                error!(
                    chain = %self.chain,
                    block = ?log.block_number,
                    tx_hash = ?log.transaction_hash,
                    log_index = ?log.log_index,
                    topic = ?topic0(log).ok(),
                    error = %e,
                    "Failed to decode log"
                );
                Err(e).with_context(|| format!("Failed to decode log on {}", self.chain))
            }
        }
    }

    async fn persist(&self, event: &IngestedEvent, timestamp: u64) -> Result<()> {
        let meta = event.meta();
        let name = format!(
            "upsert {} {}:{}",
            event.kind().table(),
            meta.tx_hash,
            meta.log_index
        );
        let timestamp_ms = normalize_timestamp_ms(timestamp);

        with_retry(&self.storage_retry, &name, || {
            self.storage.upsert_event(&self.chain, event, timestamp_ms)
        })
        .await
        .map_err(RetryError::into_anyhow)
    }
}

impl fmt::Debug for BlockProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockProcessor")
            .field("chain", &self.chain)
            .field("targets", &self.targets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_to_deploy_block() {
        let target = TopicTarget::new(TargetKind::Staking, Address::repeat_byte(1), 100);

        assert_eq!(target.clip(50, 80), None);
        assert_eq!(target.clip(50, 150), Some((100, 150)));
        assert_eq!(target.clip(120, 150), Some((120, 150)));
        assert_eq!(target.clip(100, 100), Some((100, 100)));
    }

    #[test]
    fn test_target_topics() {
        assert_eq!(TargetKind::Token.topics(), vec![Transfer::SIGNATURE_HASH]);
        assert_eq!(TargetKind::Staking.topics().len(), 3);
    }

    #[test]
    fn test_batch_stats_merge() {
        let mut total = BatchStats::default();
        let mut batch = BatchStats::default();
        batch.logs = 3;
        batch.record(EventKind::Transfer);
        batch.record(EventKind::Transfer);
        batch.record(EventKind::Staking);

        total.merge(&batch);
        total.merge(&batch);

        assert_eq!(total.logs, 6);
        assert_eq!(total.transfers, 4);
        assert_eq!(total.staking, 2);
        assert_eq!(total.events(), 6);
    }
}
