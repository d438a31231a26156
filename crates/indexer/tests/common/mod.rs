//! In-memory chain shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, LogData, B256};
use alloy::rpc::types::{Filter, Log};
use anyhow::{bail, Result};
use async_trait::async_trait;
use indexflow_indexer::listener::{BlockProcessor, ChainSource, TargetKind, TopicTarget};
use indexflow_indexer::retry::RetryPolicy;
use indexflow_indexer::storage::Storage;
use tempfile::NamedTempFile;

pub const GENESIS_TIMESTAMP: u64 = 1_700_006_400;
pub const BLOCK_TIME: u64 = 12;

pub fn token() -> Address {
    Address::repeat_byte(0x70)
}

pub fn staking() -> Address {
    Address::repeat_byte(0x71)
}

pub fn block_timestamp(block: u64) -> u64 {
    GENESIS_TIMESTAMP + block * BLOCK_TIME
}

/// A chain whose head, logs and failures are set by the test.
pub struct MockChain {
    name: String,
    head: AtomicU64,
    logs: Mutex<Vec<Log>>,
    failing_block: Mutex<Option<u64>>,
    pub log_calls: AtomicUsize,
    pub timestamp_calls: AtomicUsize,
}

impl MockChain {
    pub fn new(name: &str, head: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            head: AtomicU64::new(head),
            logs: Mutex::new(Vec::new()),
            failing_block: Mutex::new(None),
            log_calls: AtomicUsize::new(0),
            timestamp_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Fail every request touching `block`.
    pub fn fail_at(&self, block: Option<u64>) {
        *self.failing_block.lock().unwrap() = block;
    }

    /// Add a log emitted by `address` at `block`.
    pub fn push(&self, address: Address, block: u64, tx: u8, log_index: u64, data: LogData) {
        self.push_log(Log {
            inner: alloy::primitives::Log { address, data },
            block_number: Some(block),
            transaction_hash: Some(B256::repeat_byte(tx)),
            transaction_index: Some(0),
            log_index: Some(log_index),
            ..Default::default()
        });
    }

    pub fn push_log(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    fn check(&self, from: u64, to: u64) -> Result<()> {
        if let Some(block) = *self.failing_block.lock().unwrap() {
            if block >= from && block <= to {
                bail!("connection reset at block {}", block);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSource for MockChain {
    fn chain(&self) -> &str {
        &self.name
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        let from = filter.get_from_block().unwrap_or(0);
        let to = filter.get_to_block().unwrap_or(u64::MAX);
        self.check(from, to)?;

        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap_or_default();
                let topics = log.inner.data.topics();
                block >= from
                    && block <= to
                    && filter.address.matches(&log.inner.address)
                    && filter
                        .topics
                        .iter()
                        .enumerate()
                        .all(|(i, topic)| topic.is_empty() || topics.get(i).is_some_and(|t| topic.matches(t)))
            })
            .cloned()
            .collect())
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64> {
        self.timestamp_calls.fetch_add(1, Ordering::SeqCst);
        self.check(block, block)?;
        if block > self.head.load(Ordering::SeqCst) {
            bail!("Block {} not found", block);
        }
        Ok(block_timestamp(block))
    }
}

pub async fn storage() -> (Storage, NamedTempFile) {
    let temp_db = NamedTempFile::new().unwrap();
    let storage = Storage::new_with_path(temp_db.path()).await.unwrap();
    storage.run_migrations().await.unwrap();
    (storage, temp_db)
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 2,
        base_delay: Duration::from_millis(1),
        backoff_factor: 1,
        timeout: None,
    }
}

/// Token from block 0 and a staking pool deployed at `staking_deploy`.
pub fn targets(staking_deploy: u64) -> Vec<TopicTarget> {
    vec![
        TopicTarget::new(TargetKind::Token, token(), 0),
        TopicTarget::new(TargetKind::Staking, staking(), staking_deploy),
    ]
}

pub fn processor(chain: &Arc<MockChain>, storage: &Storage, staking_deploy: u64) -> BlockProcessor {
    BlockProcessor::new(
        chain.clone(),
        storage.clone(),
        targets(staking_deploy),
        fast_retry(),
    )
}
