//! Backfill and listener scenarios against an in-memory chain.

mod common;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolEvent;
use common::*;
use indexflow_indexer::backfill::{Backfill, BlockTarget};
use indexflow_indexer::config::SyncConfig;
use indexflow_indexer::listener::events::{Staked, Transfer};
use indexflow_indexer::listener::Listener;
use indexflow_indexer::storage::EventKind;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

fn transfer(value: u64) -> alloy::primitives::LogData {
    Transfer {
        from: Address::repeat_byte(0x01),
        to: Address::repeat_byte(0x02),
        value: U256::from(value),
    }
    .encode_log_data()
}

fn staked(amount: u64) -> alloy::primitives::LogData {
    Staked {
        user: Address::repeat_byte(0x03),
        amount: U256::from(amount),
    }
    .encode_log_data()
}

fn sync_config(batch_size: u64) -> SyncConfig {
    SyncConfig {
        batch_size,
        ..Default::default()
    }
}

fn seeded_chain() -> std::sync::Arc<MockChain> {
    let chain = MockChain::new("sepolia", 400);
    chain.push(token(), 10, 0x10, 0, transfer(1));
    chain.push(token(), 11, 0x11, 3, transfer(2));
    chain.push(token(), 250, 0x12, 0, transfer(3));
    chain.push(staking(), 120, 0x13, 1, staked(9));
    chain.push(staking(), 300, 0x14, 1, staked(5));
    chain
}

#[tokio::test]
async fn backfill_rerun_is_idempotent() {
    let (storage, _db) = storage().await;
    let chain = seeded_chain();
    let token_ = CancellationToken::new();

    let backfill = Backfill::new(processor(&chain, &storage, 200), &sync_config(100), 0);
    let first = backfill
        .run(None, BlockTarget::Number(400), &token_)
        .await
        .unwrap();

    assert_eq!(first.from, 0);
    assert_eq!(first.to, 400);
    assert_eq!(first.blocks, 401);
    assert_eq!(first.batches, 5);
    assert_eq!(first.stats.transfers, 3);
    // The staking log at 120 predates the pool's deploy block.
    assert_eq!(first.stats.staking, 1);

    let second = backfill
        .run(Some(0), BlockTarget::Number(400), &token_)
        .await
        .unwrap();
    assert_eq!(second.stats.transfers, 3);

    assert_eq!(storage.count_events(EventKind::Transfer).await.unwrap(), 3);
    assert_eq!(storage.count_events(EventKind::Staking).await.unwrap(), 1);

    let cursor = storage.get_cursor("sepolia").await.unwrap().unwrap();
    assert_eq!(cursor.last_processed_block, 400);
}

#[tokio::test]
async fn backfill_resumes_behind_cursor_by_reorg_depth() {
    let (storage, _db) = storage().await;
    let chain = seeded_chain();
    storage.persist_cursor("sepolia", 300, None).await.unwrap();

    let backfill = Backfill::new(processor(&chain, &storage, 0), &sync_config(200), 5);
    let range = backfill
        .resolve_range(None, BlockTarget::Latest)
        .await
        .unwrap();

    assert_eq!(range.from, 294);
    assert_eq!(range.to, 400);
    assert_eq!(range.head, Some(400));

    let explicit = backfill
        .resolve_range(Some(2), BlockTarget::Number(50))
        .await
        .unwrap();
    assert_eq!(explicit.from, 5);
    assert_eq!(explicit.to, 50);
    assert_eq!(explicit.head, None);
}

#[tokio::test]
async fn backfill_empty_range_is_noop() {
    let (storage, _db) = storage().await;
    let chain = seeded_chain();

    let backfill = Backfill::new(processor(&chain, &storage, 0), &sync_config(200), 0);
    let report = backfill
        .run(Some(50), BlockTarget::Number(10), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.blocks, 0);
    assert_eq!(report.cursor, None);
    assert_eq!(chain.log_calls.load(Ordering::SeqCst), 0);
    assert!(storage.get_cursor("sepolia").await.unwrap().is_none());
}

#[tokio::test]
async fn backfill_failure_keeps_last_committed_batch() {
    let (storage, _db) = storage().await;
    let chain = seeded_chain();
    chain.fail_at(Some(250));

    let backfill = Backfill::new(processor(&chain, &storage, 0), &sync_config(100), 0);
    let result = backfill
        .run(None, BlockTarget::Number(400), &CancellationToken::new())
        .await;

    assert!(result.is_err());
    let cursor = storage.get_cursor("sepolia").await.unwrap().unwrap();
    assert_eq!(cursor.last_processed_block, 199);
}

#[tokio::test]
async fn backfill_stops_between_batches_on_cancel() {
    let (storage, _db) = storage().await;
    let chain = seeded_chain();
    let token_ = CancellationToken::new();
    token_.cancel();

    let backfill = Backfill::new(processor(&chain, &storage, 0), &sync_config(100), 0);
    let report = backfill
        .run(None, BlockTarget::Number(400), &token_)
        .await
        .unwrap();

    assert!(report.interrupted);
    assert_eq!(report.batches, 0);
}

#[tokio::test]
async fn listener_resumes_after_persisted_block() {
    let (storage, _db) = storage().await;
    let chain = MockChain::new("sepolia", 10);
    chain.push(token(), 7, 0x20, 0, transfer(1));
    chain.fail_at(Some(7));

    let listener = Listener::new(processor(&chain, &storage, 0), sync_config(200));
    storage.persist_cursor("sepolia", 5, None).await.unwrap();

    let mut cursor = listener.resolve_start_cursor().await.unwrap();
    assert_eq!(cursor, 5);

    // Block 6 commits, block 7 fails.
    let token_ = CancellationToken::new();
    assert!(listener.poll_once(&mut cursor, &token_).await.is_err());
    assert_eq!(cursor, 6);
    assert_eq!(
        storage
            .get_cursor("sepolia")
            .await
            .unwrap()
            .unwrap()
            .last_processed_block,
        6
    );

    // A fresh listener picks up at 7, not 6.
    chain.fail_at(None);
    let restarted = Listener::new(processor(&chain, &storage, 0), sync_config(200));
    let mut cursor = restarted.resolve_start_cursor().await.unwrap();
    assert_eq!(cursor, 6);

    let outcome = restarted.poll_once(&mut cursor, &token_).await.unwrap();
    assert_eq!(outcome.processed, 4);
    assert_eq!(outcome.stats.transfers, 1);
    assert!(outcome.caught_up);
    assert_eq!(cursor, 10);

    let persisted = storage.get_cursor("sepolia").await.unwrap().unwrap();
    assert_eq!(persisted.last_processed_block, 10);
    assert_eq!(persisted.current_chain_head, Some(10));
    assert_eq!(storage.count_events(EventKind::Transfer).await.unwrap(), 1);
}

#[tokio::test]
async fn listener_processes_one_block_at_a_time() {
    let (storage, _db) = storage().await;
    let chain = MockChain::new("sepolia", 20);
    let listener = Listener::new(processor(&chain, &storage, 0), sync_config(3));

    let mut cursor = 10;
    let outcome = listener
        .poll_once(&mut cursor, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.processed, 3);
    assert!(!outcome.caught_up);
    assert_eq!(cursor, 13);
    // One timestamp and one getLogs per target for each block.
    assert_eq!(chain.timestamp_calls.load(Ordering::SeqCst), 3);
    assert_eq!(chain.log_calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn listener_waits_for_confirmations() {
    let (storage, _db) = storage().await;
    let chain = MockChain::new("sepolia", 10);
    let config = SyncConfig {
        confirmations: 2,
        ..Default::default()
    };
    let listener = Listener::new(processor(&chain, &storage, 0), config);

    let mut cursor = 5;
    let outcome = listener
        .poll_once(&mut cursor, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(cursor, 8);
    assert!(outcome.caught_up);

    let idle = listener
        .poll_once(&mut cursor, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(idle.processed, 0);
    assert!(idle.caught_up);
}

#[tokio::test]
async fn listener_start_cursor_without_persisted_state() {
    let (storage, _db) = storage().await;
    let chain = MockChain::new("sepolia", 500);

    let from_head = Listener::new(processor(&chain, &storage, 0), SyncConfig::default());
    assert_eq!(from_head.resolve_start_cursor().await.unwrap(), 499);

    let configured = Listener::new(
        processor(&chain, &storage, 0),
        SyncConfig {
            start_block: Some(100),
            ..Default::default()
        },
    );
    assert_eq!(configured.resolve_start_cursor().await.unwrap(), 99);
}

#[tokio::test]
async fn listener_honours_cancellation_at_block_boundary() {
    let (storage, _db) = storage().await;
    let chain = MockChain::new("sepolia", 20);
    let listener = Listener::new(processor(&chain, &storage, 0), SyncConfig::default());

    let token_ = CancellationToken::new();
    token_.cancel();

    let mut cursor = 10;
    let outcome = listener.poll_once(&mut cursor, &token_).await.unwrap();
    assert_eq!(outcome.processed, 0);
    assert_eq!(cursor, 10);

    // run() returns promptly once cancelled.
    listener.run(token_).await.unwrap();
}

#[tokio::test]
async fn removed_logs_are_skipped() {
    let (storage, _db) = storage().await;
    let chain = MockChain::new("sepolia", 5);
    chain.push(token(), 3, 0x30, 0, transfer(1));
    chain.push_log(alloy::rpc::types::Log {
        inner: alloy::primitives::Log {
            address: token(),
            data: transfer(2),
        },
        block_number: Some(3),
        transaction_hash: Some(alloy::primitives::B256::repeat_byte(0x31)),
        log_index: Some(1),
        removed: true,
        ..Default::default()
    });

    let processor = processor(&chain, &storage, 0);
    let stats = processor.process_block(3).await.unwrap();

    assert_eq!(stats.logs, 2);
    assert_eq!(stats.transfers, 1);
    assert_eq!(storage.count_events(EventKind::Transfer).await.unwrap(), 1);
}

#[tokio::test]
async fn range_reuses_block_timestamps() {
    let (storage, _db) = storage().await;
    let chain = MockChain::new("sepolia", 50);
    chain.push(token(), 20, 0x40, 0, transfer(1));
    chain.push(token(), 20, 0x40, 1, transfer(2));
    chain.push(token(), 21, 0x41, 0, transfer(3));

    let processor = processor(&chain, &storage, 0);
    let stats = processor.process_range(0, 50).await.unwrap();

    assert_eq!(stats.transfers, 3);
    assert_eq!(chain.timestamp_calls.load(Ordering::SeqCst), 2);

    let activity = storage
        .wallet_activity(
            "sepolia",
            &[token()],
            Address::repeat_byte(0x01),
            (block_timestamp(20) * 1000) as i64,
            (block_timestamp(21) * 1000) as i64,
        )
        .await
        .unwrap();
    assert_eq!(activity.tx_count, 3);
    assert_eq!(activity.days_active, 1);
}
