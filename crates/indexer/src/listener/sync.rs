//! Live tailing of a chain, one block at a time.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::processor::{BatchStats, BlockProcessor};
use crate::config::SyncConfig;

/// Result of one listener iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Chain head observed at the start of the iteration.
    pub head: u64,
    /// Blocks processed and committed.
    pub processed: u64,
    /// True when the cursor reached the safe head.
    pub caught_up: bool,
    /// Events written during the iteration.
    pub stats: BatchStats,
}

/// Polls a chain for new blocks and advances its cursor.
///
/// Each block is processed and its cursor persisted before the next one is
/// touched, so a crash loses at most the block in flight.
#[derive(Debug)]
pub struct Listener {
    processor: BlockProcessor,
    config: SyncConfig,
}

impl Listener {
    /// Create a listener. `config.start_block` seeds a fresh cursor.
    pub fn new(processor: BlockProcessor, config: SyncConfig) -> Self {
        Self { processor, config }
    }

    /// Chain key.
    pub fn chain(&self) -> &str {
        self.processor.chain()
    }

    /// Resolve the block the listener resumes after.
    ///
    /// Persisted cursor, else configured start block minus one, else head
    /// minus one.
    pub async fn resolve_start_cursor(&self) -> Result<u64> {
        let chain = self.processor.chain();

        if let Some(cursor) = self.processor.storage().get_cursor(chain).await? {
            info!(
                chain = %chain,
                cursor = cursor.last_processed_block,
                "Resuming from persisted cursor"
            );
            return Ok(cursor.last_processed_block);
        }

        if let Some(start) = self.config.start_block {
            info!(chain = %chain, start_block = start, "No cursor found, starting at configured block");
            return Ok(start.saturating_sub(1));
        }

        let head = self
            .processor
            .source()
            .block_number()
            .await
            .with_context(|| format!("Failed to read head for {}", chain))?;
        info!(chain = %chain, head, "No cursor found, starting at chain head");
        Ok(head.saturating_sub(1))
    }

    /// Run one iteration: process up to `batch_size` blocks after `cursor`.
    ///
    /// `cursor` is advanced only after a block's cursor write succeeds. On
    /// error it still holds the last committed block.
    pub async fn poll_once(
        &self,
        cursor: &mut u64,
        token: &CancellationToken,
    ) -> Result<PollOutcome> {
        let chain = self.processor.chain();
        let head = self.processor.source().block_number().await?;
        let safe_head = head.saturating_sub(self.config.confirmations);

        let mut outcome = PollOutcome {
            head,
            ..Default::default()
        };

        if *cursor >= safe_head {
            debug!(chain = %chain, cursor = *cursor, head, "Caught up");
            outcome.caught_up = true;
            return Ok(outcome);
        }

        let end = safe_head.min(cursor.saturating_add(self.config.batch_size));
        info!(
            chain = %chain,
            from = *cursor + 1,
            to = end,
            head,
            "Processing new blocks"
        );

        for block in (*cursor + 1)..=end {
            if token.is_cancelled() {
                info!(chain = %chain, cursor = *cursor, "Shutdown requested, stopping at block boundary");
                break;
            }

            let stats = self
                .processor
                .process_block(block)
                .await
                .with_context(|| format!("Failed to process block {} on {}", block, chain))?;
            self.processor.commit_cursor(block, Some(head)).await?;
            *cursor = block;

            if stats.events() > 0 {
                info!(
                    chain = %chain,
                    block,
                    logs = stats.logs,
                    events = stats.events(),
                    "Block ingested"
                );
            }

            outcome.processed += 1;
            outcome.stats.merge(&stats);
        }

        outcome.caught_up = *cursor >= safe_head;
        Ok(outcome)
    }

    /// Poll until `token` is cancelled. Iteration errors are logged and the
    /// next poll resumes from the last committed block.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        let chain = self.processor.chain().to_string();
        let poll_interval = self.config.poll_interval();

        let mut cursor = loop {
            match self.resolve_start_cursor().await {
                Ok(cursor) => break cursor,
                Err(e) => {
                    error!(chain = %chain, error = %e, "Failed to resolve start cursor");
                    if !sleep_or_cancel(poll_interval, &token).await {
                        return Ok(());
                    }
                }
            }
        };

        info!(chain = %chain, cursor, "Listener started");

        loop {
            let delay = match self.poll_once(&mut cursor, &token).await {
                Ok(outcome) if outcome.caught_up => poll_interval,
                Ok(_) => Duration::ZERO,
                Err(e) => {
                    error!(
                        chain = %chain,
                        cursor,
                        error = ?e,
                        "Listener iteration failed"
                    );
                    poll_interval
                }
            };

            if !sleep_or_cancel(delay, &token).await {
                break;
            }
        }

        info!(chain = %chain, cursor, "Listener stopped");
        Ok(())
    }
}

/// Sleep for `delay`. Returns false if `token` fired first.
async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> bool {
    if token.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = token.cancelled() => false,
    }
}
