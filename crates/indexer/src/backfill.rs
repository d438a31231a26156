//! Historical backfill over a bounded block range.

use anyhow::{Context, Result};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SyncConfig;
use crate::listener::{BatchStats, BlockProcessor};

/// Upper bound of a backfill range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTarget {
    /// Chain head, resolved once at startup.
    #[default]
    Latest,
    /// Explicit block number.
    Number(u64),
}

impl FromStr for BlockTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        s.parse::<u64>()
            .map(Self::Number)
            .with_context(|| format!("Invalid block '{}': expected a number or 'latest'", s))
    }
}

impl fmt::Display for BlockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Resolved inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillRange {
    /// First block.
    pub from: u64,
    /// Last block.
    pub to: u64,
    /// Head observed while resolving `latest`.
    pub head: Option<u64>,
}

impl BackfillRange {
    /// True when there is nothing to walk.
    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }
}

/// Summary of a finished backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Chain key.
    pub chain: String,
    /// First block of the range.
    pub from: u64,
    /// Last block of the range.
    pub to: u64,
    /// Blocks walked.
    pub blocks: u64,
    /// Batches committed.
    pub batches: u64,
    /// Last committed block, if any batch ran.
    pub cursor: Option<u64>,
    /// True if shutdown stopped the run before `to`.
    pub interrupted: bool,
    /// Aggregated event counts.
    pub stats: BatchStats,
}

/// Walks a historical range in fixed-size batches.
#[derive(Debug)]
pub struct Backfill {
    processor: BlockProcessor,
    start_block: u64,
    batch_size: u64,
    reorg_depth: u64,
}

impl Backfill {
    /// Create a backfill. `start_block` is the lowest block it will walk.
    pub fn new(processor: BlockProcessor, sync: &SyncConfig, start_block: u64) -> Self {
        Self {
            processor,
            start_block,
            batch_size: sync.batch_size.max(1),
            reorg_depth: sync.reorg_depth,
        }
    }

    /// Resolve the range to walk.
    ///
    /// An explicit `from` wins. Otherwise a persisted cursor is rewound by
    /// `reorg_depth` so recent blocks are re-absorbed. Neither goes below
    /// the start block.
    pub async fn resolve_range(&self, from: Option<u64>, to: BlockTarget) -> Result<BackfillRange> {
        let chain = self.processor.chain();

        let from = match from {
            Some(from) => from.max(self.start_block),
            None => match self.processor.storage().get_cursor(chain).await? {
                Some(cursor) => cursor
                    .last_processed_block
                    .saturating_sub(self.reorg_depth)
                    .max(self.start_block),
                None => self.start_block,
            },
        };

        let (to, head) = match to {
            BlockTarget::Number(n) => (n, None),
            BlockTarget::Latest => {
                let head = self
                    .processor
                    .source()
                    .block_number()
                    .await
                    .with_context(|| format!("Failed to resolve latest block for {}", chain))?;
                (head, Some(head))
            }
        };

        Ok(BackfillRange { from, to, head })
    }

    /// Resolve the range and walk it. The cursor is committed after every
    /// batch; cancellation is honoured between batches.
    pub async fn run(
        &self,
        from: Option<u64>,
        to: BlockTarget,
        token: &CancellationToken,
    ) -> Result<BackfillReport> {
        let range = self.resolve_range(from, to).await?;
        self.walk(range, token).await
    }

    /// Walk an already resolved range.
    pub async fn walk(&self, range: BackfillRange, token: &CancellationToken) -> Result<BackfillReport> {
        let chain = self.processor.chain();
        let mut report = BackfillReport {
            chain: chain.to_string(),
            from: range.from,
            to: range.to,
            ..Default::default()
        };

        if range.is_empty() {
            info!(
                chain = %chain,
                from = range.from,
                to = range.to,
                "Nothing to backfill"
            );
            return Ok(report);
        }

        info!(
            chain = %chain,
            from = range.from,
            to = range.to,
            batch_size = self.batch_size,
            targets = self.processor.targets().len(),
            "Starting backfill"
        );

        let mut batch_start = range.from;
        while batch_start <= range.to {
            if token.is_cancelled() {
                info!(chain = %chain, cursor = ?report.cursor, "Backfill interrupted");
                report.interrupted = true;
                break;
            }

            let batch_end = batch_start
                .saturating_add(self.batch_size - 1)
                .min(range.to);

            let stats = self
                .processor
                .process_range(batch_start, batch_end)
                .await
                .with_context(|| {
                    format!(
                        "Backfill failed for {} blocks {}..={}",
                        chain, batch_start, batch_end
                    )
                })?;
            self.processor.commit_cursor(batch_end, range.head).await?;

            report.blocks += batch_end - batch_start + 1;
            report.batches += 1;
            report.cursor = Some(batch_end);
            report.stats.merge(&stats);

            info!(
                chain = %chain,
                from = batch_start,
                to = batch_end,
                logs = stats.logs,
                transfers = stats.transfers,
                staking = stats.staking,
                poi = stats.poi,
                contributions = stats.contributions,
                "Batch committed"
            );

            if batch_end == u64::MAX {
                break;
            }
            batch_start = batch_end + 1;
        }

        info!(
            chain = %chain,
            blocks = report.blocks,
            batches = report.batches,
            events = report.stats.events(),
            "Backfill finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_target_parse() {
        assert_eq!("latest".parse::<BlockTarget>().unwrap(), BlockTarget::Latest);
        assert_eq!("LATEST".parse::<BlockTarget>().unwrap(), BlockTarget::Latest);
        assert_eq!(
            " 1200 ".parse::<BlockTarget>().unwrap(),
            BlockTarget::Number(1200)
        );
        assert!("soon".parse::<BlockTarget>().is_err());
        assert!("-5".parse::<BlockTarget>().is_err());
    }

    #[test]
    fn test_empty_range() {
        let range = BackfillRange {
            from: 10,
            to: 9,
            head: None,
        };
        assert!(range.is_empty());
    }
}
