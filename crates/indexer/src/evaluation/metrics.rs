//! Wallet metrics providers.
//!
//! The indexed SQLite store is the primary source. When it has not indexed a
//! campaign's scope, an on-demand RPC scan over `Transfer` logs can stand in.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use indexflow_core::{UsageSummary, DAY_SECONDS};
use thiserror::Error;
use tracing::{debug, warn};

use super::cache::TtlCache;
use super::campaigns::{CampaignRegistry, ERC20_TAG};
use crate::listener::events::Transfer;
use crate::listener::ChainSource;
use crate::storage::Storage;

/// Most targets the RPC scan accepts.
pub const RPC_MAX_TARGETS: usize = 20;
/// Deepest history the RPC scan reaches behind `as_of_block`.
pub const RPC_MAX_BLOCK_RANGE: u64 = 200_000;
/// Blocks per `getLogs` call in the RPC scan.
pub const RPC_LOG_CHUNK: u64 = 5_000;

/// Metrics provider failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    /// The provider cannot answer this query; another provider may.
    #[error("metrics not available: {0}")]
    Unavailable(String),

    /// The query itself is malformed.
    #[error("invalid metrics query: {0}")]
    InvalidQuery(String),
}

impl MetricsError {
    fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// True for [`MetricsError::Unavailable`].
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// One wallet over one campaign window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsQuery {
    /// Chain key.
    pub chain: String,
    /// Campaign id.
    pub campaign_id: String,
    /// Wallet.
    pub wallet: Address,
    /// Window start, Unix seconds.
    pub start: i64,
    /// Window end, Unix seconds.
    pub end: i64,
    /// Upper bound for on-chain lookups.
    pub as_of_block: Option<u64>,
    /// Contracts counted.
    pub targets: Vec<Address>,
}

impl MetricsQuery {
    /// Window bounds in milliseconds.
    pub fn window_ms(&self) -> (i64, i64) {
        (
            self.start.saturating_mul(1000),
            self.end.saturating_mul(1000),
        )
    }
}

/// Source of wallet usage summaries.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Aggregate a wallet's activity for `query`.
    async fn wallet_metrics(&self, query: &MetricsQuery) -> Result<UsageSummary, MetricsError>;
}

fn lower_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Reads aggregated activity from the indexed `transfers` table.
#[derive(Debug, Clone)]
pub struct IndexerDbMetricsProvider {
    storage: Storage,
}

impl IndexerDbMetricsProvider {
    /// Create a provider over `storage`.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    async fn query(&self, query: &MetricsQuery) -> anyhow::Result<Result<UsageSummary, MetricsError>> {
        let (start_ms, end_ms) = query.window_ms();

        if !self.storage.has_transfers(&query.chain).await? {
            return Ok(Err(MetricsError::unavailable("db_not_indexed")));
        }

        if !self
            .storage
            .has_transfers_in_scope(&query.chain, &query.targets, start_ms, end_ms)
            .await?
        {
            return Ok(Err(MetricsError::unavailable("db_not_indexed_for_targets")));
        }

        let activity = self
            .storage
            .wallet_activity(&query.chain, &query.targets, query.wallet, start_ms, end_ms)
            .await?;

        Ok(Ok(UsageSummary {
            days_active: activity.days_active,
            tx_count: activity.tx_count,
            unique_contracts: activity.unique_contracts,
        }))
    }
}

#[async_trait]
impl MetricsProvider for IndexerDbMetricsProvider {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn wallet_metrics(&self, query: &MetricsQuery) -> Result<UsageSummary, MetricsError> {
        if query.targets.is_empty() {
            return Err(MetricsError::unavailable("no_targets"));
        }

        let summary = self.query(query).await.map_err(|e| {
            warn!(
                chain = %query.chain,
                wallet = %query.wallet,
                error = ?e,
                "Indexed metrics query failed"
            );
            MetricsError::unavailable("db_metrics_query_failed")
        })??;

        debug!(
            source = "db",
            chain = %query.chain,
            wallet = %query.wallet,
            targets = query.targets.len(),
            start = query.start,
            end = query.end,
            "Resolved wallet metrics"
        );

        Ok(summary)
    }
}

/// Scans `Transfer` logs on demand when the store cannot answer.
///
/// Only usable for campaigns whose targets are all tagged `erc20`.
pub struct RpcScanMetricsProvider {
    sources: HashMap<String, Arc<dyn ChainSource>>,
    registry: Arc<CampaignRegistry>,
}

impl RpcScanMetricsProvider {
    /// Create a provider over per-chain sources keyed by chain key.
    pub fn new(sources: HashMap<String, Arc<dyn ChainSource>>, registry: Arc<CampaignRegistry>) -> Self {
        Self { sources, registry }
    }

    async fn scan(
        &self,
        source: &dyn ChainSource,
        query: &MetricsQuery,
    ) -> anyhow::Result<Result<UsageSummary, MetricsError>> {
        let mut timestamps = BlockTimestamps::new(source);

        let latest = source.block_number().await?;
        let as_of = query.as_of_block.unwrap_or(latest).min(latest);
        let min_block = as_of.saturating_sub(RPC_MAX_BLOCK_RANGE);

        let start = query.start.max(0) as u64;
        let end = query.end.max(0) as u64;

        if start < timestamps.get(min_block).await? {
            return Ok(Err(MetricsError::unavailable("rpc_range_too_large")));
        }

        let bounded_end = end.min(timestamps.get(as_of).await?);
        let from = timestamps.first_at_or_after(min_block, as_of, start).await?;
        let to = timestamps.last_at_or_before(min_block, as_of, bounded_end).await?;

        let (from, to) = match (from, to) {
            (Some(from), Some(to)) if from <= to => (from, to),
            _ => return Ok(Ok(UsageSummary::default())),
        };

        let wallet_topic = query.wallet.into_word();
        let mut matched: HashMap<(Address, B256, u64), u64> = HashMap::new();

        for target in &query.targets {
            let mut chunk_start = from;
            while chunk_start <= to {
                let chunk_end = chunk_start.saturating_add(RPC_LOG_CHUNK - 1).min(to);
                let base = Filter::new()
                    .address(*target)
                    .event_signature(Transfer::SIGNATURE_HASH)
                    .from_block(chunk_start)
                    .to_block(chunk_end);

                let sent = source.logs(&base.clone().topic1(wallet_topic)).await?;
                let received = source.logs(&base.topic2(wallet_topic)).await?;

                for log in sent.iter().chain(received.iter()) {
                    let key = (
                        *target,
                        log.transaction_hash.unwrap_or_default(),
                        log.log_index.unwrap_or_default(),
                    );
                    matched.insert(key, log.block_number.unwrap_or(chunk_start));
                }

                chunk_start = chunk_end + 1;
            }
        }

        let mut days = HashSet::new();
        let mut contracts = HashSet::new();
        for ((target, _, _), block) in &matched {
            let timestamp = timestamps.get(*block).await?;
            days.insert(timestamp / DAY_SECONDS as u64);
            contracts.insert(*target);
        }

        Ok(Ok(UsageSummary {
            days_active: days.len() as u64,
            tx_count: matched.len() as u64,
            unique_contracts: contracts.len() as u64,
        }))
    }
}

#[async_trait]
impl MetricsProvider for RpcScanMetricsProvider {
    fn name(&self) -> &'static str {
        "rpc"
    }

    async fn wallet_metrics(&self, query: &MetricsQuery) -> Result<UsageSummary, MetricsError> {
        let Some(source) = self.sources.get(&query.chain) else {
            return Err(MetricsError::unavailable(format!("rpc_missing:{}", query.chain)));
        };

        if query.targets.is_empty() {
            return Err(MetricsError::unavailable("no_targets"));
        }
        if query.targets.len() > RPC_MAX_TARGETS {
            return Err(MetricsError::unavailable("rpc_range_too_large"));
        }

        let ready = self
            .registry
            .get(&query.campaign_id)
            .is_some_and(|campaign| campaign.all_tagged(&query.targets, ERC20_TAG));
        if !ready {
            return Err(MetricsError::unavailable("rpc_fallback_not_ready"));
        }

        if query.end < query.start {
            return Err(MetricsError::unavailable("invalid_window"));
        }

        let summary = self.scan(source.as_ref(), query).await.map_err(|e| {
            warn!(
                chain = %query.chain,
                wallet = %query.wallet,
                error = ?e,
                "RPC metrics scan failed"
            );
            MetricsError::unavailable("rpc_query_failed")
        })??;

        debug!(
            source = "rpc",
            chain = %query.chain,
            wallet = %query.wallet,
            tx_count = summary.tx_count,
            "Resolved wallet metrics"
        );

        Ok(summary)
    }
}

impl fmt::Debug for RpcScanMetricsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chains: Vec<&String> = self.sources.keys().collect();
        chains.sort();
        f.debug_struct("RpcScanMetricsProvider")
            .field("chains", &chains)
            .finish()
    }
}

/// Memoized block timestamps for one scan.
struct BlockTimestamps<'a> {
    source: &'a dyn ChainSource,
    cache: HashMap<u64, u64>,
}

impl<'a> BlockTimestamps<'a> {
    fn new(source: &'a dyn ChainSource) -> Self {
        Self {
            source,
            cache: HashMap::new(),
        }
    }

    async fn get(&mut self, block: u64) -> anyhow::Result<u64> {
        if let Some(ts) = self.cache.get(&block) {
            return Ok(*ts);
        }
        let ts = self.source.block_timestamp(block).await?;
        self.cache.insert(block, ts);
        Ok(ts)
    }

    /// Lowest block in `[low, high]` with timestamp >= `target`.
    async fn first_at_or_after(&mut self, low: u64, high: u64, target: u64) -> anyhow::Result<Option<u64>> {
        let (mut left, mut right) = (low, high);
        let mut found = None;
        while left <= right {
            let mid = left + (right - left) / 2;
            if self.get(mid).await? >= target {
                found = Some(mid);
                if mid == 0 {
                    break;
                }
                right = mid - 1;
            } else {
                left = mid + 1;
            }
        }
        Ok(found)
    }

    /// Highest block in `[low, high]` with timestamp <= `target`.
    async fn last_at_or_before(&mut self, low: u64, high: u64, target: u64) -> anyhow::Result<Option<u64>> {
        let (mut left, mut right) = (low, high);
        let mut found = None;
        while left <= right {
            let mid = left + (right - left) / 2;
            if self.get(mid).await? <= target {
                found = Some(mid);
                left = mid + 1;
            } else {
                if mid == 0 {
                    break;
                }
                right = mid - 1;
            }
        }
        Ok(found)
    }
}

/// Tries providers in order, moving on only when one is unavailable.
pub struct FallbackMetricsProvider {
    providers: Vec<Arc<dyn MetricsProvider>>,
}

impl FallbackMetricsProvider {
    /// Create a chain of providers, highest priority first.
    pub fn new(providers: Vec<Arc<dyn MetricsProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl MetricsProvider for FallbackMetricsProvider {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn wallet_metrics(&self, query: &MetricsQuery) -> Result<UsageSummary, MetricsError> {
        let mut last = None;

        for provider in &self.providers {
            match provider.wallet_metrics(query).await {
                Ok(summary) => return Ok(summary),
                Err(MetricsError::Unavailable(reason)) => {
                    debug!(
                        provider = provider.name(),
                        reason = %reason,
                        "Metrics provider unavailable, trying next"
                    );
                    last = Some(MetricsError::Unavailable(reason));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last.unwrap_or_else(|| MetricsError::unavailable("metrics_not_available")))
    }
}

impl fmt::Debug for FallbackMetricsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("FallbackMetricsProvider")
            .field("providers", &names)
            .finish()
    }
}

/// Memoizes another provider's successful answers.
pub struct CachedMetricsProvider {
    cache: Arc<TtlCache<UsageSummary>>,
    inner: Arc<dyn MetricsProvider>,
}

impl CachedMetricsProvider {
    /// Wrap `inner` with `cache`.
    pub fn new(cache: Arc<TtlCache<UsageSummary>>, inner: Arc<dyn MetricsProvider>) -> Self {
        Self { cache, inner }
    }

    /// Cache key for a query. Targets are sorted so their order is irrelevant.
    pub fn cache_key(query: &MetricsQuery) -> String {
        let mut targets: Vec<String> = query.targets.iter().map(lower_hex).collect();
        targets.sort();
        targets.dedup();
        let targets = if targets.is_empty() {
            "none".to_string()
        } else {
            targets.join(",")
        };

        format!(
            "metrics:v1:{}:{}:{}:{}:{}:{}",
            query.campaign_id,
            query.chain,
            query.start,
            query.end,
            lower_hex(&query.wallet),
            targets
        )
    }
}

#[async_trait]
impl MetricsProvider for CachedMetricsProvider {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn wallet_metrics(&self, query: &MetricsQuery) -> Result<UsageSummary, MetricsError> {
        let key = Self::cache_key(query);
        if let Some(summary) = self.cache.get(&key) {
            debug!(source = "cache", key = %key, "Resolved wallet metrics");
            return Ok(summary);
        }

        let summary = self.inner.wallet_metrics(query).await?;
        self.cache.insert(key, summary);
        Ok(summary)
    }
}

impl fmt::Debug for CachedMetricsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedMetricsProvider")
            .field("cache", &self.cache)
            .field("inner", &self.inner.name())
            .finish()
    }
}
