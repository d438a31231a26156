//! Chain access for the ingestion pipeline.

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::U64;
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::http::{Client, Http};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{ChainConfig, RpcConfig};
use crate::retry::RetryPolicy;
use crate::rpc::{mask_url, Endpoint, EndpointPool, RateLimiter};

/// HTTP provider type used for every endpoint.
pub type HttpProvider = RootProvider<Http<Client>>;

/// Read access to one chain.
///
/// Implemented by [`ChainClient`] over an endpoint pool. Tests use
/// in-memory chains.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Chain key.
    fn chain(&self) -> &str;

    /// Current head.
    async fn block_number(&self) -> Result<u64>;

    /// Logs matching a filter.
    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>>;

    /// Block timestamp in Unix seconds.
    async fn block_timestamp(&self, block: u64) -> Result<u64>;
}

#[derive(Debug, Deserialize)]
struct BlockTimestamp {
    timestamp: U64,
}

/// Rate-limited, failover-aware RPC client for one chain.
#[derive(Debug)]
pub struct ChainClient {
    pool: EndpointPool<HttpProvider>,
}

impl ChainClient {
    /// Build a client over `urls`, in priority order.
    pub fn new(
        chain: &str,
        urls: &[String],
        limiter: RateLimiter,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let endpoints = urls
            .iter()
            .map(|url| {
                let parsed = url
                    .parse()
                    .with_context(|| format!("Invalid RPC URL for {}: {}", chain, mask_url(url)))?;
                Ok(Endpoint::new(url.clone(), ProviderBuilder::new().on_http(parsed)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            pool: EndpointPool::new(chain, endpoints, limiter, retry)?,
        })
    }

    /// Build a client from configuration, resolving the RPC pool from the
    /// environment.
    pub fn from_config(chain: &ChainConfig, rpc: &RpcConfig) -> Result<Self> {
        let urls = chain.rpc_pool()?;
        Self::new(
            &chain.id,
            &urls,
            rpc.rate_limiter(&chain.id),
            rpc.retry_policy(),
        )
    }

    /// Endpoint pool, e.g. to observe rotations.
    pub fn pool(&self) -> &EndpointPool<HttpProvider> {
        &self.pool
    }
}

#[async_trait]
impl ChainSource for ChainClient {
    fn chain(&self) -> &str {
        self.pool.chain()
    }

    async fn block_number(&self) -> Result<u64> {
        self.pool
            .execute("getBlockNumber", |provider| async move {
                provider.get_block_number().await
            })
            .await
            .context("Failed to get block number")
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.pool
            .execute("getLogs", |provider| {
                let filter = filter.clone();
                async move { provider.get_logs(&filter).await }
            })
            .await
            .context("Failed to fetch logs from RPC")
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64> {
        let header: Option<BlockTimestamp> = self
            .pool
            .execute("getBlock", |provider| async move {
                provider
                    .client()
                    .request("eth_getBlockByNumber", (BlockNumberOrTag::Number(block), false))
                    .await
            })
            .await
            .with_context(|| format!("Failed to fetch block {}", block))?;

        let header = header.with_context(|| format!("Block {} not found", block))?;
        Ok(header.timestamp.to::<u64>())
    }
}
