//! Wallet and campaign evaluation over indexed activity.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::Context;
use futures::stream::{self, StreamExt, TryStreamExt};
use indexflow_core::{
    normalize_wallet, resolve_window, CoreError, Evaluator, UsageActivity, UsageCriteriaInput,
    UsageEvaluationInput, UsageOutputV1, UsageSummaryInput, UsageWindow, UsageWindowInput,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cache::TtlCache;
use super::campaigns::{Campaign, CampaignRegistry};
use super::metrics::{
    CachedMetricsProvider, FallbackMetricsProvider, IndexerDbMetricsProvider, MetricsError,
    MetricsProvider, MetricsQuery, RpcScanMetricsProvider,
};
use crate::config::Config;
use crate::listener::{ChainClient, ChainSource};
use crate::storage::Storage;

/// Evaluation failure.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// A required request field was empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// No campaign with this id.
    #[error("unknown campaign_id: {0}")]
    UnknownCampaign(String),

    /// Wallet, window or criteria failed validation.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    /// No metrics source could answer.
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// The chain head could not be resolved.
    #[error("failed to resolve head of {chain}: {reason}")]
    Head {
        /// Chain key.
        chain: String,
        /// Underlying failure.
        reason: String,
    },
}

/// Single-wallet evaluation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateRequest {
    /// Wallet in any case.
    pub wallet: String,
    /// Campaign id.
    pub campaign_id: String,
    /// Window selection.
    pub window: UsageWindowInput,
    /// Pin on-chain lookups to this block; defaults to the chain head.
    #[serde(default)]
    pub as_of_block: Option<u64>,
}

/// Context of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationMeta {
    /// Block the evaluation was pinned to.
    pub as_of_block: u64,
}

/// Result of [`EvaluationService::evaluate_wallet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Sealed output.
    pub output: UsageOutputV1,
    /// True if served from the output cache.
    pub cached: bool,
    /// Evaluation context.
    pub meta: EvaluationMeta,
}

/// Campaign batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRunRequest {
    /// Campaign id.
    pub campaign_id: String,
    /// Window applied to every wallet.
    pub window: UsageWindowInput,
    /// Wallets, evaluated in this order.
    pub wallets: Vec<String>,
    /// Pin for the whole batch.
    #[serde(default)]
    pub as_of_block: Option<u64>,
}

/// One wallet of a campaign batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRunItem {
    /// Checksummed wallet.
    pub wallet: String,
    /// Sealed output.
    pub output: UsageOutputV1,
    /// True if served from the output cache.
    pub cached: bool,
}

/// Aggregate over a campaign batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignRunSummary {
    /// Wallets evaluated.
    pub total: u64,
    /// Wallets with `verified_usage`.
    pub verified_true: u64,
    /// Wallets without `verified_usage`.
    pub verified_false: u64,
    /// `verified_true / total`, 0 for an empty batch.
    pub verified_rate: f64,
    /// Mean `tx_count`.
    pub avg_tx_count: f64,
    /// Mean `days_active`.
    pub avg_days_active: f64,
    /// Mean `unique_contracts`.
    pub avg_unique_contracts: f64,
}

impl CampaignRunSummary {
    /// Summarize batch results.
    pub fn from_items(items: &[CampaignRunItem]) -> Self {
        let total = items.len() as u64;
        if total == 0 {
            return Self::default();
        }

        let verified_true = items.iter().filter(|i| i.output.verified_usage).count() as u64;
        let (tx, days, contracts) = items.iter().fold((0u64, 0u64, 0u64), |acc, item| {
            let s = &item.output.usage_summary;
            (
                acc.0.saturating_add(s.tx_count),
                acc.1.saturating_add(s.days_active),
                acc.2.saturating_add(s.unique_contracts),
            )
        });

        let n = total as f64;
        Self {
            total,
            verified_true,
            verified_false: total - verified_true,
            verified_rate: verified_true as f64 / n,
            avg_tx_count: tx as f64 / n,
            avg_days_active: days as f64 / n,
            avg_unique_contracts: contracts as f64 / n,
        }
    }
}

/// Result of [`EvaluationService::run_campaign_batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRunResult {
    /// Per-wallet results in request order.
    pub results: Vec<CampaignRunItem>,
    /// Batch aggregate.
    pub summary: CampaignRunSummary,
    /// Batch context.
    pub meta: EvaluationMeta,
}

/// Evaluates wallets against configured campaigns.
///
/// Every dependency is injected; the service holds no ambient state.
pub struct EvaluationService {
    registry: Arc<CampaignRegistry>,
    metrics: Arc<dyn MetricsProvider>,
    cache: Arc<TtlCache<UsageOutputV1>>,
    heads: HashMap<String, Arc<dyn ChainSource>>,
    evaluator: Evaluator,
    batch_concurrency: usize,
}

impl EvaluationService {
    /// Create a service. `heads` resolves `as_of_block` per chain key when a
    /// request omits it.
    pub fn new(
        registry: Arc<CampaignRegistry>,
        metrics: Arc<dyn MetricsProvider>,
        cache: Arc<TtlCache<UsageOutputV1>>,
        heads: HashMap<String, Arc<dyn ChainSource>>,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            metrics,
            cache,
            heads,
            evaluator: Evaluator::default(),
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    /// Wire the service from configuration: indexed metrics first, then the
    /// RPC scan, both behind the metrics cache.
    ///
    /// Chains whose RPC pool cannot be resolved are left out; their
    /// campaigns then need an explicit `as_of_block` and indexed data.
    pub fn from_config(config: &Config, storage: Storage) -> anyhow::Result<Self> {
        let registry = Arc::new(
            CampaignRegistry::from_config(&config.campaigns)
                .context("Invalid campaign configuration")?,
        );

        let mut sources: HashMap<String, Arc<dyn ChainSource>> = HashMap::new();
        for chain in &config.chains {
            match ChainClient::from_config(chain, &config.rpc) {
                Ok(client) => {
                    sources.insert(chain.id.clone(), Arc::new(client));
                }
                Err(e) => warn!(
                    chain = %chain.id,
                    error = %e,
                    "No RPC pool; head lookups and RPC scans disabled"
                ),
            }
        }

        let ttl = Duration::from_secs(config.evaluation.cache_ttl_secs);
        let fallback = FallbackMetricsProvider::new(vec![
            Arc::new(IndexerDbMetricsProvider::new(storage)) as Arc<dyn MetricsProvider>,
            Arc::new(RpcScanMetricsProvider::new(sources.clone(), registry.clone())),
        ]);
        let metrics = CachedMetricsProvider::new(Arc::new(TtlCache::new(ttl)), Arc::new(fallback));

        Ok(Self::new(
            registry,
            Arc::new(metrics),
            Arc::new(TtlCache::new(ttl)),
            sources,
            config.evaluation.batch_concurrency,
        ))
    }

    /// Replace the criteria evaluator.
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Campaigns served.
    pub fn registry(&self) -> &CampaignRegistry {
        &self.registry
    }

    /// Evaluate one wallet, serving repeated requests from the output cache.
    pub async fn evaluate_wallet(
        &self,
        request: &EvaluateRequest,
    ) -> Result<EvaluationResult, EvaluationError> {
        let campaign = self.campaign(&request.campaign_id)?;
        if request.wallet.trim().is_empty() {
            return Err(EvaluationError::MissingField("wallet"));
        }
        let wallet = normalize_wallet(&request.wallet)?;
        let window = resolve_window(&request.window)?;
        let as_of_block = self.resolve_as_of(campaign, request.as_of_block).await?;

        self.evaluate_resolved(campaign, &wallet, &window, as_of_block)
            .await
    }

    /// Evaluate many wallets of one campaign at a single `as_of_block`.
    ///
    /// Wallets run with bounded concurrency; results keep request order. The
    /// first failure fails the batch.
    pub async fn run_campaign_batch(
        &self,
        request: &CampaignRunRequest,
    ) -> Result<CampaignRunResult, EvaluationError> {
        let campaign = self.campaign(&request.campaign_id)?;
        let window = resolve_window(&request.window)?;
        let as_of_block = self.resolve_as_of(campaign, request.as_of_block).await?;

        info!(
            campaign = %campaign.id,
            wallets = request.wallets.len(),
            as_of_block,
            concurrency = self.batch_concurrency,
            "Running campaign batch"
        );

        let results: Vec<CampaignRunItem> = stream::iter(request.wallets.iter())
            .map(|raw| {
                let window = &window;
                async move {
                    if raw.trim().is_empty() {
                        return Err(EvaluationError::MissingField("wallet"));
                    }
                    let wallet = normalize_wallet(raw)?;
                    let result = self
                        .evaluate_resolved(campaign, &wallet, window, as_of_block)
                        .await?;
                    Ok(CampaignRunItem {
                        wallet: result.output.wallet.clone(),
                        output: result.output,
                        cached: result.cached,
                    })
                }
            })
            .buffered(self.batch_concurrency)
            .try_collect()
            .await?;

        Ok(CampaignRunResult {
            summary: CampaignRunSummary::from_items(&results),
            results,
            meta: EvaluationMeta { as_of_block },
        })
    }

    /// Output cache key of one evaluation.
    pub fn cache_key(campaign: &Campaign, window: &UsageWindow, wallet: &str) -> String {
        format!(
            "v1:{}:{}:{}:{}:{}",
            campaign.id, window.start, window.end, campaign.criteria_set_id, wallet
        )
    }

    fn campaign(&self, id: &str) -> Result<&Campaign, EvaluationError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(EvaluationError::MissingField("campaign_id"));
        }
        self.registry
            .get(id)
            .ok_or_else(|| EvaluationError::UnknownCampaign(id.to_string()))
    }

    async fn resolve_as_of(
        &self,
        campaign: &Campaign,
        requested: Option<u64>,
    ) -> Result<u64, EvaluationError> {
        if let Some(block) = requested {
            return Ok(block);
        }

        let source = self
            .heads
            .get(&campaign.chain)
            .ok_or_else(|| EvaluationError::Head {
                chain: campaign.chain.clone(),
                reason: "no RPC source configured".to_string(),
            })?;

        source
            .block_number()
            .await
            .map_err(|e| EvaluationError::Head {
                chain: campaign.chain.clone(),
                reason: format!("{:#}", e),
            })
    }

    async fn evaluate_resolved(
        &self,
        campaign: &Campaign,
        wallet: &str,
        window: &UsageWindow,
        as_of_block: u64,
    ) -> Result<EvaluationResult, EvaluationError> {
        let meta = EvaluationMeta { as_of_block };
        let key = Self::cache_key(campaign, window, wallet);

        if let Some(output) = self.cache.get(&key) {
            debug!(campaign = %campaign.id, wallet = %wallet, "Usage output cache hit");
            return Ok(EvaluationResult {
                output,
                cached: true,
                meta,
            });
        }

        let address: Address = wallet
            .parse()
            .map_err(|_| CoreError::InvalidWallet(wallet.to_string()))?;

        let summary = self
            .metrics
            .wallet_metrics(&MetricsQuery {
                chain: campaign.chain.clone(),
                campaign_id: campaign.id.clone(),
                wallet: address,
                start: window.start,
                end: window.end,
                as_of_block: Some(as_of_block),
                targets: campaign.target_addresses(),
            })
            .await?;

        let output = self.evaluator.evaluate(&UsageEvaluationInput {
            wallet: wallet.to_string(),
            campaign_id: campaign.id.clone(),
            window: UsageWindowInput {
                window_type: window.window_type,
                start: Some(window.start),
                end: Some(window.end),
            },
            criteria: Some(UsageCriteriaInput {
                criteria_set_id: Some(campaign.criteria_set_id.clone()),
                ..Default::default()
            }),
            activity: UsageActivity::Summary {
                summary: UsageSummaryInput::from(summary),
            },
        })?;

        self.cache.insert(key, output.clone());
        Ok(EvaluationResult {
            output,
            cached: false,
            meta,
        })
    }
}

impl fmt::Debug for EvaluationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationService")
            .field("campaigns", &self.registry.len())
            .field("metrics", &self.metrics.name())
            .field("cache", &self.cache)
            .field("batch_concurrency", &self.batch_concurrency)
            .finish()
    }
}
