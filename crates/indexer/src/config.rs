//! Configuration management for the IndexFlow indexer.
//!
//! This module handles loading configuration from:
//! - TOML files, with `${VAR_NAME}` placeholders expanded from the environment
//! - Environment variable overrides for operational knobs
//! - Default values (fallbacks)

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::listener::processor::{TargetKind, TopicTarget};
use crate::retry::RetryPolicy;
use crate::rpc::RateLimiter;

/// Main configuration for the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Ingestion loop configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// RPC client configuration
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Indexed chains
    #[serde(default)]
    pub chains: Vec<ChainConfig>,

    /// Evaluation service configuration
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Campaign registry
    #[serde(default)]
    pub campaigns: Vec<CampaignConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://indexflow.db")
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Ingestion loop configuration, shared by the listener and backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// First block to ingest. Defaults to the token deploy block.
    #[serde(default)]
    pub start_block: Option<u64>,

    /// Polling interval in seconds for new blocks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Blocks per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Blocks re-walked behind the cursor when a backfill resumes
    #[serde(default = "default_reorg_depth")]
    pub reorg_depth: u64,

    /// Blocks the listener stays behind the head
    #[serde(default)]
    pub confirmations: u64,

    /// Hard limit for graceful shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_block: None,
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            reorg_depth: default_reorg_depth(),
            confirmations: 0,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl SyncConfig {
    /// Polling interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// First block to ingest for a chain.
    pub fn start_block_for(&self, chain: &ChainConfig) -> u64 {
        self.start_block.unwrap_or(chain.deploy_block)
    }
}

/// RPC client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Requests allowed per refill period
    #[serde(default = "default_rate_limit_capacity")]
    pub rate_limit_capacity: u32,

    /// Refill period in milliseconds
    #[serde(default = "default_rate_limit_refill_ms")]
    pub rate_limit_refill_ms: u64,

    /// Maximum in-flight requests per chain
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-attempt request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Attempts per endpoint before rotating
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// First backoff delay for RPC calls
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_retry_factor")]
    pub retry_factor: u32,

    /// First backoff delay for storage writes
    #[serde(default = "default_storage_retry_base_delay_ms")]
    pub storage_retry_base_delay_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            rate_limit_capacity: default_rate_limit_capacity(),
            rate_limit_refill_ms: default_rate_limit_refill_ms(),
            max_concurrent: default_max_concurrent(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_factor: default_retry_factor(),
            storage_retry_base_delay_ms: default_storage_retry_base_delay_ms(),
        }
    }
}

impl RpcConfig {
    /// Retry policy for RPC calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            backoff_factor: self.retry_factor,
            timeout: Some(Duration::from_millis(self.request_timeout_ms)),
        }
    }

    /// Retry policy for storage writes.
    pub fn storage_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.storage_retry_base_delay_ms),
            backoff_factor: self.retry_factor,
            timeout: None,
        }
    }

    /// A fresh rate limiter for one chain.
    pub fn rate_limiter(&self, chain: &str) -> RateLimiter {
        RateLimiter::new(
            chain,
            self.rate_limit_capacity,
            Duration::from_millis(self.rate_limit_refill_ms),
            self.max_concurrent,
        )
    }
}

/// Auxiliary contract of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Contract address
    pub address: Address,

    /// Deployment block. Defaults to the token deploy block.
    #[serde(default)]
    pub deploy_block: Option<u64>,
}

/// Static per-chain descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain key, e.g. "sepolia"
    pub id: String,

    /// Network name, e.g. "mainnet"
    #[serde(default)]
    pub network: String,

    /// EIP-155 chain id
    pub chain_id: u64,

    /// Base environment key for RPC URLs, e.g. "SEPOLIA_RPC"
    pub rpc_env_key: String,

    /// Explicit RPC URLs, tried before the environment
    #[serde(default)]
    pub rpc_urls: Vec<String>,

    /// Token contract (Transfer events)
    pub token: Address,

    /// Token deployment block
    pub deploy_block: u64,

    /// Staking pool (Staked, Unstaked, RewardClaimed)
    #[serde(default)]
    pub staking: Option<TargetConfig>,

    /// Proof-of-indexing registry (ProofSubmitted)
    #[serde(default)]
    pub poi: Option<TargetConfig>,

    /// Contribution registry (ContributionRecorded)
    #[serde(default)]
    pub contributions: Option<TargetConfig>,
}

impl ChainConfig {
    /// Topic filters for this chain: the token always, auxiliary contracts
    /// only when configured.
    pub fn targets(&self) -> Vec<TopicTarget> {
        let mut targets = vec![TopicTarget::new(
            TargetKind::Token,
            self.token,
            self.deploy_block,
        )];

        let auxiliary = [
            (TargetKind::Staking, &self.staking),
            (TargetKind::ProofOfIndexing, &self.poi),
            (TargetKind::Contributions, &self.contributions),
        ];
        for (kind, target) in auxiliary {
            if let Some(target) = target {
                targets.push(TopicTarget::new(
                    kind,
                    target.address,
                    target.deploy_block.unwrap_or(self.deploy_block),
                ));
            }
        }

        targets
    }

    /// Candidate RPC URLs from the process environment.
    pub fn rpc_pool(&self) -> Result<Vec<String>> {
        self.rpc_pool_with(|key| std::env::var(key).ok())
    }

    /// Candidate RPC URLs: explicit `rpc_urls`, then `${KEY}_1`, `${KEY}_2`,
    /// `${KEY}_3` and `${KEY}`. Trimmed and deduplicated in order.
    pub fn rpc_pool_with<F>(&self, lookup: F) -> Result<Vec<String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = self.rpc_env_key.trim();
        let from_env = ["_1", "_2", "_3", ""]
            .iter()
            .filter_map(|suffix| lookup(&format!("{}{}", key, suffix)));

        let mut seen = HashSet::new();
        let pool: Vec<String> = self
            .rpc_urls
            .iter()
            .cloned()
            .chain(from_env)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .filter(|url| seen.insert(url.clone()))
            .collect();

        if pool.is_empty() {
            bail!(
                "No RPC endpoints configured for {}. Set {key}_1/{key}_2/{key}_3 or {key}.",
                self.id,
                key = key
            );
        }

        Ok(pool)
    }
}

/// Evaluation service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Lifetime of cached evaluation results
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Wallets evaluated concurrently in a campaign batch
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

/// Contract a campaign counts activity on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignTargetConfig {
    /// Contract address
    pub address: Address,

    /// Free-form tags, e.g. "erc20"
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Campaign definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Campaign id
    pub id: String,

    /// Chain key the campaign runs on
    pub chain: String,

    /// Criteria preset
    #[serde(default = "default_criteria_set_id")]
    pub criteria_set_id: String,

    /// Counted contracts
    #[serde(default)]
    pub targets: Vec<CampaignTargetConfig>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_batch_size() -> u64 {
    200
}

fn default_reorg_depth() -> u64 {
    6
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_rate_limit_capacity() -> u32 {
    10
}

fn default_rate_limit_refill_ms() -> u64 {
    1_000
}

fn default_max_concurrent() -> usize {
    2
}

fn default_request_timeout_ms() -> u64 {
    20_000
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_factor() -> u32 {
    2
}

fn default_storage_retry_base_delay_ms() -> u64 {
    300
}

fn default_cache_ttl_secs() -> u64 {
    30 * 60
}

fn default_batch_concurrency() -> usize {
    15
}

fn default_criteria_set_id() -> String {
    indexflow_core::DEFAULT_CRITERIA_SET_ID.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax,
    /// e.g. `url = "${DATABASE_URL}"`. Operational overrides
    /// (`INDEXER_BATCH_SIZE`, `INDEXER_POLL_INTERVAL_SECS`, `REORG_DEPTH`,
    /// `RPC_RATE_LIMIT_CAPACITY`) are applied after parsing.
    ///
    /// # Example
    /// ```no_run
    /// # use indexflow_indexer::config::Config;
    /// let config = Config::from_file("indexer.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse_with(&contents, |key| std::env::var(key).ok())
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load configuration from a TOML string, without environment input.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Expand placeholders, parse, apply overrides and validate, reading the
    /// environment through `lookup`.
    pub fn parse_with<F>(toml: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = expand_env_vars(toml, &lookup)?;

        let mut config: Config =
            toml::from_str(&expanded).context("Failed to parse TOML configuration")?;

        config.apply_env_overrides(&lookup)?;
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override(lookup, "INDEXER_BATCH_SIZE")? {
            self.sync.batch_size = value;
        }
        if let Some(value) = parse_override(lookup, "INDEXER_POLL_INTERVAL_SECS")? {
            self.sync.poll_interval_secs = value;
        }
        if let Some(value) = parse_override(lookup, "REORG_DEPTH")? {
            self.sync.reorg_depth = value;
        }
        if let Some(value) = parse_override(lookup, "RPC_RATE_LIMIT_CAPACITY")? {
            self.rpc.rate_limit_capacity = value;
        }

        Ok(())
    }

    /// Look up a chain by key.
    pub fn chain(&self, id: &str) -> Option<&ChainConfig> {
        let id = id.trim();
        self.chains.iter().find(|chain| chain.id == id)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        // Validate database URL
        if self.database.url.trim().is_empty() {
            bail!("Database URL cannot be empty");
        }

        // Validate connection pool settings
        if self.database.max_connections == 0 {
            bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        // Validate sync settings
        if self.sync.poll_interval_secs == 0 {
            bail!("Sync poll_interval_secs must be > 0");
        }
        if self.sync.batch_size == 0 {
            bail!("Sync batch_size must be > 0");
        }

        // Validate RPC settings
        if self.rpc.rate_limit_capacity == 0 {
            bail!("RPC rate_limit_capacity must be > 0");
        }
        if self.rpc.rate_limit_refill_ms == 0 {
            bail!("RPC rate_limit_refill_ms must be > 0");
        }
        if self.rpc.max_concurrent == 0 {
            bail!("RPC max_concurrent must be > 0");
        }
        if self.rpc.retry_attempts == 0 {
            bail!("RPC retry_attempts must be > 0");
        }

        // Validate chains
        let mut chain_ids = HashSet::new();
        for chain in &self.chains {
            if chain.id.trim().is_empty() {
                bail!("Chain id cannot be empty");
            }
            if !chain_ids.insert(chain.id.as_str()) {
                bail!("Duplicate chain id '{}'", chain.id);
            }
            if chain.rpc_env_key.trim().is_empty() {
                bail!("Chain '{}' rpc_env_key cannot be empty", chain.id);
            }
            if chain.token.is_zero() {
                bail!("Chain '{}' token must be a non-zero address", chain.id);
            }
            let auxiliary = [
                ("staking", &chain.staking),
                ("poi", &chain.poi),
                ("contributions", &chain.contributions),
            ];
            for (label, target) in auxiliary {
                if let Some(target) = target {
                    if target.address.is_zero() {
                        bail!(
                            "Chain '{}' {} must be a non-zero address when provided",
                            chain.id,
                            label
                        );
                    }
                }
            }
        }

        // Validate campaigns
        let mut campaign_ids = HashSet::new();
        for campaign in &self.campaigns {
            let id = campaign.id.trim();
            if id.is_empty() {
                bail!("Campaign id cannot be empty");
            }
            if !campaign_ids.insert(id) {
                bail!("Duplicate campaign id '{}'", id);
            }
            if self.chain(&campaign.chain).is_none() {
                bail!(
                    "Campaign '{}' references unknown chain '{}'",
                    id,
                    campaign.chain
                );
            }
        }

        if self.evaluation.batch_concurrency == 0 {
            bail!("Evaluation batch_concurrency must be > 0");
        }

        // Validate logging level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        // Validate logging format
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {}='{}': {}", key, raw, e)),
        _ => Ok(None),
    }
}

/// Expand `${VAR_NAME}` placeholders line by line.
///
/// Everything after a `#` that sits outside a quoted string is a comment and
/// is copied verbatim.
fn expand_env_vars<F>(input: &str, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());

    for (index, line) in input.split_inclusive('\n').enumerate() {
        let (code, comment) = line.split_at(comment_start(line));
        let mut rest = code;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                bail!(
                    "Unclosed environment variable placeholder on line {}",
                    index + 1
                );
            };

            let name = &after[..end];
            if name.is_empty() {
                bail!("Empty environment variable name on line {}", index + 1);
            }
            let value = lookup(name)
                .with_context(|| format!("Environment variable '{}' is not set", name))?;
            result.push_str(&value);
            rest = &after[end + 1..];
        }

        result.push_str(rest);
        result.push_str(comment);
    }

    Ok(result)
}

fn comment_start(line: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, ch) in line.char_indices() {
        match quote {
            Some('"') if escaped => escaped = false,
            Some('"') if ch == '\\' => escaped = true,
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == '#' => return i,
            None => {}
        }
    }

    line.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const EXAMPLE: &str = r#"
[database]
url = "sqlite://indexflow.db"

[sync]
poll_interval_secs = 5
batch_size = 200

[[chains]]
id = "sepolia"
network = "sepolia"
chain_id = 11155111
rpc_env_key = "SEPOLIA_RPC"
token = "0x1111111111111111111111111111111111111111"
deploy_block = 5000000

[chains.staking]
address = "0x2222222222222222222222222222222222222222"
deploy_block = 5000100

[chains.poi]
address = "0x3333333333333333333333333333333333333333"

[[campaigns]]
id = "airdrop_v1"
chain = "sepolia"

[[campaigns.targets]]
address = "0x1111111111111111111111111111111111111111"
tags = ["erc20"]
"#;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_example_config() {
        let config = Config::from_toml_str(EXAMPLE).unwrap();

        assert_eq!(config.database.url, "sqlite://indexflow.db");
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.campaigns[0].criteria_set_id, "airdrop/basic@1");

        let chain = config.chain(" sepolia ").unwrap();
        assert_eq!(chain.chain_id, 11155111);
        assert_eq!(config.sync.start_block_for(chain), 5_000_000);
    }

    #[test]
    fn test_example_file_parses() {
        let contents = include_str!("../indexer.example.toml");
        let vars = env(&[("DATABASE_URL", "sqlite://indexflow.db")]);
        let config = Config::parse_with(contents, |k| vars.get(k).cloned()).unwrap();
        assert!(!config.chains.is_empty());
    }

    #[test]
    fn test_default_values() {
        let toml = r#"
[database]
url = "sqlite://test.db"
        "#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.min_connections, 1);
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.sync.poll_interval_secs, 5);
        assert_eq!(config.sync.batch_size, 200);
        assert_eq!(config.sync.reorg_depth, 6);
        assert_eq!(config.sync.confirmations, 0);
        assert_eq!(config.rpc.rate_limit_capacity, 10);
        assert_eq!(config.rpc.max_concurrent, 2);
        assert_eq!(config.evaluation.cache_ttl_secs, 1800);
        assert_eq!(config.evaluation.batch_concurrency, 15);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_targets_follow_configured_contracts() {
        let config = Config::from_toml_str(EXAMPLE).unwrap();
        let targets = config.chains[0].targets();

        let kinds: Vec<TargetKind> = targets.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TargetKind::Token,
                TargetKind::Staking,
                TargetKind::ProofOfIndexing
            ]
        );
        assert_eq!(targets[1].deploy_block, 5_000_100);
        // falls back to the token deploy block
        assert_eq!(targets[2].deploy_block, 5_000_000);
    }

    #[test]
    fn test_rpc_pool_order_and_dedup() {
        let mut config = Config::from_toml_str(EXAMPLE).unwrap();
        config.chains[0].rpc_urls = vec!["https://explicit.example.org".to_string()];

        let vars = env(&[
            ("SEPOLIA_RPC_1", " https://one.example.org "),
            ("SEPOLIA_RPC_2", "https://one.example.org"),
            ("SEPOLIA_RPC_3", ""),
            ("SEPOLIA_RPC", "https://fallback.example.org"),
        ]);

        let pool = config.chains[0]
            .rpc_pool_with(|k| vars.get(k).cloned())
            .unwrap();
        assert_eq!(
            pool,
            vec![
                "https://explicit.example.org",
                "https://one.example.org",
                "https://fallback.example.org",
            ]
        );
    }

    #[test]
    fn test_empty_rpc_pool_names_variables() {
        let config = Config::from_toml_str(EXAMPLE).unwrap();

        let err = config.chains[0].rpc_pool_with(|_| None).unwrap_err();
        assert!(err.to_string().contains("SEPOLIA_RPC_1"));
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("INDEXER_BATCH_SIZE", "50"),
            ("INDEXER_POLL_INTERVAL_SECS", "2"),
            ("REORG_DEPTH", "12"),
            ("RPC_RATE_LIMIT_CAPACITY", "25"),
        ]);

        let config = Config::parse_with(EXAMPLE, |k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.sync.poll_interval_secs, 2);
        assert_eq!(config.sync.reorg_depth, 12);
        assert_eq!(config.rpc.rate_limit_capacity, 25);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let vars = env(&[("REORG_DEPTH", "six")]);

        let err = Config::parse_with(EXAMPLE, |k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("REORG_DEPTH"));
    }

    #[test]
    fn test_validation_zero_batch_size() {
        let vars = env(&[("INDEXER_BATCH_SIZE", "0")]);

        let err = Config::parse_with(EXAMPLE, |k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_validation_zero_token() {
        let toml = EXAMPLE.replace(
            "token = \"0x1111111111111111111111111111111111111111\"",
            "token = \"0x0000000000000000000000000000000000000000\"",
        );

        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn test_validation_duplicate_chain() {
        let toml = format!(
            "{}\n{}",
            EXAMPLE,
            r#"
[[chains]]
id = "sepolia"
chain_id = 11155111
rpc_env_key = "OTHER_RPC"
token = "0x4444444444444444444444444444444444444444"
deploy_block = 1
"#
        );

        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("Duplicate chain"));
    }

    #[test]
    fn test_validation_campaign_unknown_chain() {
        let toml = EXAMPLE.replace("chain = \"sepolia\"", "chain = \"polygon\"");

        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("unknown chain"));
    }

    #[test]
    fn test_validation_log_format() {
        let toml = format!("{}\n[logging]\nformat = \"xml\"\n", EXAMPLE);

        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("Logging format"));
    }

    #[test]
    fn test_validation_min_exceeds_max_connections() {
        let toml = r#"
[database]
url = "sqlite://test.db"
max_connections = 2
min_connections = 3
        "#;

        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("min_connections"));
    }

    #[test]
    fn test_expand_env_vars() {
        let vars = env(&[("DB", "sqlite://x.db"), ("KEY", "abc")]);
        let lookup = |k: &str| vars.get(k).cloned();

        let out = expand_env_vars("url = \"${DB}\"\nkey = '${KEY}${KEY}'\n", &lookup).unwrap();
        assert_eq!(out, "url = \"sqlite://x.db\"\nkey = 'abcabc'\n");
    }

    #[test]
    fn test_expand_env_vars_undefined() {
        let err = expand_env_vars("url = \"${MISSING}\"", &|_: &str| None).unwrap_err();
        assert!(err.to_string().contains("MISSING"));
    }

    #[test]
    fn test_expand_env_vars_malformed() {
        assert!(expand_env_vars("a = \"${}\"", &|_: &str| None).is_err());
        assert!(expand_env_vars("a = \"${OPEN\"", &|_: &str| None).is_err());
    }

    #[test]
    fn test_expand_env_vars_ignore_comments() {
        let out = expand_env_vars(
            "# url = \"${NOT_SET}\"\na = 1 # ${ALSO_NOT_SET}\n",
            &|_: &str| None,
        )
        .unwrap();
        assert_eq!(out, "# url = \"${NOT_SET}\"\na = 1 # ${ALSO_NOT_SET}\n");
    }

    #[test]
    fn test_expand_env_vars_hash_in_string() {
        let vars = env(&[("V", "x")]);
        let out = expand_env_vars(
            "a = \"abc#${V}\" # ${NOT_SET}\nb = 'it''s#' # c\nc = \"q\\\"#${V}\"\n",
            &|k: &str| vars.get(k).cloned(),
        )
        .unwrap();
        assert_eq!(
            out,
            "a = \"abc#x\" # ${NOT_SET}\nb = 'it''s#' # c\nc = \"q\\\"#x\"\n"
        );
    }

    #[test]
    fn test_config_from_file_with_env_vars() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "# url = \"${{UNUSED}}\"\n[database]\nurl = \"sqlite://from-file.db\"\n"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.database.url, "sqlite://from-file.db");
    }
}
