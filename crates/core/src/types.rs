//! Usage proof data model.
//!
//! Output types serialize with their fields in canonical order, but the
//! canonical byte form is produced by [`crate::canonical`], never by serde's
//! field order alone.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::constants::{
    WINDOW_14_DAYS_SECONDS, WINDOW_30_DAYS_SECONDS, WINDOW_7_DAYS_SECONDS,
};

/// Named evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageWindowType {
    /// Seven days ending at `end`.
    #[serde(rename = "last_7_days")]
    Last7Days,
    /// Fourteen days ending at `end`.
    #[serde(rename = "last_14_days")]
    Last14Days,
    /// Thirty days ending at `end`.
    #[serde(rename = "last_30_days")]
    Last30Days,
    /// Explicit `[start, end]`.
    #[serde(rename = "custom")]
    Custom,
}

impl UsageWindowType {
    /// Window length in seconds, `None` for custom windows.
    pub const fn length_seconds(&self) -> Option<i64> {
        match self {
            Self::Last7Days => Some(WINDOW_7_DAYS_SECONDS),
            Self::Last14Days => Some(WINDOW_14_DAYS_SECONDS),
            Self::Last30Days => Some(WINDOW_30_DAYS_SECONDS),
            Self::Custom => None,
        }
    }

    /// Wire name of the window type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Last7Days => "last_7_days",
            Self::Last14Days => "last_14_days",
            Self::Last30Days => "last_30_days",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for UsageWindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved evaluation window in Unix seconds, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageWindow {
    /// Window type.
    #[serde(rename = "type")]
    pub window_type: UsageWindowType,
    /// Inclusive lower bound.
    pub start: i64,
    /// Inclusive upper bound.
    pub end: i64,
}

impl UsageWindow {
    /// Whether a timestamp falls inside the window (both bounds inclusive).
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Aggregated wallet activity inside a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Distinct UTC days with at least one transaction.
    pub days_active: u64,
    /// Transactions inside the window.
    pub tx_count: u64,
    /// Distinct contracts interacted with.
    pub unique_contracts: u64,
}

/// Thresholds a summary must meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageCriteriaParams {
    /// Minimum distinct active days.
    pub min_days_active: u64,
    /// Minimum transaction count.
    pub min_tx_count: u64,
    /// Minimum distinct contracts.
    pub min_unique_contracts: u64,
}

impl UsageCriteriaParams {
    /// Logical AND of the three threshold comparisons.
    pub fn is_met_by(&self, summary: &UsageSummary) -> bool {
        summary.days_active >= self.min_days_active
            && summary.tx_count >= self.min_tx_count
            && summary.unique_contracts >= self.min_unique_contracts
    }
}

/// Fully resolved criteria recorded in the output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageCriteria {
    /// Preset identifier, e.g. `airdrop/basic@1`.
    pub criteria_set_id: String,
    /// Engine version that applied the criteria.
    pub engine_version: String,
    /// Resolved thresholds.
    pub params: UsageCriteriaParams,
}

/// Hash commitment over the canonical form of the output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageProof {
    /// Digest algorithm name.
    pub hash_algorithm: String,
    /// 0x-prefixed lowercase hex digest, empty while hashing.
    pub canonical_hash: String,
}

/// The hashable result of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageOutputV1 {
    /// Protocol tag.
    pub protocol: String,
    /// Document layout version.
    pub output_version: String,
    /// Checksummed wallet address.
    pub wallet: String,
    /// Campaign the evaluation belongs to.
    pub campaign_id: String,
    /// Resolved window.
    pub window: UsageWindow,
    /// Whether every threshold was met.
    pub verified_usage: bool,
    /// Activity inside the window.
    pub usage_summary: UsageSummary,
    /// Criteria that were applied.
    pub criteria: UsageCriteria,
    /// Proof over the canonical form.
    pub proof: UsageProof,
}

/// Window as supplied by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageWindowInput {
    /// Window type.
    #[serde(rename = "type")]
    pub window_type: UsageWindowType,
    /// Optional start; required for custom windows.
    #[serde(default, deserialize_with = "truncated_opt")]
    pub start: Option<i64>,
    /// End of the window; always required.
    #[serde(default, deserialize_with = "truncated_opt")]
    pub end: Option<i64>,
}

impl UsageWindowInput {
    /// Named window ending at `end` with the default start.
    pub fn ending_at(window_type: UsageWindowType, end: i64) -> Self {
        Self {
            window_type,
            start: None,
            end: Some(end),
        }
    }
}

/// Caller overrides for criteria thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCriteriaParamsInput {
    /// Override for `min_days_active`.
    #[serde(default, deserialize_with = "truncated_opt")]
    pub min_days_active: Option<i64>,
    /// Override for `min_tx_count`.
    #[serde(default, deserialize_with = "truncated_opt")]
    pub min_tx_count: Option<i64>,
    /// Override for `min_unique_contracts`.
    #[serde(default, deserialize_with = "truncated_opt")]
    pub min_unique_contracts: Option<i64>,
}

/// Criteria selection supplied by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCriteriaInput {
    /// Preset to start from; defaults to the default criteria set.
    #[serde(default)]
    pub criteria_set_id: Option<String>,
    /// Parameter overrides merged on top of the preset.
    #[serde(default)]
    pub params: UsageCriteriaParamsInput,
}

/// One raw transaction of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTransaction {
    /// Unix seconds.
    #[serde(deserialize_with = "truncated")]
    pub timestamp: i64,
    /// Contract interacted with.
    #[serde(rename = "contractAddress", alias = "contract_address")]
    pub contract_address: String,
}

/// Pre-aggregated summary; missing fields count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummaryInput {
    /// Distinct active days.
    #[serde(default, deserialize_with = "truncated_opt")]
    pub days_active: Option<i64>,
    /// Transaction count.
    #[serde(default, deserialize_with = "truncated_opt")]
    pub tx_count: Option<i64>,
    /// Distinct contracts.
    #[serde(default, deserialize_with = "truncated_opt")]
    pub unique_contracts: Option<i64>,
}

impl From<UsageSummary> for UsageSummaryInput {
    fn from(summary: UsageSummary) -> Self {
        let clamp = |v: u64| Some(i64::try_from(v).unwrap_or(i64::MAX));
        Self {
            days_active: clamp(summary.days_active),
            tx_count: clamp(summary.tx_count),
            unique_contracts: clamp(summary.unique_contracts),
        }
    }
}

/// Wallet activity: raw transactions or an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UsageActivity {
    /// Raw transactions, folded inside the window.
    Transactions {
        /// Transactions in any order.
        transactions: Vec<UsageTransaction>,
    },
    /// Summary passed through after validation.
    Summary {
        /// The aggregate.
        #[serde(default)]
        summary: UsageSummaryInput,
    },
}

/// Everything `evaluate_usage_v1` needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvaluationInput {
    /// Wallet in any case.
    pub wallet: String,
    /// Campaign identifier.
    pub campaign_id: String,
    /// Window selection.
    pub window: UsageWindowInput,
    /// Optional criteria selection.
    #[serde(default)]
    pub criteria: Option<UsageCriteriaInput>,
    /// Activity to evaluate.
    pub activity: UsageActivity,
}

// JSON numbers may arrive as floats; they are truncated toward zero.
fn truncated<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    number_to_i64(&number).ok_or_else(|| {
        serde::de::Error::custom(format!("{number} is not a finite integer-range number"))
    })
}

fn truncated_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = Option::<serde_json::Number>::deserialize(deserializer)?;
    number
        .map(|n| {
            number_to_i64(&n).ok_or_else(|| {
                serde::de::Error::custom(format!("{n} is not a finite integer-range number"))
            })
        })
        .transpose()
}

fn number_to_i64(number: &serde_json::Number) -> Option<i64> {
    if let Some(v) = number.as_i64() {
        return Some(v);
    }
    let v = number.as_f64()?.trunc();
    (v.is_finite() && v >= i64::MIN as f64 && v <= i64::MAX as f64).then_some(v as i64)
}
