//! Database types for the indexer storage layer.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamps below this value are taken to be Unix seconds.
const SECONDS_THRESHOLD: u64 = 10_000_000_000;

/// Normalize a Unix timestamp in seconds or milliseconds to milliseconds.
pub fn normalize_timestamp_ms(timestamp: u64) -> i64 {
    let ms = if timestamp < SECONDS_THRESHOLD {
        timestamp.saturating_mul(1000)
    } else {
        timestamp
    };
    i64::try_from(ms).unwrap_or(i64::MAX)
}

/// Per-chain ingestion watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Chain key, e.g. `sepolia`.
    pub chain_id: String,

    /// Inclusive watermark of fully ingested history.
    pub last_processed_block: u64,

    /// Last observed chain tip (advisory).
    pub current_chain_head: Option<u64>,

    /// Unix seconds of the last update.
    pub updated_at: i64,
}

/// Identity and position shared by every ingested log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventMeta {
    /// Block the log was emitted in.
    pub block_number: u64,

    /// Transaction hash.
    pub tx_hash: B256,

    /// Log index within the block.
    pub log_index: u64,

    /// Contract that emitted the log.
    pub contract: Address,
}

/// ERC-20 Transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Log position.
    pub meta: EventMeta,
    /// Sender.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Amount as a decimal string.
    pub value: String,
}

/// Kind of staking action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StakingEventType {
    /// Tokens staked.
    Staked,
    /// Tokens withdrawn.
    Unstaked,
    /// Rewards withdrawn.
    RewardClaimed,
}

impl StakingEventType {
    /// Stored representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Staked => "STAKED",
            Self::Unstaked => "UNSTAKED",
            Self::RewardClaimed => "REWARD_CLAIMED",
        }
    }
}

impl fmt::Display for StakingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staking pool action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingRecord {
    /// Log position.
    pub meta: EventMeta,
    /// Staker.
    pub user: Address,
    /// Amount as a decimal string.
    pub amount: String,
    /// Which action.
    pub event_type: StakingEventType,
}

/// Proof-of-indexing submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoiRecord {
    /// Log position.
    pub meta: EventMeta,
    /// Submitting operator.
    pub operator: Address,
    /// Identifier of the indexed chain.
    pub target_chain_id: B256,
    /// First covered block.
    pub from_block: u64,
    /// Last covered block.
    pub to_block: u64,
    /// Submitted proof hash.
    pub proof_hash: B256,
    /// Timestamp carried by the event, in seconds.
    pub timestamp: u64,
}

/// Contribution registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionRecord {
    /// Log position.
    pub meta: EventMeta,
    /// Contributor.
    pub user: Address,
    /// Free-form contribution category.
    pub contribution_type: String,
    /// Weight as a decimal string.
    pub weight: String,
    /// Timestamp carried by the event, in seconds.
    pub timestamp: u64,
}

/// A decoded log ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestedEvent {
    /// Token transfer.
    Transfer(TransferRecord),
    /// Staking action.
    Staking(StakingRecord),
    /// Proof-of-indexing submission.
    ProofOfIndexing(PoiRecord),
    /// Contribution record.
    Contribution(ContributionRecord),
}

impl IngestedEvent {
    /// Log position of the event.
    pub fn meta(&self) -> &EventMeta {
        match self {
            Self::Transfer(e) => &e.meta,
            Self::Staking(e) => &e.meta,
            Self::ProofOfIndexing(e) => &e.meta,
            Self::Contribution(e) => &e.meta,
        }
    }

    /// Table the event belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Transfer(_) => EventKind::Transfer,
            Self::Staking(_) => EventKind::Staking,
            Self::ProofOfIndexing(_) => EventKind::ProofOfIndexing,
            Self::Contribution(_) => EventKind::Contribution,
        }
    }

    /// Timestamp carried by the log itself, if any.
    ///
    /// Transfers and staking actions are stamped with their block timestamp.
    pub fn own_timestamp(&self) -> Option<u64> {
        match self {
            Self::ProofOfIndexing(e) => Some(e.timestamp),
            Self::Contribution(e) => Some(e.timestamp),
            Self::Transfer(_) | Self::Staking(_) => None,
        }
    }
}

/// Event tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `transfers`
    Transfer,
    /// `staking_events`
    Staking,
    /// `poi_events`
    ProofOfIndexing,
    /// `contributions`
    Contribution,
}

impl EventKind {
    /// Table name.
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Transfer => "transfers",
            Self::Staking => "staking_events",
            Self::ProofOfIndexing => "poi_events",
            Self::Contribution => "contributions",
        }
    }
}

/// Aggregated transfer activity of one wallet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalletActivity {
    /// Matching transfers.
    pub tx_count: u64,
    /// Distinct UTC days.
    pub days_active: u64,
    /// Distinct token contracts.
    pub unique_contracts: u64,
}
