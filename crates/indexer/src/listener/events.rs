//! Event definitions and log parsers.
//!
//! Each parser is a pure function from an RPC log to a record. Topic hashes
//! come from the `sol!` signatures; [`decode_log`] dispatches on topic0.

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use thiserror::Error;

use crate::storage::{
    ContributionRecord, EventMeta, IngestedEvent, PoiRecord, StakingEventType, StakingRecord,
    TransferRecord,
};

sol! {
    /// ERC-20 Transfer
    #[derive(Debug, PartialEq, Eq)]
    event Transfer(address indexed from, address indexed to, uint256 value);

    /// Staking pool deposit
    #[derive(Debug, PartialEq, Eq)]
    event Staked(address indexed user, uint256 amount);

    /// Staking pool withdrawal
    #[derive(Debug, PartialEq, Eq)]
    event Unstaked(address indexed user, uint256 amount);

    /// Staking reward withdrawal
    #[derive(Debug, PartialEq, Eq)]
    event RewardClaimed(address indexed user, uint256 amount);

    /// Proof-of-indexing submission
    #[derive(Debug, PartialEq, Eq)]
    event ProofSubmitted(
        address indexed operator,
        bytes32 indexed chainId,
        uint256 fromBlock,
        uint256 toBlock,
        bytes32 proofHash,
        uint256 timestamp
    );

    /// Contribution registry entry
    #[derive(Debug, PartialEq, Eq)]
    event ContributionRecorded(
        address indexed user,
        string contributionType,
        uint256 weight,
        uint256 timestamp
    );
}

/// Topics of the staking pool.
pub const STAKING_TOPICS: [B256; 3] = [
    Staked::SIGNATURE_HASH,
    Unstaked::SIGNATURE_HASH,
    RewardClaimed::SIGNATURE_HASH,
];

/// Log decoding failures.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The log has no topic0.
    #[error("log has no topics")]
    MissingTopic,

    /// topic0 is not one of ours.
    #[error("unknown event topic {0}")]
    UnknownTopic(B256),

    /// The log was handed to the wrong parser.
    #[error("expected {event} log, found topic {found}")]
    TopicMismatch {
        /// Expected event.
        event: &'static str,
        /// Actual topic0.
        found: B256,
    },

    /// Recognized topic, broken payload.
    #[error("failed to decode {event} log: {source}")]
    Abi {
        /// Event name.
        event: &'static str,
        /// ABI decoder error.
        #[source]
        source: alloy::sol_types::Error,
    },

    /// Pending or malformed log without position metadata.
    #[error("{event} log missing {field}")]
    MissingField {
        /// Event name.
        event: &'static str,
        /// Missing field.
        field: &'static str,
    },

    /// A numeric field does not fit in u64.
    #[error("{event} field {field} overflows u64")]
    Overflow {
        /// Event name.
        event: &'static str,
        /// Offending field.
        field: &'static str,
    },
}

/// topic0 of a log.
pub fn topic0(log: &Log) -> Result<B256, DecodeError> {
    log.inner
        .data
        .topics()
        .first()
        .copied()
        .ok_or(DecodeError::MissingTopic)
}

/// Whether a topic belongs to one of the indexed events.
pub fn is_known_topic(topic: &B256) -> bool {
    *topic == Transfer::SIGNATURE_HASH
        || STAKING_TOPICS.contains(topic)
        || *topic == ProofSubmitted::SIGNATURE_HASH
        || *topic == ContributionRecorded::SIGNATURE_HASH
}

/// Decode any indexed event by its topic0.
pub fn decode_log(log: &Log) -> Result<IngestedEvent, DecodeError> {
    let topic = topic0(log)?;

    if topic == Transfer::SIGNATURE_HASH {
        decode_transfer(log).map(IngestedEvent::Transfer)
    } else if STAKING_TOPICS.contains(&topic) {
        decode_staking(log).map(IngestedEvent::Staking)
    } else if topic == ProofSubmitted::SIGNATURE_HASH {
        decode_proof_submitted(log).map(IngestedEvent::ProofOfIndexing)
    } else if topic == ContributionRecorded::SIGNATURE_HASH {
        decode_contribution(log).map(IngestedEvent::Contribution)
    } else {
        Err(DecodeError::UnknownTopic(topic))
    }
}

/// Decode an ERC-20 Transfer.
pub fn decode_transfer(log: &Log) -> Result<TransferRecord, DecodeError> {
    const EVENT: &str = "Transfer";
    expect_topic(log, EVENT, &[Transfer::SIGNATURE_HASH])?;

    let decoded = Transfer::decode_log(log.as_ref(), true).map_err(abi(EVENT))?;

    Ok(TransferRecord {
        meta: meta(log, EVENT)?,
        from: decoded.from,
        to: decoded.to,
        value: decoded.value.to_string(),
    })
}

/// Decode a Staked, Unstaked or RewardClaimed log.
pub fn decode_staking(log: &Log) -> Result<StakingRecord, DecodeError> {
    let topic = expect_topic(log, "Staking", &STAKING_TOPICS)?;

    let (event_type, user, amount) = if topic == Staked::SIGNATURE_HASH {
        let decoded = Staked::decode_log(log.as_ref(), true).map_err(abi("Staked"))?;
        (StakingEventType::Staked, decoded.user, decoded.amount)
    } else if topic == Unstaked::SIGNATURE_HASH {
        let decoded = Unstaked::decode_log(log.as_ref(), true).map_err(abi("Unstaked"))?;
        (StakingEventType::Unstaked, decoded.user, decoded.amount)
    } else {
        let decoded =
            RewardClaimed::decode_log(log.as_ref(), true).map_err(abi("RewardClaimed"))?;
        (StakingEventType::RewardClaimed, decoded.user, decoded.amount)
    };

    Ok(StakingRecord {
        meta: meta(log, "Staking")?,
        user,
        amount: amount.to_string(),
        event_type,
    })
}

/// Decode a ProofSubmitted log.
pub fn decode_proof_submitted(log: &Log) -> Result<PoiRecord, DecodeError> {
    const EVENT: &str = "ProofSubmitted";
    expect_topic(log, EVENT, &[ProofSubmitted::SIGNATURE_HASH])?;

    let decoded = ProofSubmitted::decode_log(log.as_ref(), true).map_err(abi(EVENT))?;

    Ok(PoiRecord {
        meta: meta(log, EVENT)?,
        operator: decoded.operator,
        target_chain_id: decoded.chainId,
        from_block: to_u64(decoded.fromBlock, EVENT, "fromBlock")?,
        to_block: to_u64(decoded.toBlock, EVENT, "toBlock")?,
        proof_hash: decoded.proofHash,
        timestamp: to_u64(decoded.timestamp, EVENT, "timestamp")?,
    })
}

/// Decode a ContributionRecorded log.
pub fn decode_contribution(log: &Log) -> Result<ContributionRecord, DecodeError> {
    const EVENT: &str = "ContributionRecorded";
    expect_topic(log, EVENT, &[ContributionRecorded::SIGNATURE_HASH])?;

    let decoded = ContributionRecorded::decode_log(log.as_ref(), true).map_err(abi(EVENT))?;

    Ok(ContributionRecord {
        meta: meta(log, EVENT)?,
        user: decoded.user,
        contribution_type: decoded.contributionType.clone(),
        weight: decoded.weight.to_string(),
        timestamp: to_u64(decoded.timestamp, EVENT, "timestamp")?,
    })
}

fn expect_topic(log: &Log, event: &'static str, accepted: &[B256]) -> Result<B256, DecodeError> {
    let found = topic0(log)?;
    if accepted.contains(&found) {
        Ok(found)
    } else {
        Err(DecodeError::TopicMismatch { event, found })
    }
}

fn meta(log: &Log, event: &'static str) -> Result<EventMeta, DecodeError> {
    let missing = |field| DecodeError::MissingField { event, field };

    Ok(EventMeta {
        block_number: log.block_number.ok_or_else(|| missing("block_number"))?,
        tx_hash: log.transaction_hash.ok_or_else(|| missing("transaction_hash"))?,
        log_index: log.log_index.ok_or_else(|| missing("log_index"))?,
        contract: contract_address(log),
    })
}

fn contract_address(log: &Log) -> Address {
    log.inner.address
}

fn abi(event: &'static str) -> impl FnOnce(alloy::sol_types::Error) -> DecodeError {
    move |source| DecodeError::Abi { event, source }
}

fn to_u64(value: U256, event: &'static str, field: &'static str) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::Overflow { event, field })
}
