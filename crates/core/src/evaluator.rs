//! Usage evaluation engine.
//!
//! A pure function from wallet activity and criteria to a sealed
//! [`UsageOutputV1`]. Identical inputs always produce identical outputs.

use alloy_primitives::Address;
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::constants::{DAY_SECONDS, HASH_ALGORITHM, OUTPUT_VERSION, PROTOCOL};
use crate::criteria::CriteriaPresets;
use crate::error::{CoreError, Result};
use crate::hashing::seal_usage_output;
use crate::types::{
    UsageActivity, UsageEvaluationInput, UsageOutputV1, UsageProof, UsageSummary,
    UsageSummaryInput, UsageTransaction, UsageWindow, UsageWindowInput, UsageWindowType,
};

/// Evaluate with the built-in criteria presets.
pub fn evaluate_usage_v1(input: &UsageEvaluationInput) -> Result<UsageOutputV1> {
    Evaluator::default().evaluate(input)
}

/// Evaluation engine bound to a set of criteria presets.
#[derive(Debug, Clone)]
pub struct Evaluator {
    presets: CriteriaPresets,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(CriteriaPresets::builtin())
    }
}

impl Evaluator {
    /// Create an evaluator with the given presets.
    pub fn new(presets: CriteriaPresets) -> Self {
        Self { presets }
    }

    /// Presets used to resolve criteria.
    pub fn presets(&self) -> &CriteriaPresets {
        &self.presets
    }

    /// Evaluate one wallet and seal the result with its proof hash.
    pub fn evaluate(&self, input: &UsageEvaluationInput) -> Result<UsageOutputV1> {
        let wallet = normalize_wallet(&input.wallet)?;
        let campaign_id = input.campaign_id.trim();
        if campaign_id.is_empty() {
            return Err(CoreError::MissingField("campaign_id"));
        }

        let window = resolve_window(&input.window)?;
        let criteria = self.presets.resolve(input.criteria.as_ref())?;
        let usage_summary = resolve_summary(&input.activity, &window)?;
        let verified_usage = criteria.params.is_met_by(&usage_summary);

        seal_usage_output(UsageOutputV1 {
            protocol: PROTOCOL.to_string(),
            output_version: OUTPUT_VERSION.to_string(),
            wallet,
            campaign_id: campaign_id.to_string(),
            window,
            verified_usage,
            usage_summary,
            criteria,
            proof: UsageProof {
                hash_algorithm: HASH_ALGORITHM.to_string(),
                canonical_hash: String::new(),
            },
        })
    }
}

/// Trim and checksum a wallet address.
///
/// Mixed-case input must already carry a valid checksum; all-lower or
/// all-upper hex is accepted as is.
pub fn normalize_wallet(wallet: &str) -> Result<String> {
    let trimmed = wallet.trim();
    if trimmed.is_empty() {
        return Err(CoreError::MissingField("wallet"));
    }

    let invalid = || CoreError::InvalidWallet(trimmed.to_string());
    let body = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let address = Address::from_str(body).map_err(|_| invalid())?;
    let checksummed = address.to_checksum(None);

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && checksummed[2..] != *body {
        return Err(invalid());
    }

    Ok(checksummed)
}

/// Resolve a caller window into concrete bounds.
pub fn resolve_window(input: &UsageWindowInput) -> Result<UsageWindow> {
    let end = input.end.ok_or(CoreError::MissingField("window.end"))?;

    let start = match (input.window_type.length_seconds(), input.start) {
        (_, Some(start)) => start,
        (Some(length), None) => end.saturating_sub(length),
        (None, None) => return Err(CoreError::MissingField("window.start")),
    };

    if start > end {
        return Err(CoreError::InvalidWindow(format!(
            "start {start} is after end {end}"
        )));
    }

    Ok(UsageWindow {
        window_type: input.window_type,
        start,
        end,
    })
}

fn resolve_summary(activity: &UsageActivity, window: &UsageWindow) -> Result<UsageSummary> {
    match activity {
        UsageActivity::Transactions { transactions } => summarize_transactions(transactions, window),
        UsageActivity::Summary { summary } => validate_summary(summary),
    }
}

/// Fold raw transactions that fall inside the window.
pub fn summarize_transactions(
    transactions: &[UsageTransaction],
    window: &UsageWindow,
) -> Result<UsageSummary> {
    let mut days = BTreeSet::new();
    let mut contracts = BTreeSet::new();
    let mut tx_count = 0u64;

    for (index, tx) in transactions.iter().enumerate() {
        if !window.contains(tx.timestamp) {
            continue;
        }

        let contract = tx.contract_address.trim().to_lowercase();
        if contract.is_empty() {
            return Err(CoreError::InvalidTransaction {
                index,
                reason: "contractAddress is required".to_string(),
            });
        }

        tx_count += 1;
        days.insert(tx.timestamp.div_euclid(DAY_SECONDS));
        contracts.insert(contract);
    }

    Ok(UsageSummary {
        days_active: days.len() as u64,
        tx_count,
        unique_contracts: contracts.len() as u64,
    })
}

fn validate_summary(summary: &UsageSummaryInput) -> Result<UsageSummary> {
    let field = |value: Option<i64>, label: &'static str| match value {
        None => Ok(0),
        Some(v) => u64::try_from(v).map_err(|_| CoreError::NegativeValue(label)),
    };

    Ok(UsageSummary {
        days_active: field(summary.days_active, "days_active")?,
        tx_count: field(summary.tx_count, "tx_count")?,
        unique_contracts: field(summary.unique_contracts, "unique_contracts")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::verify_usage_output;
    use crate::types::{UsageCriteriaInput, UsageCriteriaParamsInput};

    const WALLET_LOWER: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const WALLET_CHECKSUM: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn summary_input(days: i64, txs: i64, contracts: i64) -> UsageEvaluationInput {
        UsageEvaluationInput {
            wallet: WALLET_LOWER.to_string(),
            campaign_id: "airdrop_v1".to_string(),
            window: UsageWindowInput::ending_at(UsageWindowType::Last30Days, 1_700_000_000),
            criteria: Some(UsageCriteriaInput {
                criteria_set_id: None,
                params: UsageCriteriaParamsInput {
                    min_days_active: Some(2),
                    min_tx_count: Some(3),
                    min_unique_contracts: Some(1),
                },
            }),
            activity: UsageActivity::Summary {
                summary: UsageSummaryInput {
                    days_active: Some(days),
                    tx_count: Some(txs),
                    unique_contracts: Some(contracts),
                },
            },
        }
    }

    #[test]
    fn test_normalize_wallet() {
        assert_eq!(normalize_wallet(WALLET_LOWER).unwrap(), WALLET_CHECKSUM);
        assert_eq!(normalize_wallet(WALLET_CHECKSUM).unwrap(), WALLET_CHECKSUM);
        assert_eq!(
            normalize_wallet(&format!("  {}  ", &WALLET_LOWER[2..])).unwrap(),
            WALLET_CHECKSUM
        );
        assert_eq!(
            normalize_wallet(&WALLET_LOWER.to_uppercase().replace("0X", "0x")).unwrap(),
            WALLET_CHECKSUM
        );
    }

    #[test]
    fn test_normalize_wallet_rejects_bad_input() {
        assert!(normalize_wallet("").is_err());
        assert!(normalize_wallet("0x1234").is_err());
        assert!(normalize_wallet("0xzzaeb6053f3e94c9b9a09f33669435e7ef1beaed").is_err());
        // one character flipped in a checksummed address
        assert!(normalize_wallet("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeD").is_err());
    }

    #[test]
    fn test_resolve_named_window() {
        let window =
            resolve_window(&UsageWindowInput::ending_at(UsageWindowType::Last30Days, 3_000_000))
                .unwrap();
        assert_eq!(window.start, 3_000_000 - 2_592_000);
        assert_eq!(window.end, 3_000_000);
    }

    #[test]
    fn test_resolve_window_errors() {
        let missing_end = UsageWindowInput {
            window_type: UsageWindowType::Last7Days,
            start: None,
            end: None,
        };
        assert_eq!(
            resolve_window(&missing_end).unwrap_err(),
            CoreError::MissingField("window.end")
        );

        let custom_without_start = UsageWindowInput {
            window_type: UsageWindowType::Custom,
            start: None,
            end: Some(10),
        };
        assert_eq!(
            resolve_window(&custom_without_start).unwrap_err(),
            CoreError::MissingField("window.start")
        );

        let inverted = UsageWindowInput {
            window_type: UsageWindowType::Custom,
            start: Some(11),
            end: Some(10),
        };
        assert!(matches!(
            resolve_window(&inverted),
            Err(CoreError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_summarize_transactions() {
        let window = UsageWindow {
            window_type: UsageWindowType::Custom,
            start: DAY_SECONDS,
            end: 3 * DAY_SECONDS,
        };
        let txs = vec![
            UsageTransaction {
                timestamp: DAY_SECONDS,
                contract_address: "0xAA".into(),
            },
            UsageTransaction {
                timestamp: DAY_SECONDS + 5,
                contract_address: " 0xaa ".into(),
            },
            UsageTransaction {
                timestamp: 3 * DAY_SECONDS,
                contract_address: "0xbb".into(),
            },
            // outside the window, not validated
            UsageTransaction {
                timestamp: 3 * DAY_SECONDS + 1,
                contract_address: "".into(),
            },
        ];

        let summary = summarize_transactions(&txs, &window).unwrap();
        assert_eq!(summary.tx_count, 3);
        assert_eq!(summary.days_active, 2);
        assert_eq!(summary.unique_contracts, 2);
    }

    #[test]
    fn test_empty_contract_in_window_rejected() {
        let window = UsageWindow {
            window_type: UsageWindowType::Custom,
            start: 0,
            end: 100,
        };
        let txs = vec![UsageTransaction {
            timestamp: 50,
            contract_address: "   ".into(),
        }];
        assert!(matches!(
            summarize_transactions(&txs, &window),
            Err(CoreError::InvalidTransaction { index: 0, .. })
        ));
    }

    #[test]
    fn test_verified_usage_thresholds() {
        let output = evaluate_usage_v1(&summary_input(2, 3, 1)).unwrap();
        assert!(output.verified_usage);

        let output = evaluate_usage_v1(&summary_input(2, 2, 1)).unwrap();
        assert!(!output.verified_usage);
    }

    #[test]
    fn test_negative_summary_rejected() {
        let err = evaluate_usage_v1(&summary_input(2, -1, 1)).unwrap_err();
        assert_eq!(err, CoreError::NegativeValue("tx_count"));
    }

    #[test]
    fn test_missing_summary_fields_are_zero() {
        let mut input = summary_input(0, 0, 0);
        input.activity = UsageActivity::Summary {
            summary: UsageSummaryInput::default(),
        };
        let output = evaluate_usage_v1(&input).unwrap();
        assert_eq!(output.usage_summary, UsageSummary::default());
    }

    #[test]
    fn test_output_is_sealed() {
        let output = evaluate_usage_v1(&summary_input(2, 3, 1)).unwrap();
        assert_eq!(output.protocol, "indexflow");
        assert_eq!(output.output_version, "1.0");
        assert_eq!(output.wallet, WALLET_CHECKSUM);
        assert_eq!(output.proof.hash_algorithm, "keccak256");
        assert!(verify_usage_output(&output).unwrap());
    }

    #[test]
    fn test_blank_campaign_rejected() {
        let mut input = summary_input(1, 1, 1);
        input.campaign_id = "   ".into();
        assert_eq!(
            evaluate_usage_v1(&input).unwrap_err(),
            CoreError::MissingField("campaign_id")
        );
    }
}
