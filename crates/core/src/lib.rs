//! # IndexFlow Core
//!
//! Deterministic usage evaluation, canonical JSON, and proof hashing for
//! IndexFlow usage proofs.
//!
//! Everything in this crate is pure and synchronous, so it can be called
//! concurrently from any number of evaluation requests without coordination.
//!
//! ## Features
//!
//! - **Data model**: `UsageOutputV1` and the input shapes that produce it
//! - **Evaluation**: window resolution, criteria presets, activity folding
//! - **Canonical JSON**: fixed key order per known object shape
//! - **Proof hashing**: keccak256 over the canonical form with the hash blanked
//!
//! ## Example
//!
//! ```
//! use indexflow_core::*;
//!
//! let input = UsageEvaluationInput {
//!     wallet: "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".into(),
//!     campaign_id: "airdrop_v1".into(),
//!     window: UsageWindowInput::ending_at(UsageWindowType::Last7Days, 1_700_000_000),
//!     criteria: None,
//!     activity: UsageActivity::Summary { summary: UsageSummaryInput::default() },
//! };
//!
//! let output = evaluate_usage_v1(&input).unwrap();
//! assert!(verify_usage_output(&output).unwrap());
//! ```

#![warn(missing_docs)]

pub mod canonical;
pub mod constants;
pub mod criteria;
pub mod error;
pub mod evaluator;
pub mod hashing;
pub mod types;

pub use canonical::{canonicalize, canonicalize_usage_output, canonicalize_value};
pub use constants::*;
pub use criteria::{CriteriaPreset, CriteriaPresets};
pub use error::{CoreError, Result};
pub use evaluator::{evaluate_usage_v1, normalize_wallet, resolve_window, Evaluator};
pub use hashing::{
    keccak256, keccak256_hex, seal_usage_output, usage_output_hash, verify_usage_output,
    UsageOutputHash,
};
pub use types::*;

// Re-export Alloy primitives for convenience
pub use alloy_primitives::{Address, B256};
