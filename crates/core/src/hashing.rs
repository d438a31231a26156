//! Proof hashing for usage outputs.
//!
//! The digest is keccak256 over the UTF-8 bytes of the canonical JSON with
//! `proof.canonical_hash` blanked, rendered as 0x-prefixed lowercase hex.

use alloy_primitives::{keccak256 as alloy_keccak256, B256};

use crate::canonical::canonicalize_usage_output;
use crate::error::Result;
use crate::types::UsageOutputV1;

/// Compute keccak256 hash of input data.
///
/// # Example
///
/// ```
/// use indexflow_core::hashing::keccak256;
///
/// let hash = keccak256(b"hello");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn keccak256(data: &[u8]) -> B256 {
    alloy_keccak256(data)
}

/// keccak256 of a string as 0x-prefixed lowercase hex.
pub fn keccak256_hex(data: &str) -> String {
    format!("0x{}", hex::encode(keccak256(data.as_bytes())))
}

/// Canonical JSON of an output and the digest over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageOutputHash {
    /// Canonical form with the hash field blanked.
    pub canonical_json: String,
    /// Hex digest of `canonical_json`.
    pub hash: String,
}

/// Canonicalize `output` with its hash field blanked and digest it.
pub fn usage_output_hash(output: &UsageOutputV1) -> Result<UsageOutputHash> {
    let mut blanked = output.clone();
    blanked.proof.canonical_hash.clear();

    let canonical_json = canonicalize_usage_output(&blanked)?;
    let hash = keccak256_hex(&canonical_json);

    Ok(UsageOutputHash {
        canonical_json,
        hash,
    })
}

/// Return `output` with `proof.canonical_hash` set to its digest.
pub fn seal_usage_output(mut output: UsageOutputV1) -> Result<UsageOutputV1> {
    output.proof.canonical_hash = usage_output_hash(&output)?.hash;
    Ok(output)
}

/// Whether the recorded hash matches a fresh digest of the output.
pub fn verify_usage_output(output: &UsageOutputV1) -> Result<bool> {
    let expected = usage_output_hash(output)?.hash;
    Ok(expected.eq_ignore_ascii_case(&output.proof.canonical_hash))
}
