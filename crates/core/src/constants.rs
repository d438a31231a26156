//! Protocol constants for IndexFlow usage proofs.
//!
//! Any change to these values changes every canonical hash produced by the
//! engine, so they are versioned together with [`OUTPUT_VERSION`].

/// Protocol tag embedded in every usage output.
pub const PROTOCOL: &str = "indexflow";

/// Version of the `UsageOutputV1` document layout.
pub const OUTPUT_VERSION: &str = "1.0";

/// Version of the evaluation engine recorded in resolved criteria.
pub const ENGINE_VERSION: &str = "v1";

/// Digest algorithm recorded in `proof.hash_algorithm`.
pub const HASH_ALGORITHM: &str = "keccak256";

/// Criteria set used when the caller does not name one.
pub const DEFAULT_CRITERIA_SET_ID: &str = "airdrop/basic@1";

/// Seconds in one UTC day bucket.
pub const DAY_SECONDS: i64 = 24 * 60 * 60;

/// Length of the `last_7_days` window.
pub const WINDOW_7_DAYS_SECONDS: i64 = 7 * DAY_SECONDS;

/// Length of the `last_14_days` window.
pub const WINDOW_14_DAYS_SECONDS: i64 = 14 * DAY_SECONDS;

/// Length of the `last_30_days` window.
pub const WINDOW_30_DAYS_SECONDS: i64 = 30 * DAY_SECONDS;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_lengths() {
        assert_eq!(WINDOW_7_DAYS_SECONDS, 604_800);
        assert_eq!(WINDOW_14_DAYS_SECONDS, 1_209_600);
        assert_eq!(WINDOW_30_DAYS_SECONDS, 2_592_000);
    }
}
