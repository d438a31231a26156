//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
///
/// Every variant is a validation failure: evaluation either produces a
/// complete output or one of these, never a partial result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Wallet is not a valid EVM address.
    #[error("wallet must be a valid address (got '{0}')")]
    InvalidWallet(String),

    /// A required field was missing or empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Window bounds are inconsistent.
    #[error("invalid window: {0}")]
    InvalidWindow(String),

    /// A criteria parameter is present in neither the preset nor the overrides.
    #[error("criteria param {0} could not be resolved")]
    UnresolvedCriteria(&'static str),

    /// A summary field was negative.
    #[error("usage summary field {0} must be non-negative")]
    NegativeValue(&'static str),

    /// A raw transaction entry was malformed.
    #[error("invalid transaction at index {index}: {reason}")]
    InvalidTransaction {
        /// Position in the supplied transaction list.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Serialization of an output document failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
