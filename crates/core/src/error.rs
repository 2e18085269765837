//! Error types shared across the Vigil workspace.

use thiserror::Error;

use crate::types::VideoHash;

/// Errors raised while constructing or parsing core types.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Camera identifier was empty or whitespace-only.
    #[error("camera id cannot be empty")]
    EmptyCameraId,

    /// Input could not be parsed as a 32-byte hex hash.
    #[error("invalid video hash: {0}")]
    InvalidHash(String),

    /// Unrecognized record status string.
    #[error("unknown record status: {0}")]
    UnknownStatus(String),
}

/// Failures of the authoritative ledger, as seen through the Ledger Client.
///
/// Callers must distinguish "ledger says no" (`DuplicateKey`,
/// `InvalidArgument`, `NotFound`, `OutOfRange` -- definitive answers) from
/// "ledger unreachable" (`Unavailable` -- triggers cache fallback) and
/// "outcome unknown" (`ConfirmationTimeout` -- the transaction may still
/// land; the caller must not assume failure).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger already holds a record for this hash.
    #[error("hash {hash} already recorded on the ledger")]
    DuplicateKey {
        /// The hash that was rejected.
        hash: VideoHash,
    },

    /// The ledger rejected the submission arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No record exists for the requested hash.
    #[error("evidence record not found")]
    NotFound,

    /// Index-based read past the end of the ledger.
    #[error("index {index} out of range (ledger holds {count} records)")]
    OutOfRange {
        /// Requested index.
        index: u64,
        /// Record count at the time of the call.
        count: u64,
    },

    /// Transport or consensus failure; the call did not take effect.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The transaction was sent but no receipt arrived within the bounded
    /// wait. The write may still land later.
    #[error("submission unconfirmed after timeout (tx {tx_ref})")]
    ConfirmationTimeout {
        /// Transaction reference of the in-flight submission.
        tx_ref: String,
    },
}

impl LedgerError {
    /// True when the error means the ledger could not be consulted at all,
    /// as opposed to a definitive negative answer.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            LedgerError::Unavailable(_) | LedgerError::ConfirmationTimeout { .. }
        )
    }
}
