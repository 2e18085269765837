//! The abstract ledger capability.

use async_trait::async_trait;

use vigil_core::{Address, CameraId, EvidenceRecord, LedgerError, VideoHash};

/// Ledger-assigned identifiers returned by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Ordinal position of the record in the ledger.
    pub sequence_number: u64,
    /// Commit timestamp (unix seconds) assigned by the ledger.
    pub commit_time: u64,
    /// Account that committed the record.
    pub submitter: Address,
    /// Transaction reference of the committing write.
    pub tx_ref: String,
}

/// Narrow interface over the authoritative evidence ledger.
///
/// The ledger is an opaque append-only key-value store reached through a
/// fixed contract-call surface. `exists`, `get`, `count` and `key_at` are
/// pure reads and safe to retry; `submit` is not idempotent and must be
/// serialized by the caller (one signing identity, strictly ordered
/// nonces). Every call may block for external confirmation latency and may
/// fail with [`LedgerError::Unavailable`].
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Commit a new evidence record.
    ///
    /// Fails with `DuplicateKey` if the hash is already recorded,
    /// `InvalidArgument` for a zero hash, empty camera id, or a timestamp
    /// of zero or later than the ledger's notion of now, `Unavailable` if
    /// the call never took effect, and `ConfirmationTimeout` if the
    /// transaction was sent but its outcome is unknown.
    async fn submit(
        &self,
        hash: VideoHash,
        camera_id: &CameraId,
        captured_at: u64,
    ) -> Result<SubmitOutcome, LedgerError>;

    /// Whether a record exists for the hash.
    async fn exists(&self, hash: VideoHash) -> Result<bool, LedgerError>;

    /// Fetch the record for a hash; `NotFound` if absent.
    async fn get(&self, hash: VideoHash) -> Result<EvidenceRecord, LedgerError>;

    /// Total number of committed records.
    async fn count(&self) -> Result<u64, LedgerError>;

    /// Record key at the given ordinal index; `OutOfRange` past the end.
    async fn key_at(&self, index: u64) -> Result<VideoHash, LedgerError>;

    /// Whether this client can submit writes (a signing identity is
    /// attached). Read-only clients answer every `submit` with
    /// `Unavailable`.
    fn can_submit(&self) -> bool;
}
