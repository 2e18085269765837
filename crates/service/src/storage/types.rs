//! Row types and errors for the evidence mirror.

use thiserror::Error;
use vigil_core::{Address, CameraId, EvidenceRecord, RecordStatus, VideoHash};

/// One row of the `evidence_mirror` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRow {
    pub video_hash: VideoHash,
    pub camera_id: CameraId,
    pub captured_at: u64,
    /// Transaction reference of the submission, once one was sent.
    pub submit_tx_ref: Option<String>,
    /// Ledger-assigned ordinal, populated on confirmation.
    pub sequence_number: Option<u64>,
    pub submitter: Option<Address>,
    /// Ledger commit timestamp, populated on confirmation.
    pub commit_time: Option<u64>,
    pub status: RecordStatus,
    /// Local wall-clock time the row was first written (unix seconds).
    pub inserted_at: u64,
}

impl MirrorRow {
    /// Reconstruct the full ledger record from a confirmed row.
    ///
    /// Returns `None` if the row is not confirmed or any ledger-assigned
    /// field is missing.
    pub fn as_evidence_record(&self) -> Option<EvidenceRecord> {
        if self.status != RecordStatus::Confirmed {
            return None;
        }
        Some(EvidenceRecord {
            hash: self.video_hash,
            camera_id: self.camera_id.clone(),
            captured_at: self.captured_at,
            submitter: self.submitter?,
            sequence_number: self.sequence_number?,
            commit_time: self.commit_time?,
        })
    }
}

/// Errors from mirror operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A row for this hash already exists, in any status.
    #[error("mirror row for {0} already exists")]
    AlreadyExists(VideoHash),

    #[error("no mirror row for {0}")]
    NotFound(VideoHash),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
