//! Evidence verification with ledger-first semantics.
//!
//! The ledger is authoritative; the mirror only breaks ties when the ledger
//! cannot be reached, and every answer says which source produced it.
//! Ledger hits that the mirror has not caught up with are written back
//! (self-healing), which is also how rows stuck `pending` or `failed` after
//! an interrupted submission get resolved.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

use crate::storage::{MirrorRow, Storage, StorageError};
use vigil_core::{content_hash, EvidenceRecord, RecordStatus, SourceTag, VideoHash};
use vigil_ledger::LedgerClient;

/// Answer to a verification query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified {
        evidence: EvidenceRecord,
        source: SourceTag,
        degraded: bool,
    },
    NotVerified {
        reason: NotVerifiedReason,
    },
}

/// Why a hash could not be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotVerifiedReason {
    /// No trace of the hash anywhere.
    NeverRecorded,
    /// A submission for this hash was sent and has not resolved yet.
    SubmissionInFlight,
    /// A submission for this hash was rejected by the ledger.
    SubmissionFailed,
}

impl NotVerifiedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeverRecorded => "never_recorded",
            Self::SubmissionInFlight => "submission_in_flight",
            Self::SubmissionFailed => "submission_failed",
        }
    }
}

/// Errors from verification.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The ledger is unreachable and the mirror holds no confirmed record,
    /// so neither presence nor absence can be established.
    #[error("verification unavailable: {cause}")]
    Unavailable { cause: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Answers "was this exact file ever recorded?".
pub struct VerificationEngine {
    ledger: Arc<dyn LedgerClient>,
    storage: Storage,
}

impl VerificationEngine {
    pub fn new(ledger: Arc<dyn LedgerClient>, storage: Storage) -> Self {
        Self { ledger, storage }
    }

    /// Hash the content and verify it.
    pub async fn verify(&self, content: &[u8]) -> Result<VerificationOutcome, VerifyError> {
        self.verify_hash(content_hash(content)).await
    }

    /// Verify an already-computed hash.
    pub async fn verify_hash(&self, hash: VideoHash) -> Result<VerificationOutcome, VerifyError> {
        let row = self.storage.get(hash).await?;

        match self.ledger.exists(hash).await {
            Ok(true) => match self.ledger.get(hash).await {
                Ok(record) => {
                    self.reconcile(&record, row.as_ref()).await;

                    let source = if row.is_some() {
                        SourceTag::CacheLedger
                    } else {
                        SourceTag::Ledger
                    };
                    Ok(VerificationOutcome::Verified {
                        evidence: record,
                        source,
                        degraded: false,
                    })
                }
                // Removed between exists and get cannot happen on an
                // append-only ledger; treat it as a miss.
                Err(e) if !e.is_unreachable() => {
                    warn!(%hash, error = %e, "Ledger existence and read disagree");
                    Ok(self.not_verified(hash, row.as_ref()))
                }
                Err(e) => self.fallback(hash, row.as_ref(), &e.to_string()),
            },
            Ok(false) => Ok(self.not_verified(hash, row.as_ref())),
            Err(e) => self.fallback(hash, row.as_ref(), &e.to_string()),
        }
    }

    /// Write a ledger-discovered record back into the mirror. Failures are
    /// logged, never surfaced: the verification answer stands on its own.
    async fn reconcile(&self, record: &EvidenceRecord, row: Option<&MirrorRow>) {
        let up_to_date = row.is_some_and(|r| r.status == RecordStatus::Confirmed);
        if up_to_date {
            return;
        }

        debug!(hash = %record.hash, "Reconciling ledger record into mirror");
        if let Err(e) = self.storage.insert_confirmed(record, now_unix()).await {
            warn!(hash = %record.hash, error = %e, "Mirror reconciliation failed");
        }
    }

    fn not_verified(&self, hash: VideoHash, row: Option<&MirrorRow>) -> VerificationOutcome {
        let reason = match row.map(|r| r.status) {
            None => NotVerifiedReason::NeverRecorded,
            Some(RecordStatus::Pending) => NotVerifiedReason::SubmissionInFlight,
            Some(RecordStatus::Failed) => NotVerifiedReason::SubmissionFailed,
            Some(RecordStatus::Confirmed) => {
                // A confirmed mirror row the ledger denies. Ledger truth
                // outranks mirror truth.
                warn!(%hash, "Mirror claims confirmed but ledger has no record");
                NotVerifiedReason::NeverRecorded
            }
        };
        VerificationOutcome::NotVerified { reason }
    }

    fn fallback(
        &self,
        hash: VideoHash,
        row: Option<&MirrorRow>,
        cause: &str,
    ) -> Result<VerificationOutcome, VerifyError> {
        if let Some(evidence) = row.and_then(MirrorRow::as_evidence_record) {
            warn!(%hash, cause, "Ledger unreachable, answering from mirror");
            return Ok(VerificationOutcome::Verified {
                evidence,
                source: SourceTag::CacheOnly,
                degraded: true,
            });
        }

        // Without the ledger we cannot prove absence.
        Err(VerifyError::Unavailable {
            cause: cause.to_string(),
        })
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
