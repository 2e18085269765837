//! Evidence synchronization: write-ahead mirror insert, then ledger submit.
//!
//! Submissions are serialized through a single lock so only one ledger
//! transaction is in flight at a time. The mirror row is written in
//! `pending` state before the submission is attempted, which keeps a local
//! trace of every attempt even when the process dies mid-flight.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::storage::{Storage, StorageError};
use vigil_core::{content_hash, Address, CameraId, LedgerError, RecordStatus, VideoHash};
use vigil_ledger::LedgerClient;

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReceipt {
    pub hash: VideoHash,
    pub camera_id: CameraId,
    pub captured_at: u64,
    pub sequence_number: u64,
    pub commit_time: u64,
    pub submitter: Address,
    pub tx_ref: String,
}

/// Errors from [`Synchronizer::record`].
#[derive(Debug, Error)]
pub enum RecordError {
    /// A record for this hash already exists locally or on the ledger.
    #[error("evidence {hash} already recorded (status: {status})")]
    AlreadyRecorded {
        hash: VideoHash,
        status: RecordStatus,
    },

    /// The transaction was sent but its confirmation was not observed in
    /// time. The mirror row stays `pending` until reconciliation resolves
    /// it against the ledger.
    #[error("submission {tx_ref} sent, confirmation still pending")]
    ConfirmationPending { hash: VideoHash, tx_ref: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Records video evidence to the ledger and keeps the mirror in step.
pub struct Synchronizer {
    ledger: Arc<dyn LedgerClient>,
    storage: Storage,
    submit_lock: Mutex<()>,
}

impl Synchronizer {
    pub fn new(ledger: Arc<dyn LedgerClient>, storage: Storage) -> Self {
        Self {
            ledger,
            storage,
            submit_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Hash the video content and record it.
    ///
    /// `captured_at` defaults to the current wall clock when no explicit
    /// capture time is supplied.
    pub async fn record(
        &self,
        content: &[u8],
        camera_id: &CameraId,
        captured_at: Option<u64>,
    ) -> Result<RecordReceipt, RecordError> {
        let hash = content_hash(content);
        self.record_hash(hash, camera_id, captured_at).await
    }

    /// Record an already-computed hash.
    pub async fn record_hash(
        &self,
        hash: VideoHash,
        camera_id: &CameraId,
        captured_at: Option<u64>,
    ) -> Result<RecordReceipt, RecordError> {
        // The ledger rejects the all-zero key; refusing it here keeps the
        // invalid hash from ever reserving a mirror row.
        if hash.is_zero() {
            return Err(RecordError::Ledger(LedgerError::InvalidArgument(
                "hash cannot be empty".to_string(),
            )));
        }

        let now = now_unix();
        let captured_at = captured_at.unwrap_or(now);

        // The unique key on the mirror is the dedup gate; a concurrent
        // attempt for the same hash loses here, before any ledger traffic.
        match self
            .storage
            .insert_pending(hash, camera_id, captured_at, now)
            .await
        {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => {
                let status = match self.storage.get(hash).await? {
                    Some(row) => row.status,
                    // Row disappeared between insert and read; treat as
                    // confirmed elsewhere and let the caller re-verify.
                    None => RecordStatus::Confirmed,
                };
                return Err(RecordError::AlreadyRecorded { hash, status });
            }
            Err(e) => return Err(e.into()),
        }

        info!(%hash, camera = %camera_id, "Submitting evidence to ledger");

        // One ledger transaction in flight at a time: a single signing
        // identity means strictly ordered nonces.
        let _guard = self.submit_lock.lock().await;

        match self.ledger.submit(hash, camera_id, captured_at).await {
            Ok(outcome) => {
                self.storage
                    .mark_confirmed(
                        hash,
                        &outcome.tx_ref,
                        outcome.sequence_number,
                        outcome.submitter,
                        outcome.commit_time,
                    )
                    .await?;

                info!(
                    %hash,
                    sequence = outcome.sequence_number,
                    tx = %outcome.tx_ref,
                    "Evidence confirmed on ledger"
                );

                Ok(RecordReceipt {
                    hash,
                    camera_id: camera_id.clone(),
                    captured_at,
                    sequence_number: outcome.sequence_number,
                    commit_time: outcome.commit_time,
                    submitter: outcome.submitter,
                    tx_ref: outcome.tx_ref,
                })
            }
            Err(LedgerError::ConfirmationTimeout { tx_ref }) => {
                // The transaction may still land. Keep the row pending and
                // remember the transaction so the attempt stays traceable.
                if let Err(e) = self.storage.record_tx_ref(hash, &tx_ref).await {
                    warn!(%hash, error = %e, "Could not attach tx ref to pending row");
                }
                warn!(%hash, tx = %tx_ref, "Submission confirmation timed out");
                Err(RecordError::ConfirmationPending { hash, tx_ref })
            }
            Err(e) => {
                warn!(%hash, error = %e, "Ledger submission failed");
                self.storage.mark_failed(hash).await?;
                Err(e.into())
            }
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::verify::{VerificationEngine, VerificationOutcome};
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use vigil_ledger::mock::MockLedger;

    async fn setup() -> (Arc<MockLedger>, Synchronizer, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path()).await.unwrap();
        storage.run_migrations().await.unwrap();

        let ledger = Arc::new(MockLedger::new());
        let sync = Synchronizer::new(ledger.clone(), storage);
        (ledger, sync, temp_db)
    }

    fn camera() -> CameraId {
        CameraId::new("CAM-001").unwrap()
    }

    #[tokio::test]
    async fn record_confirms_and_mirrors() {
        let (ledger, sync, _db) = setup().await;
        let now = ledger.clock().await;

        let receipt = sync
            .record(b"dashcam footage", &camera(), Some(now - 60))
            .await
            .unwrap();

        assert_eq!(receipt.hash, content_hash(b"dashcam footage"));
        assert_eq!(receipt.sequence_number, 0);
        assert_eq!(receipt.captured_at, now - 60);

        let row = sync.storage().get(receipt.hash).await.unwrap().unwrap();
        assert_eq!(row.status, RecordStatus::Confirmed);
        assert_eq!(row.submit_tx_ref.as_deref(), Some(receipt.tx_ref.as_str()));
        assert_eq!(row.sequence_number, Some(0));
    }

    #[tokio::test]
    async fn duplicate_rejected_without_second_submission() {
        let (ledger, sync, _db) = setup().await;
        let now = ledger.clock().await;

        sync.record(b"clip", &camera(), Some(now - 60)).await.unwrap();

        let err = sync
            .record(b"clip", &camera(), Some(now - 30))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::AlreadyRecorded {
                status: RecordStatus::Confirmed,
                ..
            }
        ));

        // The mirror caught the duplicate; the ledger saw a single submit.
        assert_eq!(ledger.submit_calls().await, 1);
    }

    #[tokio::test]
    async fn ledger_known_duplicate_propagates_and_fails_row() {
        let (ledger, sync, _db) = setup().await;
        let now = ledger.clock().await;
        let hash = content_hash(b"clip");

        // Recorded by another instance: on the ledger, not in our mirror.
        ledger.seed_record(hash, camera(), now - 120).await;

        let err = sync
            .record(b"clip", &camera(), Some(now - 60))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::Ledger(LedgerError::DuplicateKey { .. })
        ));

        // The failed row is healed later by verification's reconciliation.
        let row = sync.storage().get(hash).await.unwrap().unwrap();
        assert_eq!(row.status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn rejected_submission_marks_row_failed() {
        let (ledger, sync, _db) = setup().await;
        let now = ledger.clock().await;
        let hash = content_hash(b"clip");

        // Capture time in the future is rejected by the ledger.
        let err = sync
            .record(b"clip", &camera(), Some(now + 3600))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::Ledger(LedgerError::InvalidArgument(_))
        ));

        let row = sync.storage().get(hash).await.unwrap().unwrap();
        assert_eq!(row.status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn unavailable_ledger_marks_row_failed() {
        let (ledger, sync, _db) = setup().await;
        ledger.set_unavailable(true).await;

        let err = sync.record(b"clip", &camera(), None).await.unwrap_err();
        assert!(matches!(
            err,
            RecordError::Ledger(LedgerError::Unavailable(_))
        ));

        let row = sync
            .storage()
            .get(content_hash(b"clip"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn confirmation_timeout_leaves_row_pending() {
        let (ledger, sync, _db) = setup().await;
        let now = ledger.clock().await;
        let hash = content_hash(b"clip");

        ledger.timeout_next_submit().await;
        let err = sync
            .record(b"clip", &camera(), Some(now - 60))
            .await
            .unwrap_err();

        let tx_ref = match err {
            RecordError::ConfirmationPending { tx_ref, .. } => tx_ref,
            other => panic!("expected ConfirmationPending, got {other:?}"),
        };

        let row = sync.storage().get(hash).await.unwrap().unwrap();
        assert_eq!(row.status, RecordStatus::Pending);
        assert_eq!(row.submit_tx_ref.as_deref(), Some(tx_ref.as_str()));
    }

    #[tokio::test]
    async fn zero_hash_rejected_before_mirror_write() {
        let (ledger, sync, _db) = setup().await;
        let zero = VideoHash::from([0u8; 32]);

        let err = sync.record_hash(zero, &camera(), None).await.unwrap_err();
        assert!(matches!(
            err,
            RecordError::Ledger(LedgerError::InvalidArgument(_))
        ));

        // No mirror row reserved the invalid key, and the ledger never saw
        // the attempt.
        assert!(sync.storage().get(zero).await.unwrap().is_none());
        assert_eq!(ledger.submit_calls().await, 0);
    }

    #[tokio::test]
    async fn reads_are_not_serialized_behind_a_submission() {
        let (ledger, sync, _db) = setup().await;
        let now = ledger.clock().await;
        let sync = Arc::new(sync);

        sync.record(b"earlier clip", &camera(), Some(now - 120))
            .await
            .unwrap();

        // Park the next submission inside the ledger while the writer lock
        // is held.
        ledger.set_submit_delay(Duration::from_secs(2)).await;
        let writer = {
            let sync = sync.clone();
            let cam = camera();
            tokio::spawn(async move { sync.record(b"slow clip", &cam, Some(now - 60)).await })
        };

        // The pending row appears right before the writer takes the lock.
        let slow_hash = content_hash(b"slow clip");
        while sync.storage().get(slow_hash).await.unwrap().is_none() {
            tokio::task::yield_now().await;
        }

        // A concurrent read for a different hash answers immediately; it
        // could only hit this timeout by waiting on the writer lock.
        let engine = VerificationEngine::new(ledger.clone(), sync.storage().clone());
        let outcome =
            tokio::time::timeout(Duration::from_millis(500), engine.verify(b"earlier clip"))
                .await
                .expect("read blocked behind an in-flight submission")
                .unwrap();
        assert!(matches!(outcome, VerificationOutcome::Verified { .. }));

        let listing = tokio::time::timeout(
            Duration::from_millis(500),
            crate::enumerate::EnumerationService::new(ledger.clone(), sync.storage().clone())
                .list_all(),
        )
        .await
        .expect("listing blocked behind an in-flight submission")
        .unwrap();
        assert_eq!(listing.count, 1);

        let receipt = writer.await.unwrap().unwrap();
        assert_eq!(receipt.hash, content_hash(b"slow clip"));
    }

    #[tokio::test]
    async fn pending_row_blocks_resubmission() {
        let (ledger, sync, _db) = setup().await;
        let now = ledger.clock().await;

        ledger.timeout_next_submit().await;
        let _ = sync.record(b"clip", &camera(), Some(now - 60)).await;

        let err = sync
            .record(b"clip", &camera(), Some(now - 60))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::AlreadyRecorded {
                status: RecordStatus::Pending,
                ..
            }
        ));
        assert_eq!(ledger.submit_calls().await, 1);
    }
}
