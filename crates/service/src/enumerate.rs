//! Full enumeration of recorded evidence.
//!
//! Walks the ledger ordinal by ordinal, so a listing is O(n) ledger reads.
//! Acceptable at the record volumes this service targets; a single bad
//! index never takes the whole listing down.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::storage::{MirrorRow, Storage, StorageError};
use vigil_core::{Address, CameraId, EvidenceRecord, RecordStatus, SourceTag, VideoHash};
use vigil_ledger::LedgerClient;

/// One entry of a listing. Ledger-assigned fields are absent for mirror
/// rows that never confirmed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListedRecord {
    pub video_hash: VideoHash,
    pub camera_id: CameraId,
    pub captured_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitter: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_time: Option<u64>,
    pub status: RecordStatus,
}

impl From<&EvidenceRecord> for ListedRecord {
    fn from(record: &EvidenceRecord) -> Self {
        Self {
            video_hash: record.hash,
            camera_id: record.camera_id.clone(),
            captured_at: record.captured_at,
            sequence_number: Some(record.sequence_number),
            submitter: Some(record.submitter),
            commit_time: Some(record.commit_time),
            status: RecordStatus::Confirmed,
        }
    }
}

impl From<&MirrorRow> for ListedRecord {
    fn from(row: &MirrorRow) -> Self {
        Self {
            video_hash: row.video_hash,
            camera_id: row.camera_id.clone(),
            captured_at: row.captured_at,
            sequence_number: row.sequence_number,
            submitter: row.submitter,
            commit_time: row.commit_time,
            status: row.status,
        }
    }
}

/// A complete listing with its provenance.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceListing {
    pub count: u64,
    pub records: Vec<ListedRecord>,
    pub source: SourceTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Errors from enumeration.
#[derive(Debug, Error)]
pub enum ListError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Lists every recorded evidence entry, ledger first, mirror as fallback.
pub struct EnumerationService {
    ledger: Arc<dyn LedgerClient>,
    storage: Storage,
}

impl EnumerationService {
    pub fn new(ledger: Arc<dyn LedgerClient>, storage: Storage) -> Self {
        Self { ledger, storage }
    }

    pub async fn list_all(&self) -> Result<EvidenceListing, ListError> {
        let total = match self.ledger.count().await {
            Ok(total) => total,
            Err(e) => {
                warn!(error = %e, "Ledger count failed, listing from mirror");
                return self.list_from_mirror(&e.to_string()).await;
            }
        };

        let mut records = Vec::with_capacity(total as usize);
        for index in 0..total {
            let hash = match self.ledger.key_at(index).await {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(index, error = %e, "Skipping unreadable ledger index");
                    continue;
                }
            };
            let record = match self.ledger.get(hash).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(index, %hash, error = %e, "Skipping unreadable ledger record");
                    continue;
                }
            };

            self.reconcile(&record).await;
            records.push(ListedRecord::from(&record));
        }

        // Newest capture first; ledger order breaks ties.
        records.sort_by(|a, b| {
            b.captured_at
                .cmp(&a.captured_at)
                .then(b.sequence_number.cmp(&a.sequence_number))
        });

        Ok(EvidenceListing {
            count: records.len() as u64,
            records,
            source: SourceTag::Ledger,
            warning: None,
        })
    }

    async fn list_from_mirror(&self, cause: &str) -> Result<EvidenceListing, ListError> {
        let rows = self.storage.list_all().await?;
        let records: Vec<ListedRecord> = rows.iter().map(ListedRecord::from).collect();

        Ok(EvidenceListing {
            count: records.len() as u64,
            records,
            source: SourceTag::Cache,
            warning: Some(format!(
                "ledger unreachable ({cause}); listing reflects the local mirror and may be stale"
            )),
        })
    }

    /// Pull a ledger record the mirror has not confirmed yet. Errors are
    /// logged, never surfaced.
    async fn reconcile(&self, record: &EvidenceRecord) {
        let known = match self.storage.get(record.hash).await {
            Ok(row) => row.is_some_and(|r| r.status == RecordStatus::Confirmed),
            Err(e) => {
                warn!(hash = %record.hash, error = %e, "Mirror read failed during listing");
                return;
            }
        };
        if known {
            return;
        }
        if let Err(e) = self.storage.insert_confirmed(record, now_unix()).await {
            warn!(hash = %record.hash, error = %e, "Mirror reconciliation failed");
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
