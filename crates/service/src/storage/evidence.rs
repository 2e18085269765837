//! Evidence mirror operations.
//!
//! Status is monotone per row: `pending` may become `confirmed` or `failed`,
//! and a `confirmed` row is never rewritten. One deliberate exception to
//! treating `failed` as terminal: reconciliation promotes a `failed` row to
//! `confirmed` when a ledger read proves the record landed after all. The
//! failure verdict was wrong in that case, and ledger truth outranks the
//! mirror's.

use super::{MirrorRow, Storage, StorageError};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use vigil_core::{Address, B256, CameraId, EvidenceRecord, RecordStatus, VideoHash};

impl Storage {
    /// Write the write-ahead `pending` row for a new submission.
    ///
    /// Fails with [`StorageError::AlreadyExists`] if any row for this hash
    /// exists, regardless of its status.
    pub async fn insert_pending(
        &self,
        hash: VideoHash,
        camera_id: &CameraId,
        captured_at: u64,
        inserted_at: u64,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO evidence_mirror (video_hash, camera_id, captured_at, status, inserted_at)
            VALUES (?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(hash.0.as_slice())
        .bind(camera_id.as_str())
        .bind(captured_at as i64)
        .bind(inserted_at as i64)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    Err(StorageError::AlreadyExists(hash))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Attach the submission transaction reference to a pending row.
    ///
    /// Called as soon as the transaction is sent, before its outcome is
    /// known, so an interrupted confirmation still leaves a traceable row.
    pub async fn record_tx_ref(&self, hash: VideoHash, tx_ref: &str) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE evidence_mirror
            SET submit_tx_ref = ?
            WHERE video_hash = ? AND status = 'pending'
            "#,
        )
        .bind(tx_ref)
        .bind(hash.0.as_slice())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(hash));
        }
        Ok(())
    }

    /// Promote a pending row to `confirmed` with the ledger-assigned fields.
    pub async fn mark_confirmed(
        &self,
        hash: VideoHash,
        tx_ref: &str,
        sequence_number: u64,
        submitter: Address,
        commit_time: u64,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE evidence_mirror
            SET status = 'confirmed',
                submit_tx_ref = ?,
                sequence_number = ?,
                submitter = ?,
                commit_time = ?
            WHERE video_hash = ? AND status = 'pending'
            "#,
        )
        .bind(tx_ref)
        .bind(sequence_number as i64)
        .bind(submitter.as_slice())
        .bind(commit_time as i64)
        .bind(hash.0.as_slice())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(hash));
        }
        Ok(())
    }

    /// Demote a pending row to `failed` after a rejected submission.
    pub async fn mark_failed(&self, hash: VideoHash) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE evidence_mirror
            SET status = 'failed'
            WHERE video_hash = ? AND status = 'pending'
            "#,
        )
        .bind(hash.0.as_slice())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(hash));
        }
        Ok(())
    }

    /// Upsert a ledger record discovered during reconciliation.
    ///
    /// Inserts a `confirmed` row, or promotes an existing `pending`/`failed`
    /// row. A row that is already `confirmed` is left untouched.
    pub async fn insert_confirmed(
        &self,
        record: &EvidenceRecord,
        inserted_at: u64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO evidence_mirror (
                video_hash, camera_id, captured_at,
                sequence_number, submitter, commit_time,
                status, inserted_at
            )
            VALUES (?, ?, ?, ?, ?, ?, 'confirmed', ?)
            ON CONFLICT(video_hash) DO UPDATE SET
                camera_id = excluded.camera_id,
                captured_at = excluded.captured_at,
                sequence_number = excluded.sequence_number,
                submitter = excluded.submitter,
                commit_time = excluded.commit_time,
                status = 'confirmed'
            WHERE evidence_mirror.status <> 'confirmed'
            "#,
        )
        .bind(record.hash.0.as_slice())
        .bind(record.camera_id.as_str())
        .bind(record.captured_at as i64)
        .bind(record.sequence_number as i64)
        .bind(record.submitter.as_slice())
        .bind(record.commit_time as i64)
        .bind(inserted_at as i64)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Fetch the row for a hash, if any.
    pub async fn get(&self, hash: VideoHash) -> Result<Option<MirrorRow>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT video_hash, camera_id, captured_at, submit_tx_ref,
                   sequence_number, submitter, commit_time, status, inserted_at
            FROM evidence_mirror
            WHERE video_hash = ?
            "#,
        )
        .bind(hash.0.as_slice())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_mirror).transpose()
    }

    /// All rows, newest first.
    pub async fn list_all(&self) -> Result<Vec<MirrorRow>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT video_hash, camera_id, captured_at, submit_tx_ref,
                   sequence_number, submitter, commit_time, status, inserted_at
            FROM evidence_mirror
            ORDER BY inserted_at DESC, rowid DESC
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_mirror).collect()
    }

    /// Number of rows in the given status.
    pub async fn count_by_status(&self, status: RecordStatus) -> anyhow::Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM evidence_mirror WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(self.pool())
                .await?;

        Ok(count as u64)
    }
}

fn row_to_mirror(row: &SqliteRow) -> Result<MirrorRow, StorageError> {
    let hash_bytes: Vec<u8> = row.try_get("video_hash")?;
    let video_hash = VideoHash(B256::from_slice(&hash_bytes));

    let camera_str: String = row.try_get("camera_id")?;
    let camera_id =
        CameraId::new(&camera_str).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    let status_str: String = row.try_get("status")?;
    let status =
        RecordStatus::from_str(&status_str).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    let submitter: Option<Vec<u8>> = row.try_get("submitter")?;
    let submitter = submitter.map(|b| Address::from_slice(&b));

    let captured_at: i64 = row.try_get("captured_at")?;
    let sequence_number: Option<i64> = row.try_get("sequence_number")?;
    let commit_time: Option<i64> = row.try_get("commit_time")?;
    let inserted_at: i64 = row.try_get("inserted_at")?;

    Ok(MirrorRow {
        video_hash,
        camera_id,
        captured_at: captured_at as u64,
        submit_tx_ref: row.try_get("submit_tx_ref")?,
        sequence_number: sequence_number.map(|v| v as u64),
        submitter,
        commit_time: commit_time.map(|v| v as u64),
        status,
        inserted_at: inserted_at as u64,
    })
}
