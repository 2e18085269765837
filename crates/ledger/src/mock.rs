//! In-memory ledger with failure injection.
//!
//! Models the contract's observable semantics: per-hash uniqueness, strict
//! argument checks against the ledger clock, ordinal sequence numbers and
//! commit timestamps. Tests drive outages and per-index read failures
//! through the control methods.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::client::{LedgerClient, SubmitOutcome};
use vigil_core::{Address, CameraId, EvidenceRecord, LedgerError, VideoHash};

#[derive(Debug, Default)]
struct MockState {
    records: Vec<EvidenceRecord>,
    by_hash: HashMap<VideoHash, usize>,
    now: u64,
    unavailable: bool,
    failing_indices: HashSet<u64>,
    timeout_next_submit: bool,
    submit_delay: Option<Duration>,
    submit_calls: u64,
}

/// In-memory [`LedgerClient`] for tests.
pub struct MockLedger {
    state: Mutex<MockState>,
    submitter: Address,
    read_only: AtomicBool,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// Empty ledger whose clock starts at a fixed, comfortably large time.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                now: 1_700_000_000,
                ..MockState::default()
            }),
            submitter: Address::repeat_byte(0xaa),
            read_only: AtomicBool::new(false),
        }
    }

    /// Pretend no signing identity was configured.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    /// Set the ledger's notion of "now" (unix seconds).
    pub async fn set_clock(&self, now: u64) {
        self.state.lock().await.now = now;
    }

    /// Current ledger clock.
    pub async fn clock(&self) -> u64 {
        self.state.lock().await.now
    }

    /// Simulate total ledger unreachability (all calls fail Unavailable).
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Make `key_at`/`get` fail for one ordinal index (corrupt-slot
    /// simulation for skip-on-error tests).
    pub async fn fail_index(&self, index: u64) {
        self.state.lock().await.failing_indices.insert(index);
    }

    /// Make the next submit time out after committing, simulating a
    /// transaction that lands without the caller seeing a receipt.
    pub async fn timeout_next_submit(&self) {
        self.state.lock().await.timeout_next_submit = true;
    }

    /// Stall every submit for the given duration before it touches the
    /// ledger, simulating a slow transaction. Reads are not delayed.
    pub async fn set_submit_delay(&self, delay: Duration) {
        self.state.lock().await.submit_delay = Some(delay);
    }

    /// Number of submit attempts observed, successful or not. Lets tests
    /// assert that deduplication prevented a second ledger write.
    pub async fn submit_calls(&self) -> u64 {
        self.state.lock().await.submit_calls
    }

    /// Seed a committed record directly, bypassing validation, as if it had
    /// been written by another submitter instance.
    pub async fn seed_record(&self, hash: VideoHash, camera_id: CameraId, captured_at: u64) {
        let mut state = self.state.lock().await;
        let sequence_number = state.records.len() as u64;
        let commit_time = state.now;
        let record = EvidenceRecord {
            hash,
            camera_id,
            captured_at,
            submitter: self.submitter,
            sequence_number,
            commit_time,
        };
        let index = state.records.len();
        state.by_hash.insert(hash, index);
        state.records.push(record);
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn submit(
        &self,
        hash: VideoHash,
        camera_id: &CameraId,
        captured_at: u64,
    ) -> Result<SubmitOutcome, LedgerError> {
        // Stall outside the state lock so concurrent reads stay answerable.
        let delay = self.state.lock().await.submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        state.submit_calls += 1;

        if state.unavailable {
            return Err(LedgerError::Unavailable("mock ledger offline".to_string()));
        }
        if hash.is_zero() {
            return Err(LedgerError::InvalidArgument(
                "hash cannot be empty".to_string(),
            ));
        }
        if camera_id.as_str().trim().is_empty() {
            return Err(LedgerError::InvalidArgument(
                "camera id cannot be empty".to_string(),
            ));
        }
        if captured_at == 0 {
            return Err(LedgerError::InvalidArgument(
                "timestamp cannot be zero".to_string(),
            ));
        }
        if captured_at > state.now {
            return Err(LedgerError::InvalidArgument(
                "timestamp cannot be in the future".to_string(),
            ));
        }
        if state.by_hash.contains_key(&hash) {
            return Err(LedgerError::DuplicateKey { hash });
        }

        let sequence_number = state.records.len() as u64;
        let commit_time = state.now;
        let tx_ref = format!("0xmock{:064x}", sequence_number);

        let record = EvidenceRecord {
            hash,
            camera_id: camera_id.clone(),
            captured_at,
            submitter: self.submitter,
            sequence_number,
            commit_time,
        };
        let index = state.records.len();
        state.by_hash.insert(hash, index);
        state.records.push(record);

        if state.timeout_next_submit {
            // The write landed, but the caller never learns of it.
            state.timeout_next_submit = false;
            return Err(LedgerError::ConfirmationTimeout { tx_ref });
        }

        Ok(SubmitOutcome {
            sequence_number,
            commit_time,
            submitter: self.submitter,
            tx_ref,
        })
    }

    async fn exists(&self, hash: VideoHash) -> Result<bool, LedgerError> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(LedgerError::Unavailable("mock ledger offline".to_string()));
        }
        Ok(state.by_hash.contains_key(&hash))
    }

    async fn get(&self, hash: VideoHash) -> Result<EvidenceRecord, LedgerError> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(LedgerError::Unavailable("mock ledger offline".to_string()));
        }
        let index = state.by_hash.get(&hash).ok_or(LedgerError::NotFound)?;
        if state.failing_indices.contains(&(*index as u64)) {
            return Err(LedgerError::Unavailable(format!(
                "simulated read failure at index {}",
                index
            )));
        }
        Ok(state.records[*index].clone())
    }

    async fn count(&self) -> Result<u64, LedgerError> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(LedgerError::Unavailable("mock ledger offline".to_string()));
        }
        Ok(state.records.len() as u64)
    }

    async fn key_at(&self, index: u64) -> Result<VideoHash, LedgerError> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(LedgerError::Unavailable("mock ledger offline".to_string()));
        }
        let count = state.records.len() as u64;
        if index >= count {
            return Err(LedgerError::OutOfRange { index, count });
        }
        if state.failing_indices.contains(&index) {
            return Err(LedgerError::Unavailable(format!(
                "simulated read failure at index {}",
                index
            )));
        }
        Ok(state.records[index as usize].hash)
    }

    fn can_submit(&self) -> bool {
        !self.read_only.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::content_hash;

    fn camera() -> CameraId {
        CameraId::new("CAM-001").unwrap()
    }

    #[tokio::test]
    async fn submit_and_read_back() {
        let ledger = MockLedger::new();
        let hash = content_hash(b"clip-1");
        let now = ledger.clock().await;

        let outcome = ledger.submit(hash, &camera(), now - 3600).await.unwrap();
        assert_eq!(outcome.sequence_number, 0);
        assert_eq!(outcome.commit_time, now);

        assert!(ledger.exists(hash).await.unwrap());
        let record = ledger.get(hash).await.unwrap();
        assert_eq!(record.hash, hash);
        assert_eq!(record.captured_at, now - 3600);
        assert_eq!(ledger.count().await.unwrap(), 1);
        assert_eq!(ledger.key_at(0).await.unwrap(), hash);
    }

    #[tokio::test]
    async fn duplicate_hash_rejected() {
        let ledger = MockLedger::new();
        let hash = content_hash(b"clip-1");
        let now = ledger.clock().await;

        ledger.submit(hash, &camera(), now - 1).await.unwrap();
        let err = ledger.submit(hash, &camera(), now - 1).await.unwrap_err();
        assert_eq!(err, LedgerError::DuplicateKey { hash });
    }

    #[tokio::test]
    async fn argument_checks() {
        let ledger = MockLedger::new();
        let now = ledger.clock().await;

        let zero = VideoHash::from([0u8; 32]);
        assert!(matches!(
            ledger.submit(zero, &camera(), now - 1).await.unwrap_err(),
            LedgerError::InvalidArgument(_)
        ));

        let hash = content_hash(b"clip-1");
        assert!(matches!(
            ledger.submit(hash, &camera(), 0).await.unwrap_err(),
            LedgerError::InvalidArgument(_)
        ));
        assert!(matches!(
            ledger
                .submit(hash, &camera(), now + 86_400)
                .await
                .unwrap_err(),
            LedgerError::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn out_of_range_read() {
        let ledger = MockLedger::new();
        assert_eq!(
            ledger.key_at(3).await.unwrap_err(),
            LedgerError::OutOfRange { index: 3, count: 0 }
        );
    }

    #[tokio::test]
    async fn unavailable_blocks_everything() {
        let ledger = MockLedger::new();
        ledger.set_unavailable(true).await;
        let hash = content_hash(b"clip-1");
        assert!(ledger.exists(hash).await.unwrap_err().is_unreachable());
        assert!(ledger.count().await.unwrap_err().is_unreachable());
    }

    #[tokio::test]
    async fn timeout_still_commits() {
        let ledger = MockLedger::new();
        let hash = content_hash(b"clip-1");
        let now = ledger.clock().await;

        ledger.timeout_next_submit().await;
        let err = ledger.submit(hash, &camera(), now - 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::ConfirmationTimeout { .. }));

        // The record landed despite the missing receipt.
        assert!(ledger.exists(hash).await.unwrap());
    }
}
