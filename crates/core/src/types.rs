//! Domain types for the Vigil evidence ledger.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// SHA-256 content fingerprint of a video file (32 bytes).
///
/// This is the unique identifying key of an evidence record, both on the
/// ledger and in the local mirror. The all-zero hash is never a valid key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoHash(pub B256);

impl VideoHash {
    /// Wrap a raw 32-byte digest.
    pub const fn new(bytes: B256) -> Self {
        VideoHash(bytes)
    }

    /// Get the inner B256.
    pub const fn inner(&self) -> &B256 {
        &self.0
    }

    /// Borrow the raw bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// True for the all-zero digest, which the ledger rejects.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<[u8; 32]> for VideoHash {
    fn from(bytes: [u8; 32]) -> Self {
        VideoHash(B256::from(bytes))
    }
}

impl From<B256> for VideoHash {
    fn from(bytes: B256) -> Self {
        VideoHash(bytes)
    }
}

impl fmt::Display for VideoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_slice()))
    }
}

impl FromStr for VideoHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| CoreError::InvalidHash(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidHash(s.to_string()))?;
        Ok(VideoHash::from(arr))
    }
}

/// Opaque identifier of the capture source (e.g. `"CAM-001"`).
///
/// Validated to be non-empty at construction and deserialization, mirroring
/// the ledger contract's own argument check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
    /// Create a new CameraId, rejecting empty or whitespace-only input.
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(CoreError::EmptyCameraId);
        }
        Ok(CameraId(value))
    }

    /// Borrow the raw string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CameraId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        CameraId::new(value).map_err(serde::de::Error::custom)
    }
}

/// A committed, ledger-authoritative evidence record.
///
/// `submitter`, `sequence_number` and `commit_time` are assigned by the
/// ledger at commit and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    /// Content fingerprint, the unique record key.
    pub hash: VideoHash,
    /// Capture source supplied by the submitter.
    pub camera_id: CameraId,
    /// Capture time (unix seconds) supplied by the submitter.
    pub captured_at: u64,
    /// Account that committed the record (ledger-assigned).
    pub submitter: Address,
    /// Ordinal position in the ledger (ledger-assigned).
    pub sequence_number: u64,
    /// Commit timestamp (unix seconds, ledger-assigned).
    pub commit_time: u64,
}

/// Lifecycle status of a mirror row.
///
/// Transitions are monotonic: `pending -> confirmed` or `pending -> failed`,
/// both terminal. Rows created by reconciliation start at `confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Write-ahead reservation; ledger submission not yet resolved.
    Pending,
    /// Ledger accepted the write (terminal).
    Confirmed,
    /// Ledger rejected the write (terminal).
    Failed,
}

impl RecordStatus {
    /// Stable string form used in the database and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Confirmed => "confirmed",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecordStatus::Pending),
            "confirmed" => Ok(RecordStatus::Confirmed),
            "failed" => Ok(RecordStatus::Failed),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// Trust provenance of a read result.
///
/// Ledger truth always outranks mirror truth; anything but `Ledger` /
/// `CacheLedger` means the answer was served at degraded trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTag {
    /// Answered by the ledger; no mirror row existed.
    Ledger,
    /// Answered by the ledger; the mirror already knew the record.
    CacheLedger,
    /// Ledger unreachable; answered from a confirmed mirror row.
    CacheOnly,
    /// Ledger unreachable; listing served wholly from the mirror.
    Cache,
}

impl SourceTag {
    /// Stable string form used in API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Ledger => "ledger",
            SourceTag::CacheLedger => "cache+ledger",
            SourceTag::CacheOnly => "cache-only",
            SourceTag::Cache => "cache",
        }
    }

    /// True when the answer was not backed by a live ledger read.
    pub fn is_degraded(&self) -> bool {
        matches!(self, SourceTag::CacheOnly | SourceTag::Cache)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SourceTag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}
