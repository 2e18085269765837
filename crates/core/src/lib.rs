//! Core types for Vigil.
//!
//! This crate defines the domain vocabulary shared by every Vigil component:
//! the content fingerprint ([`VideoHash`]), the capture-source identifier
//! ([`CameraId`]), the ledger-resident [`EvidenceRecord`], mirror-row
//! lifecycle states, and the typed error taxonomy.

pub mod error;
pub mod hashing;
pub mod types;

pub use error::{CoreError, LedgerError};
pub use hashing::content_hash;
pub use types::{CameraId, EvidenceRecord, RecordStatus, SourceTag, VideoHash};

// Re-export Alloy primitives used throughout the workspace.
pub use alloy_primitives::{Address, B256};
