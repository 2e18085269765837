//! Evidence mirror, synchronization, verification and enumeration.
//!
//! Sits between the ledger client and the HTTP boundary: every write goes
//! through the [`synchronizer::Synchronizer`], every read through the
//! [`verify::VerificationEngine`] or [`enumerate::EnumerationService`],
//! all three sharing the SQLite mirror in [`storage`].

pub mod config;
pub mod enumerate;
pub mod storage;
pub mod synchronizer;
pub mod verify;

pub use config::Config;
pub use enumerate::{EnumerationService, EvidenceListing, ListError, ListedRecord};
pub use storage::{MirrorRow, MirrorStats, Storage, StorageError};
pub use synchronizer::{RecordError, RecordReceipt, Synchronizer};
pub use verify::{NotVerifiedReason, VerificationEngine, VerificationOutcome, VerifyError};
