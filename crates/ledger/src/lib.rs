//! Ledger Client for Vigil.
//!
//! The authoritative store is an `EvidenceRegistry` contract on an EVM
//! chain: an append-only mapping from content hash to evidence record with
//! uniqueness enforced on-chain. This crate exposes that store through the
//! narrow [`LedgerClient`] capability (submit, exists, get, count, key_at)
//! and provides:
//!
//! - [`registry::EvidenceRegistryClient`]: the real alloy-based client,
//!   read-only unless constructed with a signing identity;
//! - [`mock::MockLedger`] (behind the `mock` feature): an in-memory ledger
//!   with failure injection for tests.

pub mod client;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod registry;

pub use client::{LedgerClient, SubmitOutcome};
pub use registry::EvidenceRegistryClient;

// Callers constructing a signing client need the signer type without
// pulling in the whole alloy surface themselves.
pub use alloy::signers::local::PrivateKeySigner;
