//! Alloy-based client for the EvidenceRegistry contract.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::client::{LedgerClient, SubmitOutcome};
use vigil_core::{CameraId, EvidenceRecord, LedgerError, VideoHash};

// Type alias for the Alloy provider with wallet support
// This complex type is necessary until Alloy provides a simpler abstraction
// See: https://github.com/alloy-rs/alloy/issues/1800
type WalletProvider = alloy::providers::fillers::FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::fillers::JoinFill<
            alloy::providers::Identity,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::GasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::BlobGasFiller,
                    alloy::providers::fillers::JoinFill<
                        alloy::providers::fillers::NonceFiller,
                        alloy::providers::fillers::ChainIdFiller,
                    >,
                >,
            >,
        >,
        alloy::providers::fillers::WalletFiller<EthereumWallet>,
    >,
    alloy::providers::RootProvider<alloy::transports::http::Http<alloy::transports::http::Client>>,
    alloy::transports::http::Http<alloy::transports::http::Client>,
    alloy::network::Ethereum,
>;

type HttpTransport = alloy::transports::http::Http<alloy::transports::http::Client>;

// Generate EvidenceRegistry contract bindings
sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract EvidenceRegistry {
        function recordEvidence(bytes32 videoHash, string cameraId, uint256 capturedAt) external;
        function verifyEvidence(bytes32 videoHash) external view returns (bool exists);
        function getEvidence(bytes32 videoHash) external view returns (string cameraId, uint256 capturedAt, address submitter, uint256 sequenceNumber, uint256 commitTime);
        function getTotalRecords() external view returns (uint256 total);
        function getHashAt(uint256 index) external view returns (bytes32 videoHash);

        event EvidenceRecorded(
            bytes32 indexed videoHash,
            string cameraId,
            uint256 capturedAt,
            address indexed submitter,
            uint256 sequenceNumber
        );
    }
}

const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 120;

/// HTTP client for the EvidenceRegistry contract.
///
/// Reads go through an unauthenticated provider; writes require the signing
/// identity passed at construction. Built without one, the client is
/// read-only and `submit` fails with `Unavailable`, which is how the
/// service degrades to read-fallback-only mode at startup.
pub struct EvidenceRegistryClient {
    reader: EvidenceRegistry::EvidenceRegistryInstance<HttpTransport, RootProvider<HttpTransport>>,
    writer: Option<EvidenceRegistry::EvidenceRegistryInstance<HttpTransport, WalletProvider>>,
    submit_timeout: Duration,
}

impl EvidenceRegistryClient {
    /// Create a read-only client.
    pub fn read_only(rpc_url: &str, contract_address: Address) -> Result<Self> {
        let url = rpc_url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            reader: EvidenceRegistry::new(contract_address, provider),
            writer: None,
            submit_timeout: Duration::from_secs(DEFAULT_SUBMIT_TIMEOUT_SECS),
        })
    }

    /// Create a client that can submit writes with the given signer.
    pub fn with_signer(
        rpc_url: &str,
        contract_address: Address,
        signer: PrivateKeySigner,
        submit_timeout: Duration,
    ) -> Result<Self> {
        let url: alloy::transports::http::reqwest::Url = rpc_url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;

        let read_provider = ProviderBuilder::new().on_http(url.clone());

        let wallet = EthereumWallet::from(signer.clone());
        let write_provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(url);

        info!(
            submitter = %signer.address(),
            contract = %contract_address,
            "EvidenceRegistry client initialized with signing identity"
        );

        Ok(Self {
            reader: EvidenceRegistry::new(contract_address, read_provider),
            writer: Some(EvidenceRegistry::new(contract_address, write_provider)),
            submit_timeout,
        })
    }
}

/// Classify a submit-path contract error by its revert reason.
///
/// The contract's revert strings are part of its ABI surface: "already
/// recorded", "cannot be empty", "in the future". Anything unrecognized is
/// treated as transport failure.
fn classify_submit_error(hash: VideoHash, err: &dyn std::fmt::Display) -> LedgerError {
    let text = err.to_string();
    let lowered = text.to_lowercase();
    if lowered.contains("already recorded") {
        LedgerError::DuplicateKey { hash }
    } else if lowered.contains("cannot be empty")
        || lowered.contains("in the future")
        || lowered.contains("invalid timestamp")
    {
        LedgerError::InvalidArgument(text)
    } else {
        LedgerError::Unavailable(text)
    }
}

/// Classify a read-path contract error.
fn classify_read_error(err: &dyn std::fmt::Display) -> LedgerError {
    let text = err.to_string();
    let lowered = text.to_lowercase();
    if lowered.contains("not found") {
        LedgerError::NotFound
    } else if lowered.contains("out of range") || lowered.contains("out of bounds") {
        // Caller fills in index/count context.
        LedgerError::OutOfRange { index: 0, count: 0 }
    } else {
        LedgerError::Unavailable(text)
    }
}

fn u256_to_u64(value: U256, what: &str) -> Result<u64, LedgerError> {
    u64::try_from(value)
        .map_err(|_| LedgerError::Unavailable(format!("ledger returned oversized {}: {}", what, value)))
}

#[async_trait]
impl LedgerClient for EvidenceRegistryClient {
    async fn submit(
        &self,
        hash: VideoHash,
        camera_id: &CameraId,
        captured_at: u64,
    ) -> Result<SubmitOutcome, LedgerError> {
        let Some(contract) = &self.writer else {
            return Err(LedgerError::Unavailable(
                "no signing identity configured; ledger writes are disabled".to_string(),
            ));
        };

        // Cheap local checks before spending a round trip. The future-time
        // check stays on-chain because only the ledger's clock counts.
        if hash.is_zero() {
            return Err(LedgerError::InvalidArgument(
                "hash cannot be empty".to_string(),
            ));
        }
        if captured_at == 0 {
            return Err(LedgerError::InvalidArgument(
                "timestamp cannot be zero".to_string(),
            ));
        }

        let pending = contract
            .recordEvidence(
                *hash.inner(),
                camera_id.as_str().to_string(),
                U256::from(captured_at),
            )
            .send()
            .await
            .map_err(|e| classify_submit_error(hash, &e))?;

        let tx_ref = format!("0x{}", hex::encode(pending.tx_hash()));
        info!(tx = %tx_ref, hash = %hash, "evidence submission sent");

        // A timeout here does NOT mean the write failed: the transaction
        // may still land. Surface ConfirmationTimeout so the caller leaves
        // its bookkeeping in the pending state.
        let receipt = match tokio::time::timeout(self.submit_timeout, pending.get_receipt()).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                warn!(tx = %tx_ref, error = %e, "receipt watcher failed; submission outcome unknown");
                return Err(LedgerError::ConfirmationTimeout { tx_ref });
            }
            Err(_) => {
                warn!(tx = %tx_ref, "no receipt within bounded wait; submission outcome unknown");
                return Err(LedgerError::ConfirmationTimeout { tx_ref });
            }
        };

        if !receipt.status() {
            // The transaction landed and reverted. The receipt carries no
            // revert reason, so disambiguate with a read: a concurrent
            // writer duplicating the hash is the common cause.
            warn!(tx = %tx_ref, hash = %hash, "evidence submission reverted on-chain");
            return Err(match self.exists(hash).await {
                Ok(true) => LedgerError::DuplicateKey { hash },
                _ => LedgerError::InvalidArgument(format!(
                    "transaction {} reverted on-chain",
                    tx_ref
                )),
            });
        }

        // Read back the ledger-assigned fields rather than trusting local
        // bookkeeping.
        let record = match self.get(hash).await {
            Ok(record) => record,
            Err(LedgerError::NotFound) => {
                return Err(LedgerError::Unavailable(format!(
                    "record missing after confirmed commit (tx {})",
                    tx_ref
                )))
            }
            Err(other) => return Err(other),
        };

        info!(
            tx = %tx_ref,
            sequence = record.sequence_number,
            "evidence submission confirmed"
        );

        Ok(SubmitOutcome {
            sequence_number: record.sequence_number,
            commit_time: record.commit_time,
            submitter: record.submitter,
            tx_ref,
        })
    }

    async fn exists(&self, hash: VideoHash) -> Result<bool, LedgerError> {
        let out = self
            .reader
            .verifyEvidence(*hash.inner())
            .call()
            .await
            .map_err(|e| classify_read_error(&e))?;
        Ok(out.exists)
    }

    async fn get(&self, hash: VideoHash) -> Result<EvidenceRecord, LedgerError> {
        let out = self
            .reader
            .getEvidence(*hash.inner())
            .call()
            .await
            .map_err(|e| classify_read_error(&e))?;

        let camera_id = CameraId::new(out.cameraId)
            .map_err(|e| LedgerError::Unavailable(format!("ledger returned malformed record: {}", e)))?;

        Ok(EvidenceRecord {
            hash,
            camera_id,
            captured_at: u256_to_u64(out.capturedAt, "capturedAt")?,
            submitter: out.submitter,
            sequence_number: u256_to_u64(out.sequenceNumber, "sequenceNumber")?,
            commit_time: u256_to_u64(out.commitTime, "commitTime")?,
        })
    }

    async fn count(&self) -> Result<u64, LedgerError> {
        let out = self
            .reader
            .getTotalRecords()
            .call()
            .await
            .map_err(|e| classify_read_error(&e))?;
        u256_to_u64(out.total, "record count")
    }

    async fn key_at(&self, index: u64) -> Result<VideoHash, LedgerError> {
        let out = self
            .reader
            .getHashAt(U256::from(index))
            .call()
            .await
            .map_err(|e| match classify_read_error(&e) {
                LedgerError::OutOfRange { .. } => LedgerError::OutOfRange { index, count: 0 },
                other => other,
            })?;
        Ok(VideoHash::from(out.videoHash))
    }

    fn can_submit(&self) -> bool {
        self.writer.is_some()
    }
}
