//! Content fingerprinting.
//!
//! Vigil identifies video files by the SHA-256 digest of their bytes. The
//! same digest is the record key on the ledger contract, so this must never
//! change without a contract migration.

use sha2::{Digest, Sha256};

use crate::types::VideoHash;

/// Compute the content fingerprint of a byte payload.
///
/// # Example
///
/// ```
/// use vigil_core::content_hash;
///
/// let hash = content_hash(b"clip bytes");
/// assert!(!hash.is_zero());
/// ```
pub fn content_hash(bytes: &[u8]) -> VideoHash {
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    VideoHash::from(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // sha256("hello")
        let hash = content_hash(b"hello");
        assert_eq!(
            hash.to_string(),
            "0x2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn deterministic_and_content_sensitive() {
        assert_eq!(content_hash(b"a"), content_hash(b"a"));
        assert_ne!(content_hash(b"a"), content_hash(b"b"));
    }

    #[test]
    fn empty_payload_is_not_zero() {
        // The empty file still hashes to a non-zero digest; the all-zero
        // key can only be produced by a caller-supplied hash.
        assert!(!content_hash(b"").is_zero());
    }
}
