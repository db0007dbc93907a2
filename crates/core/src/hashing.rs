//! SHA-256 hex digest utility.
//!
//! The upload orchestrator fingerprints file content with this digest to
//! detect idempotent resubmissions.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn consistent_output() {
        let data = b"2024-01-01,TXN-1,100.00";
        assert_eq!(sha256_hex(data), sha256_hex(data));
        assert_eq!(sha256_hex(data).len(), 64);
    }

    #[test]
    fn one_byte_change_changes_digest() {
        assert_ne!(sha256_hex(b"TXN-1,100.00"), sha256_hex(b"TXN-1,100.01"));
    }
}
