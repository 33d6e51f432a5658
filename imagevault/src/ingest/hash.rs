//! Content fingerprinting for deduplication.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 content fingerprint of an upload payload.
///
/// Returns a 64-character lowercase hex string. The fingerprint is the
/// artifact's stable identity: the same bytes always produce the same
/// fingerprint, and the stored filename and storage paths derive from it.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let data = vec![0xAB; 4096];
        assert_eq!(fingerprint(&data), fingerprint(&data));
    }

    #[test]
    fn test_fingerprint_differs_for_different_bytes() {
        assert_ne!(fingerprint(b"one"), fingerprint(b"two"));
    }

    #[test]
    fn test_fingerprint_length_and_charset() {
        let hash = fingerprint(b"payload");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hash.to_lowercase());
    }
}
