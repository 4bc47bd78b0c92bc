//! SHA-256 hashing helpers shared by the identifier types.

use sha2::{Digest, Sha256};

/// A 256-bit (32-byte) hash value.
pub type Hash256 = [u8; 32];

/// Computes the SHA-256 hash of the input bytes.
///
/// # Examples
///
/// ```
/// use glacier_ids::compute_hash256;
///
/// let hash = compute_hash256(b"hello world");
/// assert_eq!(hash.len(), 32);
/// ```
#[must_use]
pub fn compute_hash256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes a checksum of the given length from the SHA-256 hash.
///
/// Returns the last `length` bytes of the hash.
///
/// # Panics
///
/// Panics if `length` is greater than 32.
#[must_use]
pub fn checksum(data: &[u8], length: usize) -> Vec<u8> {
    assert!(length <= 32, "checksum length must be <= 32");
    let hash = compute_hash256(data);
    hash[32 - length..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash256() {
        // Known SHA-256 hash of the empty string.
        let hash = compute_hash256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(hash.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_checksum_is_hash_suffix() {
        let data = b"test data";
        let cs = checksum(data, 4);
        assert_eq!(cs.len(), 4);

        let hash = compute_hash256(data);
        assert_eq!(cs, hash[28..32]);
    }
}
