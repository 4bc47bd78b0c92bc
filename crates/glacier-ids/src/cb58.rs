//! CB58 encoding and decoding.
//!
//! CB58 is Base58 with a 4-byte SHA-256 checksum appended, the standard
//! human-readable rendering for Glacier identifiers.

use thiserror::Error;

use crate::hashing::checksum;

/// Length of the CB58 checksum in bytes.
const CHECKSUM_LEN: usize = 4;

/// Errors that can occur during CB58 encoding/decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Cb58Error {
    /// Failed to decode the Base58 string.
    #[error("base58 decoding error: {0}")]
    Base58Decoding(String),

    /// The input string is too short to contain a checksum.
    #[error("input string is smaller than the checksum size")]
    MissingChecksum,

    /// The checksum in the input does not match the computed checksum.
    #[error("invalid checksum")]
    BadChecksum,
}

/// Encodes bytes to a CB58 string.
///
/// # Examples
///
/// ```
/// use glacier_ids::encode_cb58;
///
/// let encoded = encode_cb58(&[1, 2, 3, 4]);
/// assert!(!encoded.is_empty());
/// ```
#[must_use]
pub fn encode_cb58(bytes: &[u8]) -> String {
    let mut checked = Vec::with_capacity(bytes.len() + CHECKSUM_LEN);
    checked.extend_from_slice(bytes);
    checked.extend_from_slice(&checksum(bytes, CHECKSUM_LEN));
    bs58::encode(checked).into_string()
}

/// Decodes a CB58 string to bytes, verifying the checksum.
///
/// # Errors
///
/// Returns an error if the string is not valid Base58, is too short to
/// contain a checksum, or the checksum does not match.
pub fn decode_cb58(s: &str) -> Result<Vec<u8>, Cb58Error> {
    let decoded = bs58::decode(s)
        .into_vec()
        .map_err(|e| Cb58Error::Base58Decoding(e.to_string()))?;

    if decoded.len() < CHECKSUM_LEN {
        return Err(Cb58Error::MissingChecksum);
    }

    let data_len = decoded.len() - CHECKSUM_LEN;
    let (raw_bytes, provided_checksum) = decoded.split_at(data_len);

    if provided_checksum != checksum(raw_bytes, CHECKSUM_LEN) {
        return Err(Cb58Error::BadChecksum);
    }

    Ok(raw_bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let test_cases: &[&[u8]] = &[&[], &[0], &[1, 2, 3, 4], &[0xff; 32], &[0x00; 20]];

        for bytes in test_cases {
            let encoded = encode_cb58(bytes);
            let decoded = decode_cb58(&encoded).unwrap();
            assert_eq!(*bytes, decoded.as_slice(), "roundtrip failed for {bytes:?}");
        }
    }

    #[test]
    fn test_decode_invalid_base58() {
        // '0', 'O', 'I', 'l' are not valid Base58 characters.
        let result = decode_cb58("0OIl");
        assert!(matches!(result, Err(Cb58Error::Base58Decoding(_))));
    }

    #[test]
    fn test_decode_too_short() {
        let result = decode_cb58("1");
        assert!(matches!(result, Err(Cb58Error::MissingChecksum)));
    }

    #[test]
    fn test_decode_bad_checksum() {
        let encoded = encode_cb58(&[1, 2, 3, 4]);

        let mut raw = bs58::decode(&encoded).into_vec().unwrap();
        if let Some(last) = raw.last_mut() {
            *last ^= 0xff;
        }
        let corrupted = bs58::encode(raw).into_string();

        assert!(matches!(decode_cb58(&corrupted), Err(Cb58Error::BadChecksum)));
    }
}
