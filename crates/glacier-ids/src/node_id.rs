//! Peer node identifier type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::cb58::{decode_cb58, encode_cb58, Cb58Error};
use crate::hashing::compute_hash256;
use crate::NODE_ID_LEN;

/// The prefix for NodeId string representations.
pub const NODE_ID_PREFIX: &str = "NodeID-";

/// A 20-byte identifier for a peer in the validator set.
///
/// NodeIds identify the peers the engine samples during a poll. They
/// are derived from the peer's authenticated identity material
/// (the leading 20 bytes of `SHA256(identity)`).
///
/// # Examples
///
/// ```
/// use glacier_ids::NodeId;
///
/// let id = NodeId::from_bytes([0u8; 20]);
/// assert!(id.to_string().starts_with("NodeID-"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NodeId([u8; NODE_ID_LEN]);

/// Errors that can occur when parsing a NodeId.
#[derive(Debug, Error)]
pub enum NodeIdError {
    /// The CB58 decoding failed.
    #[error("cb58 decoding failed: {0}")]
    Cb58(#[from] Cb58Error),

    /// The decoded bytes have the wrong length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The NodeId string is missing the required prefix.
    #[error("missing NodeID- prefix")]
    MissingPrefix,
}

impl NodeId {
    /// The empty (zero) NodeId.
    pub const EMPTY: Self = Self([0u8; NODE_ID_LEN]);

    /// Creates a NodeId from a 20-byte array.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates a NodeId from a slice, returning an error if the length is wrong.
    ///
    /// # Errors
    ///
    /// Returns `NodeIdError::InvalidLength` if the slice is not exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, NodeIdError> {
        if bytes.len() != NODE_ID_LEN {
            return Err(NodeIdError::InvalidLength {
                expected: NODE_ID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; NODE_ID_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Derives a NodeId from a peer's identity bytes.
    ///
    /// The NodeId is the leading 20 bytes of `SHA256(identity)`.
    #[must_use]
    pub fn from_identity(identity: &[u8]) -> Self {
        let hash = compute_hash256(identity);
        let mut arr = [0u8; NODE_ID_LEN];
        arr.copy_from_slice(&hash[..NODE_ID_LEN]);
        Self(arr)
    }

    /// Returns the NodeId as a byte array reference.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Returns true if this is the empty (zero) NodeId.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; NODE_ID_LEN]
    }

    /// Returns the hex-encoded representation of this NodeId (without prefix).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{NODE_ID_PREFIX}{}", encode_cb58(&self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s
            .strip_prefix(NODE_ID_PREFIX)
            .ok_or(NodeIdError::MissingPrefix)?;
        let bytes = decode_cb58(stripped)?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; NODE_ID_LEN]> for NodeId {
    fn from(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<NodeId> for [u8; NODE_ID_LEN] {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl Serialize for NodeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            Self::from_slice(&bytes).map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_node_id() {
        let id = NodeId::EMPTY;
        assert!(id.is_empty());
        assert_eq!(id.as_bytes(), &[0u8; 20]);
    }

    #[test]
    fn test_from_identity() {
        let id = NodeId::from_identity(b"peer identity material");
        assert!(!id.is_empty());
        assert_eq!(id, NodeId::from_identity(b"peer identity material"));
        assert_ne!(id, NodeId::from_identity(b"other peer"));
    }

    #[test]
    fn test_string_roundtrip() {
        let id = NodeId::from_bytes([42u8; 20]);
        let s = id.to_string();
        assert!(s.starts_with(NODE_ID_PREFIX));

        let parsed: NodeId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_string_missing_prefix() {
        let result = "somestringwithoutprefix".parse::<NodeId>();
        assert!(matches!(result, Err(NodeIdError::MissingPrefix)));
    }

    #[test]
    fn test_json_serialization() {
        let id = NodeId::from_bytes([42u8; 20]);
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.contains(NODE_ID_PREFIX));

        let parsed: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
