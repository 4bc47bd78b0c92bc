//! Glacier identifier types.
//!
//! Every entity the consensus core reasons about (transactions,
//! vertices, blocks, spent resources) is keyed by a content-addressed
//! [`Id`]. Peers are keyed by the shorter [`NodeId`]. Both render as
//! CB58 strings (Base58 with a 4-byte checksum).

mod cb58;
mod hashing;
mod id;
mod node_id;

pub use cb58::{decode_cb58, encode_cb58, Cb58Error};
pub use hashing::{checksum, compute_hash256, Hash256};
pub use id::{Id, IdError};
pub use node_id::{NodeId, NodeIdError};

/// Length of an [`Id`] in bytes (32 bytes / 256 bits).
pub const ID_LEN: usize = 32;

/// Length of a [`NodeId`] in bytes (20 bytes / 160 bits).
pub const NODE_ID_LEN: usize = 20;
