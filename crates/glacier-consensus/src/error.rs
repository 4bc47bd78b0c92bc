//! Error types for consensus.
//!
//! Only structural problems are errors: unknown references, duplicate
//! adds, bad parameters, misuse of the engine lifecycle. An item losing
//! its conflict set is a decision event, and an inconclusive poll is
//! silently absorbed by the voting state machines; neither surfaces
//! here. Invariant violations (two members of one conflict set both
//! accepted) are fatal panics, never error values.

use thiserror::Error;

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors that can occur during consensus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// The item was previously decided (accepted or rejected).
    #[error("item already decided: {0}")]
    AlreadyDecided(String),

    /// The item is already being processed.
    #[error("duplicate item: {0}")]
    DuplicateItem(String),

    /// A referenced parent vertex or block is not known.
    #[error("unknown parent: {0}")]
    UnknownParent(String),

    /// A referenced dependency is not known.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    /// A block with this id is already tracked.
    #[error("block already exists: {0}")]
    BlockExists(String),

    /// The named parent block is not tracked.
    #[error("parent block not found: {0}")]
    ParentNotFound(String),

    /// The block is malformed relative to its parent.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// Invalid consensus parameters.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The engine is not in the required state.
    #[error("invalid engine state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Not enough validators to sample a poll.
    #[error("insufficient validators: need {needed}, have {have}")]
    InsufficientValidators { needed: usize, have: usize },

    /// Too many polls already in flight.
    #[error("poll limit reached: {limit} polls outstanding")]
    PollLimitReached { limit: usize },

    /// Too many undecided items already tracked.
    #[error("outstanding item limit reached: {limit}")]
    OutstandingLimitReached { limit: usize },
}
