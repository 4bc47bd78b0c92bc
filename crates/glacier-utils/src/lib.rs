//! Glacier utility types and functions.
//!
//! - [`Bag`]: a multiset with counts, quorum-threshold tracking, and a
//!   deterministic mode; the vote-tally container used by every poll.
//! - [`Set`]: a thin set wrapper with the union/difference operations
//!   the consensus structures need.
//! - [`logging`]: configuration for the `tracing`-based logging stack.

pub mod bag;
pub mod logging;
pub mod set;

pub use bag::Bag;
pub use set::Set;
