//! Item lifecycle states.

/// Status of a candidate item.
///
/// The lifecycle is `Processing -> {Accepted | Rejected}`; both
/// terminal states are irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Being voted on.
    Processing,
    /// Accepted, finalized.
    Accepted,
    /// Rejected, finalized.
    Rejected,
    /// Not known to this instance.
    Unknown,
}

impl Status {
    /// Returns true if decided (accepted or rejected).
    #[must_use]
    pub fn decided(&self) -> bool {
        matches!(self, Status::Accepted | Status::Rejected)
    }

    /// Returns true if the item was accepted.
    #[must_use]
    pub fn accepted(&self) -> bool {
        matches!(self, Status::Accepted)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Processing => write!(f, "processing"),
            Status::Accepted => write!(f, "accepted"),
            Status::Rejected => write!(f, "rejected"),
            Status::Unknown => write!(f, "unknown"),
        }
    }
}
