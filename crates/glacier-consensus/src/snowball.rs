//! Snowball: the atomic voting state machine.
//!
//! A snowball node converts a stream of sampled-peer vote tallies into
//! a single irreversible decision. Each round the modal choice is
//! computed; if it reaches the `alpha` quorum the node's confidence in
//! that choice grows, otherwise confidence resets. Once confidence
//! crosses the beta threshold the node finalizes forever.

use glacier_ids::Id;
use glacier_utils::{Bag, Set};
use tracing::{debug, trace};

use crate::{ConsensusError, Parameters, Result};

/// A single-decision snowball node over one or more choices.
///
/// One node backs each decision point: a conflict set in the DAG
/// specialization, or a branch point in the chain specialization. With
/// a single choice the node behaves as the unary primitive, with two as
/// the binary one, and it generalizes to n choices with the same
/// modal-count rule.
#[derive(Debug)]
pub struct Snowball {
    params: Parameters,
    /// Live (undecided, unrejected) choices.
    choices: Set<Id>,
    /// Current preference, if any choice has been added.
    preference: Option<Id>,
    /// Consecutive conclusive rounds agreeing with the preference.
    confidence: usize,
    finalized: bool,
}

impl Snowball {
    /// Creates a new snowball node.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` if the parameters fail validation.
    pub fn new(params: Parameters) -> Result<Self> {
        params
            .validate()
            .map_err(ConsensusError::InvalidParameters)?;
        Ok(Self {
            params,
            choices: Set::new(),
            preference: None,
            confidence: 0,
            finalized: false,
        })
    }

    /// Adds a choice to be decided among.
    ///
    /// The first choice added becomes the initial preference.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyDecided` if the node has finalized, and
    /// `DuplicateItem` if the choice is already tracked.
    pub fn add_choice(&mut self, id: Id) -> Result<()> {
        if self.finalized {
            return Err(ConsensusError::AlreadyDecided(id.to_string()));
        }
        if !self.choices.add(id) {
            return Err(ConsensusError::DuplicateItem(id.to_string()));
        }
        if self.preference.is_none() {
            self.preference = Some(id);
        }
        Ok(())
    }

    /// Records one round of sampled votes.
    ///
    /// Returns `true` if the round was conclusive (the modal choice
    /// reached alpha), `false` for an inconclusive round. Inconclusive
    /// rounds reset confidence to zero but never change the preference.
    /// A finalized node ignores further polls.
    pub fn record_poll(&mut self, votes: &Bag<Id>) -> bool {
        if self.finalized {
            return false;
        }

        // An empty or short tally can still contain an alpha majority;
        // the modal count decides, not the tally size.
        let Some((modal, count)) = votes.mode() else {
            self.record_unsuccessful_poll();
            return false;
        };

        if count < self.params.alpha || !self.choices.contains(&modal) {
            self.record_unsuccessful_poll();
            return false;
        }

        if self.preference == Some(modal) {
            self.confidence += 1;
        } else {
            trace!(from = ?self.preference, to = %modal, "preference switched");
            self.preference = Some(modal);
            self.confidence = 1;
        }

        if self.confidence >= self.beta() {
            self.finalized = true;
            debug!(choice = %modal, confidence = self.confidence, "snowball finalized");
        }

        true
    }

    /// Returns the current preference.
    #[must_use]
    pub fn preference(&self) -> Option<Id> {
        self.preference
    }

    /// Returns the current confidence counter.
    #[must_use]
    pub fn confidence(&self) -> usize {
        self.confidence
    }

    /// Returns true once the node has decided.
    #[must_use]
    pub fn finalized(&self) -> bool {
        self.finalized
    }

    /// Returns the number of live choices.
    #[must_use]
    pub fn num_choices(&self) -> usize {
        self.choices.len()
    }

    /// Removes a choice that was decided externally (a sibling losing
    /// its conflict elsewhere). Dropping back to one live choice lowers
    /// the finalization threshold to `beta_virtuous`.
    pub fn remove_choice(&mut self, id: &Id) {
        if self.finalized {
            return;
        }
        self.choices.remove(id);
        if self.preference == Some(*id) {
            self.preference = self.choices.iter().min().copied();
            self.confidence = 0;
        }
    }

    fn record_unsuccessful_poll(&mut self) {
        self.confidence = 0;
    }

    fn beta(&self) -> usize {
        // A lone choice has no live conflicting sibling.
        if self.choices.len() <= 1 {
            self.params.beta_virtuous
        } else {
            self.params.beta_rogue
        }
    }
}
