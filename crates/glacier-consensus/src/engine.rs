//! Poll lifecycle and engine state.
//!
//! The engine owns the network-facing side of a consensus instance:
//! which peers to query, how many polls may be in flight, which
//! requests are still outstanding, and when a poll's deadline expires.
//! It never inspects vote contents; completed vote bags are handed back
//! to the caller to feed into `record_poll` on the consensus structure
//! it drives.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use glacier_ids::{Id, NodeId};
use glacier_utils::Bag;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::validators::ValidatorSet;
use crate::{ConsensusError, Parameters, Result};

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created, not yet syncing.
    Initializing,
    /// Fetching the accepted frontier from peers.
    Bootstrapping,
    /// Normal operation: issuing polls and recording votes.
    Consensus,
    /// Shut down; no further transitions.
    Halted,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Bootstrapping => "bootstrapping",
            Self::Consensus => "consensus",
            Self::Halted => "halted",
        };
        write!(f, "{s}")
    }
}

/// The peers a poll queries, split by query kind.
///
/// Push queries carry the item being voted on; pull queries carry only
/// its id, and the peer fetches the item if it lacks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub request_id: u32,
    pub push: Vec<NodeId>,
    pub pull: Vec<NodeId>,
}

#[derive(Debug)]
struct PendingPoll {
    outstanding: HashSet<NodeId>,
    votes: Bag<Id>,
    issued_at: Instant,
}

/// Drives poll issuance for one consensus instance.
///
/// Thread safe; votes arrive from network handler threads while the
/// caller issues polls.
#[derive(Debug)]
pub struct Engine {
    params: Parameters,
    validators: Arc<ValidatorSet>,
    state: RwLock<EngineState>,
    polls: RwLock<HashMap<u32, PendingPoll>>,
    next_request_id: RwLock<u32>,
    /// Items issued into consensus and not yet decided.
    pending_items: RwLock<HashSet<Id>>,
    polls_completed: RwLock<u64>,
}

impl Engine {
    /// Creates an engine in the `Initializing` state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` if the parameters fail validation.
    pub fn new(params: Parameters, validators: Arc<ValidatorSet>) -> Result<Self> {
        params
            .validate()
            .map_err(ConsensusError::InvalidParameters)?;
        Ok(Self {
            params,
            validators,
            state: RwLock::new(EngineState::Initializing),
            polls: RwLock::new(HashMap::new()),
            next_request_id: RwLock::new(0),
            pending_items: RwLock::new(HashSet::new()),
            polls_completed: RwLock::new(0),
        })
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Moves the engine to a new lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the transition is not allowed. The
    /// only legal order is Initializing, Bootstrapping, Consensus, and
    /// Halted is reachable from anywhere.
    pub fn transition(&self, next: EngineState) -> Result<()> {
        let mut state = self.state.write();
        let ok = matches!(
            (*state, next),
            (EngineState::Initializing, EngineState::Bootstrapping)
                | (EngineState::Bootstrapping, EngineState::Consensus)
                | (_, EngineState::Halted)
        );
        if !ok {
            return Err(ConsensusError::InvalidState {
                expected: state.to_string(),
                actual: next.to_string(),
            });
        }
        info!(from = %state, to = %next, "engine state transition");
        *state = next;
        Ok(())
    }

    /// Registers an item as outstanding in consensus.
    ///
    /// # Errors
    ///
    /// Returns `OutstandingLimitReached` when the processing bound is
    /// hit; the caller should hold the item back and reissue later.
    pub fn add_pending_item(&self, id: Id) -> Result<()> {
        let mut pending = self.pending_items.write();
        if pending.len() >= self.params.max_outstanding_items {
            warn!(limit = self.params.max_outstanding_items, "outstanding item limit reached");
            return Err(ConsensusError::OutstandingLimitReached {
                limit: self.params.max_outstanding_items,
            });
        }
        pending.insert(id);
        Ok(())
    }

    /// Clears an item once consensus decides it.
    pub fn remove_pending_item(&self, id: &Id) {
        self.pending_items.write().remove(id);
    }

    #[must_use]
    pub fn num_pending_items(&self) -> usize {
        self.pending_items.read().len()
    }

    /// Samples peers and opens a poll, returning who to query and how.
    ///
    /// The first `mixed_query_num_push_vdr` sampled peers receive push
    /// queries; the rest receive pull queries.
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the `Consensus` state, `PollLimitReached`
    /// when `concurrent_polls` are already in flight, and
    /// `InsufficientValidators` if the sample cannot be filled.
    pub fn start_poll(&self) -> Result<QueryPlan> {
        let state = self.state();
        if state != EngineState::Consensus {
            return Err(ConsensusError::InvalidState {
                expected: EngineState::Consensus.to_string(),
                actual: state.to_string(),
            });
        }

        let mut polls = self.polls.write();
        if polls.len() >= self.params.concurrent_polls {
            return Err(ConsensusError::PollLimitReached {
                limit: self.params.concurrent_polls,
            });
        }

        let sampled = self.validators.sample(self.params.k)?;

        let request_id = {
            let mut next = self.next_request_id.write();
            let id = *next;
            *next = next.wrapping_add(1);
            id
        };

        let split = self.params.mixed_query_num_push_vdr.min(sampled.len());
        let plan = QueryPlan {
            request_id,
            push: sampled[..split].to_vec(),
            pull: sampled[split..].to_vec(),
        };

        polls.insert(
            request_id,
            PendingPoll {
                outstanding: sampled.into_iter().collect(),
                votes: Bag::new(),
                issued_at: Instant::now(),
            },
        );
        debug!(request_id, push = plan.push.len(), pull = plan.pull.len(), "poll started");
        Ok(plan)
    }

    /// Records one peer's vote for a poll.
    ///
    /// Votes from peers that were not sampled, duplicate votes, and
    /// votes for unknown or expired polls are dropped. Returns `true`
    /// when the poll just became complete; the caller then takes the
    /// bag with [`complete_poll`](Engine::complete_poll).
    pub fn record_vote(&self, request_id: u32, node: NodeId, vote: Id) -> bool {
        let mut polls = self.polls.write();
        let Some(poll) = polls.get_mut(&request_id) else {
            debug!(request_id, node = %node, "vote for unknown poll dropped");
            return false;
        };
        if !poll.outstanding.remove(&node) {
            debug!(request_id, node = %node, "unsolicited vote dropped");
            return false;
        }
        poll.votes.add(vote);
        poll.outstanding.is_empty()
    }

    /// Records that a sampled peer failed to answer. The poll can
    /// still conclude with the votes of the peers that did.
    pub fn record_no_response(&self, request_id: u32, node: NodeId) -> bool {
        let mut polls = self.polls.write();
        let Some(poll) = polls.get_mut(&request_id) else {
            return false;
        };
        poll.outstanding.remove(&node);
        poll.outstanding.is_empty()
    }

    /// Closes a poll and returns its vote bag.
    pub fn complete_poll(&self, request_id: u32) -> Option<Bag<Id>> {
        let poll = self.polls.write().remove(&request_id)?;
        *self.polls_completed.write() += 1;
        debug!(request_id, votes = poll.votes.len(), "poll completed");
        Some(poll.votes)
    }

    /// Expires polls past their deadline, returning each with the
    /// votes collected so far. Partial bags still feed `record_poll`;
    /// short tallies simply read as inconclusive.
    pub fn process_timeouts(&self) -> Vec<(u32, Bag<Id>)> {
        let deadline = self.params.max_item_processing_time;
        let now = Instant::now();

        let mut polls = self.polls.write();
        let expired: Vec<u32> = polls
            .iter()
            .filter(|(_, poll)| now.duration_since(poll.issued_at) >= deadline)
            .map(|(id, _)| *id)
            .collect();

        let mut out = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(poll) = polls.remove(&id) {
                warn!(request_id = id, missing = poll.outstanding.len(), "poll timed out");
                *self.polls_completed.write() += 1;
                out.push((id, poll.votes));
            }
        }
        out
    }

    #[must_use]
    pub fn num_outstanding_polls(&self) -> usize {
        self.polls.read().len()
    }

    #[must_use]
    pub fn polls_completed(&self) -> u64 {
        *self.polls_completed.read()
    }
}
