//! Linear chain consensus.
//!
//! The chain is a tree of blocks rooted at the last accepted block. At
//! any time exactly one snowball instance is live, voting over the
//! direct children of the last accepted block (the branch point). Votes
//! for deeper blocks collapse upward to the child they descend from.
//! Accepting a child advances the branch point and prunes every sibling
//! subtree.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use glacier_ids::Id;
use glacier_utils::{Bag, Set};
use tracing::{debug, info};

use crate::snowball::Snowball;
use crate::{ConsensusError, Parameters, Result, Status};

/// A block, as consensus sees it.
pub trait Block {
    /// Returns the unique identifier for this block.
    fn id(&self) -> Id;

    /// Returns the id of this block's parent.
    fn parent(&self) -> Id;

    /// Returns this block's height. Must be the parent's height plus one.
    fn height(&self) -> u64;

    /// Returns the time this block was proposed.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Returns the block's payload bytes. Consensus never inspects
    /// them; they exist so push queries can carry the block.
    fn bytes(&self) -> &[u8] {
        &[]
    }

    /// Verifies the block is syntactically valid. Called before the
    /// block is admitted.
    fn verify(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct BlockNode {
    /// `None` only for the genesis block.
    parent: Option<Id>,
    height: u64,
    children: Set<Id>,
    status: Status,
    /// Tip-walk hint below the branch point; the branch point itself
    /// defers to the live snowball.
    preferred_child: Option<Id>,
}

/// Snowball-driven chain consensus.
#[derive(Debug)]
pub struct Snowman {
    params: Parameters,
    /// Accepted ancestry plus the processing tree. Pruned blocks are
    /// dropped and only their ids retained below.
    blocks: HashMap<Id, BlockNode>,
    pruned: Set<Id>,
    last_accepted: Option<Id>,
    /// Votes over the children of the last accepted block. `None`
    /// until the first child arrives after an acceptance.
    current: Option<Snowball>,
    num_processing: usize,
}

impl Snowman {
    /// Creates a new chain consensus instance.
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
            blocks: HashMap::new(),
            pruned: Set::new(),
            last_accepted: None,
            current: None,
            num_processing: 0,
        })
    }

    /// Sets the already-accepted block the chain grows from.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateItem` if the genesis was already set.
    pub fn set_genesis(&mut self, id: Id, height: u64) -> Result<()> {
        if self.last_accepted.is_some() {
            return Err(ConsensusError::DuplicateItem(id.to_string()));
        }
        self.blocks.insert(
            id,
            BlockNode {
                parent: None,
                height,
                children: Set::new(),
                status: Status::Accepted,
                preferred_child: None,
            },
        );
        self.last_accepted = Some(id);
        info!(block = %id, height, "genesis set");
        Ok(())
    }

    /// Adds a block to be voted on.
    ///
    /// # Errors
    ///
    /// `AlreadyDecided` if the id was previously decided or sits on a
    /// pruned branch, `BlockExists` if it is already processing,
    /// `ParentNotFound` if the parent has never been seen, and
    /// `InvalidBlock` if the height does not extend the parent.
    pub fn add_block(&mut self, block: &dyn Block) -> Result<()> {
        let id = block.id();
        let parent = block.parent();
        let height = block.height();

        if self.pruned.contains(&id) {
            return Err(ConsensusError::AlreadyDecided(id.to_string()));
        }
        if let Some(node) = self.blocks.get(&id) {
            return Err(if node.status.decided() {
                ConsensusError::AlreadyDecided(id.to_string())
            } else {
                ConsensusError::BlockExists(id.to_string())
            });
        }
        block.verify()?;

        if self.pruned.contains(&parent) {
            // The whole branch lost; decide the newcomer on arrival.
            self.pruned.add(id);
            debug!(block = %id, "block on pruned branch rejected");
            return Ok(());
        }
        let Some(parent_node) = self.blocks.get_mut(&parent) else {
            return Err(ConsensusError::ParentNotFound(parent.to_string()));
        };
        if height != parent_node.height + 1 {
            return Err(ConsensusError::InvalidBlock(format!(
                "block {id} height {height} does not extend parent height {}",
                parent_node.height
            )));
        }
        if parent_node.status == Status::Accepted && Some(parent) != self.last_accepted {
            // A sibling already won at this height.
            self.pruned.add(id);
            debug!(block = %id, "late sibling of accepted block rejected");
            return Ok(());
        }

        parent_node.children.add(id);
        if parent_node.preferred_child.is_none() {
            parent_node.preferred_child = Some(id);
        }
        self.blocks.insert(
            id,
            BlockNode {
                parent: Some(parent),
                height,
                children: Set::new(),
                status: Status::Processing,
                preferred_child: None,
            },
        );
        self.num_processing += 1;
        debug!(block = %id, height, "block added");

        if Some(parent) == self.last_accepted {
            if self.current.is_none() {
                self.current = Some(Snowball::new(self.params.clone())?);
            }
            if let Some(sb) = self.current.as_mut() {
                sb.add_choice(id)?;
            }
        }
        Ok(())
    }

    /// Records one round of block votes.
    ///
    /// Each vote is walked up to the child of the last accepted block
    /// it descends from; votes for unknown or pruned blocks are
    /// dropped. Along the walk the per-node preferred-child hints are
    /// refreshed wherever a child gathers an alpha majority, so the
    /// reported tip tracks votes below the branch point too. Returns
    /// `true` if a block was accepted.
    pub fn record_poll(&mut self, votes: &Bag<Id>) -> Result<bool> {
        let Some(last) = self.last_accepted else {
            return Err(ConsensusError::InvalidState {
                expected: "genesis set".to_string(),
                actual: "no genesis".to_string(),
            });
        };

        let mut collapsed = Bag::new();
        let mut edge_votes: HashMap<Id, Bag<Id>> = HashMap::new();
        for (vote, count) in votes.iter() {
            // Parent edges crossed on the way up to the branch point.
            let mut path = Vec::new();
            let mut cursor = *vote;
            let branch = loop {
                let Some(node) = self.blocks.get(&cursor) else {
                    break None;
                };
                if node.status != Status::Processing {
                    break None;
                }
                let Some(parent) = node.parent else {
                    break None;
                };
                path.push((parent, cursor));
                if parent == last {
                    break Some(cursor);
                }
                cursor = parent;
            };
            let Some(branch) = branch else {
                continue;
            };
            collapsed.add_count(branch, count);
            for (parent, child) in path {
                if parent != last {
                    edge_votes.entry(parent).or_default().add_count(child, count);
                }
            }
        }

        for (parent, bag) in edge_votes {
            let Some((child, count)) = bag.mode() else {
                continue;
            };
            if count >= self.params.alpha {
                if let Some(node) = self.blocks.get_mut(&parent) {
                    node.preferred_child = Some(child);
                }
            }
        }

        let Some(sb) = self.current.as_mut() else {
            return Ok(false);
        };
        sb.record_poll(&collapsed);
        if !sb.finalized() {
            return Ok(false);
        }
        let Some(winner) = sb.preference() else {
            return Ok(false);
        };
        self.accept_block(winner)?;
        Ok(true)
    }

    /// Returns the tip of the currently preferred branch. This is the
    /// block new proposals should build on.
    #[must_use]
    pub fn preference(&self) -> Option<Id> {
        let mut tip = self.last_accepted?;
        loop {
            let next = if Some(tip) == self.last_accepted {
                self.current.as_ref().and_then(Snowball::preference)
            } else {
                self.blocks.get(&tip).and_then(|node| node.preferred_child)
            };
            match next {
                Some(n) if self.blocks.contains_key(&n) => tip = n,
                _ => return Some(tip),
            }
        }
    }

    /// Returns the most recently accepted block.
    #[must_use]
    pub fn last_accepted(&self) -> Option<Id> {
        self.last_accepted
    }

    /// Returns the status of a block.
    #[must_use]
    pub fn status(&self, id: &Id) -> Status {
        if self.pruned.contains(id) {
            return Status::Rejected;
        }
        self.blocks
            .get(id)
            .map(|node| node.status)
            .unwrap_or(Status::Unknown)
    }

    /// Returns the height of a known block.
    #[must_use]
    pub fn height(&self, id: &Id) -> Option<u64> {
        self.blocks.get(id).map(|node| node.height)
    }

    /// Returns the number of processing blocks.
    #[must_use]
    pub fn num_processing(&self) -> usize {
        self.num_processing
    }

    /// Returns true when no blocks are awaiting a decision.
    #[must_use]
    pub fn finalized(&self) -> bool {
        self.num_processing == 0
    }

    /// Returns the accepted chain from the genesis to the last
    /// accepted block.
    pub fn accepted_chain(&self) -> Vec<Id> {
        let mut chain = Vec::new();
        let mut cursor = self.last_accepted;
        while let Some(id) = cursor {
            chain.push(id);
            cursor = self.blocks.get(&id).and_then(|node| node.parent);
        }
        chain.reverse();
        chain
    }

    fn accept_block(&mut self, winner: Id) -> Result<()> {
        let last = self.last_accepted.expect("accept without genesis");

        let node = self
            .blocks
            .get_mut(&winner)
            .expect("finalized preference not in block map");
        node.status = Status::Accepted;
        self.num_processing -= 1;
        info!(block = %winner, height = node.height, "block accepted");

        let siblings: Vec<Id> = self.blocks[&last]
            .children
            .iter()
            .filter(|c| **c != winner)
            .copied()
            .collect();
        for sibling in siblings {
            self.prune_subtree(sibling);
        }

        self.last_accepted = Some(winner);

        // Children the winner already has seed the next branch point.
        // Sorted insertion keeps the initial preference deterministic.
        let mut children = self.blocks[&winner].children.to_vec();
        children.sort();
        if children.is_empty() {
            self.current = None;
        } else {
            let mut sb = Snowball::new(self.params.clone())?;
            for child in children {
                sb.add_choice(child)?;
            }
            self.current = Some(sb);
        }
        Ok(())
    }

    fn prune_subtree(&mut self, root: Id) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.blocks.remove(&id) else {
                continue;
            };
            self.pruned.add(id);
            self.num_processing -= 1;
            debug!(block = %id, "block rejected");
            stack.extend(node.children.iter().copied());
        }
    }
}
