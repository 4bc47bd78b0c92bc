//! DAG consensus over vertices.
//!
//! A vertex batches transactions and names parent vertices. Votes land
//! on vertices; [`VertexConsensus`] fans each vertex vote down to every
//! processing transaction in its ancestry, drives the transaction layer
//! in [`crate::snowstorm`], and accepts a vertex only after all of its
//! parents and all of its transactions are accepted. Acceptance is
//! therefore always topological.

use std::collections::HashMap;

use glacier_ids::Id;
use glacier_utils::{Bag, Set};
use tracing::{debug, info};

use crate::events::Blocker;
use crate::snowstorm::{Directed, Tx};
use crate::{ConsensusError, Parameters, Result, Status};

#[derive(Debug)]
struct VertexRecord {
    parents: Vec<Id>,
    txs: Vec<Id>,
    height: u64,
    status: Status,
}

/// Vote-driven DAG consensus.
///
/// Owns a [`Directed`] instance for the transaction layer. Single
/// writer, like the rest of the stack.
#[derive(Debug)]
pub struct VertexConsensus {
    vertices: HashMap<Id, VertexRecord>,
    directed: Directed,
    /// Vertices waiting on parents and transactions to decide.
    blocker: Blocker<Id>,
    num_processing: usize,
}

impl VertexConsensus {
    /// Creates a new DAG consensus instance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` if the parameters fail validation.
    pub fn new(params: Parameters) -> Result<Self> {
        Ok(Self {
            vertices: HashMap::new(),
            directed: Directed::new(params)?,
            blocker: Blocker::new(),
            num_processing: 0,
        })
    }

    /// Adds a vertex to be voted on.
    ///
    /// Every parent must already be known; transactions the vertex
    /// carries are added to the transaction layer if they are new
    /// (shared transactions across vertices are fine). A vertex with a
    /// rejected parent or a rejected transaction is admitted and
    /// rejected in the same call.
    ///
    /// # Errors
    ///
    /// `AlreadyDecided`, `DuplicateItem`, or `UnknownParent`.
    pub fn add_vertex(&mut self, id: Id, parent_ids: &[Id], txs: &[&dyn Tx]) -> Result<()> {
        if let Some(rec) = self.vertices.get(&id) {
            return Err(if rec.status.decided() {
                ConsensusError::AlreadyDecided(id.to_string())
            } else {
                ConsensusError::DuplicateItem(id.to_string())
            });
        }

        let mut height = 0;
        let mut doomed = false;
        for parent in parent_ids {
            let Some(p) = self.vertices.get(parent) else {
                return Err(ConsensusError::UnknownParent(parent.to_string()));
            };
            height = height.max(p.height + 1);
            if p.status == Status::Rejected {
                doomed = true;
            }
        }

        let mut tx_ids = Vec::with_capacity(txs.len());
        for tx in txs {
            let txid = tx.id();
            match self.directed.status(&txid) {
                Status::Unknown => self.directed.add(*tx)?,
                Status::Rejected => doomed = true,
                Status::Processing | Status::Accepted => {}
            }
            tx_ids.push(txid);
        }
        // Adding a doomed tx above may have rejected it immediately.
        for txid in &tx_ids {
            if self.directed.status(txid) == Status::Rejected {
                doomed = true;
            }
        }

        let mut deps = Set::new();
        for parent in parent_ids {
            if self.vertices[parent].status == Status::Processing {
                deps.add(*parent);
            }
        }
        for txid in &tx_ids {
            if self.directed.status(txid) == Status::Processing {
                deps.add(*txid);
            }
        }

        self.vertices.insert(
            id,
            VertexRecord {
                parents: parent_ids.to_vec(),
                txs: tx_ids,
                height,
                status: Status::Processing,
            },
        );
        self.num_processing += 1;
        debug!(vertex = %id, height, "vertex added");

        if doomed {
            self.reject_vertex(id);
        } else if let Some(ready) = self.blocker.register(id, deps, id) {
            // No undecided dependencies at all, e.g. the genesis vertex.
            self.accept_vertex(ready);
        }
        self.drain_tx_decisions();
        Ok(())
    }

    /// Records one round of vertex votes.
    ///
    /// A vote for a vertex counts for every processing transaction in
    /// the vertex and its processing ancestry. Returns `true` if any
    /// vertex or transaction reached a terminal state.
    pub fn record_poll(&mut self, votes: &Bag<Id>) -> Result<bool> {
        let mut tx_votes: Bag<Id> = Bag::new();
        for (vertex, count) in votes.iter() {
            let mut visited = Set::new();
            let mut stack = vec![*vertex];
            while let Some(v) = stack.pop() {
                if !visited.add(v) {
                    continue;
                }
                let Some(rec) = self.vertices.get(&v) else {
                    continue;
                };
                if rec.status != Status::Processing {
                    continue;
                }
                for txid in &rec.txs {
                    if self.directed.status(txid) == Status::Processing {
                        tx_votes.add_count(*txid, count);
                    }
                }
                stack.extend(rec.parents.iter().copied());
            }
        }

        let before = self.num_processing;
        let tx_changed = self.directed.record_poll(&tx_votes)?;
        self.drain_tx_decisions();
        Ok(tx_changed || self.num_processing != before)
    }

    /// Returns the status of a vertex.
    #[must_use]
    pub fn vertex_status(&self, id: &Id) -> Status {
        self.vertices
            .get(id)
            .map(|rec| rec.status)
            .unwrap_or(Status::Unknown)
    }

    /// Returns the status of a transaction.
    #[must_use]
    pub fn tx_status(&self, id: &Id) -> Status {
        self.directed.status(id)
    }

    /// Returns true if the vertex has been accepted.
    #[must_use]
    pub fn is_accepted(&self, id: &Id) -> bool {
        self.vertex_status(id) == Status::Accepted
    }

    /// Returns true if the vertex has been rejected.
    #[must_use]
    pub fn is_rejected(&self, id: &Id) -> bool {
        self.vertex_status(id) == Status::Rejected
    }

    /// Returns the height of a known vertex.
    #[must_use]
    pub fn height(&self, id: &Id) -> Option<u64> {
        self.vertices.get(id).map(|rec| rec.height)
    }

    /// Returns the number of processing vertices.
    #[must_use]
    pub fn num_processing(&self) -> usize {
        self.num_processing
    }

    /// Returns true once every known vertex has been decided.
    #[must_use]
    pub fn finalized(&self) -> bool {
        self.num_processing == 0
    }

    /// Returns the preferred frontier: the deepest vertices whose
    /// ancestry and transactions are all accepted or currently
    /// preferred. These are the vertices new issuances should name as
    /// parents.
    pub fn preferred_frontier(&self) -> Vec<Id> {
        let tx_prefs: Set<Id> = self.directed.preferences().into_iter().collect();

        let mut processing: Vec<(&Id, &VertexRecord)> = self
            .vertices
            .iter()
            .filter(|(_, rec)| rec.status == Status::Processing)
            .collect();
        processing.sort_by_key(|(_, rec)| rec.height);

        // Parents decide before children, so one pass in height order
        // sees every parent's verdict first.
        let mut preferred = Set::new();
        for (id, rec) in &processing {
            let parents_ok = rec.parents.iter().all(|p| {
                self.vertices[p].status == Status::Accepted || preferred.contains(p)
            });
            let txs_ok = rec.txs.iter().all(|t| {
                self.directed.status(t) == Status::Accepted || tx_prefs.contains(t)
            });
            if parents_ok && txs_ok {
                preferred.add(**id);
            }
        }

        let mut interior = Set::new();
        for (_, rec) in &processing {
            for parent in &rec.parents {
                if preferred.contains(parent) {
                    interior.add(*parent);
                }
            }
        }

        let mut frontier: Vec<Id> = preferred
            .iter()
            .filter(|id| !interior.contains(*id))
            .copied()
            .collect();
        if frontier.is_empty() {
            frontier = self.accepted_frontier();
        }
        frontier.sort();
        frontier
    }

    /// Returns the accepted vertices with no accepted children.
    pub fn accepted_frontier(&self) -> Vec<Id> {
        let mut interior = Set::new();
        for rec in self.vertices.values() {
            if rec.status == Status::Accepted {
                for parent in &rec.parents {
                    interior.add(*parent);
                }
            }
        }
        let mut frontier: Vec<Id> = self
            .vertices
            .iter()
            .filter(|(id, rec)| rec.status == Status::Accepted && !interior.contains(*id))
            .map(|(id, _)| *id)
            .collect();
        frontier.sort();
        frontier
    }

    /// Returns the processing transactions with no live conflicts.
    pub fn virtuous_txs(&self) -> Vec<Id> {
        self.directed.virtuous()
    }

    fn drain_tx_decisions(&mut self) {
        for (txid, status) in self.directed.take_decisions() {
            match status {
                Status::Accepted => {
                    for (vertex, _) in self.blocker.fulfill(txid) {
                        self.accept_vertex(vertex);
                    }
                }
                Status::Rejected => {
                    for (vertex, _) in self.blocker.abandon(txid) {
                        self.reject_vertex(vertex);
                    }
                }
                _ => {}
            }
        }
    }

    fn accept_vertex(&mut self, id: Id) {
        let rec = self.vertices.get_mut(&id).expect("accepting unknown vertex");
        if rec.status != Status::Processing {
            return;
        }
        rec.status = Status::Accepted;
        self.num_processing -= 1;
        info!(vertex = %id, "vertex accepted");

        for (child, _) in self.blocker.fulfill(id) {
            self.accept_vertex(child);
        }
    }

    fn reject_vertex(&mut self, id: Id) {
        let rec = self.vertices.get_mut(&id).expect("rejecting unknown vertex");
        if rec.status != Status::Processing {
            return;
        }
        rec.status = Status::Rejected;
        self.num_processing -= 1;
        debug!(vertex = %id, "vertex rejected");

        // Descendants can never satisfy their parent dependency.
        for (child, _) in self.blocker.abandon(id) {
            self.reject_vertex(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestTx {
        id: Id,
        inputs: Vec<Id>,
    }

    impl TestTx {
        fn new(id: u8, inputs: &[u8]) -> Self {
            Self {
                id: make_id(id),
                inputs: inputs.iter().map(|b| make_id(*b)).collect(),
            }
        }
    }

    impl Tx for TestTx {
        fn id(&self) -> Id {
            self.id
        }

        fn input_ids(&self) -> Vec<Id> {
            self.inputs.clone()
        }
    }

    fn make_id(byte: u8) -> Id {
        Id::from_bytes([byte; 32])
    }

    fn params() -> Parameters {
        Parameters::new(5, 3, 2, 3)
    }

    fn votes_for(ids: &[u8]) -> Bag<Id> {
        let mut bag = Bag::new();
        for id in ids {
            bag.add_count(make_id(*id), 4);
        }
        bag
    }

    /// Builds a DAG with an empty accepted genesis vertex (id 0).
    fn dag_with_genesis() -> VertexConsensus {
        let mut dag = VertexConsensus::new(params()).unwrap();
        dag.add_vertex(make_id(0), &[], &[]).unwrap();
        assert_eq!(dag.vertex_status(&make_id(0)), Status::Accepted);
        dag
    }

    #[test]
    fn test_unknown_parent_errors() {
        let mut dag = VertexConsensus::new(params()).unwrap();
        let result = dag.add_vertex(make_id(1), &[make_id(9)], &[]);
        assert!(matches!(result, Err(ConsensusError::UnknownParent(_))));
    }

    #[test]
    fn test_vertex_accepts_with_txs() {
        let mut dag = dag_with_genesis();
        let tx = TestTx::new(10, &[100]);
        dag.add_vertex(make_id(1), &[make_id(0)], &[&tx]).unwrap();

        assert_eq!(dag.height(&make_id(1)), Some(1));

        dag.record_poll(&votes_for(&[1])).unwrap();
        assert_eq!(dag.vertex_status(&make_id(1)), Status::Processing);

        // Second conclusive poll finalizes the virtuous tx, and the
        // vertex follows in the same call.
        assert!(dag.record_poll(&votes_for(&[1])).unwrap());
        assert_eq!(dag.tx_status(&make_id(10)), Status::Accepted);
        assert_eq!(dag.vertex_status(&make_id(1)), Status::Accepted);
        assert!(dag.finalized());
    }

    #[test]
    fn test_child_vote_counts_for_ancestry() {
        let mut dag = dag_with_genesis();
        let tx_a = TestTx::new(10, &[100]);
        let tx_b = TestTx::new(11, &[101]);
        dag.add_vertex(make_id(1), &[make_id(0)], &[&tx_a]).unwrap();
        dag.add_vertex(make_id(2), &[make_id(1)], &[&tx_b]).unwrap();

        // Votes only ever land on the child; the parent's tx still
        // gains confidence through the ancestry walk.
        dag.record_poll(&votes_for(&[2])).unwrap();
        dag.record_poll(&votes_for(&[2])).unwrap();

        assert_eq!(dag.vertex_status(&make_id(1)), Status::Accepted);
        assert_eq!(dag.vertex_status(&make_id(2)), Status::Accepted);
    }

    #[test]
    fn test_vertex_waits_for_parent() {
        let mut dag = dag_with_genesis();
        let tx_a = TestTx::new(10, &[100]);
        let tx_a2 = TestTx::new(11, &[100]); // conflicts with tx_a
        let tx_b = TestTx::new(12, &[101]);
        dag.add_vertex(make_id(1), &[make_id(0)], &[&tx_a]).unwrap();
        dag.add_vertex(make_id(2), &[make_id(0)], &[&tx_a2]).unwrap();
        dag.add_vertex(make_id(3), &[make_id(1)], &[&tx_b]).unwrap();

        // tx_b finalizes quickly, but vertex 3 waits for vertex 1,
        // which is held up by the rogue conflict.
        dag.record_poll(&votes_for(&[3])).unwrap();
        dag.record_poll(&votes_for(&[3])).unwrap();
        assert_eq!(dag.tx_status(&make_id(12)), Status::Accepted);
        assert_eq!(dag.vertex_status(&make_id(3)), Status::Processing);

        // One more conclusive round pushes the rogue tx past beta.
        dag.record_poll(&votes_for(&[3])).unwrap();
        assert_eq!(dag.vertex_status(&make_id(1)), Status::Accepted);
        assert_eq!(dag.vertex_status(&make_id(3)), Status::Accepted);
    }

    #[test]
    fn test_rejected_tx_rejects_vertex_and_descendants() {
        let mut dag = dag_with_genesis();
        let tx_a = TestTx::new(10, &[100]);
        let tx_a2 = TestTx::new(11, &[100]);
        let tx_b = TestTx::new(12, &[101]);
        dag.add_vertex(make_id(1), &[make_id(0)], &[&tx_a]).unwrap();
        dag.add_vertex(make_id(2), &[make_id(0)], &[&tx_a2]).unwrap();
        dag.add_vertex(make_id(3), &[make_id(2)], &[&tx_b]).unwrap();

        // tx_a wins the conflict; vertex 2 and its child die with tx_a2.
        for _ in 0..3 {
            dag.record_poll(&votes_for(&[1])).unwrap();
        }

        assert_eq!(dag.vertex_status(&make_id(1)), Status::Accepted);
        assert_eq!(dag.vertex_status(&make_id(2)), Status::Rejected);
        assert_eq!(dag.vertex_status(&make_id(3)), Status::Rejected);
        assert_eq!(dag.tx_status(&make_id(12)), Status::Processing);
    }

    #[test]
    fn test_add_child_of_rejected_parent() {
        let mut dag = dag_with_genesis();
        let tx_a = TestTx::new(10, &[100]);
        let tx_a2 = TestTx::new(11, &[100]);
        dag.add_vertex(make_id(1), &[make_id(0)], &[&tx_a]).unwrap();
        dag.add_vertex(make_id(2), &[make_id(0)], &[&tx_a2]).unwrap();
        for _ in 0..3 {
            dag.record_poll(&votes_for(&[1])).unwrap();
        }
        assert_eq!(dag.vertex_status(&make_id(2)), Status::Rejected);

        // A late child of the rejected vertex is decided on arrival.
        let tx_b = TestTx::new(12, &[101]);
        dag.add_vertex(make_id(3), &[make_id(2)], &[&tx_b]).unwrap();
        assert_eq!(dag.vertex_status(&make_id(3)), Status::Rejected);
    }

    #[test]
    fn test_preferred_frontier() {
        let mut dag = dag_with_genesis();
        let tx_a = TestTx::new(10, &[100]);
        let tx_a2 = TestTx::new(11, &[100]);
        dag.add_vertex(make_id(1), &[make_id(0)], &[&tx_a]).unwrap();
        dag.add_vertex(make_id(2), &[make_id(0)], &[&tx_a2]).unwrap();

        // Equal confidence: the lower tx id wins the preference, so
        // only vertex 1 is on the frontier.
        assert_eq!(dag.preferred_frontier(), vec![make_id(1)]);

        // A conclusive round for vertex 2 flips the preference.
        dag.record_poll(&votes_for(&[2])).unwrap();
        assert_eq!(dag.preferred_frontier(), vec![make_id(2)]);
    }

    #[test]
    fn test_shared_tx_across_vertices() {
        let mut dag = dag_with_genesis();
        let tx = TestTx::new(10, &[100]);
        dag.add_vertex(make_id(1), &[make_id(0)], &[&tx]).unwrap();
        // The same tx reissued in a second vertex is not an error.
        dag.add_vertex(make_id(2), &[make_id(0)], &[&tx]).unwrap();

        dag.record_poll(&votes_for(&[1, 2])).unwrap();
        dag.record_poll(&votes_for(&[1, 2])).unwrap();

        assert_eq!(dag.vertex_status(&make_id(1)), Status::Accepted);
        assert_eq!(dag.vertex_status(&make_id(2)), Status::Accepted);
    }
}
