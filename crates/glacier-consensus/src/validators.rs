//! Validator registry and weighted poll sampling.

use std::collections::HashMap;

use glacier_ids::NodeId;
use parking_lot::RwLock;
use rand::Rng;
use tracing::debug;

use crate::{ConsensusError, Result};

/// A staked peer eligible for polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub node_id: NodeId,
    /// Stake weight; the probability of being sampled is proportional
    /// to it. Zero-weight validators are never sampled.
    pub weight: u64,
}

impl Validator {
    #[must_use]
    pub fn new(node_id: NodeId, weight: u64) -> Self {
        Self { node_id, weight }
    }
}

/// The set of validators a poll samples from.
///
/// Interior locking so the registry can be shared with the membership
/// feed while the engine reads it.
#[derive(Debug, Default)]
pub struct ValidatorSet {
    validators: RwLock<HashMap<NodeId, Validator>>,
}

impl ValidatorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a validator, or updates its weight if already present.
    pub fn add(&self, validator: Validator) {
        debug!(node = %validator.node_id, weight = validator.weight, "validator added");
        self.validators
            .write()
            .insert(validator.node_id, validator);
    }

    /// Removes a validator. Returns the removed entry, if any.
    pub fn remove(&self, node_id: &NodeId) -> Option<Validator> {
        self.validators.write().remove(node_id)
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.validators.read().contains_key(node_id)
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Validator> {
        self.validators.read().get(node_id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }

    /// Returns the sum of all validator weights.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.validators.read().values().map(|v| v.weight).sum()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.validators.read().keys().copied().collect()
    }

    /// Samples `k` distinct validators, weighted by stake.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientValidators` if fewer than `k` validators
    /// carry positive weight.
    pub fn sample(&self, k: usize) -> Result<Vec<NodeId>> {
        self.sample_with_rng(k, &mut rand::thread_rng())
    }

    /// Samples with a caller-supplied source of randomness. Tests use
    /// this with a seeded generator.
    pub fn sample_with_rng<R: Rng + ?Sized>(&self, k: usize, rng: &mut R) -> Result<Vec<NodeId>> {
        let validators = self.validators.read();

        let mut remaining: Vec<(NodeId, u64)> = validators
            .values()
            .filter(|v| v.weight > 0)
            .map(|v| (v.node_id, v.weight))
            .collect();
        if remaining.len() < k {
            return Err(ConsensusError::InsufficientValidators {
                needed: k,
                have: remaining.len(),
            });
        }
        let mut total: u64 = remaining.iter().map(|(_, w)| w).sum();

        let mut sampled = Vec::with_capacity(k);
        for _ in 0..k {
            let mut target = rng.gen_range(0..total);
            let mut index = 0;
            for (i, (_, weight)) in remaining.iter().enumerate() {
                if target < *weight {
                    index = i;
                    break;
                }
                target -= *weight;
            }
            let (node, weight) = remaining.swap_remove(index);
            total -= weight;
            sampled.push(node);
        }
        Ok(sampled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn node(byte: u8) -> NodeId {
        NodeId::from_bytes([byte; 20])
    }

    fn set_of(weights: &[(u8, u64)]) -> ValidatorSet {
        let set = ValidatorSet::new();
        for (id, weight) in weights {
            set.add(Validator::new(node(*id), *weight));
        }
        set
    }

    #[test]
    fn test_add_update_remove() {
        let set = set_of(&[(1, 10)]);
        assert_eq!(set.total_weight(), 10);

        set.add(Validator::new(node(1), 25));
        assert_eq!(set.len(), 1);
        assert_eq!(set.total_weight(), 25);

        assert!(set.remove(&node(1)).is_some());
        assert!(set.is_empty());
    }

    #[test]
    fn test_sample_returns_distinct_nodes() {
        let set = set_of(&[(1, 10), (2, 10), (3, 10), (4, 10), (5, 10)]);
        let mut rng = StdRng::seed_from_u64(7);

        let sampled = set.sample_with_rng(5, &mut rng).unwrap();
        assert_eq!(sampled.len(), 5);
        let unique: std::collections::HashSet<_> = sampled.iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_sample_insufficient() {
        let set = set_of(&[(1, 10), (2, 10)]);
        let mut rng = StdRng::seed_from_u64(7);

        assert!(matches!(
            set.sample_with_rng(3, &mut rng),
            Err(ConsensusError::InsufficientValidators { needed: 3, have: 2 })
        ));
    }

    #[test]
    fn test_zero_weight_never_sampled() {
        let set = set_of(&[(1, 10), (2, 0)]);
        let mut rng = StdRng::seed_from_u64(7);

        let sampled = set.sample_with_rng(1, &mut rng).unwrap();
        assert_eq!(sampled, vec![node(1)]);

        // The zero-weight validator does not count toward k either.
        assert!(set.sample_with_rng(2, &mut rng).is_err());
    }

    #[test]
    fn test_sample_weights_bias() {
        let set = set_of(&[(1, 1_000), (2, 1)]);
        let mut rng = StdRng::seed_from_u64(42);

        let mut heavy = 0;
        for _ in 0..100 {
            if set.sample_with_rng(1, &mut rng).unwrap()[0] == node(1) {
                heavy += 1;
            }
        }
        assert!(heavy > 90);
    }
}
