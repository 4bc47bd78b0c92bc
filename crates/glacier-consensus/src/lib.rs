//! Metastable consensus (Snow family).
//!
//! This crate provides the Snowball voting primitive and the two
//! consensus structures built on it.
//!
//! # Architecture
//!
//! - **Snowball**: Repeated-poll voting over a set of choices
//! - **Snowman**: Linear chain consensus built on Snowball
//! - **Directed**: Conflict-set consensus over transactions
//! - **VertexConsensus**: DAG consensus batching transactions into vertices
//! - **Engine**: Poll lifecycle and engine state machine
//! - **Validators**: Validator registry and weighted sampling
//!
//! # Example
//!
//! ```
//! use glacier_consensus::{Parameters, Snowball};
//!
//! let params = Parameters::default();
//! let mut snowball = Snowball::new(params).unwrap();
//! ```

mod avalanche;
mod choices;
mod engine;
mod error;
mod events;
mod parameters;
mod snowball;
mod snowman;
mod snowstorm;
mod validators;

pub use avalanche::VertexConsensus;
pub use choices::Status;
pub use engine::{Engine, EngineState, QueryPlan};
pub use error::{ConsensusError, Result};
pub use events::Blocker;
pub use parameters::Parameters;
pub use snowball::Snowball;
pub use snowman::{Block, Snowman};
pub use snowstorm::{Directed, Tx};
pub use validators::{Validator, ValidatorSet};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_default_are_valid() {
        let params = Parameters::default();
        assert!(params.validate().is_ok());
        assert!(params.alpha * 2 > params.k);
    }
}
