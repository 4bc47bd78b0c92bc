//! Consensus parameters.

use std::time::Duration;

/// Tunables shared by every consensus instance.
///
/// Parameters are immutable once an instance is constructed; they are
/// passed by value into every constructor rather than read from any
/// global registry.
#[derive(Debug, Clone)]
pub struct Parameters {
    /// Sample size: the number of validators polled each round.
    pub k: usize,

    /// Quorum threshold: votes needed for a conclusive round. `alpha <= k`.
    pub alpha: usize,

    /// Consecutive conclusive rounds needed to finalize an item with no
    /// live conflicts.
    pub beta_virtuous: usize,

    /// Consecutive conclusive rounds needed to finalize an item that
    /// shares a resource with another live item. `beta_rogue >= beta_virtuous`.
    pub beta_rogue: usize,

    /// Maximum polls in flight at once.
    pub concurrent_polls: usize,

    /// Number of undecided items the engine aims to keep in the pipeline.
    pub optimal_processing: usize,

    /// Hard cap on undecided items tracked simultaneously.
    pub max_outstanding_items: usize,

    /// Of the `k` sampled peers that are validators, how many receive a
    /// push query (item included) rather than a pull query.
    pub mixed_query_num_push_vdr: usize,

    /// As above for sampled non-validator peers.
    pub mixed_query_num_push_non_vdr: usize,

    /// Deadline for a single poll; expiry resolves the poll with the
    /// votes collected so far.
    pub max_item_processing_time: Duration,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            k: 20,
            alpha: 15,
            beta_virtuous: 15,
            beta_rogue: 20,
            concurrent_polls: 4,
            optimal_processing: 50,
            max_outstanding_items: 1024,
            mixed_query_num_push_vdr: 10,
            mixed_query_num_push_non_vdr: 0,
            max_item_processing_time: Duration::from_secs(30),
        }
    }
}

impl Parameters {
    /// Creates parameters with the given voting thresholds, keeping
    /// defaults for the pipeline bounds.
    #[must_use]
    pub fn new(k: usize, alpha: usize, beta_virtuous: usize, beta_rogue: usize) -> Self {
        let defaults = Self::default();
        Self {
            k,
            alpha,
            beta_virtuous,
            beta_rogue,
            // The pipeline defaults assume a large sample; small-k
            // configurations still have to pass validation.
            mixed_query_num_push_vdr: defaults.mixed_query_num_push_vdr.min(k),
            mixed_query_num_push_non_vdr: defaults.mixed_query_num_push_non_vdr.min(k),
            ..defaults
        }
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.k == 0 {
            return Err("k must be positive".to_string());
        }
        if self.alpha == 0 {
            return Err("alpha must be positive".to_string());
        }
        if self.alpha > self.k {
            return Err(format!("alpha = {} must be <= k = {}", self.alpha, self.k));
        }
        if self.beta_virtuous == 0 {
            return Err("beta_virtuous must be positive".to_string());
        }
        if self.beta_rogue < self.beta_virtuous {
            return Err(format!(
                "beta_rogue = {} must be >= beta_virtuous = {}",
                self.beta_rogue, self.beta_virtuous
            ));
        }
        if self.concurrent_polls == 0 {
            return Err("concurrent_polls must be positive".to_string());
        }
        if self.max_outstanding_items == 0 {
            return Err("max_outstanding_items must be positive".to_string());
        }
        if self.mixed_query_num_push_vdr > self.k {
            return Err(format!(
                "mixed_query_num_push_vdr = {} must be <= k = {}",
                self.mixed_query_num_push_vdr, self.k
            ));
        }
        if self.mixed_query_num_push_non_vdr > self.k {
            return Err(format!(
                "mixed_query_num_push_non_vdr = {} must be <= k = {}",
                self.mixed_query_num_push_non_vdr, self.k
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_valid() {
        assert!(Parameters::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_k() {
        let params = Parameters {
            k: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_invalid_alpha() {
        let params = Parameters {
            k: 20,
            alpha: 25,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_invalid_beta() {
        let params = Parameters {
            beta_virtuous: 20,
            beta_rogue: 15,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_new_with_small_k_is_valid() {
        // The push-query default exceeds small sample sizes; the
        // constructor clamps it so small-k configurations validate.
        let params = Parameters::new(5, 3, 2, 3);
        assert!(params.validate().is_ok());
        assert_eq!(params.mixed_query_num_push_vdr, 5);

        let params = Parameters::new(1, 1, 1, 1);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_invalid_mixed_query() {
        let params = Parameters {
            k: 5,
            alpha: 3,
            mixed_query_num_push_vdr: 10,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
