//! Ensemble configuration.

use crate::error::{EnsembleError, Result};
use crate::partitioning::PartitionStrategy;
use serde::{Deserialize, Serialize};

/// Configuration for an [`LshEnsemble`](super::LshEnsemble).
///
/// Fields missing from a serialized config take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// MinHash permutations per signature.
    pub num_hash: usize,
    /// Maximum rows per band. Must divide `num_hash`.
    pub max_k: usize,
    /// Requested number of size partitions (an upper bound; fewer are built
    /// when there are fewer distinct sizes).
    pub num_partitions: usize,
    /// MinHash seed; queries must be sketched with the same seed.
    pub seed: u64,
    /// How partition boundaries are chosen by [`bootstrap`](super::LshEnsemble::bootstrap).
    pub strategy: PartitionStrategy,
    /// Bound of the query result channel. 0 makes it a rendezvous channel.
    pub channel_capacity: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            num_hash: 256,
            max_k: 4,
            num_partitions: 8,
            seed: 42,
            strategy: PartitionStrategy::Optimal,
            channel_capacity: 64,
        }
    }
}

impl EnsembleConfig {
    #[must_use]
    pub fn with_num_hash(mut self, num_hash: usize) -> Self {
        self.num_hash = num_hash;
        self
    }

    #[must_use]
    pub fn with_max_k(mut self, max_k: usize) -> Self {
        self.max_k = max_k;
        self
    }

    #[must_use]
    pub fn with_num_partitions(mut self, num_partitions: usize) -> Self {
        self.num_partitions = num_partitions;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: PartitionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }

    /// Bands per signature at build granularity.
    pub fn num_bands(&self) -> usize {
        self.num_hash / self.max_k.max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_hash == 0 {
            return Err(EnsembleError::InvalidParameter(
                "num_hash must be greater than 0".to_string(),
            ));
        }
        if self.max_k == 0 {
            return Err(EnsembleError::InvalidParameter(
                "max_k must be greater than 0".to_string(),
            ));
        }
        if self.num_hash % self.max_k != 0 {
            return Err(EnsembleError::InvalidParameter(format!(
                "max_k ({}) must divide num_hash ({})",
                self.max_k, self.num_hash
            )));
        }
        if self.num_partitions == 0 {
            return Err(EnsembleError::InvalidParameter(
                "num_partitions must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = EnsembleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_bands(), 64);
    }

    #[test]
    fn rejects_bad_hash_layout() {
        assert!(EnsembleConfig::default().with_num_hash(0).validate().is_err());
        assert!(EnsembleConfig::default().with_max_k(0).validate().is_err());
        assert!(EnsembleConfig::default()
            .with_num_hash(100)
            .with_max_k(3)
            .validate()
            .is_err());
        assert!(EnsembleConfig::default()
            .with_num_partitions(0)
            .validate()
            .is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EnsembleConfig =
            serde_json::from_str(r#"{"num_hash":128,"strategy":"equi_depth"}"#).unwrap();
        assert_eq!(config.num_hash, 128);
        assert_eq!(config.max_k, 4);
        assert_eq!(config.strategy, PartitionStrategy::EquiDepth);
    }
}
