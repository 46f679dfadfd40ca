//! LSH Ensemble: partitioned containment search.
//!
//! # Architecture
//!
//! ```text
//!            add(key, sig, size)
//!                   │  route by size
//!      ┌────────────┼────────────┐
//!      ▼            ▼            ▼
//!  [l0, u0)     [u0, u1)  …  [un-1, un)     one BandedIndex each
//!      │            │            │
//!      └──── build_all (parallel barrier) ───┘
//!
//!            query(sig, q, t)
//!   per partition: (k, l) = OptimalKL(u_i − 1, q, t)   (cached)
//!   one producer per partition ──▶ merged QueryStream
//! ```
//!
//! Each domain lives in exactly one partition, so the merged stream never
//! repeats a key across partitions. Within one partition a key can appear
//! once per matching band.
//!
//! # Example
//!
//! ```rust
//! use lsh_ensemble::{DomainRecord, EnsembleConfig, ForestEnsemble};
//! use std::collections::HashSet;
//!
//! # fn main() -> lsh_ensemble::Result<()> {
//! let config = EnsembleConfig::default().with_num_hash(128).with_num_partitions(2);
//! let domains: Vec<(&str, HashSet<&str>)> = vec![
//!     ("colors", ["red", "green", "blue"].into_iter().collect()),
//!     ("fruit", ["apple", "pear", "plum", "fig"].into_iter().collect()),
//! ];
//! let records = domains
//!     .iter()
//!     .map(|(k, v)| DomainRecord::from_set(*k, v, config.seed, config.num_hash))
//!     .collect::<lsh_ensemble::Result<Vec<_>>>()?;
//!
//! let index = ForestEnsemble::bootstrap(config, &records)?;
//! let hits: Vec<String> = index
//!     .query(&records[0].signature, records[0].size, 0.8)?
//!     .collect();
//! assert!(hits.contains(&"colors".to_string()));
//! # Ok(())
//! # }
//! ```

mod config;
mod stream;

pub use config::EnsembleConfig;
pub use stream::{CancelToken, QueryStream};

use crate::error::{EnsembleError, Result};
use crate::forest::{BandHashIndex, BandedIndex, IndexStats, LshForest};
use crate::hash::Signature;
use crate::params::{validate_threshold, BandingParams, CacheKey, ParamCache};
use crate::partitioning::{
    build_partitions, find_partition, validate_partitions, Partition, PartitionLayout,
};
use crate::record::DomainRecord;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Ensemble over array-backed LSH forests.
pub type ForestEnsemble = LshEnsemble<LshForest>;

/// Ensemble over hash-table banded indexes.
pub type HashedEnsemble = LshEnsemble<BandHashIndex>;

/// One size partition and its index.
pub(crate) struct PartitionIndex<I> {
    pub(crate) bounds: Partition,
    pub(crate) index: I,
}

enum Stage<I> {
    /// Accepting records.
    Staging(Vec<PartitionIndex<I>>),
    /// Read-only, shared with in-flight queries.
    Built(Arc<[PartitionIndex<I>]>),
    /// A partition failed to build; nothing is usable.
    Failed,
}

/// Per-partition statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStats {
    pub bounds: Partition,
    pub index: IndexStats,
}

/// Ensemble-wide statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsembleStats {
    pub partitions: Vec<PartitionStats>,
    pub total_records: usize,
    pub built: bool,
    pub cached_params: usize,
}

/// Containment-search index over size-partitioned banded LSH indexes.
///
/// The index variant is chosen by type parameter; see [`ForestEnsemble`] and
/// [`HashedEnsemble`].
pub struct LshEnsemble<I: BandedIndex = LshForest> {
    config: EnsembleConfig,
    bounds: Vec<Partition>,
    stage: Stage<I>,
    param_cache: ParamCache,
    live_producers: Arc<AtomicUsize>,
}

impl<I: BandedIndex + 'static> LshEnsemble<I> {
    /// Create an empty ensemble over explicit partition boundaries.
    ///
    /// Partitions must be non-empty, sorted and contiguous.
    pub fn new(partitions: Vec<Partition>, config: EnsembleConfig) -> Result<Self> {
        config.validate()?;
        validate_partitions(&partitions)?;

        let num_bands = config.num_bands();
        let indexes = partitions
            .iter()
            .map(|&bounds| {
                Ok(PartitionIndex {
                    bounds,
                    index: I::new(config.max_k, num_bands)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            partitions = partitions.len(),
            num_hash = config.num_hash,
            max_k = config.max_k,
            "created ensemble"
        );
        Ok(Self {
            config,
            bounds: partitions,
            stage: Stage::Staging(indexes),
            param_cache: ParamCache::new(),
            live_producers: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Recreate an empty ensemble from saved partition boundaries.
    ///
    /// Band tables are not part of the layout: re-add the source records and
    /// call [`build_all`](Self::build_all) before querying.
    pub fn from_layout(layout: &PartitionLayout, config: EnsembleConfig) -> Result<Self> {
        if layout.num_hash != config.num_hash || layout.max_k != config.max_k {
            return Err(EnsembleError::InvalidParameter(format!(
                "layout was made for num_hash={} max_k={}, config has num_hash={} max_k={}",
                layout.num_hash, layout.max_k, config.num_hash, config.max_k
            )));
        }
        Self::new(layout.partitions.clone(), config)
    }

    /// Partition the records by size, index them and build.
    pub fn bootstrap(config: EnsembleConfig, records: &[DomainRecord]) -> Result<Self> {
        config.validate()?;
        let sizes: Vec<usize> = records.iter().map(|r| r.size).collect();
        let partitions = build_partitions(&sizes, config.num_partitions, config.strategy)?;

        let mut ensemble = Self::new(partitions, config)?;
        for record in records {
            ensemble.add_record(record)?;
        }
        ensemble.build_all()?;
        Ok(ensemble)
    }

    /// Stage a domain in the partition covering `size`.
    pub fn add(&mut self, key: &str, signature: &Signature, size: usize) -> Result<()> {
        let parts = match &mut self.stage {
            Stage::Staging(parts) => parts,
            Stage::Built(_) => return Err(EnsembleError::AlreadyBuilt),
            Stage::Failed => return Err(EnsembleError::Poisoned),
        };
        let Some(idx) = find_partition(&self.bounds, size) else {
            let (lower, upper) = size_range(&self.bounds);
            return Err(EnsembleError::SizeOutOfRange { size, lower, upper });
        };
        parts[idx].index.add(key, signature)
    }

    pub fn add_record(&mut self, record: &DomainRecord) -> Result<()> {
        self.add(&record.key, &record.signature, record.size)
    }

    /// Build every partition in parallel and make the ensemble queryable.
    ///
    /// Returns once all partitions are done. If any partition fails the
    /// ensemble is left unusable.
    pub fn build_all(&mut self) -> Result<()> {
        let mut parts = match std::mem::replace(&mut self.stage, Stage::Failed) {
            Stage::Staging(parts) => parts,
            Stage::Built(parts) => {
                self.stage = Stage::Built(parts);
                return Err(EnsembleError::AlreadyBuilt);
            }
            Stage::Failed => return Err(EnsembleError::Poisoned),
        };

        let start = Instant::now();
        let built = parts
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(partition, p)| {
                p.index
                    .build()
                    .map_err(|e| EnsembleError::PartitionBuild {
                        partition,
                        source: Box::new(e),
                    })
            });

        if let Err(e) = built {
            error!(error = %e, "ensemble build failed");
            return Err(e);
        }

        for (i, p) in parts.iter().enumerate() {
            debug!(
                partition = i,
                lower = p.bounds.lower,
                upper = p.bounds.upper,
                records = p.index.len(),
                "partition built"
            );
        }
        info!(
            partitions = parts.len(),
            records = parts.iter().map(|p| p.index.len()).sum::<usize>(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ensemble built"
        );
        self.stage = Stage::Built(Arc::from(parts));
        Ok(())
    }

    /// Banding parameters each partition would use for this query.
    pub fn optimal_params(&self, size: usize, threshold: f64) -> Result<Vec<BandingParams>> {
        if size == 0 {
            return Err(EnsembleError::EmptyQuery);
        }
        validate_threshold(threshold)?;

        self.partition_indexes()?
            .iter()
            .map(|p| {
                let key = CacheKey::new(p.bounds.upper, size, threshold);
                self.param_cache.get_or_compute(key, |key| {
                    p.index
                        .optimal_kl(p.bounds.max_size(), size, key.threshold())
                        .map(|opt| opt.banding())
                })
            })
            .collect()
    }

    /// Start a containment query.
    ///
    /// Returns a stream of candidate keys whose containment of the query may
    /// reach `threshold`. Candidates can include false positives; confirm
    /// them against the raw values when exact answers matter.
    pub fn query(&self, signature: &Signature, size: usize, threshold: f64) -> Result<QueryStream> {
        if size == 0 {
            return Err(EnsembleError::EmptyQuery);
        }
        validate_threshold(threshold)?;
        if signature.len() != self.config.num_hash {
            return Err(EnsembleError::SignatureLength {
                expected: self.config.num_hash,
                actual: signature.len(),
            });
        }
        let parts = match &self.stage {
            Stage::Built(parts) => Arc::clone(parts),
            Stage::Staging(_) => return Err(EnsembleError::NotBuilt),
            Stage::Failed => return Err(EnsembleError::Poisoned),
        };

        let params = self.optimal_params(size, threshold)?;

        // A partition that cannot answer fails the whole query.
        for (partition, (p, banding)) in parts.iter().zip(&params).enumerate() {
            if let Err(e) = p.index.query(signature, banding.k, banding.l) {
                error!(partition, error = %e, "partition query failed");
                return Err(EnsembleError::PartitionQuery {
                    partition,
                    source: Box::new(e),
                });
            }
        }

        debug!(size, threshold, ?params, "dispatching query");
        QueryStream::spawn(
            parts,
            params,
            signature.clone(),
            self.config.channel_capacity,
            &self.live_producers,
        )
    }

    /// Run a query to completion and collect every candidate.
    pub fn query_all(&self, signature: &Signature, size: usize, threshold: f64) -> Result<Vec<String>> {
        Ok(self.query(signature, size, threshold)?.collect())
    }

    fn partition_indexes(&self) -> Result<&[PartitionIndex<I>]> {
        match &self.stage {
            Stage::Staging(parts) => Ok(&parts[..]),
            Stage::Built(parts) => Ok(&parts[..]),
            Stage::Failed => Err(EnsembleError::Poisoned),
        }
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.bounds
    }

    pub fn num_partitions(&self) -> usize {
        self.bounds.len()
    }

    /// Serializable partition boundaries.
    pub fn layout(&self) -> PartitionLayout {
        PartitionLayout {
            num_hash: self.config.num_hash,
            max_k: self.config.max_k,
            partitions: self.bounds.clone(),
        }
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn is_built(&self) -> bool {
        matches!(self.stage, Stage::Built(_))
    }

    /// Total records across partitions.
    pub fn len(&self) -> usize {
        self.partition_indexes()
            .map(|parts| parts.iter().map(|p| p.index.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cached `(k, l)` entries.
    pub fn param_cache_len(&self) -> usize {
        self.param_cache.len()
    }

    /// Producer threads currently running across all open query streams.
    pub fn active_producers(&self) -> usize {
        self.live_producers.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> EnsembleStats {
        let partitions: Vec<PartitionStats> = self
            .partition_indexes()
            .map(|parts| {
                parts
                    .iter()
                    .map(|p| PartitionStats {
                        bounds: p.bounds,
                        index: p.index.stats(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        EnsembleStats {
            total_records: partitions.iter().map(|p| p.index.num_records).sum(),
            partitions,
            built: self.is_built(),
            cached_params: self.param_cache.len(),
        }
    }
}

fn size_range(bounds: &[Partition]) -> (usize, usize) {
    let lower = bounds.first().map_or(0, |p| p.lower);
    let upper = bounds.last().map_or(0, |p| p.upper);
    (lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sketch;

    fn config() -> EnsembleConfig {
        EnsembleConfig::default()
            .with_num_hash(32)
            .with_max_k(4)
            .with_num_partitions(3)
    }

    fn sig(seed_value: &str) -> Signature {
        sketch(42, 32, [seed_value]).unwrap()
    }

    #[test]
    fn add_routes_by_size() {
        let parts = vec![Partition::new(1, 10), Partition::new(10, 100)];
        let mut e = ForestEnsemble::new(parts, config()).unwrap();
        e.add("small", &sig("a"), 3).unwrap();
        e.add("large", &sig("b"), 50).unwrap();
        e.add("edge", &sig("c"), 10).unwrap();
        let stats = e.stats();
        assert_eq!(stats.partitions[0].index.num_records, 1);
        assert_eq!(stats.partitions[1].index.num_records, 2);
        assert_eq!(stats.total_records, 3);
    }

    #[test]
    fn add_outside_partitions_reports_range() {
        let parts = vec![Partition::new(2, 10)];
        let mut e = ForestEnsemble::new(parts, config()).unwrap();
        assert_eq!(
            e.add("x", &sig("x"), 10),
            Err(EnsembleError::SizeOutOfRange {
                size: 10,
                lower: 2,
                upper: 10
            })
        );
        assert!(e.is_empty());
    }

    #[test]
    fn phase_errors() {
        let mut e = ForestEnsemble::new(vec![Partition::new(1, 5)], config()).unwrap();
        assert!(matches!(
            e.query(&sig("a"), 1, 0.5),
            Err(EnsembleError::NotBuilt)
        ));
        e.build_all().unwrap();
        assert_eq!(e.build_all(), Err(EnsembleError::AlreadyBuilt));
        assert_eq!(e.add("a", &sig("a"), 1), Err(EnsembleError::AlreadyBuilt));
        assert!(e.is_built());
    }

    #[test]
    fn params_are_cached_per_partition() {
        let parts = vec![Partition::new(1, 10), Partition::new(10, 100)];
        let mut e = ForestEnsemble::new(parts, config()).unwrap();
        e.build_all().unwrap();
        let first = e.optimal_params(8, 0.5).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(e.param_cache_len(), 2);
        let again = e.optimal_params(8, 0.501).unwrap();
        assert_eq!(first, again);
        assert_eq!(e.param_cache_len(), 2);
    }

    #[test]
    fn layout_mismatch_is_rejected() {
        let layout = PartitionLayout {
            num_hash: 64,
            max_k: 4,
            partitions: vec![Partition::new(1, 5)],
        };
        assert!(ForestEnsemble::from_layout(&layout, config()).is_err());
    }

    #[test]
    fn query_checks_inputs_before_spawning() {
        let mut e = HashedEnsemble::new(vec![Partition::new(1, 5)], config()).unwrap();
        e.build_all().unwrap();
        assert!(matches!(e.query(&sig("a"), 0, 0.5), Err(EnsembleError::EmptyQuery)));
        assert!(matches!(
            e.query(&sig("a"), 1, 1.2),
            Err(EnsembleError::InvalidParameter(_))
        ));
        let short = Signature::new(vec![1; 8]);
        assert!(matches!(
            e.query(&short, 1, 0.5),
            Err(EnsembleError::SignatureLength { .. })
        ));
        assert_eq!(e.active_producers(), 0);
    }
}
