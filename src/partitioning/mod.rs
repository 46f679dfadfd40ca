//! Size-based partitioning of the domain collection.
//!
//! # Why partition by size
//!
//! Containment converts to Jaccard only once the candidate size |X| is known
//! (see [`crate::hash`]). Inside a partition `[lower, upper)` the index
//! assumes the worst case `|X| = upper − 1`, so every domain smaller than that
//! looks less similar to the LSH than it really is. The gap between a
//! domain's true size and its partition's upper bound is what produces false
//! positives, and the partitioner's job is to keep that gap small where most
//! of the domains are.
//!
//! # Strategies
//!
//! | Strategy | Boundaries | Cost |
//! |----------|------------|------|
//! | [`PartitionStrategy::Optimal`] | minimize expected false positives | O(R + P·S log S) |
//! | [`PartitionStrategy::EquiDepth`] | equal record counts | O(R + S) |
//!
//! R = records, S = distinct sizes, P = partitions.
//!
//! # Layout
//!
//! Partitions are half-open, sorted and contiguous: the first starts at the
//! smallest observed size, each one starts where the previous ends, and the
//! last ends one past the largest observed size. Every observed size falls in
//! exactly one partition.

mod equi_depth;
mod optimal;

pub use equi_depth::equi_depth_partitions;
pub use optimal::optimal_partitions;

use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};

/// A half-open domain size range `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub lower: usize,
    pub upper: usize,
}

impl Partition {
    pub fn new(lower: usize, upper: usize) -> Self {
        Self { lower, upper }
    }

    /// True if `size` falls inside `[lower, upper)`.
    pub fn contains(&self, size: usize) -> bool {
        self.lower <= size && size < self.upper
    }

    /// Largest domain size the partition admits.
    ///
    /// This is the worst-case candidate size used for parameter tuning.
    pub fn max_size(&self) -> usize {
        self.upper.saturating_sub(1)
    }
}

/// How partition boundaries are chosen from the size distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Minimize the expected number of false positives.
    #[default]
    Optimal,
    /// Equal number of records per partition.
    EquiDepth,
}

/// Compute partitions over `sizes` with the given strategy.
pub fn build_partitions(
    sizes: &[usize],
    num_part: usize,
    strategy: PartitionStrategy,
) -> Result<Vec<Partition>> {
    match strategy {
        PartitionStrategy::Optimal => optimal_partitions(sizes, num_part),
        PartitionStrategy::EquiDepth => equi_depth_partitions(sizes, num_part),
    }
}

/// Check that partitions are non-empty, sorted and contiguous.
pub fn validate_partitions(partitions: &[Partition]) -> Result<()> {
    if partitions.is_empty() {
        return Err(EnsembleError::InvalidParameter(
            "partition list is empty".to_string(),
        ));
    }
    for (i, p) in partitions.iter().enumerate() {
        if p.lower >= p.upper {
            return Err(EnsembleError::InvalidParameter(format!(
                "partition {i} has empty range [{}, {})",
                p.lower, p.upper
            )));
        }
    }
    for (i, pair) in partitions.windows(2).enumerate() {
        if pair[0].upper != pair[1].lower {
            return Err(EnsembleError::InvalidParameter(format!(
                "partitions {i} and {} are not contiguous: [{}, {}) then [{}, {})",
                i + 1,
                pair[0].lower,
                pair[0].upper,
                pair[1].lower,
                pair[1].upper
            )));
        }
    }
    Ok(())
}

/// Index of the partition containing `size`, if any.
///
/// `partitions` must be sorted and contiguous.
pub fn find_partition(partitions: &[Partition], size: usize) -> Option<usize> {
    let idx = partitions.partition_point(|p| p.upper <= size);
    partitions
        .get(idx)
        .filter(|p| p.contains(size))
        .map(|_| idx)
}

/// Distinct sizes in ascending order with their record counts.
pub(crate) struct SizeHistogram {
    pub sizes: Vec<usize>,
    pub counts: Vec<usize>,
}

impl SizeHistogram {
    pub fn from_sizes(sizes: &[usize]) -> Result<Self> {
        if sizes.is_empty() {
            return Err(EnsembleError::InvalidParameter(
                "cannot partition an empty size list".to_string(),
            ));
        }
        let mut sorted = sizes.to_vec();
        sorted.sort_unstable();

        let mut hist = Self {
            sizes: Vec::new(),
            counts: Vec::new(),
        };
        for s in sorted {
            match hist.sizes.last() {
                Some(&last) if last == s => {
                    if let Some(c) = hist.counts.last_mut() {
                        *c += 1;
                    }
                }
                _ => {
                    hist.sizes.push(s);
                    hist.counts.push(1);
                }
            }
        }
        Ok(hist)
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Turn block end indices (inclusive, ascending, last == len-1) into
    /// contiguous partitions.
    pub fn to_partitions(&self, block_ends: &[usize]) -> Vec<Partition> {
        let mut partitions = Vec::with_capacity(block_ends.len());
        let mut lower = self.sizes[0];
        for &end in block_ends {
            let upper = self.sizes[end] + 1;
            partitions.push(Partition::new(lower, upper));
            lower = upper;
        }
        partitions
    }
}

fn check_num_part(num_part: usize) -> Result<()> {
    if num_part == 0 {
        return Err(EnsembleError::InvalidParameter(
            "number of partitions must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Serializable partition boundaries.
///
/// This is boundary metadata only. Band tables are never persisted: an
/// ensemble restored with [`crate::LshEnsemble::from_layout`] is empty and
/// must be re-populated from the source records and rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionLayout {
    pub num_hash: usize,
    pub max_k: usize,
    pub partitions: Vec<Partition>,
}

impl PartitionLayout {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let layout: Self = serde_json::from_str(json)?;
        validate_partitions(&layout.partitions)?;
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn find_partition_respects_half_open_bounds() {
        let parts = vec![
            Partition::new(1, 5),
            Partition::new(5, 10),
            Partition::new(10, 11),
        ];
        assert_eq!(find_partition(&parts, 0), None);
        assert_eq!(find_partition(&parts, 1), Some(0));
        assert_eq!(find_partition(&parts, 4), Some(0));
        assert_eq!(find_partition(&parts, 5), Some(1));
        assert_eq!(find_partition(&parts, 10), Some(2));
        assert_eq!(find_partition(&parts, 11), None);
    }

    #[test]
    fn validate_rejects_gaps_and_empty_ranges() {
        assert!(validate_partitions(&[]).is_err());
        assert!(validate_partitions(&[Partition::new(3, 3)]).is_err());
        assert!(validate_partitions(&[Partition::new(1, 3), Partition::new(4, 6)]).is_err());
        assert!(validate_partitions(&[Partition::new(1, 4), Partition::new(3, 6)]).is_err());
        assert!(validate_partitions(&[Partition::new(1, 4), Partition::new(4, 6)]).is_ok());
    }

    #[test]
    fn layout_round_trips_through_json() {
        let layout = PartitionLayout {
            num_hash: 128,
            max_k: 4,
            partitions: vec![Partition::new(2, 8), Partition::new(8, 31)],
        };
        let json = layout.to_json().unwrap();
        assert_eq!(PartitionLayout::from_json(&json).unwrap(), layout);
    }

    #[test]
    fn layout_from_json_validates_partitions() {
        let json = r#"{"num_hash":8,"max_k":2,"partitions":[{"lower":1,"upper":3},{"lower":5,"upper":9}]}"#;
        assert!(matches!(
            PartitionLayout::from_json(json),
            Err(EnsembleError::InvalidParameter(_))
        ));
    }

    #[test]
    fn strategy_serializes_snake_case() {
        let json = serde_json::to_string(&PartitionStrategy::EquiDepth).unwrap();
        assert_eq!(json, "\"equi_depth\"");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn every_observed_size_lands_in_exactly_one_partition(
            sizes in proptest::collection::vec(0usize..500, 1..200),
            num_part in 1usize..12,
            optimal in any::<bool>(),
        ) {
            let strategy = if optimal { PartitionStrategy::Optimal } else { PartitionStrategy::EquiDepth };
            let parts = build_partitions(&sizes, num_part, strategy).unwrap();
            prop_assert!(validate_partitions(&parts).is_ok());
            prop_assert!(parts.len() <= num_part);
            for &s in &sizes {
                let hits = parts.iter().filter(|p| p.contains(s)).count();
                prop_assert_eq!(hits, 1, "size {} hit {} partitions", s, hits);
                prop_assert!(find_partition(&parts, s).is_some());
            }
        }
    }
}
