//! Equi-depth partitioning: equal record counts per partition.
//!
//! Simpler than the optimal strategy and a reasonable choice when sizes
//! follow a smooth distribution. Records sharing a size are never split
//! across partitions, so heavy sizes can leave fewer partitions than asked.

use super::{check_num_part, Partition, SizeHistogram};
use crate::error::Result;
use tracing::debug;

/// Partition `sizes` into at most `num_part` ranges of roughly equal depth.
pub fn equi_depth_partitions(sizes: &[usize], num_part: usize) -> Result<Vec<Partition>> {
    check_num_part(num_part)?;
    let hist = SizeHistogram::from_sizes(sizes)?;
    let n = hist.len();
    let total = sizes.len();

    let mut ends = Vec::with_capacity(num_part.min(n));
    let mut cumulative = 0usize;
    for (i, &c) in hist.counts.iter().enumerate() {
        cumulative += c;
        if i + 1 == n {
            ends.push(i);
            break;
        }
        // Close the current block once it reaches its share of the records.
        let target = total * (ends.len() + 1) / num_part;
        if ends.len() + 1 < num_part && cumulative >= target.max(1) {
            ends.push(i);
        }
    }

    let partitions = hist.to_partitions(&ends);
    debug!(
        records = total,
        distinct_sizes = n,
        partitions = partitions.len(),
        "computed equi-depth partitions"
    );
    Ok(partitions)
}
