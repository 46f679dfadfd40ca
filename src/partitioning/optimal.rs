//! Optimal partitioning by expected false positives.
//!
//! A domain of size s placed in a partition whose largest size is u is
//! indexed as if it had size u. Under a uniform containment prior the
//! expected false-positive count such a partition contributes is
//!
//! ```text
//! NFP(i, j) = Σ_{m=i..j} c_m · (1 − s_m / s_j)
//! ```
//!
//! over distinct sizes s_i < … < s_j with record counts c_m. We pick P − 1
//! breakpoints minimizing the total NFP with the usual partition DP
//!
//! ```text
//! D[p][j] = min_{i ≤ j} D[p−1][i−1] + NFP(i, j)
//! ```
//!
//! NFP is O(1) from prefix sums, and it satisfies the quadrangle inequality
//! (NFP(a,c) + NFP(b,d) − NFP(a,d) − NFP(b,c) = Σ_{a..b−1} c_m·s_m·(1/s_d − 1/s_c) ≤ 0),
//! so the optimal split point is monotone in j and each DP layer can be
//! filled by divide and conquer in O(S log S).

use super::{check_num_part, Partition, SizeHistogram};
use crate::error::Result;
use tracing::debug;

/// Prefix sums for O(1) NFP lookups.
struct NfpTable<'a> {
    sizes: &'a [usize],
    /// counts[0..i]
    count_prefix: Vec<f64>,
    /// counts[m] * sizes[m] over 0..i
    weight_prefix: Vec<f64>,
}

impl<'a> NfpTable<'a> {
    fn new(hist: &'a SizeHistogram) -> Self {
        let n = hist.len();
        let mut count_prefix = Vec::with_capacity(n + 1);
        let mut weight_prefix = Vec::with_capacity(n + 1);
        count_prefix.push(0.0);
        weight_prefix.push(0.0);
        for (&s, &c) in hist.sizes.iter().zip(hist.counts.iter()) {
            let last_c = count_prefix[count_prefix.len() - 1];
            let last_w = weight_prefix[weight_prefix.len() - 1];
            count_prefix.push(last_c + c as f64);
            weight_prefix.push(last_w + (c * s) as f64);
        }
        Self {
            sizes: &hist.sizes,
            count_prefix,
            weight_prefix,
        }
    }

    /// Expected false positives of one partition over distinct sizes `i..=j`.
    fn nfp(&self, i: usize, j: usize) -> f64 {
        let upper = self.sizes[j];
        if upper == 0 {
            return 0.0;
        }
        let count = self.count_prefix[j + 1] - self.count_prefix[i];
        let weight = self.weight_prefix[j + 1] - self.weight_prefix[i];
        count - weight / upper as f64
    }
}

/// Partition `sizes` into at most `num_part` ranges minimizing expected
/// false positives.
///
/// Returns `min(num_part, distinct sizes)` partitions.
pub fn optimal_partitions(sizes: &[usize], num_part: usize) -> Result<Vec<Partition>> {
    check_num_part(num_part)?;
    let hist = SizeHistogram::from_sizes(sizes)?;
    let n = hist.len();
    let parts = num_part.min(n);

    let ends = if parts == n {
        (0..n).collect()
    } else {
        let table = NfpTable::new(&hist);
        let (_, ends) = solve(&table, n, parts);
        ends
    };

    let partitions = hist.to_partitions(&ends);
    debug!(
        records = sizes.len(),
        distinct_sizes = n,
        partitions = partitions.len(),
        "computed optimal partitions"
    );
    Ok(partitions)
}

/// Run the DP; returns the total cost and the inclusive end index of each block.
fn solve(table: &NfpTable<'_>, n: usize, parts: usize) -> (f64, Vec<usize>) {
    // cost[j]: best cost covering 0..=j with the current number of blocks.
    let mut cost: Vec<f64> = (0..n).map(|j| table.nfp(0, j)).collect();
    // split[p][j]: start index of the last block in the best p+1 block cover of 0..=j.
    let mut split: Vec<Vec<usize>> = vec![vec![0; n]];

    for p in 1..parts {
        let mut next = vec![f64::INFINITY; n];
        let mut starts = vec![0; n];
        fill_layer(table, &cost, &mut next, &mut starts, p, p, n - 1, p, n - 1);
        cost = next;
        split.push(starts);
    }

    let mut ends = Vec::with_capacity(parts);
    let mut j = n - 1;
    for p in (0..parts).rev() {
        ends.push(j);
        if p > 0 {
            j = split[p][j] - 1;
        }
    }
    ends.reverse();
    (cost[n - 1], ends)
}

/// Fill `next[lo..=hi]` knowing the optimal start lies in `opt_lo..=opt_hi`.
#[allow(clippy::too_many_arguments)]
fn fill_layer(
    table: &NfpTable<'_>,
    prev: &[f64],
    next: &mut [f64],
    starts: &mut [usize],
    p: usize,
    lo: usize,
    hi: usize,
    opt_lo: usize,
    opt_hi: usize,
) {
    if lo > hi {
        return;
    }
    let mid = lo + (hi - lo) / 2;
    let mut best = f64::INFINITY;
    let mut best_start = opt_lo.max(p);
    for i in opt_lo.max(p)..=opt_hi.min(mid) {
        let c = prev[i - 1] + table.nfp(i, mid);
        if c < best {
            best = c;
            best_start = i;
        }
    }
    next[mid] = best;
    starts[mid] = best_start;

    if mid > lo {
        fill_layer(table, prev, next, starts, p, lo, mid - 1, opt_lo, best_start);
    }
    fill_layer(table, prev, next, starts, p, mid + 1, hi, best_start, opt_hi);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Plain O(P·S²) DP for cross-checking.
    fn brute_force_cost(hist: &SizeHistogram, parts: usize) -> f64 {
        let table = NfpTable::new(hist);
        let n = hist.len();
        let mut cost: Vec<f64> = (0..n).map(|j| table.nfp(0, j)).collect();
        for p in 1..parts {
            let mut next = vec![f64::INFINITY; n];
            for j in p..n {
                for i in p..=j {
                    let c = cost[i - 1] + table.nfp(i, j);
                    if c < next[j] {
                        next[j] = c;
                    }
                }
            }
            cost = next;
        }
        cost[n - 1]
    }

    fn total_nfp(hist: &SizeHistogram, ends: &[usize]) -> f64 {
        let table = NfpTable::new(hist);
        let mut start = 0;
        let mut total = 0.0;
        for &end in ends {
            total += table.nfp(start, end);
            start = end + 1;
        }
        total
    }

    #[test]
    fn single_partition_spans_everything() {
        let parts = optimal_partitions(&[3, 9, 4, 3], 1).unwrap();
        assert_eq!(parts, vec![Partition::new(3, 10)]);
    }

    #[test]
    fn more_partitions_than_sizes_gives_one_per_size() {
        let parts = optimal_partitions(&[4, 4, 4, 4], 4).unwrap();
        assert_eq!(parts, vec![Partition::new(4, 5)]);

        let parts = optimal_partitions(&[1, 2, 7], 8).unwrap();
        assert_eq!(
            parts,
            vec![
                Partition::new(1, 2),
                Partition::new(2, 3),
                Partition::new(3, 8)
            ]
        );
    }

    #[test]
    fn splits_separate_clusters_of_sizes() {
        let mut sizes = vec![10; 50];
        sizes.extend(std::iter::repeat(1000).take(50));
        let parts = optimal_partitions(&sizes, 2).unwrap();
        assert_eq!(parts, vec![Partition::new(10, 11), Partition::new(11, 1001)]);
    }

    #[test]
    fn empty_input_and_zero_partitions_fail() {
        assert!(optimal_partitions(&[], 3).is_err());
        assert!(optimal_partitions(&[1, 2], 0).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn divide_and_conquer_matches_brute_force(
            sizes in proptest::collection::vec(1usize..200, 2..80),
            num_part in 2usize..8,
        ) {
            let hist = SizeHistogram::from_sizes(&sizes).unwrap();
            prop_assume!(num_part < hist.len());

            let table = NfpTable::new(&hist);
            let (cost, ends) = solve(&table, hist.len(), num_part);
            let expected = brute_force_cost(&hist, num_part);

            prop_assert!((cost - expected).abs() < 1e-6, "d&c {} vs brute {}", cost, expected);
            prop_assert!((total_nfp(&hist, &ends) - cost).abs() < 1e-6);
            prop_assert_eq!(ends.len(), num_part);
        }
    }
}
