//! Per-query banding parameter selection.
//!
//! # The problem
//!
//! A forest built with `maxK` rows per band and `L` bands can be queried with
//! any `k ≤ maxK` rows and `l ≤ L` bands. Which pair to use depends on three
//! numbers known only at query time: the partition's worst-case domain size
//! `x`, the query size `q`, and the containment threshold `t`.
//!
//! # Collision probability for containment
//!
//! Containment `s` of the query in a domain of size `x` corresponds to
//! Jaccard
//!
//! ```text
//! j(s) = s·q / (x + q − s·q)
//! ```
//!
//! and a domain is returned when at least one of `l` bands of `k` rows fully
//! agrees:
//!
//! ```text
//! P(s) = 1 − (1 − j(s)^k)^l
//! ```
//!
//! # Error terms
//!
//! Containment cannot exceed `x/q`, so both integrals are clipped there:
//!
//! ```text
//! FP = ∫_0^{min(t, x/q)} P(s) ds
//! FN = ∫_t^{min(1, x/q)} 1 − P(s) ds      (0 when x/q < t)
//! ```
//!
//! [`optimal_kl`] grid-searches `(k, l)` for the smallest `FP + FN`, breaking
//! ties toward fewer bands, then fewer rows, which are cheaper to query.
//!
//! # References
//!
//! - Zhu et al. (2016). "LSH Ensemble: Internet-Scale Domain Search." VLDB.
//! - Bawa et al. (2005). "LSH Forest: Self-tuning indexes for similarity search."

mod cache;

pub use cache::{CacheKey, ParamCache};

use crate::error::{EnsembleError, Result};

/// Integration step for the error integrals.
pub const INTEGRATION_PRECISION: f64 = 0.01;

/// Rows per band (`k`) and number of bands (`l`) for one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BandingParams {
    pub k: usize,
    pub l: usize,
}

/// Result of [`optimal_kl`]: the chosen parameters and their error terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimalParams {
    pub k: usize,
    pub l: usize,
    pub false_positive: f64,
    pub false_negative: f64,
}

impl OptimalParams {
    pub fn banding(&self) -> BandingParams {
        BandingParams {
            k: self.k,
            l: self.l,
        }
    }

    /// Combined error `FP + FN`.
    pub fn error(&self) -> f64 {
        self.false_positive + self.false_negative
    }
}

/// Probability that a domain with containment `s` becomes a candidate.
pub fn collision_probability(s: f64, x: usize, q: usize, k: usize, l: usize) -> f64 {
    let q = q as f64;
    let denom = x as f64 + q - s * q;
    let jaccard = if denom <= 0.0 {
        1.0
    } else {
        (s * q / denom).clamp(0.0, 1.0)
    };
    1.0 - (1.0 - jaccard.powi(k as i32)).powi(l as i32)
}

/// Midpoint-rule integral of `f` over `[a, b]`.
fn integral(f: impl Fn(f64) -> f64, a: f64, b: f64, precision: f64) -> f64 {
    if b <= a {
        return 0.0;
    }
    let mut area = 0.0;
    let mut lo = a;
    while lo < b {
        let step = precision.min(b - lo);
        area += f(lo + 0.5 * step) * step;
        lo += step;
    }
    area
}

/// Expected false-positive mass for `(k, l)`.
pub fn false_positive(x: usize, q: usize, t: f64, k: usize, l: usize) -> f64 {
    let xq = x as f64 / q as f64;
    let upper = t.min(xq);
    integral(
        |s| collision_probability(s, x, q, k, l),
        0.0,
        upper,
        INTEGRATION_PRECISION,
    )
}

/// Expected false-negative mass for `(k, l)`.
pub fn false_negative(x: usize, q: usize, t: f64, k: usize, l: usize) -> f64 {
    let xq = x as f64 / q as f64;
    if xq < t {
        return 0.0;
    }
    integral(
        |s| 1.0 - collision_probability(s, x, q, k, l),
        t,
        xq.min(1.0),
        INTEGRATION_PRECISION,
    )
}

/// Find `(k, l)` minimizing `FP + FN` for partition bound `x`, query size `q`
/// and threshold `t`.
///
/// Searches `k ∈ [1, max_k]`, `l ∈ [1, max_l]`.
pub fn optimal_kl(x: usize, q: usize, t: f64, max_k: usize, max_l: usize) -> Result<OptimalParams> {
    if q == 0 {
        return Err(EnsembleError::EmptyQuery);
    }
    validate_threshold(t)?;
    if max_k == 0 || max_l == 0 {
        return Err(EnsembleError::InvalidParameter(format!(
            "max_k ({max_k}) and max_l ({max_l}) must be greater than 0"
        )));
    }

    let mut best = OptimalParams {
        k: 1,
        l: 1,
        false_positive: f64::INFINITY,
        false_negative: f64::INFINITY,
    };
    // l outer, k inner with a strict comparison: the first minimum found is
    // the one with the fewest bands, then the fewest rows.
    for l in 1..=max_l {
        for k in 1..=max_k {
            let fp = false_positive(x, q, t, k, l);
            let fn_ = false_negative(x, q, t, k, l);
            if fp + fn_ < best.error() {
                best = OptimalParams {
                    k,
                    l,
                    false_positive: fp,
                    false_negative: fn_,
                };
            }
        }
    }
    Ok(best)
}

/// Thresholds must lie in `[0, 1]`.
pub fn validate_threshold(t: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&t) {
        return Err(EnsembleError::InvalidParameter(format!(
            "containment threshold must be in [0, 1], got {t}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_is_rejected() {
        assert_eq!(optimal_kl(10, 0, 0.5, 4, 32), Err(EnsembleError::EmptyQuery));
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        assert!(optimal_kl(10, 10, 1.5, 4, 32).is_err());
        assert!(optimal_kl(10, 10, -0.1, 4, 32).is_err());
        assert!(optimal_kl(10, 10, f64::NAN, 4, 32).is_err());
    }

    #[test]
    fn zero_error_everywhere_picks_cheapest_params() {
        // x = 0: containment is always 0, both integrals are empty.
        let p = optimal_kl(0, 5, 0.5, 4, 32).unwrap();
        assert_eq!((p.k, p.l), (1, 1));
        assert_eq!(p.error(), 0.0);
    }

    #[test]
    fn chosen_params_are_the_grid_minimum() {
        let (x, q, t) = (120, 40, 0.6);
        let best = optimal_kl(x, q, t, 4, 32).unwrap();
        for l in 1..=32 {
            for k in 1..=4 {
                let err = false_positive(x, q, t, k, l) + false_negative(x, q, t, k, l);
                assert!(best.error() <= err + 1e-12, "({k},{l}) beats chosen params");
            }
        }
    }

    #[test]
    fn error_terms_are_bounded() {
        for &(x, q, t) in &[(10, 10, 0.5), (1000, 3, 0.9), (3, 1000, 0.2), (50, 50, 1.0)] {
            let p = optimal_kl(x, q, t, 4, 64).unwrap();
            assert!((0.0..=1.0).contains(&p.false_positive), "{p:?}");
            assert!((0.0..=1.0).contains(&p.false_negative), "{p:?}");
            assert!(p.k >= 1 && p.k <= 4 && p.l >= 1 && p.l <= 64);
        }
    }

    #[test]
    fn collision_probability_is_monotone_in_containment() {
        let mut prev = 0.0;
        for i in 0..=100 {
            let s = i as f64 / 100.0;
            let p = collision_probability(s, 20, 20, 4, 8);
            assert!(p >= prev - 1e-12);
            prev = p;
        }
        assert!((collision_probability(1.0, 20, 20, 4, 8) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn higher_threshold_prefers_stricter_bands() {
        let low = optimal_kl(100, 100, 0.1, 4, 32).unwrap();
        let high = optimal_kl(100, 100, 0.9, 4, 32).unwrap();
        // Probability of a candidate at moderate containment must drop.
        let p_low = collision_probability(0.5, 100, 100, low.k, low.l);
        let p_high = collision_probability(0.5, 100, 100, high.k, high.l);
        assert!(p_high <= p_low, "low {low:?} high {high:?}");
    }
}
