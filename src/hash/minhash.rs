//! MinHash signatures for set containment and Jaccard estimation.
//!
//! ## Algorithm
//!
//! For each hash permutation h_i:
//! - MinHash_i(S) = min_{x ∈ S} h_i(x)
//!
//! The probability that two MinHash values match equals the Jaccard similarity
//! of the underlying sets:
//! P[MinHash_i(A) = MinHash_i(B)] = J(A,B)
//!
//! ## Permutations
//!
//! Each value is first reduced to a stable 64-bit base hash, then mapped
//! through `numHash` universal hash functions
//!
//! ```text
//! h_i(x) = (a_i · base(x) + b_i) mod (2^61 − 1)
//! ```
//!
//! with `(a_i, b_i)` drawn from a generator seeded by the sketch seed. Two
//! sketchers with the same seed and hash count always produce the same
//! permutations, so signatures built on different machines are comparable.
//!
//! ## References
//!
//! - Broder (1997). "On the resemblance and containment of documents"
//! - Broder et al. (2000). "Min-wise independent permutations"

use crate::error::{EnsembleError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Modulus of the permutation family (Mersenne prime 2^61 − 1).
const MERSENNE_PRIME: u64 = (1 << 61) - 1;

/// Incremental MinHash sketcher.
///
/// Values are pushed one at a time; pushing the same value twice, or pushing
/// values in a different order, yields the same signature.
#[derive(Debug, Clone)]
pub struct MinHash {
    seed: u64,
    /// `(a_i, b_i)` per permutation.
    coefficients: Vec<(u64, u64)>,
    mins: Vec<u64>,
    pushed: usize,
}

impl MinHash {
    /// Create a sketcher with `num_hash` permutations derived from `seed`.
    ///
    /// Typical values are 128-256 permutations. More permutations tighten the
    /// similarity estimate at the cost of larger signatures.
    pub fn new(seed: u64, num_hash: usize) -> Result<Self> {
        if num_hash == 0 {
            return Err(EnsembleError::InvalidParameter(
                "num_hash must be greater than 0".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let coefficients = (0..num_hash)
            .map(|_| {
                let a = rng.random_range(1..MERSENNE_PRIME);
                let b = rng.random_range(0..MERSENNE_PRIME);
                (a, b)
            })
            .collect();

        Ok(Self {
            seed,
            coefficients,
            mins: vec![u64::MAX; num_hash],
            pushed: 0,
        })
    }

    /// Push one value into the sketch.
    pub fn push<T: Hash + ?Sized>(&mut self, value: &T) {
        let base = base_hash(value);
        for (min, &(a, b)) in self.mins.iter_mut().zip(self.coefficients.iter()) {
            let hv = permute(base, a, b);
            if hv < *min {
                *min = hv;
            }
        }
        self.pushed += 1;
    }

    /// Push every value from an iterator.
    pub fn extend<T: Hash, I: IntoIterator<Item = T>>(&mut self, values: I) {
        for value in values {
            self.push(&value);
        }
    }

    /// Fold another sketch into this one (sketch of the set union).
    ///
    /// Both sketches must share seed and hash count.
    pub fn merge(&mut self, other: &MinHash) -> Result<()> {
        if self.seed != other.seed || self.mins.len() != other.mins.len() {
            return Err(EnsembleError::InvalidParameter(format!(
                "cannot merge sketches (seed {}, {} hashes) and (seed {}, {} hashes)",
                self.seed,
                self.mins.len(),
                other.seed,
                other.mins.len()
            )));
        }
        for (a, &b) in self.mins.iter_mut().zip(other.mins.iter()) {
            *a = (*a).min(b);
        }
        self.pushed += other.pushed;
        Ok(())
    }

    /// Current signature.
    pub fn signature(&self) -> Signature {
        Signature {
            values: self.mins.clone(),
        }
    }

    /// Seed the permutations were derived from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of permutations (signature length).
    pub fn num_hash(&self) -> usize {
        self.mins.len()
    }

    /// Number of push calls so far, duplicates included.
    pub fn len(&self) -> usize {
        self.pushed
    }

    /// True if nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.pushed == 0
    }
}

/// Sketch a whole set in one call.
///
/// Equivalent to pushing every value into a fresh [`MinHash`].
pub fn sketch<T: Hash, I: IntoIterator<Item = T>>(
    seed: u64,
    num_hash: usize,
    values: I,
) -> Result<Signature> {
    let mut mh = MinHash::new(seed, num_hash)?;
    mh.extend(values);
    Ok(mh.signature())
}

fn base_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[inline]
fn permute(base: u64, a: u64, b: u64) -> u64 {
    let v = (a as u128) * (base as u128) + (b as u128);
    (v % MERSENNE_PRIME as u128) as u64
}

/// A MinHash signature: one minimum per permutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    values: Vec<u64>,
}

impl Signature {
    /// Wrap raw signature values.
    pub fn new(values: Vec<u64>) -> Self {
        Self { values }
    }

    /// Signature values in permutation order.
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Estimate Jaccard similarity as the fraction of agreeing positions.
    ///
    /// Returns 0.0 for signatures of different lengths.
    pub fn estimate_jaccard(&self, other: &Signature) -> f64 {
        if self.values.len() != other.values.len() || self.values.is_empty() {
            return 0.0;
        }

        let matches = self
            .values
            .iter()
            .zip(other.values.iter())
            .filter(|(a, b)| a == b)
            .count();

        matches as f64 / self.values.len() as f64
    }

    /// Signature of the union of both underlying sets (element-wise minimum).
    pub fn merge(&self, other: &Signature) -> Signature {
        let values = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| a.min(b))
            .collect();

        Signature { values }
    }

    /// Length of the signature.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if signature is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<u64>> for Signature {
    fn from(values: Vec<u64>) -> Self {
        Self::new(values)
    }
}

impl AsRef<[u64]> for Signature {
    fn as_ref(&self) -> &[u64] {
        &self.values
    }
}
