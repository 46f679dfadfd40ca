//! Set sketching for containment search.
//!
//! ## MinHash: Jaccard Similarity for Sets
//!
//! **Key insight** (Broder 1997): For a random permutation π of the universe,
//!
//! ```text
//! P[min(π(A)) = min(π(B))] = |A ∩ B| / |A ∪ B| = Jaccard(A, B)
//! ```
//!
//! ## From Jaccard to Containment
//!
//! Containment is asymmetric: C(Q, X) = |Q ∩ X| / |Q|. Given the set sizes
//! it converts to Jaccard exactly,
//!
//! ```text
//! J = C·|Q| / (|X| + |Q| − C·|Q|)
//! ```
//!
//! which is what lets a Jaccard sketch answer containment queries once the
//! candidate's size is bounded (see [`crate::partitioning`]).
//!
//! ```rust
//! use lsh_ensemble::hash::{sketch, MinHash};
//!
//! let mut mh = MinHash::new(42, 128).unwrap();
//! for v in ["the", "quick", "brown", "fox"] {
//!     mh.push(v);
//! }
//! let sig = mh.signature();
//! assert_eq!(sig, sketch(42, 128, ["fox", "brown", "quick", "the"]).unwrap());
//! ```
//!
//! ## References
//!
//! - Broder (1997). "On the resemblance and containment of documents."
//! - Zhu et al. (2016). "LSH Ensemble: Internet-Scale Domain Search."

pub mod minhash;

pub use minhash::{sketch, MinHash, Signature};

use std::collections::HashSet;
use std::hash::Hash;

/// Exact containment |Q ∩ X| / |Q| of `query` in `candidate`.
///
/// Index results are candidates only; use this to drop false positives once
/// the raw values are at hand. Returns 0.0 for an empty query.
pub fn containment<T: Eq + Hash>(query: &HashSet<T>, candidate: &HashSet<T>) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let overlap = query.iter().filter(|v| candidate.contains(*v)).count();
    overlap as f64 / query.len() as f64
}
