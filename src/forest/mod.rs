//! Banded LSH indexes over one partition.
//!
//! # Variable-granularity banding
//!
//! A signature of N values is cut into `L = N / maxK` bands of `maxK` rows.
//! Records are stored at that maximum granularity, but a query may use any
//! `k ≤ maxK` rows and `l ≤ L` bands: a band matches at `k` rows when its
//! first `k` values agree. One build therefore serves every `(k, l)` the
//! optimizer may choose (the LSH Forest idea of Bawa et al.).
//!
//! ```text
//! signature: [v0 v1 v2 v3 | v4 v5 v6 v7 | ... ]   maxK = 4
//!             └─ band 0 ─┘ └─ band 1 ─┘
//! query k=2: match on [v0 v1], [v4 v5], ... over the first l bands
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Empty ──add──▶ Staged ──build──▶ Built (read-only, queryable)
//! ```
//!
//! `add` after `build` fails with [`EnsembleError::AlreadyBuilt`]; `query`
//! before `build` fails with [`EnsembleError::NotBuilt`].
//!
//! # Variants
//!
//! | Index | Lookup | Memory |
//! |-------|--------|--------|
//! | [`LshForest`] | binary search over sorted band arrays | N values + one id per band per record |
//! | [`BandHashIndex`] | one hash lookup per band | a table per band per prefix length |
//!
//! Both return the same candidates for the same input.

mod hashed;
mod sorted;

pub use hashed::BandHashIndex;
pub use sorted::LshForest;

use crate::error::{EnsembleError, Result};
use crate::hash::Signature;
use crate::params::{optimal_kl, OptimalParams};

/// Build phase of a banded index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Empty,
    Staged,
    Built,
}

/// Statistics about a banded index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub num_records: usize,
    pub max_k: usize,
    pub num_bands: usize,
    pub size_bytes: usize,
    pub algorithm: &'static str,
}

/// Capability set shared by the banded index variants.
///
/// The ensemble depends on nothing else.
pub trait BandedIndex: Send + Sync {
    /// Create an empty index with `max_k` rows per band and `num_bands` bands.
    fn new(max_k: usize, num_bands: usize) -> Result<Self>
    where
        Self: Sized;

    /// Stage a record. Not searchable until [`BandedIndex::build`].
    fn add(&mut self, key: &str, signature: &Signature) -> Result<()>;

    /// Make all staged records searchable. The index is read-only afterwards.
    fn build(&mut self) -> Result<()>;

    /// Candidate keys whose first `k` rows agree with `signature` in any of
    /// the first `l` bands.
    ///
    /// A key matching several bands is yielded once per band. No order is
    /// guaranteed.
    fn query<'a>(
        &'a self,
        signature: &'a Signature,
        k: usize,
        l: usize,
    ) -> Result<Box<dyn Iterator<Item = &'a str> + 'a>>;

    /// Rows per band at build granularity.
    fn max_k(&self) -> usize;

    /// Bands at build granularity.
    fn num_bands(&self) -> usize;

    /// Records added so far.
    fn len(&self) -> usize;

    fn phase(&self) -> IndexPhase;

    fn stats(&self) -> IndexStats;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signature length this index accepts.
    fn num_hash(&self) -> usize {
        self.max_k() * self.num_bands()
    }

    /// Best `(k, l)` for domain size bound `x`, query size `q`, threshold `t`
    /// within this index's granularity.
    fn optimal_kl(&self, x: usize, q: usize, t: f64) -> Result<OptimalParams> {
        optimal_kl(x, q, t, self.max_k(), self.num_bands())
    }
}

pub(crate) fn check_dimensions(max_k: usize, num_bands: usize) -> Result<()> {
    if max_k == 0 || num_bands == 0 {
        return Err(EnsembleError::InvalidParameter(format!(
            "max_k ({max_k}) and num_bands ({num_bands}) must be greater than 0"
        )));
    }
    Ok(())
}

pub(crate) fn check_signature(expected: usize, signature: &Signature) -> Result<()> {
    if signature.len() != expected {
        return Err(EnsembleError::SignatureLength {
            expected,
            actual: signature.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_query(
    index: &impl BandedIndex,
    signature: &Signature,
    k: usize,
    l: usize,
) -> Result<()> {
    if index.phase() != IndexPhase::Built {
        return Err(EnsembleError::NotBuilt);
    }
    check_signature(index.num_hash(), signature)?;
    if k == 0 || k > index.max_k() || l == 0 || l > index.num_bands() {
        return Err(EnsembleError::InvalidParameter(format!(
            "query needs 1 <= k <= {} and 1 <= l <= {}, got k={k} l={l}",
            index.max_k(),
            index.num_bands()
        )));
    }
    Ok(())
}
