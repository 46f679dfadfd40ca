//! lsh-ensemble: approximate set-containment search.
//!
//! Given a query set Q and a threshold t, find every indexed set X with
//! containment |Q ∩ X| / |Q| ≥ t, without comparing Q against each X.
//!
//! - `hash/`: MinHash sketching (signatures)
//! - `partitioning/`: size partitions (optimal and equi-depth)
//! - `forest/`: banded LSH indexes, one per partition
//! - `params/`: per-query (k, l) selection and its cache
//! - `ensemble/`: the coordinator tying them together
//!
//! # Critical Nuances
//!
//! ## Containment is not Jaccard
//!
//! MinHash estimates Jaccard, which penalizes large candidates: a small query
//! fully contained in a huge domain has tiny Jaccard. The conversion back to
//! containment needs the candidate's size, which the index does not have per
//! query. Partitioning by size bounds it, and the bound is what the banding
//! parameters are tuned against.
//!
//! ## Results are candidates
//!
//! Output can contain false positives, and with small probability miss true
//! matches. Callers needing exact answers confirm candidates with
//! [`hash::containment`] on the raw values.
//!
//! ## Persistence
//!
//! Only partition boundaries serialize ([`PartitionLayout`]). Band tables are
//! rebuilt from the source records.
//!
//! # References
//!
//! - Zhu, Nargesian, Pu, Miller (2016): "LSH Ensemble: Internet-Scale Domain Search"
//! - Bawa, Condie, Ganesan (2005): "LSH Forest: Self-Tuning Indexes for Similarity Search"

pub mod ensemble;
pub mod error;
pub mod forest;
pub mod hash;
pub mod params;
pub mod partitioning;
pub mod record;

// Re-exports
pub use ensemble::{
    CancelToken, EnsembleConfig, EnsembleStats, ForestEnsemble, HashedEnsemble, LshEnsemble,
    PartitionStats, QueryStream,
};
pub use error::{EnsembleError, Result};
pub use forest::{BandHashIndex, BandedIndex, IndexPhase, IndexStats, LshForest};
pub use hash::{containment, sketch, MinHash, Signature};
pub use params::{optimal_kl, BandingParams, OptimalParams};
pub use partitioning::{Partition, PartitionLayout, PartitionStrategy};
pub use record::DomainRecord;
