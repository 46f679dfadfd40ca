//! Error types for lsh-ensemble.

use thiserror::Error;

/// Errors that can occur while sketching, indexing or querying.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnsembleError {
    /// Invalid construction or query parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Query domain has size 0, so containment is undefined.
    #[error("query is empty: containment needs a non-empty query domain")]
    EmptyQuery,

    /// Domain size does not fall inside any partition.
    #[error("domain size {size} is outside the partitioned range [{lower}, {upper})")]
    SizeOutOfRange {
        size: usize,
        lower: usize,
        upper: usize,
    },

    /// Signature length differs from the index's hash count.
    #[error("signature has {actual} values, index expects {expected}")]
    SignatureLength { expected: usize, actual: usize },

    /// `add` or `build` called on an index that is already built.
    #[error("index is already built and read-only")]
    AlreadyBuilt,

    /// `query` called before `build`.
    #[error("index has not been built")]
    NotBuilt,

    /// A partition failed to build; the whole ensemble is unusable.
    #[error("partition {partition} failed to build: {source}")]
    PartitionBuild {
        partition: usize,
        source: Box<EnsembleError>,
    },

    /// A partition rejected the lookup; no partial results are returned.
    #[error("partition {partition} failed to answer the query: {source}")]
    PartitionQuery {
        partition: usize,
        source: Box<EnsembleError>,
    },

    /// The ensemble is unusable after a failed build.
    #[error("ensemble is unusable after a failed build; rebuild it from source records")]
    Poisoned,

    /// A query producer thread could not be started.
    #[error("failed to spawn query worker: {0}")]
    ThreadSpawn(String),

    /// Partition layout (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EnsembleError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(format!("json error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, EnsembleError>;
