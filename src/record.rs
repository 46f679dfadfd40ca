//! Sketched domains.

use crate::error::Result;
use crate::hash::{sketch, Signature};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

/// A domain ready for indexing: its key, distinct-value count and signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub key: String,
    pub size: usize,
    pub signature: Signature,
}

impl DomainRecord {
    pub fn new(key: impl Into<String>, size: usize, signature: Signature) -> Self {
        Self {
            key: key.into(),
            size,
            signature,
        }
    }

    /// Sketch a set of distinct values into a record.
    pub fn from_set<T: Hash + Eq>(
        key: impl Into<String>,
        values: &HashSet<T>,
        seed: u64,
        num_hash: usize,
    ) -> Result<Self> {
        Ok(Self {
            key: key.into(),
            size: values.len(),
            signature: sketch(seed, num_hash, values)?,
        })
    }
}

/// Sort records by ascending domain size (stable).
pub fn sort_by_size(records: &mut [DomainRecord]) {
    records.sort_by_key(|r| r.size);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counts_distinct_values() {
        let values: HashSet<&str> = ["a", "b", "a", "c"].into_iter().collect();
        let rec = DomainRecord::from_set("k", &values, 1, 16).unwrap();
        assert_eq!(rec.size, 3);
        assert_eq!(rec.signature.len(), 16);
    }

    #[test]
    fn sorts_by_size_keeping_order_of_ties() {
        let sig = Signature::new(vec![0; 4]);
        let mut recs = vec![
            DomainRecord::new("x", 5, sig.clone()),
            DomainRecord::new("y", 2, sig.clone()),
            DomainRecord::new("z", 5, sig),
        ];
        sort_by_size(&mut recs);
        let keys: Vec<&str> = recs.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["y", "x", "z"]);
    }
}
