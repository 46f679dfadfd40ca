//! Hash-table banded index.
//!
//! Keeps one table per band per prefix length, keyed by the prefix values
//! themselves, so a query costs one lookup per band regardless of partition
//! size. The price is `maxK` tables per band instead of one sorted array.

use super::{check_dimensions, check_query, check_signature, BandedIndex, IndexPhase, IndexStats};
use crate::error::{EnsembleError, Result};
use crate::hash::Signature;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

type Bucket = SmallVec<[u32; 4]>;

/// Banded index backed by per-band hash tables.
#[derive(Debug, Clone)]
pub struct BandHashIndex {
    max_k: usize,
    num_bands: usize,
    keys: Vec<Box<str>>,
    /// Signatures waiting for build.
    staged: Vec<u64>,
    /// tables[b][k - 1]: first k values of band b -> record ids.
    tables: Vec<Vec<FxHashMap<Box<[u64]>, Bucket>>>,
    built: bool,
}

impl BandedIndex for BandHashIndex {
    fn new(max_k: usize, num_bands: usize) -> Result<Self> {
        check_dimensions(max_k, num_bands)?;
        Ok(Self {
            max_k,
            num_bands,
            keys: Vec::new(),
            staged: Vec::new(),
            tables: Vec::new(),
            built: false,
        })
    }

    fn add(&mut self, key: &str, signature: &Signature) -> Result<()> {
        if self.built {
            return Err(EnsembleError::AlreadyBuilt);
        }
        check_signature(self.num_hash(), signature)?;
        if self.keys.len() >= u32::MAX as usize {
            return Err(EnsembleError::InvalidParameter(
                "partition holds too many records".to_string(),
            ));
        }
        self.staged.extend_from_slice(signature.values());
        self.keys.push(key.into());
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        if self.built {
            return Err(EnsembleError::AlreadyBuilt);
        }
        let num_hash = self.num_hash();
        let mut tables: Vec<Vec<FxHashMap<Box<[u64]>, Bucket>>> = (0..self.num_bands)
            .map(|_| (0..self.max_k).map(|_| FxHashMap::default()).collect())
            .collect();

        for (id, sig) in self.staged.chunks(num_hash).enumerate() {
            for (band, chunk) in sig.chunks(self.max_k).enumerate() {
                for k in 1..=self.max_k {
                    tables[band][k - 1]
                        .entry(chunk[..k].into())
                        .or_default()
                        .push(id as u32);
                }
            }
        }

        self.tables = tables;
        self.staged = Vec::new();
        self.built = true;
        Ok(())
    }

    fn query<'a>(
        &'a self,
        signature: &'a Signature,
        k: usize,
        l: usize,
    ) -> Result<Box<dyn Iterator<Item = &'a str> + 'a>> {
        check_query(self, signature, k, l)?;
        let values = signature.values();
        let max_k = self.max_k;
        Ok(Box::new((0..l).flat_map(move |band| {
            let start = band * max_k;
            self.tables[band][k - 1]
                .get(&values[start..start + k])
                .into_iter()
                .flat_map(|bucket| bucket.iter())
                .map(move |&id| &*self.keys[id as usize])
        })))
    }

    fn max_k(&self) -> usize {
        self.max_k
    }

    fn num_bands(&self) -> usize {
        self.num_bands
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn phase(&self) -> IndexPhase {
        match (self.built, self.keys.is_empty()) {
            (true, _) => IndexPhase::Built,
            (false, true) => IndexPhase::Empty,
            (false, false) => IndexPhase::Staged,
        }
    }

    fn stats(&self) -> IndexStats {
        let mut size_bytes = self.staged.len() * std::mem::size_of::<u64>();
        for band in &self.tables {
            for (k, table) in band.iter().enumerate() {
                size_bytes += table.len() * (k + 1) * std::mem::size_of::<u64>();
                size_bytes += table
                    .values()
                    .map(|b| b.len() * std::mem::size_of::<u32>())
                    .sum::<usize>();
            }
        }
        size_bytes += self.keys.iter().map(|k| k.len()).sum::<usize>();
        IndexStats {
            num_records: self.keys.len(),
            max_k: self.max_k,
            num_bands: self.num_bands,
            size_bytes,
            algorithm: "Band-HashTable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(values: &[u64]) -> Signature {
        Signature::new(values.to_vec())
    }

    #[test]
    fn staged_records_are_not_searchable() {
        let mut idx = BandHashIndex::new(2, 2).unwrap();
        idx.add("a", &sig(&[1, 2, 3, 4])).unwrap();
        assert_eq!(idx.phase(), IndexPhase::Staged);
        assert!(matches!(idx.query(&sig(&[1, 2, 3, 4]), 1, 1), Err(EnsembleError::NotBuilt)));
    }

    #[test]
    fn exact_prefix_lookup() {
        let mut idx = BandHashIndex::new(3, 1).unwrap();
        idx.add("a", &sig(&[7, 8, 9])).unwrap();
        idx.add("b", &sig(&[7, 8, 0])).unwrap();
        idx.add("c", &sig(&[7, 1, 9])).unwrap();
        idx.build().unwrap();

        let q = sig(&[7, 8, 9]);
        let count = |k| idx.query(&q, k, 1).unwrap().count();
        assert_eq!(count(1), 3);
        assert_eq!(count(2), 2);
        assert_eq!(count(3), 1);
    }

    #[test]
    fn build_twice_fails() {
        let mut idx = BandHashIndex::new(1, 1).unwrap();
        idx.build().unwrap();
        assert_eq!(idx.build(), Err(EnsembleError::AlreadyBuilt));
        assert_eq!(idx.add("x", &sig(&[1])), Err(EnsembleError::AlreadyBuilt));
    }

    #[test]
    fn empty_index_yields_nothing() {
        let mut idx = BandHashIndex::new(2, 4).unwrap();
        idx.build().unwrap();
        assert_eq!(idx.query(&sig(&[0; 8]), 2, 4).unwrap().count(), 0);
        assert!(idx.is_empty());
    }
}
