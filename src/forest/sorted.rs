//! Array-backed LSH Forest.
//!
//! Each band keeps its records' band values in one flat array and, after
//! build, a permutation of record ids sorted lexicographically by those
//! values. Sorting by the full band also sorts by every prefix, so a query
//! at `k` rows is a binary search for the first id whose `k`-prefix is not
//! smaller than the query's, followed by a scan while prefixes are equal.

use super::{check_dimensions, check_query, check_signature, BandedIndex, IndexPhase, IndexStats};
use crate::error::{EnsembleError, Result};
use crate::hash::Signature;

/// LSH Forest over sorted per-band arrays.
#[derive(Debug, Clone)]
pub struct LshForest {
    max_k: usize,
    num_bands: usize,
    keys: Vec<Box<str>>,
    /// bands[b][id * max_k..(id + 1) * max_k] = band b of record id.
    bands: Vec<Vec<u64>>,
    /// sorted[b] = record ids ordered by band b values. Empty until build.
    sorted: Vec<Vec<u32>>,
    built: bool,
}

impl LshForest {
    #[inline]
    fn band_of(&self, band: usize, id: u32) -> &[u64] {
        let start = id as usize * self.max_k;
        &self.bands[band][start..start + self.max_k]
    }

    /// Ids in band `band` whose first `k` values equal `prefix`.
    fn band_matches<'a>(
        &'a self,
        band: usize,
        prefix: &'a [u64],
    ) -> impl Iterator<Item = u32> + 'a {
        let k = prefix.len();
        let order = &self.sorted[band];
        let start = order.partition_point(|&id| &self.band_of(band, id)[..k] < prefix);
        order[start..]
            .iter()
            .take_while(move |&&id| &self.band_of(band, id)[..k] == prefix)
            .copied()
    }
}

impl BandedIndex for LshForest {
    fn new(max_k: usize, num_bands: usize) -> Result<Self> {
        check_dimensions(max_k, num_bands)?;
        Ok(Self {
            max_k,
            num_bands,
            keys: Vec::new(),
            bands: vec![Vec::new(); num_bands],
            sorted: Vec::new(),
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

        for (band, chunk) in signature.values().chunks(self.max_k).enumerate() {
            self.bands[band].extend_from_slice(chunk);
        }
        self.keys.push(key.into());
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        if self.built {
            return Err(EnsembleError::AlreadyBuilt);
        }
        let n = self.keys.len() as u32;
        let mut sorted = Vec::with_capacity(self.num_bands);
        for band in 0..self.num_bands {
            let mut order: Vec<u32> = (0..n).collect();
            order.sort_unstable_by(|&a, &b| self.band_of(band, a).cmp(self.band_of(band, b)));
            sorted.push(order);
        }
        self.sorted = sorted;
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
            self.band_matches(band, &values[start..start + k])
                .map(move |id| &*self.keys[id as usize])
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
        let values: usize = self.bands.iter().map(Vec::len).sum();
        let ids: usize = self.sorted.iter().map(Vec::len).sum();
        let keys: usize = self.keys.iter().map(|k| k.len()).sum();
        IndexStats {
            num_records: self.keys.len(),
            max_k: self.max_k,
            num_bands: self.num_bands,
            size_bytes: values * std::mem::size_of::<u64>()
                + ids * std::mem::size_of::<u32>()
                + keys,
            algorithm: "LSH-Forest",
        }
    }
}
