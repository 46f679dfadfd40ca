//! Memoized banding parameters.
//!
//! The optimizer is the most expensive pure computation on the query path,
//! and its inputs repeat: partition bounds are fixed after build, and query
//! sizes and thresholds cluster. The cache is owned by one ensemble and lives
//! exactly as long as it does.
//!
//! Entries are a pure function of their key, so two queries racing on the
//! same miss compute the same value and whichever insert lands last wins.

use super::BandingParams;
use crate::error::Result;
use dashmap::DashMap;

/// Thresholds are cached at two decimal places.
const THRESHOLD_SCALE: f64 = 100.0;

/// Cache key: partition upper bound, query size, threshold in hundredths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub upper: usize,
    pub query_size: usize,
    pub threshold_centi: u32,
}

impl CacheKey {
    pub fn new(upper: usize, query_size: usize, threshold: f64) -> Self {
        Self {
            upper,
            query_size,
            threshold_centi: (threshold * THRESHOLD_SCALE).round() as u32,
        }
    }

    /// The rounded threshold this key stands for.
    pub fn threshold(&self) -> f64 {
        self.threshold_centi as f64 / THRESHOLD_SCALE
    }
}

/// Concurrent `(upper, q, t) -> (k, l)` cache.
#[derive(Debug, Default)]
pub struct ParamCache {
    entries: DashMap<CacheKey, BandingParams>,
}

impl ParamCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached entry for `key`, computing and inserting it on a miss.
    ///
    /// `compute` runs without holding any lock.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> Result<BandingParams>
    where
        F: FnOnce(&CacheKey) -> Result<BandingParams>,
    {
        if let Some(hit) = self.entries.get(&key) {
            return Ok(*hit);
        }
        let params = compute(&key)?;
        self.entries.insert(key, params);
        Ok(params)
    }

    pub fn get(&self, key: &CacheKey) -> Option<BandingParams> {
        self.entries.get(key).map(|e| *e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
