//! Shared fixtures for integration tests.

#![allow(dead_code)]

use lsh_ensemble::{DomainRecord, EnsembleConfig, Signature};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};

/// Install a test-friendly tracing subscriber (honours `RUST_LOG`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Domains keyed by name, plus their sketched records.
pub struct Corpus {
    pub values: HashMap<String, HashSet<String>>,
    pub records: Vec<DomainRecord>,
}

impl Corpus {
    pub fn record(&self, key: &str) -> &DomainRecord {
        self.records
            .iter()
            .find(|r| r.key == key)
            .expect("record exists")
    }
}

/// Random domains drawn from a shared vocabulary so that they overlap.
pub fn random_corpus(
    num_domains: usize,
    vocab: usize,
    sizes: std::ops::Range<usize>,
    config: &EnsembleConfig,
    seed: u64,
) -> Corpus {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut values = HashMap::new();
    let mut records = Vec::with_capacity(num_domains);

    for d in 0..num_domains {
        let target = rng.random_range(sizes.clone());
        let mut set = HashSet::with_capacity(target);
        while set.len() < target {
            set.insert(format!("tok{}", rng.random_range(0..vocab)));
        }
        let key = format!("domain-{d}");
        records.push(DomainRecord::from_set(&key, &set, config.seed, config.num_hash).unwrap());
        values.insert(key, set);
    }

    Corpus { values, records }
}

/// Build a corpus from literal domains.
pub fn literal_corpus(domains: &[(&str, &[&str])], config: &EnsembleConfig) -> Corpus {
    let mut values = HashMap::new();
    let mut records = Vec::new();
    for (key, vals) in domains {
        let set: HashSet<String> = vals.iter().map(|v| v.to_string()).collect();
        records.push(DomainRecord::from_set(*key, &set, config.seed, config.num_hash).unwrap());
        values.insert(key.to_string(), set);
    }
    Corpus { values, records }
}

/// `n` records sharing one signature, spread over sizes `1..=max_size`.
pub fn identical_records(n: usize, max_size: usize, signature: &Signature) -> Vec<DomainRecord> {
    (0..n)
        .map(|i| DomainRecord::new(format!("dup-{i}"), 1 + i % max_size, signature.clone()))
        .collect()
}
