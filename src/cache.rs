//! Cleaned-trace cache keyed by input fingerprint.
//!
//! Cleaning a day of probe data is the slowest stage, and repeated analyses of
//! the same file (different clustering radius, different regions) do not need
//! it redone. A [`Fingerprint`] covers both the input bytes and the cleaning
//! parameters, so changing either one misses the cache.

use std::collections::HashMap;
use std::hash::Hasher;
use std::time::{Duration, Instant};

use seahash::SeaHasher;

use crate::cleaner::CleanedTrace;
use crate::config::CleaningConfig;
use crate::error::Result;

/// Hash of an input file together with the parameters used to clean it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn compute(input: &[u8], config: &CleaningConfig) -> Result<Self> {
        let mut hasher = SeaHasher::new();
        hasher.write_usize(input.len());
        hasher.write(input);
        hasher.write(&serde_json::to_vec(config)?);
        Ok(Fingerprint(hasher.finish()))
    }
}

struct CacheEntry {
    trace: CleanedTrace,
    inserted: Instant,
}

/// Bounded, expiring map from fingerprints to cleaned traces.
pub struct TraceCache {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<Fingerprint, CacheEntry>,
}

impl TraceCache {
    /// A `max_entries` of 0 disables caching.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a live entry, dropping it if it has expired.
    pub fn get(&mut self, key: &Fingerprint) -> Option<&CleanedTrace> {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.inserted.elapsed() >= self.ttl);
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.trace)
    }

    /// Store a trace, first purging expired entries and then the oldest
    /// entry if the cache is still full.
    pub fn insert(&mut self, key: Fingerprint, trace: CleanedTrace) {
        if self.max_entries == 0 {
            return;
        }
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.inserted.elapsed() < ttl);

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(k, _)| *k)
            {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                trace,
                inserted: Instant::now(),
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for TraceCache {
    /// One hour, eight traces.
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), 8)
    }
}
