//! Hosted Cache Statistics Module
//!
//! Counts lookups, evictions and permanently failing item ids.

use serde::Serialize;

// == Hosted Cache Stats ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostedCacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that deferred the request and started a fetch
    pub misses: u64,
    /// Entries dropped for capacity or age
    pub evictions: u64,
    /// Item ids blacklisted after terminal or exhausted failures
    pub failures: u64,
    /// Current number of cached entries
    pub total_entries: usize,
}

impl HostedCacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// hits / (hits + misses), or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
