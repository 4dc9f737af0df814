//! Cache Metrics System
//!
//! Hit-ratio reporting for the midpoint caches. Each cache tracks the common
//! [`CoreCacheMetrics`] plus the hot/cold specific counters in
//! [`MidpointCacheMetrics`], and reports both through the [`CacheMetrics`]
//! trait as a `BTreeMap<String, f64>`.
//!
//! A `BTreeMap` keeps the keys in a stable order, so two reports of the same
//! workload print and export identically.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

pub mod midpoint;

pub use midpoint::MidpointCacheMetrics;

#[cfg(feature = "concurrent")]
pub use midpoint::AtomicMidpointMetrics;

/// Common metrics tracked by every cache.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CoreCacheMetrics {
    /// Total number of lookups made to the cache
    pub requests: u64,

    /// Number of lookups that found their key
    pub cache_hits: u64,

    /// Number of entries admitted by `put`
    pub insertions: u64,

    /// Number of entries pushed out of the tail to make room
    pub evictions: u64,

    /// Number of entries dropped by an explicit `remove`
    pub removals: u64,

    /// Number of live entries when the snapshot was taken
    pub entries: u64,

    /// Maximum number of live entries
    pub capacity: u64,
}

impl CoreCacheMetrics {
    /// Creates an empty set of counters for a cache of `capacity` entries.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Records a lookup that found its key.
    pub fn record_hit(&mut self) {
        self.requests += 1;
        self.cache_hits += 1;
    }

    /// Records a lookup that missed. Misses are `requests - cache_hits`.
    pub fn record_miss(&mut self) {
        self.requests += 1;
    }

    /// Records an admitted entry.
    pub fn record_insertion(&mut self) {
        self.insertions += 1;
    }

    /// Records a capacity eviction.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Records an explicit removal.
    pub fn record_removal(&mut self) {
        self.removals += 1;
    }

    /// Fraction of lookups that hit, or `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        if self.requests > 0 {
            self.cache_hits as f64 / self.requests as f64
        } else {
            0.0
        }
    }

    /// Fraction of lookups that missed, or `0.0` before the first lookup.
    pub fn miss_rate(&self) -> f64 {
        if self.requests > 0 {
            (self.requests - self.cache_hits) as f64 / self.requests as f64
        } else {
            0.0
        }
    }

    /// How full the cache was at snapshot time, between `0.0` and `1.0`.
    pub fn utilization(&self) -> f64 {
        if self.capacity > 0 {
            self.entries as f64 / self.capacity as f64
        } else {
            0.0
        }
    }

    /// Convert core metrics to BTreeMap for reporting
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();

        metrics.insert("cache_hits".to_string(), self.cache_hits as f64);
        metrics.insert(
            "cache_misses".to_string(),
            (self.requests - self.cache_hits) as f64,
        );
        metrics.insert("capacity".to_string(), self.capacity as f64);
        metrics.insert("entries".to_string(), self.entries as f64);
        metrics.insert("evictions".to_string(), self.evictions as f64);
        metrics.insert("insertions".to_string(), self.insertions as f64);
        metrics.insert("removals".to_string(), self.removals as f64);
        metrics.insert("requests".to_string(), self.requests as f64);

        metrics.insert("hit_rate".to_string(), self.hit_rate());
        metrics.insert("miss_rate".to_string(), self.miss_rate());
        metrics.insert("utilization".to_string(), self.utilization());

        if self.requests > 0 {
            metrics.insert(
                "eviction_rate".to_string(),
                self.evictions as f64 / self.requests as f64,
            );
        }

        metrics
    }
}

/// Uniform metrics access for every cache in the crate.
///
/// The simulator uses this to print and export comparable reports.
pub trait CacheMetrics {
    /// Returns all metrics as key-value pairs in deterministic order
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Algorithm name for identification
    fn algorithm_name(&self) -> &'static str;
}
