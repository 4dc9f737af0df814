//! Midpoint Cache Metrics
//!
//! Counters specific to the hot/cold split: where hits land, how often cold
//! entries are promoted and how often the boundary moves.

extern crate alloc;

use super::{CacheMetrics, CoreCacheMetrics};
use crate::meta::{Split, Temperature};
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

/// Midpoint-specific metrics (extends CoreCacheMetrics)
#[derive(Debug, Clone, PartialEq)]
pub struct MidpointCacheMetrics {
    /// Core metrics common to all cache algorithms
    pub core: CoreCacheMetrics,

    /// Hits on entries before the boundary
    pub hot_hits: u64,

    /// Hits on the boundary or entries after it
    pub cold_hits: u64,

    /// Cold entries moved to the head by a hit
    pub promotions: u64,

    /// Single-step boundary moves, in either direction
    pub boundary_shifts: u64,

    /// Promotions the caller ran itself because the refresh queue was full
    pub saturated_refreshes: u64,

    /// Entries counted hot at snapshot time
    pub hot_size: u64,

    /// Entries counted cold at snapshot time
    pub cold_size: u64,
}

impl MidpointCacheMetrics {
    /// Creates an empty set of counters for a cache of `capacity` entries.
    pub fn new(capacity: u64) -> Self {
        Self {
            core: CoreCacheMetrics::new(capacity),
            hot_hits: 0,
            cold_hits: 0,
            promotions: 0,
            boundary_shifts: 0,
            saturated_refreshes: 0,
            hot_size: 0,
            cold_size: 0,
        }
    }

    /// Records a hit on an entry of the given temperature.
    pub fn record_hit(&mut self, temperature: Temperature) {
        self.core.record_hit();
        match temperature {
            Temperature::Hot => self.hot_hits += 1,
            Temperature::Cold => {
                self.cold_hits += 1;
                self.promotions += 1;
            }
        }
    }

    /// Copies the current list shape into the snapshot.
    pub fn update_split(&mut self, split: Split, boundary_shifts: u64) {
        self.hot_size = split.hot as u64;
        self.cold_size = split.cold as u64;
        self.core.entries = split.len() as u64;
        self.boundary_shifts = boundary_shifts;
    }

    /// Share of hits served from the hot half, or `0.0` without hits.
    pub fn hot_hit_ratio(&self) -> f64 {
        if self.core.cache_hits > 0 {
            self.hot_hits as f64 / self.core.cache_hits as f64
        } else {
            0.0
        }
    }

    /// Converts midpoint metrics to BTreeMap for reporting
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = self.core.to_btreemap();

        metrics.insert("boundary_shifts".to_string(), self.boundary_shifts as f64);
        metrics.insert("cold_hits".to_string(), self.cold_hits as f64);
        metrics.insert("cold_size".to_string(), self.cold_size as f64);
        metrics.insert("hot_hits".to_string(), self.hot_hits as f64);
        metrics.insert("hot_size".to_string(), self.hot_size as f64);
        metrics.insert("promotions".to_string(), self.promotions as f64);
        metrics.insert(
            "saturated_refreshes".to_string(),
            self.saturated_refreshes as f64,
        );
        metrics.insert("hot_hit_ratio".to_string(), self.hot_hit_ratio());

        metrics
    }
}

impl CacheMetrics for MidpointCacheMetrics {
    fn metrics(&self) -> BTreeMap<String, f64> {
        self.to_btreemap()
    }

    fn algorithm_name(&self) -> &'static str {
        "Midpoint"
    }
}

#[cfg(feature = "concurrent")]
pub use atomic::AtomicMidpointMetrics;

#[cfg(feature = "concurrent")]
mod atomic {
    use super::MidpointCacheMetrics;
    use crate::meta::{Split, Temperature};
    use core::sync::atomic::{AtomicU64, Ordering};

    /// Lock-free counters shared by all threads of a concurrent cache.
    ///
    /// Every counter is an independent relaxed atomic; a snapshot is not
    /// a consistent cut across counters.
    #[derive(Debug, Default)]
    pub struct AtomicMidpointMetrics {
        requests: AtomicU64,
        hot_hits: AtomicU64,
        cold_hits: AtomicU64,
        promotions: AtomicU64,
        insertions: AtomicU64,
        evictions: AtomicU64,
        removals: AtomicU64,
        saturated_refreshes: AtomicU64,
    }

    impl AtomicMidpointMetrics {
        /// Creates zeroed counters.
        pub fn new() -> Self {
            Self::default()
        }

        /// Records a lookup that found an entry of the given temperature.
        pub fn record_hit(&self, temperature: Temperature) {
            self.requests.fetch_add(1, Ordering::Relaxed);
            match temperature {
                Temperature::Hot => self.hot_hits.fetch_add(1, Ordering::Relaxed),
                Temperature::Cold => self.cold_hits.fetch_add(1, Ordering::Relaxed),
            };
        }

        /// Records a lookup that missed.
        pub fn record_miss(&self) {
            self.requests.fetch_add(1, Ordering::Relaxed);
        }

        /// Records a cold entry that was relinked at the head as hot.
        pub fn record_promotion(&self) {
            self.promotions.fetch_add(1, Ordering::Relaxed);
        }

        /// Records an admitted entry.
        pub fn record_insertion(&self) {
            self.insertions.fetch_add(1, Ordering::Relaxed);
        }

        /// Records a capacity eviction.
        pub fn record_eviction(&self) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        /// Records an explicit removal.
        pub fn record_removal(&self) {
            self.removals.fetch_add(1, Ordering::Relaxed);
        }

        /// Records a promotion run on the caller because the queue was full.
        pub fn record_saturation(&self) {
            self.saturated_refreshes.fetch_add(1, Ordering::Relaxed);
        }

        /// Copies the counters into a plain metrics value.
        pub fn snapshot(
            &self,
            capacity: u64,
            split: Split,
            boundary_shifts: u64,
        ) -> MidpointCacheMetrics {
            let hot_hits = self.hot_hits.load(Ordering::Relaxed);
            let cold_hits = self.cold_hits.load(Ordering::Relaxed);
            let mut metrics = MidpointCacheMetrics::new(capacity);
            metrics.core.cache_hits = hot_hits + cold_hits;
            metrics.core.requests = self
                .requests
                .load(Ordering::Relaxed)
                .max(metrics.core.cache_hits);
            metrics.core.insertions = self.insertions.load(Ordering::Relaxed);
            metrics.core.evictions = self.evictions.load(Ordering::Relaxed);
            metrics.core.removals = self.removals.load(Ordering::Relaxed);
            metrics.hot_hits = hot_hits;
            metrics.cold_hits = cold_hits;
            metrics.promotions = self.promotions.load(Ordering::Relaxed);
            metrics.saturated_refreshes = self.saturated_refreshes.load(Ordering::Relaxed);
            metrics.update_split(split, boundary_shifts);
            metrics
        }
    }
}
