//! Simulation runner for cache algorithms
//!
//! Every algorithm replays the same trace through the read-through pattern:
//! `get`, and on a miss `put` the key. Thread-safe caches can be driven by
//! several threads, each taking every `threads`-th request, so the trace
//! order is kept within a thread but interleaved across threads.
//!
//! Hit counts are kept per thread and merged at the end; windows are
//! indexed by the request's sequence number, not by completion order.

use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;
use std::thread;
use std::time::Instant;

use lru::LruCache;
use midpoint_cache::concurrent::ConcurrentMidpointCache;
use midpoint_cache::config::{ConcurrentMidpointCacheConfig, MidpointCacheConfig};
use midpoint_cache::metrics::CacheMetrics;
use midpoint_cache::MidpointCache;
use moka::sync::Cache as MokaCache;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::models::{
    AlgorithmStats, CacheAlgorithm, LatencyStats, OpLatencyStats, Request, SimulationConfig,
    SimulationResult,
};

/// Caches that can be shared between threads
enum SharedCache {
    MidpointConcurrent(ConcurrentMidpointCache<u64, u64>),
    Lru(Mutex<LruCache<u64, u64>>),
    Moka(MokaCache<u64, u64>),
}

/// Wrapper enum for all cache implementations
enum CacheWrapper {
    Midpoint(MidpointCache<u64, u64>),
    Shared(SharedCache),
}

impl CacheWrapper {
    fn new(algorithm: CacheAlgorithm, config: &SimulationConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        match algorithm {
            CacheAlgorithm::Midpoint => CacheWrapper::Midpoint(MidpointCache::init(
                MidpointCacheConfig::new(capacity),
                None,
            )),
            CacheAlgorithm::MidpointConcurrent => {
                let cache_config = ConcurrentMidpointCacheConfig::new(capacity)
                    .with_refresh_workers(config.refresh_workers.max(1))
                    .with_refresh_queue(config.refresh_queue.max(1));
                CacheWrapper::Shared(SharedCache::MidpointConcurrent(
                    ConcurrentMidpointCache::from_config(cache_config),
                ))
            }
            CacheAlgorithm::Lru => {
                CacheWrapper::Shared(SharedCache::Lru(Mutex::new(LruCache::new(capacity))))
            }
            CacheAlgorithm::Moka => {
                CacheWrapper::Shared(SharedCache::Moka(MokaCache::new(capacity.get() as u64)))
            }
        }
    }
}

impl SharedCache {
    #[inline]
    fn get(&self, key: u64) -> bool {
        match self {
            SharedCache::MidpointConcurrent(cache) => cache.get(&key).is_some(),
            SharedCache::Lru(cache) => cache.lock().get(&key).is_some(),
            SharedCache::Moka(cache) => cache.get(&key).is_some(),
        }
    }

    #[inline]
    fn put(&self, key: u64, value: u64) {
        match self {
            SharedCache::MidpointConcurrent(cache) => {
                cache.put(key, value);
            }
            SharedCache::Lru(cache) => {
                cache.lock().put(key, value);
            }
            SharedCache::Moka(cache) => cache.insert(key, value),
        }
    }

    /// Lets background work finish and returns the cache's own report.
    fn settle(&self) -> BTreeMap<String, f64> {
        match self {
            SharedCache::MidpointConcurrent(cache) => {
                cache.quiesce();
                CacheMetrics::metrics(cache)
            }
            SharedCache::Lru(_) => BTreeMap::new(),
            SharedCache::Moka(cache) => {
                cache.run_pending_tasks();
                BTreeMap::new()
            }
        }
    }
}

/// Tracks latency for a single operation type
#[derive(Debug)]
struct OpLatencyTracker {
    total_ns: u64,
    count: u64,
    min_ns: u64,
    max_ns: u64,
    /// Sample reservoir for the percentile
    samples: Vec<u64>,
    max_samples: usize,
}

impl OpLatencyTracker {
    fn new() -> Self {
        Self {
            total_ns: 0,
            count: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            samples: Vec::with_capacity(5000),
            max_samples: 5000,
        }
    }

    #[inline]
    fn record(&mut self, latency_ns: u64) {
        self.total_ns += latency_ns;
        self.count += 1;
        self.min_ns = self.min_ns.min(latency_ns);
        self.max_ns = self.max_ns.max(latency_ns);

        // Reservoir sampling
        if self.samples.len() < self.max_samples {
            self.samples.push(latency_ns);
        } else {
            let slot = rand::random::<u64>() % self.count;
            if (slot as usize) < self.max_samples {
                self.samples[slot as usize] = latency_ns;
            }
        }
    }

    fn finish(mut self) -> OpLatencyStats {
        self.samples.sort_unstable();
        let p99_ns = match self.samples.len() {
            0 => 0,
            len => self.samples[(len * 99 / 100).min(len - 1)],
        };
        OpLatencyStats {
            total_ns: self.total_ns,
            count: self.count,
            min_ns: if self.count == 0 { 0 } else { self.min_ns },
            max_ns: self.max_ns,
            p99_ns,
        }
    }
}

/// Per-thread recorder of hits, windows and latencies
struct Recorder {
    stats: AlgorithmStats,
    window: usize,
    get: OpLatencyTracker,
    put: OpLatencyTracker,
}

impl Recorder {
    fn new(window: usize) -> Self {
        Self {
            stats: AlgorithmStats::new(),
            window,
            get: OpLatencyTracker::new(),
            put: OpLatencyTracker::new(),
        }
    }

    /// Runs one read-through access, timing each cache call.
    #[inline]
    fn access(
        &mut self,
        request: &Request,
        get: impl FnOnce(u64) -> bool,
        put: impl FnOnce(u64, u64),
    ) {
        let start = Instant::now();
        let hit = get(request.key);
        self.get.record(start.elapsed().as_nanos() as u64);

        if !hit {
            let start = Instant::now();
            put(request.key, request.seq);
            self.put.record(start.elapsed().as_nanos() as u64);
        }
        self.stats.record(request, hit, self.window);
    }

    fn finish(self) -> AlgorithmStats {
        let mut stats = self.stats;
        stats.latency = LatencyStats {
            get_stats: self.get.finish(),
            put_stats: self.put.finish(),
        };
        stats
    }
}

/// Runs one trace against every configured algorithm
pub struct SimulationRunner {
    config: SimulationConfig,
}

impl SimulationRunner {
    /// Create a new simulation runner
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Replays `requests` through each algorithm in turn.
    pub fn run(&self, requests: &[Request]) -> SimulationResult {
        let start = Instant::now();
        let unique_keys = requests.iter().map(|r| r.key).collect::<HashSet<_>>().len();

        let mut stats = BTreeMap::new();
        for &algorithm in &self.config.algorithms {
            let algorithm_start = Instant::now();
            let mut algorithm_stats = self.run_algorithm(algorithm, requests);
            algorithm_stats.simulation_time_ms = algorithm_start.elapsed().as_millis() as u64;

            info!(
                algorithm = algorithm.as_str(),
                hit_rate = algorithm_stats.overall.hit_rate(),
                popular_hit_rate = algorithm_stats.popular.hit_rate(),
                elapsed_ms = algorithm_stats.simulation_time_ms,
                "algorithm finished"
            );
            stats.insert(algorithm, algorithm_stats);
        }

        SimulationResult {
            stats,
            total_requests: requests.len(),
            unique_keys,
            window: self.config.window,
            duration: start.elapsed(),
        }
    }

    fn run_algorithm(&self, algorithm: CacheAlgorithm, requests: &[Request]) -> AlgorithmStats {
        let window = self.config.window;
        match CacheWrapper::new(algorithm, &self.config) {
            CacheWrapper::Midpoint(mut cache) => {
                if self.config.threads > 1 {
                    debug!(algorithm = algorithm.as_str(), "not thread-safe, running on one thread");
                }
                let mut recorder = Recorder::new(window);
                for request in requests {
                    let hit = {
                        let start = Instant::now();
                        let hit = cache.get(&request.key).is_some();
                        recorder.get.record(start.elapsed().as_nanos() as u64);
                        hit
                    };
                    if !hit {
                        let start = Instant::now();
                        cache.put(request.key, request.seq);
                        recorder.put.record(start.elapsed().as_nanos() as u64);
                    }
                    recorder.stats.record(request, hit, window);
                }
                let mut stats = recorder.finish();
                stats.cache_metrics = CacheMetrics::metrics(&cache);
                stats
            }
            CacheWrapper::Shared(cache) => {
                let threads = self.config.threads.max(1);
                let mut stats = AlgorithmStats::new();

                thread::scope(|scope| {
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let cache = &cache;
                            scope.spawn(move || {
                                debug!(algorithm = algorithm.as_str(), thread = t, "worker started");
                                let mut recorder = Recorder::new(window);
                                for request in requests.iter().skip(t).step_by(threads) {
                                    recorder.access(
                                        request,
                                        |key| cache.get(key),
                                        |key, value| cache.put(key, value),
                                    );
                                }
                                recorder.finish()
                            })
                        })
                        .collect();

                    for handle in handles {
                        match handle.join() {
                            Ok(worker) => stats.merge(worker),
                            Err(_) => error!(
                                algorithm = algorithm.as_str(),
                                "simulation worker panicked"
                            ),
                        }
                    }
                });

                stats.cache_metrics = cache.settle();
                stats
            }
        }
    }
}
