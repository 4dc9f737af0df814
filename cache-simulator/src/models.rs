// Data models for cache simulation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A single cache request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Position in the trace
    pub seq: u64,
    /// Cache key
    pub key: u64,
    /// Whether the key belongs to the popular set
    pub hot: bool,
}

impl Request {
    /// Create a new request
    pub fn new(seq: u64, key: u64, hot: bool) -> Self {
        Self { seq, key, hot }
    }
}

/// Cache implementations supported for simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheAlgorithm {
    /// Serialized `MidpointCache`, always single-threaded
    Midpoint,
    /// `ConcurrentMidpointCache`
    MidpointConcurrent,
    /// `lru::LruCache` behind a mutex
    Lru,
    /// Moka cache (external crate for comparison)
    Moka,
}

impl CacheAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheAlgorithm::Midpoint => "midpoint",
            CacheAlgorithm::MidpointConcurrent => "midpoint-concurrent",
            CacheAlgorithm::Lru => "lru",
            CacheAlgorithm::Moka => "moka",
        }
    }

    /// Parses a command-line name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "midpoint" | "mid" => Some(CacheAlgorithm::Midpoint),
            "midpoint-concurrent" | "concurrent" => Some(CacheAlgorithm::MidpointConcurrent),
            "lru" => Some(CacheAlgorithm::Lru),
            "moka" => Some(CacheAlgorithm::Moka),
            _ => None,
        }
    }

    /// Whether the runner may drive this cache from several threads
    pub fn is_thread_safe(&self) -> bool {
        !matches!(self, CacheAlgorithm::Midpoint)
    }

    /// Get all available algorithms
    pub fn all() -> Vec<CacheAlgorithm> {
        vec![
            CacheAlgorithm::Midpoint,
            CacheAlgorithm::MidpointConcurrent,
            CacheAlgorithm::Lru,
            CacheAlgorithm::Moka,
        ]
    }
}

impl fmt::Display for CacheAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a simulation run
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Cache capacity in number of entries
    pub capacity: usize,
    /// Algorithms to simulate
    pub algorithms: Vec<CacheAlgorithm>,
    /// Threads driving thread-safe caches
    pub threads: usize,
    /// Refresh workers for the concurrent midpoint cache
    pub refresh_workers: usize,
    /// Refresh queue bound for the concurrent midpoint cache
    pub refresh_queue: usize,
    /// Requests per reporting window
    pub window: usize,
}

/// Results of a simulation run
#[derive(Debug)]
pub struct SimulationResult {
    /// Statistics for each algorithm
    pub stats: BTreeMap<CacheAlgorithm, AlgorithmStats>,
    /// Total number of requests processed
    pub total_requests: usize,
    /// Number of distinct keys in the trace
    pub unique_keys: usize,
    /// Requests per reporting window
    pub window: usize,
    /// Duration of the simulation
    pub duration: Duration,
}

/// Hit and miss counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HitCount {
    pub hits: u64,
    pub misses: u64,
}

impl HitCount {
    pub fn record(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    pub fn merge(&mut self, other: HitCount) {
        self.hits += other.hits;
        self.misses += other.misses;
    }

    /// Hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Statistics for a single algorithm
#[derive(Debug, Default, Clone)]
pub struct AlgorithmStats {
    /// All requests
    pub overall: HitCount,
    /// Requests for popular keys
    pub popular: HitCount,
    /// One entry per reporting window, in trace order
    pub windows: Vec<HitCount>,
    /// Wall time for this algorithm in milliseconds
    pub simulation_time_ms: u64,
    /// Latency statistics for cache operations
    pub latency: LatencyStats,
    /// Report from the cache's own metrics, when it has one
    pub cache_metrics: BTreeMap<String, f64>,
}

impl AlgorithmStats {
    /// Create new empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one request's outcome.
    pub fn record(&mut self, request: &Request, hit: bool, window: usize) {
        self.overall.record(hit);
        if request.hot {
            self.popular.record(hit);
        }
        let index = request.seq as usize / window.max(1);
        if self.windows.len() <= index {
            self.windows.resize(index + 1, HitCount::default());
        }
        self.windows[index].record(hit);
    }

    /// Folds a worker thread's counts into these.
    pub fn merge(&mut self, other: AlgorithmStats) {
        self.overall.merge(other.overall);
        self.popular.merge(other.popular);
        if self.windows.len() < other.windows.len() {
            self.windows.resize(other.windows.len(), HitCount::default());
        }
        for (mine, theirs) in self.windows.iter_mut().zip(other.windows) {
            mine.merge(theirs);
        }
        self.latency.merge(other.latency);
    }
}

/// Latency statistics for a single operation type
#[derive(Debug, Clone, Default)]
pub struct OpLatencyStats {
    /// Total time spent (nanoseconds)
    pub total_ns: u64,
    /// Number of operations
    pub count: u64,
    /// Minimum latency (nanoseconds)
    pub min_ns: u64,
    /// Maximum latency (nanoseconds)
    pub max_ns: u64,
    /// 99th percentile from a sample reservoir (nanoseconds)
    pub p99_ns: u64,
}

impl OpLatencyStats {
    /// Calculate average latency in nanoseconds
    pub fn avg_ns(&self) -> f64 {
        if self.count > 0 {
            self.total_ns as f64 / self.count as f64
        } else {
            0.0
        }
    }

    fn merge(&mut self, other: OpLatencyStats) {
        if other.count == 0 {
            return;
        }
        self.min_ns = if self.count == 0 {
            other.min_ns
        } else {
            self.min_ns.min(other.min_ns)
        };
        self.max_ns = self.max_ns.max(other.max_ns);
        self.p99_ns = self.p99_ns.max(other.p99_ns);
        self.total_ns += other.total_ns;
        self.count += other.count;
    }
}

/// Latency statistics for all cache operations
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    /// Get operation stats
    pub get_stats: OpLatencyStats,
    /// Put operation stats
    pub put_stats: OpLatencyStats,
}

impl LatencyStats {
    /// Total number of operations
    pub fn count(&self) -> u64 {
        self.get_stats.count + self.put_stats.count
    }

    /// Calculate throughput in operations per second (all operations)
    pub fn ops_per_sec(&self) -> f64 {
        let total_ns = self.get_stats.total_ns + self.put_stats.total_ns;
        if total_ns > 0 {
            (self.count() as f64 * 1_000_000_000.0) / total_ns as f64
        } else {
            0.0
        }
    }

    /// Worker latencies merge by summing; p99 keeps the worst worker.
    pub fn merge(&mut self, other: LatencyStats) {
        self.get_stats.merge(other.get_stats);
        self.put_stats.merge(other.put_stats);
    }
}

/// CSV export row for simulation results
#[derive(Debug, Serialize)]
pub struct CsvResultRow {
    pub algorithm: String,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub popular_hit_rate: f64,
    pub worst_window_hit_rate: f64,
    pub simulation_time_ms: u64,
    pub ops_per_sec: f64,
    pub get_avg_ns: f64,
    pub get_p99_ns: u64,
    pub put_avg_ns: f64,
    pub put_p99_ns: u64,
}
