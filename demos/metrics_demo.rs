//! Cache Metrics Demonstration
//!
//! Runs one workload through the serialized and the concurrent midpoint
//! caches and prints the core counters next to the hot/cold counters.
//!
//! Run with: cargo run --example metrics_demo

use midpoint_cache::config::MidpointCacheConfig;
use midpoint_cache::metrics::CacheMetrics;
use midpoint_cache::MidpointCache;
use core::num::NonZeroUsize;
use std::collections::BTreeMap;

fn main() {
    println!("Cache Metrics Demonstration");
    println!("===========================\n");

    let capacity = NonZeroUsize::new(4).unwrap();
    println!("Capacity: {} items", capacity.get());
    println!("Workload: insert 6 items, read the survivors, insert 2 more\n");

    #[allow(unused_mut)]
    let mut caches: Vec<(&str, Box<dyn CacheMetrics>)> =
        vec![("Serialized", Box::new(run_serialized(capacity)))];
    #[cfg(feature = "concurrent")]
    caches.push(("Concurrent", Box::new(run_concurrent(capacity))));

    display_metrics_comparison(&caches);
    demonstrate_deterministic_ordering(caches[0].1.as_ref());
}

const WORKLOAD: [&str; 6] = ["apple", "banana", "cherry", "date", "elderberry", "fig"];

fn run_serialized(capacity: NonZeroUsize) -> MidpointCache<&'static str, usize> {
    let mut cache = MidpointCache::init(MidpointCacheConfig::new(capacity), None);
    for (i, key) in WORKLOAD.into_iter().enumerate() {
        if let Some((evicted, _)) = cache.put(key, i) {
            println!("  serialized: {key} evicted {evicted}");
        }
    }
    for key in WORKLOAD {
        cache.get(&key);
    }
    cache.put("grape", 6);
    cache.put("honeydew", 7);
    cache
}

#[cfg(feature = "concurrent")]
fn run_concurrent(
    capacity: NonZeroUsize,
) -> midpoint_cache::ConcurrentMidpointCache<&'static str, usize> {
    use midpoint_cache::concurrent::{ConcurrentMidpointCache, InlineExecutor};

    let cache = ConcurrentMidpointCache::with_executor(capacity, InlineExecutor);
    for (i, key) in WORKLOAD.into_iter().enumerate() {
        if let Some((evicted, _)) = cache.put(key, i) {
            println!("  concurrent: {key} evicted {evicted}");
        }
    }
    for key in WORKLOAD {
        cache.get(&key);
    }
    cache.put("grape", 6);
    cache.put("honeydew", 7);
    cache
}

fn display_metrics_comparison(caches: &[(&str, Box<dyn CacheMetrics>)]) {
    println!("\nCore Metrics");
    println!("{:-<60}", "");
    print_row(caches, &["requests", "cache_hits", "hit_rate", "insertions", "evictions"]);

    println!("\nHot/Cold Metrics");
    println!("{:-<60}", "");
    print_row(
        caches,
        &["hot_hits", "cold_hits", "hot_hit_ratio", "promotions", "boundary_shifts", "hot_size", "cold_size"],
    );
}

fn print_row(caches: &[(&str, Box<dyn CacheMetrics>)], names: &[&str]) {
    print!("{:<18}", "metric");
    for (label, cache) in caches {
        print!("{:>20}", format!("{label} ({})", cache.algorithm_name()));
    }
    println!();
    for name in names {
        print!("{name:<18}");
        for (_, cache) in caches {
            let value = cache.metrics().get(*name).copied().unwrap_or(0.0);
            print!("{value:>20.3}");
        }
        println!();
    }
}

fn demonstrate_deterministic_ordering(cache: &dyn CacheMetrics) {
    println!("\nAll metrics in BTreeMap order ({}):", cache.algorithm_name());
    let metrics: BTreeMap<String, f64> = cache.metrics();
    for (name, value) in &metrics {
        println!("  {name:<20} {value:.3}");
    }
}
