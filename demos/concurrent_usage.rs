//! Concurrent Cache Usage Examples
//!
//! This example demonstrates multi-threaded usage patterns for the
//! concurrent midpoint cache.
//!
//! Run with: cargo run --example concurrent_usage --features concurrent

extern crate midpoint_cache;

use midpoint_cache::concurrent::{ConcurrentMidpointCache, InlineExecutor};
use midpoint_cache::config::ConcurrentMidpointCacheConfig;
use midpoint_cache::metrics::CacheMetrics;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn config(capacity: usize, workers: usize, queue: usize) -> ConcurrentMidpointCacheConfig {
    ConcurrentMidpointCacheConfig::new(NonZeroUsize::new(capacity).unwrap())
        .with_refresh_workers(workers)
        .with_refresh_queue(queue)
}

fn main() {
    println!("Concurrent Cache Usage Examples");
    println!("================================\n");

    basic_concurrent_usage();
    deferred_promotions();
    scan_resistance();
    refresh_pool_sizes();
    weak_iteration();

    println!("\nAll examples completed successfully!");
}

/// Basic usage: several threads sharing one cache through an `Arc`.
fn basic_concurrent_usage() {
    println!("1. Basic Concurrent Usage");
    println!("-------------------------");

    let cache: Arc<ConcurrentMidpointCache<String, i32>> =
        Arc::new(ConcurrentMidpointCache::from_config(config(100, 2, 256)));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..25 {
                    let key = format!("thread{t}_key{i}");
                    cache.put(key.clone(), t * 1000 + i);
                    assert_eq!(cache.get(&key), Some(t * 1000 + i));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    cache.quiesce();
    println!("   Cache size after 4 threads x 25 puts: {}", cache.len());
    println!(
        "   Hot / cold: {} / {}",
        cache.hot_len(),
        cache.cold_len()
    );
    println!();
}

/// A hit returns at once; moving the entry to the head happens later on
/// the refresh pool.
fn deferred_promotions() {
    println!("2. Deferred Promotions");
    println!("----------------------");

    let cache: ConcurrentMidpointCache<&str, i32> =
        ConcurrentMidpointCache::from_config(config(4, 1, 64));
    for (i, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
        cache.put(key, i as i32);
    }
    let before: Vec<_> = cache.iter().map(|(k, _)| k).collect();
    println!("   Order after four puts: {before:?}");

    cache.get(&"d");
    println!("   Pending refreshes right after get(d): {}", cache.pending_refreshes());
    cache.quiesce();

    let after: Vec<_> = cache.iter().map(|(k, _)| k).collect();
    println!("   Order once the pool has run:    {after:?}");
    println!();
}

/// A handful of popular keys survive a long stream of one-time keys.
fn scan_resistance() {
    println!("3. Scan Resistance");
    println!("------------------");

    let cache: Arc<ConcurrentMidpointCache<u64, u64>> =
        Arc::new(ConcurrentMidpointCache::from_config(config(64, 2, 1024)));
    for key in 0..8 {
        cache.put(key, key);
    }

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let mut misses = 0;
                for i in 0..20_000u64 {
                    if cache.get(&(i % 8)).is_none() {
                        misses += 1;
                    }
                }
                misses
            })
        })
        .collect();
    let scanner = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for key in 1_000..11_000u64 {
                cache.put(key, key);
            }
        })
    };

    let misses: u64 = readers.into_iter().map(|h| h.join().unwrap()).sum();
    scanner.join().unwrap();
    cache.quiesce();

    let survivors = (0..8).filter(|k| cache.contains(k)).count();
    println!("   Popular keys still cached: {survivors}/8");
    println!("   Popular key misses during the scan: {misses}");
    println!();
}

/// Compares refresh pool settings on the same read-heavy workload.
fn refresh_pool_sizes() {
    println!("4. Refresh Pool Sizes");
    println!("---------------------");

    let settings = [(0, 0, "inline"), (1, 64, "1 worker"), (4, 4096, "4 workers")];
    for (workers, queue, label) in settings {
        let cache: Arc<ConcurrentMidpointCache<usize, usize>> = if workers == 0 {
            Arc::new(ConcurrentMidpointCache::with_executor(
                NonZeroUsize::new(1_000).unwrap(),
                InlineExecutor,
            ))
        } else {
            Arc::new(ConcurrentMidpointCache::from_config(config(
                1_000, workers, queue,
            )))
        };
        for key in 0..1_000 {
            cache.put(key, key);
        }

        let start = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..10_000 {
                        let key = (t * 37 + i) % 2_000;
                        if cache.get(&key).is_none() && i % 4 == 0 {
                            cache.put(key, key);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        cache.quiesce();

        let metrics = cache.metrics();
        println!(
            "   {label:>10}: {:?}, hit rate {:.1}%, saturated refreshes {}",
            start.elapsed(),
            metrics.core.hit_rate() * 100.0,
            metrics.saturated_refreshes
        );
    }
    println!();
}

/// Iterating while writers are active never blocks them for long and never
/// yields a torn entry.
fn weak_iteration() {
    println!("5. Weakly Consistent Iteration");
    println!("------------------------------");

    let cache: Arc<ConcurrentMidpointCache<u32, u32>> =
        Arc::new(ConcurrentMidpointCache::from_config(config(256, 2, 256)));
    for key in 0..256 {
        cache.put(key, key * 2);
    }

    let writer = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for key in 1_000..3_000 {
                cache.put(key, key * 2);
            }
        })
    };

    let mut seen = 0;
    for _ in 0..10 {
        for (key, value) in cache.iter() {
            assert_eq!(value, key * 2);
            seen += 1;
        }
    }
    writer.join().unwrap();
    cache.quiesce();

    println!("   Entries visited across 10 passes: {seen}");
    println!("   Report: {:?}", CacheMetrics::metrics(cache.as_ref()).get("hot_size"));
}
