//! Stress Tests for the Concurrent Midpoint Cache
//!
//! These tests verify thread safety and correctness under high contention.
//! Every test ends by quiescing the cache and running the full invariant
//! check over the list, its counters and the key index.

#![cfg(feature = "concurrent")]

use midpoint_cache::concurrent::{ConcurrentMidpointCache, InlineExecutor};
use midpoint_cache::config::ConcurrentMidpointCacheConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const NUM_THREADS: usize = 8;
const OPS_PER_THREAD: usize = 10_000;

fn make_cache(capacity: usize, workers: usize, queue: usize) -> ConcurrentMidpointCache<usize, usize> {
    let config = ConcurrentMidpointCacheConfig::new(NonZeroUsize::new(capacity).unwrap())
        .with_refresh_workers(workers)
        .with_refresh_queue(queue);
    ConcurrentMidpointCache::from_config(config)
}

fn assert_settled(cache: &ConcurrentMidpointCache<usize, usize>) {
    cache.quiesce();
    assert_eq!(cache.pending_refreshes(), 0);
    if let Err(err) = cache.check_invariants() {
        panic!("invariant violated: {err}");
    }
    assert!(cache.len() <= cache.cap().get());
    assert_eq!(cache.hot_len() + cache.cold_len(), cache.len());
    assert!(cache.hot_len() - cache.cold_len() <= 1);
}

/// Random mix of reads, writes and removals. Each thread writes and removes
/// only its own keys; reads go anywhere.
#[test]
fn stress_mixed_operations() {
    let cache = Arc::new(make_cache(256, 2, 1024));

    let mut handles = Vec::new();
    for t in 0..NUM_THREADS {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(t as u64);
            let own = t * 1_000;
            for _ in 0..OPS_PER_THREAD {
                let roll = rng.gen_range(0..100);
                if roll < 60 {
                    let key = rng.gen_range(0..NUM_THREADS * 1_000);
                    if let Some(value) = cache.get(&key) {
                        assert_eq!(value, key * 3);
                    }
                } else if roll < 90 {
                    let key = own + rng.gen_range(0..1_000);
                    if !cache.contains(&key) {
                        cache.put(key, key * 3);
                    }
                } else {
                    let key = own + rng.gen_range(0..1_000);
                    if let Some(value) = cache.remove(&key) {
                        assert_eq!(value, key * 3);
                    }
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_settled(&cache);
    let metrics = cache.metrics();
    assert_eq!(
        metrics.core.insertions - metrics.core.evictions - metrics.core.removals,
        cache.len() as u64
    );
}

/// A few viral keys read by every thread while a stream of one-time keys
/// flows through the cache.
#[test]
fn stress_viral_keys_under_one_time_stream() {
    const VIRAL: usize = 8;
    let cache = Arc::new(make_cache(128, 2, 4096));
    for key in 0..VIRAL {
        cache.put(key, key);
    }

    let viral_misses = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for t in 0..NUM_THREADS {
        let cache = Arc::clone(&cache);
        let viral_misses = Arc::clone(&viral_misses);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(100 + t as u64);
            for i in 0..OPS_PER_THREAD {
                if t % 2 == 0 {
                    let key = rng.gen_range(0..VIRAL);
                    match cache.get(&key) {
                        Some(value) => assert_eq!(value, key),
                        None => {
                            viral_misses.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                } else {
                    let key = 1_000_000 + t * OPS_PER_THREAD + i;
                    cache.put(key, key);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_settled(&cache);
    let metrics = cache.metrics();
    assert_eq!(
        metrics.core.requests,
        (NUM_THREADS / 2 * OPS_PER_THREAD) as u64
    );
    assert_eq!(
        metrics.core.requests - metrics.core.cache_hits,
        viral_misses.load(Ordering::Relaxed) as u64
    );
}

/// Very small caches force every put through the eviction path.
#[test]
fn stress_tiny_capacities() {
    for capacity in [1, 2, 3, 4] {
        let cache = Arc::new(make_cache(capacity, 1, 16));

        let mut handles = Vec::new();
        for t in 0..NUM_THREADS {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..2_000 {
                    let key = t * 2_000 + i;
                    cache.put(key, key);
                    let _ = cache.get(&key);
                    let _ = cache.get(&(key.saturating_sub(1)));
                }
            }));
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_settled(&cache);
        assert_eq!(cache.len(), capacity);
    }
}

/// Promotions run on the calling thread; no background workers at all.
#[test]
fn stress_inline_executor() {
    let cache: Arc<ConcurrentMidpointCache<usize, usize>> = Arc::new(
        ConcurrentMidpointCache::with_executor(NonZeroUsize::new(64).unwrap(), InlineExecutor),
    );

    let mut handles = Vec::new();
    for t in 0..NUM_THREADS {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for i in 0..OPS_PER_THREAD / 2 {
                let key = t * 100 + i % 100;
                if cache.get(&key).is_none() {
                    cache.put(key, key);
                }
                if i % 7 == 0 {
                    cache.remove(&(t * 100 + (i * 13) % 100));
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_settled(&cache);
}

/// Scoped pool of readers and writers sharing one cache by reference.
#[test]
fn stress_scoped_pool() {
    let cache = make_cache(512, 4, 256);
    let mut pool = scoped_threadpool::Pool::new(NUM_THREADS as u32);

    pool.scoped(|scope| {
        for t in 0..NUM_THREADS {
            let cache = &cache;
            scope.execute(move || {
                for i in 0..OPS_PER_THREAD / 2 {
                    let key = t * OPS_PER_THREAD + i % 700;
                    if i % 4 == 0 {
                        cache.remove(&key);
                    } else if cache.get(&key).is_none() {
                        cache.put(key, key);
                    }
                }
            });
        }
    });

    assert_settled(&cache);
}

/// Lookups on an empty cache never allocate or link anything.
#[test]
fn stress_empty_cache() {
    let cache = Arc::new(make_cache(100, 2, 64));

    let mut handles = Vec::new();
    for _ in 0..NUM_THREADS {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for i in 0..1_000 {
                assert!(cache.get(&i).is_none());
                assert!(cache.remove(&i).is_none());
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert!(cache.is_empty());
    assert_eq!(cache.iter().count(), 0);
    assert_settled(&cache);
}
