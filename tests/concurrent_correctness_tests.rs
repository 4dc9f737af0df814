//! Concurrent Cache Correctness Tests
//!
//! These tests validate that the concurrent midpoint cache keeps the same
//! eviction semantics as the serialized cache, and that its removal and
//! eviction paths respect promotions that are still in flight.
//!
//! ## Test Strategy
//!
//! - With [`InlineExecutor`] every promotion finishes inside `get`, so a
//!   single thread sees exactly the serialized layouts.
//! - A parking executor holds promotions back to open the windows where a
//!   removal or eviction races a pending refresh.
//! - Multi-threaded cases end with `quiesce` and `check_invariants`.

#![cfg(feature = "concurrent")]

mod common;

use common::{ops, Model, Op};
use midpoint_cache::concurrent::{
    ConcurrentMidpointCache, Dispatch, Executor, InlineExecutor, RefreshPool, Task,
};
use midpoint_cache::config::ConcurrentMidpointCacheConfig;
use midpoint_cache::{CacheMetrics, MidpointCache};
use proptest::prelude::*;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

// ============================================================================
// HELPERS
// ============================================================================

fn inline_cache<K, V>(cap: usize) -> ConcurrentMidpointCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    ConcurrentMidpointCache::with_executor(NonZeroUsize::new(cap).unwrap(), InlineExecutor)
}

fn order<V>(cache: &ConcurrentMidpointCache<&'static str, V>) -> Vec<&'static str>
where
    V: Clone + Send + Sync + 'static,
{
    cache.iter().map(|(k, _)| k).collect()
}

/// Holds promotions until the test releases them.
#[derive(Clone, Default)]
struct ParkingExecutor {
    parked: Arc<Mutex<Vec<Task>>>,
}

impl ParkingExecutor {
    fn release(&self) -> usize {
        let tasks: Vec<Task> = std::mem::take(&mut *self.parked.lock().unwrap());
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }
}

impl Executor for ParkingExecutor {
    fn execute(&self, task: Task) -> Dispatch {
        self.parked.lock().unwrap().push(task);
        Dispatch::Queued
    }
}

fn parked_cache(
    cap: usize,
) -> (
    Arc<ConcurrentMidpointCache<&'static str, i32>>,
    ParkingExecutor,
) {
    let executor = ParkingExecutor::default();
    let cache = ConcurrentMidpointCache::with_executor(
        NonZeroUsize::new(cap).unwrap(),
        executor.clone(),
    );
    (Arc::new(cache), executor)
}

/// Spins until `done` is set or a second has passed.
fn finishes_within_a_second(done: &AtomicBool) -> bool {
    for _ in 0..100 {
        if done.load(Ordering::SeqCst) {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

// ============================================================================
// SEGMENT 1: SERIALIZED EQUIVALENCE
// ============================================================================

#[test]
fn test_inline_layouts_match_serialized_cache() {
    let concurrent = inline_cache(4);
    let mut serialized = MidpointCache::new(NonZeroUsize::new(4).unwrap());

    let script: &[(&str, &'static str)] = &[
        ("put", "A"),
        ("put", "B"),
        ("put", "C"),
        ("put", "D"),
        ("get", "D"),
        ("put", "E"),
        ("get", "A"),
        ("remove", "C"),
        ("put", "F"),
        ("get", "B"),
        ("put", "G"),
    ];
    for &(op, key) in script {
        match op {
            "put" => {
                let a = concurrent.put(key, 0).map(|(k, _)| k);
                let b = serialized.put(key, 0).map(|(k, _)| k);
                assert_eq!(a, b, "evictions diverge at put {key}");
            }
            "get" => assert_eq!(concurrent.get(&key), serialized.get(&key).copied()),
            _ => assert_eq!(concurrent.remove(&key), serialized.remove(&key)),
        }
        let expected: Vec<&str> = serialized.iter().map(|(k, _)| *k).collect();
        assert_eq!(order(&concurrent), expected, "layouts diverge after {op} {key}");
        assert_eq!(concurrent.hot_len(), serialized.hot_len());
        concurrent.check_invariants().unwrap();
    }
}

#[test]
fn test_scan_resistance() {
    let cache = inline_cache(4);
    for key in ["A", "B", "C", "D"] {
        cache.put(key, 1);
    }
    cache.get(&"A");
    let evicted: Vec<_> = ["E", "F", "G"]
        .into_iter()
        .filter_map(|key| cache.put(key, 1))
        .map(|(k, _)| k)
        .collect();
    assert_eq!(evicted, ["B", "D", "E"]);
    assert_eq!(order(&cache), ["A", "C", "G", "F"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_inline_matches_reference_model(cap in 1usize..8, ops in ops(64)) {
        let cache: ConcurrentMidpointCache<u8, u8> = inline_cache(cap);
        let mut model = Model::new(cap);

        for op in ops {
            match op {
                Op::Get(key) => {
                    prop_assert_eq!(cache.get(&key).is_some(), model.get(key));
                }
                Op::Put(key) => {
                    if model.contains(key) {
                        prop_assert!(cache.get(&key).is_some());
                        model.get(key);
                    } else {
                        let evicted = cache.put(key, key).map(|(k, _)| k);
                        prop_assert_eq!(evicted, model.put(key));
                    }
                }
                Op::Remove(key) => {
                    prop_assert_eq!(cache.remove(&key).is_some(), model.remove(key));
                }
            }
            let order: Vec<u8> = cache.iter().map(|(k, _)| k).collect();
            prop_assert_eq!(&order[..], model.order());
            prop_assert_eq!(cache.hot_len(), model.hot_len());
            prop_assert!(cache.check_invariants().is_ok());
        }
    }
}

// ============================================================================
// SEGMENT 2: PENDING PROMOTIONS
// ============================================================================

#[test]
fn test_promotion_is_deferred_until_executed() {
    let (cache, executor) = parked_cache(4);
    for key in ["A", "B", "C", "D"] {
        cache.put(key, 0);
    }
    assert_eq!(cache.get(&"B"), Some(0));
    assert_eq!(cache.pending_refreshes(), 1);
    assert_eq!(order(&cache), ["A", "C", "D", "B"]);

    assert_eq!(executor.release(), 1);
    assert_eq!(cache.pending_refreshes(), 0);
    cache.quiesce();
    assert_eq!(order(&cache), ["B", "A", "C", "D"]);
    assert_eq!(cache.metrics().promotions, 1);
    cache.check_invariants().unwrap();
}

#[test]
fn test_remove_waits_for_pending_promotion() {
    let (cache, executor) = parked_cache(4);
    for key in ["A", "B", "C"] {
        cache.put(key, 0);
    }
    cache.get(&"B");

    let done = Arc::new(AtomicBool::new(false));
    let remover = {
        let cache = Arc::clone(&cache);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let removed = cache.remove(&"B");
            done.store(true, Ordering::SeqCst);
            removed
        })
    };

    // The key leaves the index at once; the node waits for the refresh.
    while cache.contains(&"B") {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst), "remove ran ahead of the refresh");

    executor.release();
    assert!(finishes_within_a_second(&done));
    assert_eq!(remover.join().unwrap(), Some(0));

    cache.quiesce();
    assert_eq!(order(&cache), ["A", "C"]);
    cache.check_invariants().unwrap();
}

#[test]
fn test_eviction_waits_for_pending_promotion() {
    let (cache, executor) = parked_cache(2);
    cache.put("A", 1);
    cache.put("B", 2);
    // B is the tail; hitting it pins it.
    assert_eq!(cache.get(&"B"), Some(2));

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let cache = Arc::clone(&cache);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let evicted = cache.put("C", 3);
            done.store(true, Ordering::SeqCst);
            evicted
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst), "evicted a pinned node");

    executor.release();
    assert!(finishes_within_a_second(&done));
    assert_eq!(writer.join().unwrap(), Some(("B", 2)));

    cache.quiesce();
    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&"A"));
    assert!(cache.contains(&"C"));
    cache.check_invariants().unwrap();
}

#[test]
fn test_saturated_pool_runs_promotions_on_caller() {
    let pool = RefreshPool::new(1, 1);
    let gate = Arc::new(Barrier::new(2));
    let worker_gate = Arc::clone(&gate);
    // Park the only worker so the queue fills.
    pool.execute(Box::new(move || {
        worker_gate.wait();
    }));

    let cache: ConcurrentMidpointCache<u32, u32> =
        ConcurrentMidpointCache::with_executor(NonZeroUsize::new(8).unwrap(), pool);
    for key in 0..8 {
        cache.put(key, key);
    }
    for key in 0..8 {
        assert_eq!(cache.get(&key), Some(key));
    }
    assert!(cache.metrics().saturated_refreshes >= 1);

    gate.wait();
    cache.quiesce();
    assert_eq!(cache.metrics().core.cache_hits, 8);
    cache.check_invariants().unwrap();
}

// ============================================================================
// SEGMENT 3: THREAD SAFETY INVARIANTS
// ============================================================================

#[test]
fn test_capacity_never_exceeded() {
    let config = ConcurrentMidpointCacheConfig::new(NonZeroUsize::new(32).unwrap())
        .with_refresh_workers(2)
        .with_refresh_queue(64);
    let cache: Arc<ConcurrentMidpointCache<usize, usize>> =
        Arc::new(ConcurrentMidpointCache::from_config(config));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..2_000 {
                    let key = t * 10_000 + i;
                    cache.put(key, key);
                    if i % 3 == 0 {
                        cache.get(&(key - i / 2));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    cache.quiesce();
    assert_eq!(cache.len(), 32);
    let metrics = cache.metrics();
    assert_eq!(metrics.core.insertions - metrics.core.evictions, 32);
    cache.check_invariants().unwrap();
}

#[test]
fn test_racing_puts_of_one_key_leave_one_entry() {
    let cache: Arc<ConcurrentMidpointCache<u32, u32>> = Arc::new(
        ConcurrentMidpointCache::new(NonZeroUsize::new(16).unwrap()),
    );
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..500 {
                    cache.put(7, t);
                    cache.remove(&7);
                    cache.put(7, t);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&7).is_some());
    cache.quiesce();
    cache.check_invariants().unwrap();
}

#[test]
fn test_weak_iterator_under_writes() {
    let cache: Arc<ConcurrentMidpointCache<u64, u64>> = Arc::new(
        ConcurrentMidpointCache::new(NonZeroUsize::new(64).unwrap()),
    );
    for key in 0..64 {
        cache.put(key, key * 2);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let writers: Vec<_> = (0..3u64)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut key = 1_000_000 + t;
                while !stop.load(Ordering::Relaxed) {
                    cache.put(key, key * 2);
                    cache.get(&(key / 2));
                    key += 3;
                }
            })
        })
        .collect();

    for _ in 0..200 {
        for (key, value) in cache.iter() {
            assert_eq!(value, key * 2);
        }
    }
    stop.store(true, Ordering::Relaxed);
    for writer in writers {
        writer.join().unwrap();
    }

    cache.quiesce();
    assert_eq!(cache.iter().count(), cache.len());
    cache.check_invariants().unwrap();
}

#[test]
fn test_dropped_iterator_releases_its_flag() {
    let cache = Arc::new(inline_cache::<&'static str, i32>(4));
    for (i, key) in ["A", "B", "C", "D"].into_iter().enumerate() {
        cache.put(key, i as i32);
    }
    assert_eq!(order(&cache), ["A", "C", "D", "B"]);

    let done = Arc::new(AtomicBool::new(false));
    let worker = {
        let cache = Arc::clone(&cache);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut iter = cache.iter();
            assert_eq!(iter.next(), Some(("A", 0)));
            assert_eq!(iter.next(), Some(("C", 2)));
            // Reads that stay off the list are fine while the flag is held.
            assert_eq!(cache.peek(&"D"), Some(3));
            assert!(cache.contains(&"B"));
            drop(iter);

            // D sits right after the node whose flag the iterator held, and
            // its promotion runs on this thread.
            assert_eq!(cache.get(&"D"), Some(3));
            assert_eq!(cache.remove(&"C"), Some(2));
            cache.put("E", 4);
            cache.put("F", 5);
            done.store(true, Ordering::SeqCst);
        })
    };

    assert!(finishes_within_a_second(&done), "iterator flag was not released");
    worker.join().unwrap();
    assert_eq!(cache.len(), 4);
    assert!(!cache.contains(&"B"));
    cache.check_invariants().unwrap();
}

#[test]
fn test_metrics_trait_object() {
    let cache: ConcurrentMidpointCache<u8, u8> = inline_cache(4);
    cache.put(1, 1);
    cache.get(&1);
    let reporter: &dyn CacheMetrics = &cache;
    assert_eq!(reporter.algorithm_name(), "ConcurrentMidpoint");
    assert_eq!(reporter.metrics().get("cache_hits"), Some(&1.0));
}
