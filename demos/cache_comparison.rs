//! Midpoint vs. plain LRU
//!
//! Runs the same small scripts against a `MidpointCache` and an `lru::LruCache`
//! of equal capacity and prints what each one keeps.
//!
//! Run with: cargo run --example cache_comparison

extern crate midpoint_cache;

use lru::LruCache;
use midpoint_cache::config::MidpointCacheConfig;
use midpoint_cache::{MidpointCache, Temperature};
use core::num::NonZeroUsize;

fn main() {
    println!("Cache Implementation Comparison");
    println!("===============================");
    println!("Both caches have capacity of 4 items.\n");

    let cap = NonZeroUsize::new(4).unwrap();
    let mut midpoint: MidpointCache<&str, i32> =
        MidpointCache::init(MidpointCacheConfig::new(cap), None);
    let mut lru = LruCache::new(cap);

    println!("Adding apple, banana, cherry, date...");
    for (i, key) in ["apple", "banana", "cherry", "date"].into_iter().enumerate() {
        midpoint.put(key, i as i32);
        lru.put(key, i as i32);
    }
    print_state(&midpoint, &lru);

    println!("\nReading apple three times...");
    for _ in 0..3 {
        midpoint.get(&"apple");
        lru.get(&"apple");
    }
    print_state(&midpoint, &lru);

    println!("\nAdding elderberry to a full cache...");
    let evicted = midpoint.put("elderberry", 4);
    let lru_evicted = lru.push("elderberry", 4);
    println!("  Midpoint evicted: {:?}", evicted.map(|(k, _)| k));
    println!("  LRU evicted:      {:?}", lru_evicted.map(|(k, _)| k));
    print_state(&midpoint, &lru);

    println!("\nScan: one pass over 100 keys nobody reads again");
    let popular = ["apple", "cherry"];
    let scan: Vec<String> = (0..100).map(|i| format!("scan{i}")).collect();

    let mut midpoint: MidpointCache<String, i32> =
        MidpointCache::init(MidpointCacheConfig::new(cap), None);
    let mut lru = LruCache::new(cap);
    for key in popular {
        midpoint.put(key.to_string(), 0);
        lru.put(key.to_string(), 0);
    }

    let (mut midpoint_hits, mut lru_hits) = (0, 0);
    for key in &scan {
        for key in popular {
            if midpoint.get(key).is_some() {
                midpoint_hits += 1;
            } else {
                midpoint.put(key.to_string(), 0);
            }
            if lru.get(key).is_some() {
                lru_hits += 1;
            } else {
                lru.put(key.to_string(), 0);
            }
        }
        midpoint.put(key.clone(), 0);
        lru.put(key.clone(), 0);
    }

    let total = scan.len() * popular.len();
    println!("  Popular-key hits, Midpoint: {midpoint_hits}/{total}");
    println!("  Popular-key hits, LRU:      {lru_hits}/{total}");
}

fn print_state(midpoint: &MidpointCache<&str, i32>, lru: &LruCache<&str, i32>) {
    let layout: Vec<String> = midpoint
        .iter()
        .map(|(key, _)| match midpoint.temperature(key) {
            Some(Temperature::Hot) => key.to_uppercase(),
            _ => key.to_string(),
        })
        .collect();
    let lru_order: Vec<&str> = lru.iter().map(|(key, _)| *key).collect();
    println!("  Midpoint (HOT in caps): {layout:?}");
    println!("  LRU (most recent first): {lru_order:?}");
}
