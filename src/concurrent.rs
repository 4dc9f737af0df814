//! Concurrent Midpoint Cache
//!
//! A thread-safe counterpart to [`MidpointCache`](crate::MidpointCache).
//! Every operation takes `&self`, so one cache can be shared behind an `Arc`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        ConcurrentMidpointCache                           │
//! │                                                                          │
//! │   DashMap<K, NodeRef>            key → arena slot + allocation stamp     │
//! │          │                                                               │
//! │          ▼                                                               │
//! │   HEAD ◀─▶ [hot] ◀─▶ [hot] ◀─▶ [COLD] ◀─▶ [cold] ◀─▶ TAIL                │
//! │     └─ per-link spin flags; one boundary token for counts and temps ─┘   │
//! │                                                                          │
//! │   get(hit) ──▶ value returned now ──▶ Executor ──▶ refresh to head      │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! * The key index is a sharded [`DashMap`]. A lookup holds a shard read
//!   guard only while it pins the node and clones the value.
//! * The list keeps the same hot/cold rule as the serialized variant. Link
//!   updates lock only the pointers they touch, so a refresh near the head
//!   and an eviction at the tail run in parallel.
//! * A hit does not move the entry itself. The move to the head (and the
//!   promotion of a cold entry) is handed to an [`Executor`]; by default a
//!   [`RefreshPool`] of background threads. When its queue is full the
//!   caller runs the promotion and the metrics count a saturated refresh.
//!
//! # Consistency
//!
//! | Operation | Guarantee |
//! |-----------|-----------|
//! | `get` / `peek` / `contains` | linearizable against the key index |
//! | `put` | the key is readable once `put` returns; at most `cap` entries are ever live |
//! | `remove` | the entry is gone from the index on return; its node waits for in-flight promotions |
//! | recency order | promotions apply some time after the hit; the boundary settles once idle |
//! | `iter` | weakly consistent: never yields a freed entry, may miss concurrent changes |
//!
//! Call [`quiesce`](ConcurrentMidpointCache::quiesce) to wait for pending
//! promotions and settle the boundary, for instance before
//! [`check_invariants`](ConcurrentMidpointCache::check_invariants).
//!
//! # Example
//!
//! ```
//! use midpoint_cache::concurrent::ConcurrentMidpointCache;
//! use core::num::NonZeroUsize;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let cache = Arc::new(ConcurrentMidpointCache::new(NonZeroUsize::new(1000).unwrap()));
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let cache = Arc::clone(&cache);
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 let key = format!("key_{t}_{i}");
//!                 cache.put(key.clone(), i);
//!                 assert_eq!(cache.get(&key), Some(i));
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! cache.quiesce();
//! assert_eq!(cache.len(), 400);
//! cache.check_invariants().unwrap();
//! ```

mod executor;
mod list;
mod policy;
mod sync;

pub use self::executor::{Dispatch, Executor, InlineExecutor, RefreshPool, Task};
pub use self::list::WeakIter;

use self::list::NodeRef;
use self::policy::ConcurrentMidpointPolicy;
use crate::config::ConcurrentMidpointCacheConfig;
use crate::error::{ensure, ConfigError, InvariantError};
use crate::metrics::{CacheMetrics, MidpointCacheMetrics};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::num::NonZeroUsize;
use dashmap::DashMap;
use std::collections::hash_map::RandomState;
use tracing::{debug, trace};

/// Thread-safe midpoint cache.
///
/// Values are returned by clone. Keys and values must be `Send + Sync +
/// 'static` because promotions may run on the refresh pool's threads.
pub struct ConcurrentMidpointCache<K, V, S = RandomState> {
    map: DashMap<K, NodeRef, S>,
    policy: ConcurrentMidpointPolicy<K, V>,
}

impl<K, V, S> ConcurrentMidpointCache<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone,
{
    /// Creates a cache with an explicit hasher and promotion executor.
    pub fn with_hasher_and_executor(
        cap: NonZeroUsize,
        hash_builder: S,
        executor: Box<dyn Executor>,
    ) -> Self {
        debug!(capacity = cap.get(), "creating concurrent midpoint cache");
        ConcurrentMidpointCache {
            map: DashMap::with_capacity_and_hasher(cap.get(), hash_builder),
            policy: ConcurrentMidpointPolicy::new(cap, executor),
        }
    }

    /// Creates a cache from a configuration, starting its refresh pool.
    pub fn init(config: ConcurrentMidpointCacheConfig, hasher: Option<S>) -> Self
    where
        S: Default,
    {
        let pool = RefreshPool::new(config.refresh_workers(), config.refresh_queue());
        Self::with_hasher_and_executor(
            config.capacity(),
            hasher.unwrap_or_default(),
            Box::new(pool),
        )
    }

    /// Returns the maximum number of entries.
    #[inline]
    pub fn cap(&self) -> NonZeroUsize {
        self.policy.cap()
    }

    /// Returns the number of mapped keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no key is mapped.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries counted hot. Exact only after [`quiesce`](Self::quiesce).
    pub fn hot_len(&self) -> usize {
        self.policy.split().hot
    }

    /// Entries counted cold. Exact only after [`quiesce`](Self::quiesce).
    pub fn cold_len(&self) -> usize {
        self.policy.split().cold
    }

    /// Promotions handed to the executor and not yet applied.
    pub fn pending_refreshes(&self) -> usize {
        self.policy.pending()
    }

    /// Returns a clone of the value for `key` and schedules its move to the
    /// head of the list.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (value, guard) = {
            let Some(entry) = self.map.get(key) else {
                self.policy.record_miss();
                return None;
            };
            self.policy.get(*entry.value())?
        };
        self.policy.promote(guard);
        Some(value)
    }

    /// Returns a clone of the value for `key` without touching recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.map.get(key)?;
        self.policy.peek(*entry.value())
    }

    /// Returns `true` if `key` is cached. Does not touch recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Inserts a key, evicting the least recent entry if the cache is full.
    ///
    /// Returns the evicted entry, if any. If another `put` of the same key
    /// wins the race into the index, the older of the two entries is removed
    /// again, so the key ends up mapped exactly once.
    pub fn put(&self, key: K, value: V) -> Option<(K, V)> {
        let (node, evicted) = self.policy.put(&self.map, key.clone(), value);
        if let Some(displaced) = self.map.insert(key, node) {
            trace!(index = displaced.index(), "replacing duplicate entry");
            self.policy.remove(displaced);
        }
        evicted
    }

    /// Removes `key` and returns its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (_, node) = self.map.remove(key)?;
        self.policy.remove(node).map(|(_, value)| value)
    }

    /// Weakly consistent iteration from most to least recent.
    ///
    /// The iterator holds a link flag until it is exhausted or dropped. While
    /// it is alive, the thread that holds it must not call [`get`](Self::get),
    /// [`remove`](Self::remove) or a [`put`](Self::put) that may evict: each
    /// can unlink a node next to the held flag on the calling thread (a `get`
    /// does so whenever its promotion runs inline) and would wait on it
    /// forever. `peek`, `contains` and `len` are safe. Collect the entries or
    /// drop the iterator first.
    pub fn iter(&self) -> WeakIter<'_, K, V> {
        self.policy.iter()
    }

    /// Waits for pending promotions, then settles the boundary.
    ///
    /// Only guaranteed to return a settled list while no other thread is
    /// using the cache.
    pub fn quiesce(&self) {
        self.policy.quiesce();
    }

    /// Snapshot of the cache's metrics.
    pub fn metrics(&self) -> MidpointCacheMetrics {
        self.policy.metrics()
    }

    /// Checks the list and its agreement with the key index.
    ///
    /// Call only while the cache is idle and after [`quiesce`](Self::quiesce).
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.policy.check_invariants()?;
        let linked = self.policy.split().len();
        ensure!(
            self.map.len() == linked,
            "map holds {} keys but the list links {} entries",
            self.map.len(),
            linked
        );
        for entry in self.map.iter() {
            self.policy.check_mapping(entry.key(), *entry.value())?;
        }
        Ok(())
    }
}

impl<K, V> ConcurrentMidpointCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache of `cap` entries with the default refresh pool.
    ///
    /// ```
    /// use midpoint_cache::concurrent::ConcurrentMidpointCache;
    /// use core::num::NonZeroUsize;
    ///
    /// let cache = ConcurrentMidpointCache::new(NonZeroUsize::new(2).unwrap());
    /// cache.put("apple", 1);
    /// assert_eq!(cache.get(&"apple"), Some(1));
    /// ```
    pub fn new(cap: NonZeroUsize) -> Self {
        Self::from_config(ConcurrentMidpointCacheConfig::new(cap))
    }

    /// Creates a cache from a configuration with the default hasher.
    pub fn from_config(config: ConcurrentMidpointCacheConfig) -> Self {
        Self::init(config, None)
    }

    /// Creates a cache from a plain capacity, rejecting zero.
    pub fn try_new(cap: usize) -> Result<Self, ConfigError> {
        let cap = NonZeroUsize::new(cap).ok_or(ConfigError::ZeroCapacity)?;
        Ok(Self::new(cap))
    }

    /// Creates a cache that runs promotions on `executor`.
    ///
    /// With [`InlineExecutor`] every promotion completes before `get`
    /// returns, which makes single-threaded runs deterministic.
    ///
    /// ```
    /// use midpoint_cache::concurrent::{ConcurrentMidpointCache, InlineExecutor};
    /// use core::num::NonZeroUsize;
    ///
    /// let cache = ConcurrentMidpointCache::with_executor(
    ///     NonZeroUsize::new(4).unwrap(),
    ///     InlineExecutor,
    /// );
    /// for key in ["a", "b", "c", "d"] {
    ///     cache.put(key, ());
    /// }
    /// let order: Vec<_> = cache.iter().map(|(k, _)| k).collect();
    /// assert_eq!(order, ["a", "c", "d", "b"]);
    /// ```
    pub fn with_executor<E: Executor + 'static>(cap: NonZeroUsize, executor: E) -> Self {
        Self::with_hasher_and_executor(cap, RandomState::default(), Box::new(executor))
    }
}

impl<K, V, S> CacheMetrics for ConcurrentMidpointCache<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone,
{
    fn metrics(&self) -> BTreeMap<String, f64> {
        self.policy.metrics().to_btreemap()
    }

    fn algorithm_name(&self) -> &'static str {
        "ConcurrentMidpoint"
    }
}

impl<K, V, S> fmt::Debug for ConcurrentMidpointCache<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMidpointCache")
            .field("len", &self.map.len())
            .field("policy", &self.policy)
            .finish()
    }
}
