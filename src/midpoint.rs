//! Midpoint Cache Implementation
//!
//! A bounded recency cache whose list is split into a **hot** prefix and a
//! **cold** suffix by a movable boundary node (the *midpoint*). New entries
//! are admitted at the midpoint rather than the head, so a stream of one-time
//! keys churns the cold half and never reaches the entries that are actually
//! being read.
//!
//! # How the Algorithm Works
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              MidpointCache                                   │
//! │                                                                              │
//! │   get(hit) ──────────────┐                                                   │
//! │                          ▼                                                   │
//! │   HEAD ◀──▶ [hot] ◀──▶ [hot] ◀──▶ [COLD] ◀──▶ [cold] ◀──▶ [cold] ◀──▶ TAIL   │
//! │             └──── hot half ──┘      ▲   └──── cold half ────┘        │      │
//! │                                     │                                 │      │
//! │                         put(new) ───┘ (admitted before       evict ◀──┘      │
//! │                                        the boundary)                         │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The halves are kept within one entry of each other (`hot - cold` is `0` or
//! `1`). Every operation moves the boundary by at most one node:
//!
//! | Operation | Action | Boundary |
//! |-----------|--------|----------|
//! | `get` on a hot entry | move to head | unchanged |
//! | `get` on a cold entry | move to head, turn hot | one step toward the head |
//! | `put` | evict tail if full, insert before boundary as hot | one step toward the head if the hot half grew too long |
//! | `remove` | unlink | one step in whichever direction rebalances |
//!
//! ## Scan Resistance Example
//!
//! ```text
//! put A, B, C, D   →  [A, C | D, B]
//! get A            →  [A, C | D, B]      (A already hot)
//! put E            →  [A, C | E, D]      (B evicted)
//! put F            →  [A, C | F, E]      (D evicted)
//! put G            →  [A, C | G, F]      (E evicted)
//! ```
//!
//! A and C stay hot while the stream of new keys only ever replaces the cold
//! half.
//!
//! # Performance Characteristics
//!
//! | Metric | Value |
//! |--------|-------|
//! | Get | O(1) |
//! | Put | O(1) |
//! | Remove | O(1) |
//! | Memory per entry | two indices, one temperature tag, key ×2, value, map bucket |
//!
//! # Thread Safety
//!
//! `MidpointCache` is **not thread-safe**; every mutating call takes
//! `&mut self`. For shared use, either wrap it in a `Mutex` or use
//! [`ConcurrentMidpointCache`](crate::concurrent::ConcurrentMidpointCache)
//! (requires the `concurrent` feature).
//!
//! # Examples
//!
//! ```
//! use midpoint_cache::MidpointCache;
//! use core::num::NonZeroUsize;
//!
//! let mut cache = MidpointCache::new(NonZeroUsize::new(4).unwrap());
//! for key in ["a", "b", "c", "d"] {
//!     cache.put(key, key.len());
//! }
//! cache.get(&"a");
//!
//! // A full cache evicts its least recent cold entry, never "a".
//! let evicted = cache.put("e", 1).unwrap();
//! assert_ne!(evicted.0, "a");
//! assert_eq!(cache.get(&"a"), Some(&1));
//! assert_eq!(cache.len(), 4);
//! ```

extern crate alloc;

use crate::config::MidpointCacheConfig;
use crate::error::{ensure, ConfigError, InvariantError};
use crate::list::{self, MidpointList};
use crate::meta::{Split, Temperature};
use crate::metrics::{CacheMetrics, MidpointCacheMetrics};
use alloc::collections::BTreeMap;
use alloc::string::String;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;
use core::num::NonZeroUsize;

pub use crate::list::NodeId;

#[cfg(feature = "hashbrown")]
use hashbrown::DefaultHashBuilder;
#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

#[cfg(not(feature = "hashbrown"))]
use std::collections::hash_map::RandomState as DefaultHashBuilder;
#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

/// The serialized eviction policy.
///
/// Owns the recency list and the metrics but not the key index; the façade
/// passes its map into [`put`](Self::put) so the policy can drop the evicted
/// key from it.
pub struct MidpointPolicy<K, V> {
    list: MidpointList<(K, V)>,
    metrics: MidpointCacheMetrics,
}

impl<K, V> MidpointPolicy<K, V> {
    /// Creates an empty policy for `cap` entries.
    pub fn new(cap: NonZeroUsize) -> Self {
        MidpointPolicy {
            list: MidpointList::new(cap),
            metrics: MidpointCacheMetrics::new(cap.get() as u64),
        }
    }

    /// Maximum number of entries.
    #[inline]
    pub fn cap(&self) -> NonZeroUsize {
        self.list.cap()
    }

    /// Number of linked entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns `true` when no entry is linked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Current hot/cold counts.
    #[inline]
    pub fn split(&self) -> Split {
        self.list.split()
    }

    /// Moves `id` to the head and returns its value.
    pub fn get(&mut self, id: NodeId) -> Option<&V> {
        let was = self.list.refresh(id)?;
        self.metrics.record_hit(was);
        self.list.get(id).map(|(_, v)| v)
    }

    /// Returns the value at `id` without touching recency or metrics.
    pub fn peek(&self, id: NodeId) -> Option<&V> {
        self.list.get(id).map(|(_, v)| v)
    }

    /// Temperature of the entry at `id`.
    pub fn temperature(&self, id: NodeId) -> Option<Temperature> {
        self.list.temperature(id)
    }

    /// Counts a lookup that found nothing.
    #[inline]
    pub fn record_miss(&mut self) {
        self.metrics.core.record_miss();
    }

    /// Admits `key` before the boundary, evicting the tail first when full.
    ///
    /// The evicted key is removed from `map`. Returns the new node and the
    /// evicted pair, if any.
    pub fn put<S: BuildHasher>(
        &mut self,
        map: &mut HashMap<K, NodeId, S>,
        key: K,
        value: V,
    ) -> (NodeId, Option<(K, V)>)
    where
        K: Hash + Eq,
    {
        let mut evicted = None;
        let mut entry = (key, value);
        let id = loop {
            match self.list.insert(entry) {
                Ok(id) => break id,
                Err(rejected) => {
                    entry = rejected;
                    evicted = self.evict_tail(map);
                }
            }
        };
        self.metrics.core.record_insertion();
        (id, evicted)
    }

    fn evict_tail<S: BuildHasher>(&mut self, map: &mut HashMap<K, NodeId, S>) -> Option<(K, V)>
    where
        K: Hash + Eq,
    {
        let (key, value) = self.list.pop_tail()?;
        map.remove(&key);
        self.metrics.core.record_eviction();
        tracing::trace!(len = self.list.len(), "evicted tail entry");
        Some((key, value))
    }

    /// Unlinks the entry at `id`.
    pub fn remove(&mut self, id: NodeId) -> Option<(K, V)> {
        let entry = self.list.remove(id)?;
        self.metrics.core.record_removal();
        Some(entry)
    }

    /// Drops every entry. Metrics are kept.
    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// Iterates entries from most to least recent.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.list.iter(),
        }
    }

    /// Snapshot of the metrics, including the current split.
    pub fn metrics(&self) -> MidpointCacheMetrics {
        let mut metrics = self.metrics.clone();
        metrics.update_split(self.list.split(), self.list.boundary_shifts());
        metrics
    }

    /// Checks the recency list.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.list.check_invariants()
    }
}

impl<K, V> fmt::Debug for MidpointPolicy<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidpointPolicy")
            .field("cap", &self.list.cap())
            .field("split", &self.list.split())
            .field("boundary_shifts", &self.list.boundary_shifts())
            .finish()
    }
}

/// A serialized midpoint cache.
///
/// Keys index into the policy's arena through a hash map; see the
/// [module documentation](self) for the algorithm.
pub struct MidpointCache<K, V, S = DefaultHashBuilder> {
    map: HashMap<K, NodeId, S>,
    policy: MidpointPolicy<K, V>,
}

impl<K: Hash + Eq, V, S: BuildHasher> MidpointCache<K, V, S> {
    /// Creates an empty cache that uses `hash_builder` for its key index.
    pub fn with_hasher(cap: NonZeroUsize, hash_builder: S) -> Self {
        tracing::debug!(capacity = cap.get(), "creating midpoint cache");
        MidpointCache {
            map: HashMap::with_capacity_and_hasher(cap.get(), hash_builder),
            policy: MidpointPolicy::new(cap),
        }
    }

    /// Creates a cache from a configuration and an optional hasher.
    ///
    /// ```
    /// use midpoint_cache::config::MidpointCacheConfig;
    /// use midpoint_cache::MidpointCache;
    /// use core::num::NonZeroUsize;
    ///
    /// let config = MidpointCacheConfig::new(NonZeroUsize::new(100).unwrap());
    /// let mut cache: MidpointCache<&str, i32> = MidpointCache::init(config, None);
    /// cache.put("key", 42);
    /// assert_eq!(cache.get(&"key"), Some(&42));
    /// ```
    pub fn init(config: MidpointCacheConfig, hasher: Option<S>) -> Self
    where
        S: Default,
    {
        Self::with_hasher(config.capacity(), hasher.unwrap_or_default())
    }

    /// Maximum number of entries.
    #[inline]
    pub fn cap(&self) -> NonZeroUsize {
        self.policy.cap()
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of entries before the boundary.
    #[inline]
    pub fn hot_len(&self) -> usize {
        self.policy.split().hot
    }

    /// Number of entries from the boundary to the tail.
    #[inline]
    pub fn cold_len(&self) -> usize {
        self.policy.split().cold
    }

    /// Returns the value for `key` and moves it to the head.
    ///
    /// A cold entry turns hot and pulls the boundary one step toward the head.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.map.get(key).copied() {
            Some(id) => self.policy.get(id),
            None => {
                self.policy.record_miss();
                None
            }
        }
    }

    /// Returns the value for `key` without updating recency or metrics.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let id = *self.map.get(key)?;
        self.policy.peek(id)
    }

    /// Returns `true` if `key` is cached. Does not update recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.contains_key(key)
    }

    /// Which half of the list `key` currently sits in.
    pub fn temperature<Q>(&self, key: &Q) -> Option<Temperature>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let id = *self.map.get(key)?;
        self.policy.temperature(id)
    }

    /// Removes `key`, returning its value. Absent keys are a no-op.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let id = self.map.remove(key)?;
        self.policy.remove(id).map(|(_, v)| v)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.map.clear();
        self.policy.clear();
    }

    /// Iterates `(key, value)` pairs from most to least recent.
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.policy.iter()
    }

    /// Snapshot of the cache's metrics.
    pub fn metrics(&self) -> MidpointCacheMetrics {
        self.policy.metrics()
    }

    /// Checks the recency list and its agreement with the key index.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.policy.check_invariants()?;
        ensure!(
            self.map.len() == self.policy.len(),
            "map holds {} keys but the list links {} entries",
            self.map.len(),
            self.policy.len()
        );
        for (key, id) in &self.map {
            let linked = self.policy.list.get(*id);
            ensure!(
                linked.is_some_and(|(k, _)| k == key),
                "map entry points at slot {} which holds another key",
                id.index()
            );
        }
        Ok(())
    }
}

impl<K: Hash + Eq + Clone, V, S: BuildHasher> MidpointCache<K, V, S> {
    /// Inserts a key that is not currently cached.
    ///
    /// If the cache is full the least recent entry is evicted first and
    /// returned. The new entry is admitted just before the boundary, so it
    /// must be read again before it outranks entries already in the hot half.
    ///
    /// Putting a key that is already cached is a caller bug; it is caught by
    /// a debug assertion. Release builds drop the old entry first.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        debug_assert!(
            !self.map.contains_key(&key),
            "put called with a key that is already cached"
        );
        if let Some(stale) = self.map.remove(&key) {
            self.policy.remove(stale);
        }
        let (id, evicted) = self.policy.put(&mut self.map, key.clone(), value);
        self.map.insert(key, id);
        evicted
    }
}

impl<K: Hash + Eq, V> MidpointCache<K, V> {
    /// Creates a new midpoint cache holding at most `cap` entries.
    ///
    /// ```
    /// use midpoint_cache::MidpointCache;
    /// use core::num::NonZeroUsize;
    ///
    /// let mut cache = MidpointCache::new(NonZeroUsize::new(2).unwrap());
    /// cache.put("apple", 1);
    /// assert_eq!(cache.get(&"apple"), Some(&1));
    /// ```
    pub fn new(cap: NonZeroUsize) -> MidpointCache<K, V, DefaultHashBuilder> {
        MidpointCache::with_hasher(cap, DefaultHashBuilder::default())
    }

    /// Creates a cache from a configuration with the default hasher.
    pub fn from_config(config: MidpointCacheConfig) -> MidpointCache<K, V, DefaultHashBuilder> {
        MidpointCache::new(config.capacity())
    }

    /// Creates a cache from a plain capacity, rejecting zero.
    pub fn try_new(cap: usize) -> Result<MidpointCache<K, V, DefaultHashBuilder>, ConfigError> {
        MidpointCacheConfig::try_new(cap).map(Self::from_config)
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> CacheMetrics for MidpointCache<K, V, S> {
    fn metrics(&self) -> BTreeMap<String, f64> {
        self.policy.metrics().to_btreemap()
    }

    fn algorithm_name(&self) -> &'static str {
        "Midpoint"
    }
}

impl<K, V, S> fmt::Debug for MidpointCache<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidpointCache")
            .field("len", &self.map.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Iterator over a midpoint cache, most recent entry first.
pub struct Iter<'a, K, V> {
    inner: list::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|((k, v), _)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.inner.len())
            .finish()
    }
}

impl<'a, K: Hash + Eq, V, S: BuildHasher> IntoIterator for &'a MidpointCache<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
