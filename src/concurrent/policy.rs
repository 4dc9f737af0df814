//! Shared state and operations of the concurrent midpoint cache.
//!
//! The façade owns the key map; this module owns everything else: the
//! concurrent list, the counters, the count of promotions not yet run and
//! the executor that runs them.

use super::executor::{Dispatch, Executor};
use super::list::{ConcurrentList, NodeRef, Unlink, WeakIter};
use super::sync::backoff;
use crate::error::{ensure, InvariantError};
use crate::metrics::{AtomicMidpointMetrics, MidpointCacheMetrics};
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicUsize, Ordering};
use dashmap::DashMap;
use tracing::trace;

struct Shared<K, V> {
    list: ConcurrentList<K, V>,
    metrics: AtomicMidpointMetrics,
    pending: AtomicUsize,
}

/// Keeps a node from being unlinked for removal until dropped.
///
/// Taken by a hit while the map still maps the key, and carried into the
/// promotion task.
pub(crate) struct PromotionGuard<K, V> {
    shared: Arc<Shared<K, V>>,
    index: usize,
}

impl<K, V> Drop for PromotionGuard<K, V> {
    fn drop(&mut self) {
        self.shared.list.unpin(self.index);
    }
}

pub(crate) struct ConcurrentMidpointPolicy<K, V> {
    shared: Arc<Shared<K, V>>,
    executor: Box<dyn Executor>,
}

impl<K, V> ConcurrentMidpointPolicy<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(cap: NonZeroUsize, executor: Box<dyn Executor>) -> Self {
        ConcurrentMidpointPolicy {
            shared: Arc::new(Shared {
                list: ConcurrentList::new(cap),
                metrics: AtomicMidpointMetrics::new(),
                pending: AtomicUsize::new(0),
            }),
            executor,
        }
    }

    #[inline]
    pub(crate) fn cap(&self) -> NonZeroUsize {
        self.shared.list.cap()
    }

    pub(crate) fn split(&self) -> crate::meta::Split {
        self.shared.list.split()
    }

    /// Reads the value of a mapped node and pins it for promotion.
    ///
    /// Call while holding the map guard that maps `node`.
    pub(crate) fn get(&self, node: NodeRef) -> Option<(V, PromotionGuard<K, V>)> {
        let list = &self.shared.list;
        list.pin(node.index());
        let guard = PromotionGuard {
            shared: Arc::clone(&self.shared),
            index: node.index(),
        };
        // SAFETY: the caller's map guard keeps the node mapped, and a mapped
        // node is never freed.
        let value = unsafe { list.value(node.index()) }.cloned()?;
        self.shared
            .metrics
            .record_hit(list.temperature(node.index()));
        Some((value, guard))
    }

    /// Hands the promotion of a pinned node to the executor.
    ///
    /// Call after releasing the map guard: a caller-run promotion may wait on
    /// an evictor that is waiting on the map.
    pub(crate) fn promote(&self, guard: PromotionGuard<K, V>) {
        let shared = Arc::clone(&self.shared);
        shared.pending.fetch_add(1, Ordering::AcqRel);
        let dispatch = self.executor.execute(Box::new(move || {
            let index = guard.index;
            if guard.shared.list.refresh(index) {
                guard.shared.metrics.record_promotion();
            }
            drop(guard);
            shared.pending.fetch_sub(1, Ordering::AcqRel);
        }));
        if dispatch == Dispatch::Saturated {
            self.shared.metrics.record_saturation();
        }
    }

    /// Clones the value of a mapped node without touching recency.
    pub(crate) fn peek(&self, node: NodeRef) -> Option<V> {
        // SAFETY: as for `get`.
        unsafe { self.shared.list.value(node.index()) }.cloned()
    }

    pub(crate) fn record_miss(&self) {
        self.shared.metrics.record_miss();
    }

    /// Links a new entry, evicting the least recent one while the list is
    /// full. The caller maps `key` to the returned node afterwards.
    pub(crate) fn put<S>(
        &self,
        map: &DashMap<K, NodeRef, S>,
        key: K,
        value: V,
    ) -> (NodeRef, Option<(K, V)>)
    where
        S: BuildHasher + Clone,
    {
        let list = &self.shared.list;
        let evicted = loop {
            if list.try_reserve() {
                break None;
            }
            // A successful eviction hands its reservation to this insert.
            if let Some(evicted) = self.evict_one(map) {
                break Some(evicted);
            }
            backoff();
        };
        let node = list.alloc(key, value);
        list.insert(node.index());
        self.shared.metrics.record_insertion();
        (node, evicted)
    }

    /// Evicts the last node if it is still mapped. Keeps its reservation.
    fn evict_one<S>(&self, map: &DashMap<K, NodeRef, S>) -> Option<(K, V)>
    where
        S: BuildHasher + Clone,
    {
        let list = &self.shared.list;
        let tail = list.lock_tail();
        let victim = list.last(&tail)?;
        // SAFETY: the victim cannot be unlinked while the tail flag is held.
        let key = unsafe { list.key(victim.index()) }?;
        // The map may already point the key at a newer node, or not at all.
        map.remove_if(key, |_, mapped| *mapped == victim)?;

        if list.is_pinned(victim.index()) {
            // A promotion of the victim may be waiting on the tail flag.
            drop(tail);
            list.wait_unpinned(victim.index());
            list.unlink(victim.index(), Unlink::Remove, None);
        } else {
            list.unlink(victim.index(), Unlink::Remove, Some(tail));
        }
        list.rebalance();
        let evicted = list.free(victim.index());
        self.shared.metrics.record_eviction();
        trace!(index = victim.index(), "evicted");
        evicted
    }

    /// Unlinks a node the caller has already unmapped.
    pub(crate) fn remove(&self, node: NodeRef) -> Option<(K, V)> {
        let list = &self.shared.list;
        list.wait_unpinned(node.index());
        list.unlink(node.index(), Unlink::Remove, None);
        list.rebalance();
        let entry = list.free(node.index());
        list.release_reservation();
        self.shared.metrics.record_removal();
        entry
    }

    pub(crate) fn iter(&self) -> WeakIter<'_, K, V> {
        self.shared.list.iter()
    }

    /// Promotions handed out but not yet finished.
    pub(crate) fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Waits for every promotion to finish, then settles the boundary.
    pub(crate) fn quiesce(&self) {
        while self.pending() != 0 {
            backoff();
        }
        self.shared.list.settle();
    }

    pub(crate) fn metrics(&self) -> MidpointCacheMetrics {
        let list = &self.shared.list;
        self.shared.metrics.snapshot(
            list.cap().get() as u64,
            list.split(),
            list.boundary_shifts(),
        )
    }

    /// Checks that `node` is the live allocation holding `key`.
    pub(crate) fn check_mapping(&self, key: &K, node: NodeRef) -> Result<(), InvariantError> {
        let list = &self.shared.list;
        ensure!(
            list.node_ref(node.index()) == node,
            "map holds stale node {:?}",
            node
        );
        // SAFETY: only called while the cache is idle.
        let stored = unsafe { list.key(node.index()) };
        ensure!(
            stored == Some(key),
            "slot {} holds a different key",
            node.index()
        );
        Ok(())
    }

    pub(crate) fn check_invariants(&self) -> Result<(), InvariantError> {
        ensure!(
            self.pending() == 0,
            "{} promotions still pending",
            self.pending()
        );
        self.shared.list.check_invariants()
    }
}

impl<K, V> fmt::Debug for ConcurrentMidpointPolicy<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMidpointPolicy")
            .field("list", &self.shared.list)
            .field("pending", &self.shared.pending.load(Ordering::Relaxed))
            .finish()
    }
}
