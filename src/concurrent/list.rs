//! Concurrent midpoint recency list.
//!
//! The same hot/cold list as [`MidpointList`](crate::list::MidpointList), but
//! every operation takes `&self`. Nodes live in a fixed arena of
//! `capacity + 2` slots; slot `0` is the head sentinel and slot `1` the tail
//! sentinel.
//!
//! # Locking Protocol
//!
//! ```text
//!        pred                 node                 succ
//!   ┌────────────┐       ┌────────────┐       ┌────────────┐
//!   │  next_lock ②│──────▶│ prev_lock ①│       │ prev_lock ④│
//!   │            │       │ next_lock ③│──────▶│            │
//!   └────────────┘◀──────└────────────┘◀──────└────────────┘
//! ```
//!
//! * Each slot's `prev` link is written only under its `prev_lock`, and its
//!   `next` link only under its `next_lock`.
//! * Unlinking takes ① the node's `prev_lock`, ② the predecessor's
//!   `next_lock`, ③ the node's `next_lock`, ④ the successor's `prev_lock`.
//! * One **boundary token** serializes every decision that reads or moves
//!   the boundary, flips a temperature, or changes the hot/cold counters. The
//!   token is taken first and released before the links are spliced.
//! * Every pointer flag is taken with `try_lock`. A failure releases
//!   everything held, the token included, yields and starts over, so a token
//!   holder never waits on a pointer flag.
//! * The evictor holds the tail's `prev_lock` while it claims the victim and
//!   hands it into the victim's unlink as a [`TailGuard`] in place of ④.
//!
//! A node being relinked at the head is detached for a moment: its links are
//! `NIL` and it is still counted as hot. Anything that finds a `NIL`
//! predecessor backs off and retries.
//!
//! # Slot Lifetime
//!
//! A slot is taken from the free queue by `alloc`, linked by `insert`,
//! unlinked by `unlink` and handed back by `free`. Its key and value may be
//! read only while something keeps it from being freed: the backing map still
//! mapping it (under the map's guard), an in-flight promotion, or a held flag
//! on one of its neighbours' links.

use super::sync::{backoff, SpinFlag, TailGuard};
use crate::error::{ensure, InvariantError};
use crate::meta::{Shift, Split, Temperature};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::fmt;
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use crossbeam_channel::{Receiver, Sender};

pub(crate) const HEAD: usize = 0;
pub(crate) const TAIL: usize = 1;
const NIL: usize = usize::MAX;

/// A slot index paired with the allocation it belongs to.
///
/// Two `NodeRef`s compare equal only if they name the same allocation of the
/// same slot, so a stale handle never matches a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    index: usize,
    stamp: u64,
}

impl NodeRef {
    /// Arena slot of this node.
    #[inline]
    pub fn index(self) -> usize {
        self.index
    }

    /// Allocation generation of this node.
    #[inline]
    pub fn stamp(self) -> u64 {
        self.stamp
    }
}

/// Why a node is being unlinked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unlink {
    /// The node leaves the list for good.
    Remove,
    /// The node will be relinked at the head as hot.
    Refresh,
}

struct Slot<K, V> {
    prev: AtomicUsize,
    next: AtomicUsize,
    prev_lock: SpinFlag,
    next_lock: SpinFlag,
    hot: AtomicBool,
    inflight: AtomicUsize,
    stamp: AtomicU64,
    entry: UnsafeCell<Option<(K, V)>>,
}

impl<K, V> Slot<K, V> {
    fn new(prev: usize, next: usize) -> Self {
        Slot {
            prev: AtomicUsize::new(prev),
            next: AtomicUsize::new(next),
            prev_lock: SpinFlag::new(),
            next_lock: SpinFlag::new(),
            hot: AtomicBool::new(false),
            inflight: AtomicUsize::new(0),
            stamp: AtomicU64::new(0),
            entry: UnsafeCell::new(None),
        }
    }

    #[inline]
    fn temperature(&self) -> Temperature {
        if self.hot.load(Ordering::Relaxed) {
            Temperature::Hot
        } else {
            Temperature::Cold
        }
    }
}

/// Concurrent midpoint list over a fixed arena.
pub(crate) struct ConcurrentList<K, V> {
    slots: Box<[Slot<K, V>]>,
    cap: NonZeroUsize,
    /// Boundary token.
    token: SpinFlag,
    boundary: AtomicUsize,
    hot: AtomicUsize,
    cold: AtomicUsize,
    /// Live-entry claims; never exceeds `cap`.
    reserved: AtomicUsize,
    free_tx: Sender<usize>,
    free_rx: Receiver<usize>,
    next_stamp: AtomicU64,
    shifts: AtomicU64,
}

// SAFETY: the entry cells are only written by the thread that owns the slot
// (just taken from, or about to return to, the free queue) and only read
// while the slot is pinned as described in the module documentation. Every
// other field is atomic.
unsafe impl<K: Send, V: Send> Send for ConcurrentList<K, V> {}

// SAFETY: shared readers clone keys and values through `&K`/`&V`, which
// requires `Sync`; ownership moves between threads through `alloc`/`free`,
// which requires `Send`.
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for ConcurrentList<K, V> {}

impl<K, V> ConcurrentList<K, V> {
    pub(crate) fn new(cap: NonZeroUsize) -> Self {
        let mut slots = Vec::with_capacity(cap.get() + 2);
        slots.push(Slot::new(NIL, TAIL));
        slots.push(Slot::new(HEAD, NIL));
        slots.extend((0..cap.get()).map(|_| Slot::new(NIL, NIL)));

        let (free_tx, free_rx) = crossbeam_channel::bounded(cap.get());
        for idx in TAIL + 1..cap.get() + 2 {
            // The channel has room for every data slot.
            let _ = free_tx.try_send(idx);
        }

        ConcurrentList {
            slots: slots.into_boxed_slice(),
            cap,
            token: SpinFlag::new(),
            boundary: AtomicUsize::new(TAIL),
            hot: AtomicUsize::new(0),
            cold: AtomicUsize::new(0),
            reserved: AtomicUsize::new(0),
            free_tx,
            free_rx,
            next_stamp: AtomicU64::new(0),
            shifts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn cap(&self) -> NonZeroUsize {
        self.cap
    }

    /// Hot/cold counters. Only exact when no operation is running.
    pub(crate) fn split(&self) -> Split {
        Split {
            hot: self.hot.load(Ordering::Relaxed),
            cold: self.cold.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn boundary_shifts(&self) -> u64 {
        self.shifts.load(Ordering::Relaxed)
    }

    // ---------------------------------------------------------------------
    // Capacity reservations and slot allocation
    // ---------------------------------------------------------------------

    /// Claims one of the `cap` live-entry slots if any is unclaimed.
    pub(crate) fn try_reserve(&self) -> bool {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.cap.get()).then_some(n + 1)
            })
            .is_ok()
    }

    /// Gives a claim back. The slot it covered must already be freed.
    pub(crate) fn release_reservation(&self) {
        self.reserved.fetch_sub(1, Ordering::AcqRel);
    }

    /// Takes a free slot and stores the entry in it. The caller must hold a
    /// reservation.
    pub(crate) fn alloc(&self, key: K, value: V) -> NodeRef {
        let index = loop {
            // A reservation guarantees a free slot; it may still be in flight
            // from a concurrent `free`.
            match self.free_rx.try_recv() {
                Ok(index) => break index,
                Err(_) => backoff(),
            }
        };
        let slot = &self.slots[index];
        let stamp = self.next_stamp.fetch_add(1, Ordering::Relaxed) + 1;
        slot.stamp.store(stamp, Ordering::Relaxed);
        slot.hot.store(true, Ordering::Relaxed);
        // SAFETY: the slot came off the free queue, so no other thread can
        // reach it until `insert` publishes it.
        unsafe { *slot.entry.get() = Some((key, value)) };
        NodeRef { index, stamp }
    }

    /// Takes the entry out of an unlinked slot and returns the slot to the
    /// free queue.
    pub(crate) fn free(&self, index: usize) -> Option<(K, V)> {
        let slot = &self.slots[index];
        debug_assert_eq!(slot.prev.load(Ordering::Relaxed), NIL);
        debug_assert_eq!(slot.inflight.load(Ordering::Relaxed), 0);
        // SAFETY: the slot is unlinked, unmapped and unpinned; its last owner
        // is the only thread that can reach it.
        let entry = unsafe { (*slot.entry.get()).take() };
        let returned = self.free_tx.try_send(index);
        debug_assert!(returned.is_ok(), "free queue overflow");
        entry
    }

    /// The handle of the live allocation in `index`.
    pub(crate) fn node_ref(&self, index: usize) -> NodeRef {
        NodeRef {
            index,
            stamp: self.slots[index].stamp.load(Ordering::Relaxed),
        }
    }

    /// Borrows the key stored in `index`.
    ///
    /// # Safety
    ///
    /// The slot must be live and pinned (see the module documentation) for
    /// the whole lifetime of the returned reference.
    pub(crate) unsafe fn key(&self, index: usize) -> Option<&K> {
        // SAFETY: guaranteed by the caller.
        unsafe { (*self.slots[index].entry.get()).as_ref().map(|(k, _)| k) }
    }

    /// Borrows the value stored in `index`.
    ///
    /// # Safety
    ///
    /// Same contract as [`key`](Self::key).
    pub(crate) unsafe fn value(&self, index: usize) -> Option<&V> {
        // SAFETY: guaranteed by the caller.
        unsafe { (*self.slots[index].entry.get()).as_ref().map(|(_, v)| v) }
    }

    /// Racy temperature read, for metrics only.
    pub(crate) fn temperature(&self, index: usize) -> Temperature {
        self.slots[index].temperature()
    }

    // ---------------------------------------------------------------------
    // In-flight promotions
    // ---------------------------------------------------------------------

    /// Marks a promotion of `index` as in flight.
    pub(crate) fn pin(&self, index: usize) {
        self.slots[index].inflight.fetch_add(1, Ordering::AcqRel);
    }

    /// Marks one promotion of `index` as finished.
    pub(crate) fn unpin(&self, index: usize) {
        self.slots[index].inflight.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn is_pinned(&self, index: usize) -> bool {
        self.slots[index].inflight.load(Ordering::Acquire) != 0
    }

    /// Yields until no promotion of `index` is in flight.
    pub(crate) fn wait_unpinned(&self, index: usize) {
        while self.is_pinned(index) {
            backoff();
        }
    }

    // ---------------------------------------------------------------------
    // Structural operations
    // ---------------------------------------------------------------------

    /// Links a freshly allocated node just before the boundary as hot.
    pub(crate) fn insert(&self, index: usize) {
        let node = &self.slots[index];
        let shift = loop {
            self.token.lock();
            let b = self.boundary.load(Ordering::Relaxed);
            let at = &self.slots[b];
            if !at.prev_lock.try_lock() {
                self.token.unlock();
                backoff();
                continue;
            }
            let p = at.prev.load(Ordering::Acquire);
            let pred = &self.slots[p];
            if !pred.next_lock.try_lock() {
                at.prev_lock.unlock();
                self.token.unlock();
                backoff();
                continue;
            }

            node.prev.store(p, Ordering::Relaxed);
            node.next.store(b, Ordering::Relaxed);
            pred.next.store(index, Ordering::Release);
            at.prev.store(index, Ordering::Release);

            self.hot.fetch_add(1, Ordering::Relaxed);
            let shift = self.split().shift();
            if shift == Shift::TowardHead {
                // The new node is the last hot one.
                node.hot.store(false, Ordering::Relaxed);
                self.boundary.store(index, Ordering::Relaxed);
                self.apply(Shift::TowardHead);
            }

            pred.next_lock.unlock();
            at.prev_lock.unlock();
            self.token.unlock();
            break shift;
        };
        if shift == Shift::TowardTail {
            self.rebalance();
        }
    }

    /// Detaches `index` from its neighbours.
    ///
    /// `Remove` uncounts the node. `Refresh` keeps it counted, as hot, and
    /// returns `true` if it was cold. Pass `tail` when the caller already
    /// holds the tail sentinel's `prev` flag and `index` is the last node.
    pub(crate) fn unlink(&self, index: usize, mode: Unlink, tail: Option<TailGuard<'_>>) -> bool {
        let node = &self.slots[index];
        debug_assert!(tail
            .as_ref()
            .map_or(true, |guard| guard.guards(&self.slots[TAIL].prev_lock)));
        loop {
            self.token.lock();

            if !node.prev_lock.try_lock() {
                self.token.unlock();
                backoff();
                continue;
            }
            let p = node.prev.load(Ordering::Acquire);
            if p == NIL {
                // Detached by a concurrent refresh.
                node.prev_lock.unlock();
                self.token.unlock();
                backoff();
                continue;
            }
            let pred = &self.slots[p];
            if !pred.next_lock.try_lock() {
                node.prev_lock.unlock();
                self.token.unlock();
                backoff();
                continue;
            }
            if !node.next_lock.try_lock() {
                pred.next_lock.unlock();
                node.prev_lock.unlock();
                self.token.unlock();
                backoff();
                continue;
            }
            let n = node.next.load(Ordering::Acquire);
            let succ = &self.slots[n];
            if tail.is_none() && !succ.prev_lock.try_lock() {
                node.next_lock.unlock();
                pred.next_lock.unlock();
                node.prev_lock.unlock();
                self.token.unlock();
                backoff();
                continue;
            }
            debug_assert!(tail.is_none() || n == TAIL);

            if self.boundary.load(Ordering::Relaxed) == index {
                self.boundary.store(n, Ordering::Relaxed);
            }
            let was = node.temperature();
            let promoted = match mode {
                Unlink::Remove => {
                    match was {
                        Temperature::Hot => self.hot.fetch_sub(1, Ordering::Relaxed),
                        Temperature::Cold => self.cold.fetch_sub(1, Ordering::Relaxed),
                    };
                    false
                }
                Unlink::Refresh if was.is_cold() => {
                    self.cold.fetch_sub(1, Ordering::Relaxed);
                    self.hot.fetch_add(1, Ordering::Relaxed);
                    node.hot.store(true, Ordering::Relaxed);
                    true
                }
                Unlink::Refresh => false,
            };
            self.token.unlock();

            pred.next.store(n, Ordering::Release);
            succ.prev.store(p, Ordering::Release);
            node.next.store(NIL, Ordering::Release);
            node.prev.store(NIL, Ordering::Release);

            match tail {
                Some(guard) => drop(guard),
                None => succ.prev_lock.unlock(),
            }
            node.next_lock.unlock();
            pred.next_lock.unlock();
            node.prev_lock.unlock();
            return promoted;
        }
    }

    /// Links a detached node right after the head sentinel.
    fn link_head(&self, index: usize) {
        let node = &self.slots[index];
        let head = &self.slots[HEAD];
        loop {
            if !head.next_lock.try_lock() {
                backoff();
                continue;
            }
            let h1 = head.next.load(Ordering::Acquire);
            let first = &self.slots[h1];
            if !first.prev_lock.try_lock() {
                head.next_lock.unlock();
                backoff();
                continue;
            }
            if !node.prev_lock.try_lock() {
                first.prev_lock.unlock();
                head.next_lock.unlock();
                backoff();
                continue;
            }
            if !node.next_lock.try_lock() {
                node.prev_lock.unlock();
                first.prev_lock.unlock();
                head.next_lock.unlock();
                backoff();
                continue;
            }

            node.next.store(h1, Ordering::Release);
            node.prev.store(HEAD, Ordering::Release);
            head.next.store(index, Ordering::Release);
            first.prev.store(index, Ordering::Release);

            node.next_lock.unlock();
            node.prev_lock.unlock();
            first.prev_lock.unlock();
            head.next_lock.unlock();
            return;
        }
    }

    /// Moves `index` to the head as hot. Returns `true` if it was cold.
    pub(crate) fn refresh(&self, index: usize) -> bool {
        let promoted = self.unlink(index, Unlink::Refresh, None);
        self.link_head(index);
        if promoted {
            self.rebalance();
        }
        promoted
    }

    /// Applies at most one boundary step. Returns `true` if it moved.
    pub(crate) fn rebalance(&self) -> bool {
        loop {
            self.token.lock();
            let shift = self.split().shift();
            match shift {
                Shift::None => {
                    self.token.unlock();
                    return false;
                }
                Shift::TowardHead => {
                    let b = self.boundary.load(Ordering::Relaxed);
                    let at = &self.slots[b];
                    if !at.prev_lock.try_lock() {
                        self.token.unlock();
                        backoff();
                        continue;
                    }
                    let p = at.prev.load(Ordering::Acquire);
                    if p == HEAD {
                        // Every hot node is detached for a refresh; the
                        // refresh that relinks them rebalances again.
                        at.prev_lock.unlock();
                        self.token.unlock();
                        return false;
                    }
                    self.slots[p].hot.store(false, Ordering::Relaxed);
                    self.boundary.store(p, Ordering::Relaxed);
                    at.prev_lock.unlock();
                }
                Shift::TowardTail => {
                    let b = self.boundary.load(Ordering::Relaxed);
                    if b == TAIL {
                        self.token.unlock();
                        return false;
                    }
                    let at = &self.slots[b];
                    if !at.next_lock.try_lock() {
                        self.token.unlock();
                        backoff();
                        continue;
                    }
                    let n = at.next.load(Ordering::Acquire);
                    at.hot.store(true, Ordering::Relaxed);
                    self.boundary.store(n, Ordering::Relaxed);
                    at.next_lock.unlock();
                }
            }
            self.apply(shift);
            self.token.unlock();
            return true;
        }
    }

    /// Moves the counters by one step. Token held.
    fn apply(&self, shift: Shift) {
        match shift {
            Shift::None => return,
            Shift::TowardHead => {
                self.hot.fetch_sub(1, Ordering::Relaxed);
                self.cold.fetch_add(1, Ordering::Relaxed);
            }
            Shift::TowardTail => {
                self.cold.fetch_sub(1, Ordering::Relaxed);
                self.hot.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.shifts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(?shift, "boundary shift");
    }

    /// Rebalances until the split is exact. Only meaningful when idle.
    pub(crate) fn settle(&self) {
        while self.rebalance() {}
    }

    // ---------------------------------------------------------------------
    // Eviction support
    // ---------------------------------------------------------------------

    /// Takes the tail sentinel's `prev` flag.
    pub(crate) fn lock_tail(&self) -> TailGuard<'_> {
        TailGuard::acquire(&self.slots[TAIL].prev_lock)
    }

    /// The last node, read under the tail flag. `None` when the list is empty.
    pub(crate) fn last(&self, _held: &TailGuard<'_>) -> Option<NodeRef> {
        let last = self.slots[TAIL].prev.load(Ordering::Acquire);
        (last != HEAD).then(|| self.node_ref(last))
    }

    // ---------------------------------------------------------------------
    // Traversal and checks
    // ---------------------------------------------------------------------

    /// Head-to-tail traversal with lock coupling on `next` flags.
    pub(crate) fn iter(&self) -> WeakIter<'_, K, V> {
        self.slots[HEAD].next_lock.lock();
        WeakIter {
            list: self,
            held: Some(HEAD),
        }
    }

    /// Walks the list without locks. Call only when no operation is running.
    pub(crate) fn check_invariants(&self) -> Result<(), InvariantError> {
        let head = &self.slots[HEAD];
        let tail = &self.slots[TAIL];
        ensure!(
            head.prev.load(Ordering::Relaxed) == NIL && tail.next.load(Ordering::Relaxed) == NIL,
            "sentinels must not link outward"
        );
        let boundary = self.boundary.load(Ordering::Relaxed);
        let mut seen = Split::default();
        let mut past_boundary = false;
        let mut prev = HEAD;
        let mut cur = head.next.load(Ordering::Relaxed);
        while cur != TAIL {
            ensure!(
                cur != NIL && cur < self.slots.len(),
                "slot {} links to an invalid index",
                prev
            );
            ensure!(
                seen.len() < self.cap.get(),
                "list longer than capacity {}",
                self.cap
            );
            let slot = &self.slots[cur];
            // SAFETY: no operation is running, so nothing writes the cell.
            let live = unsafe { (*slot.entry.get()).is_some() };
            ensure!(live, "linked slot {} has no entry", cur);
            ensure!(
                slot.prev.load(Ordering::Relaxed) == prev,
                "slot {} links back to {} instead of {}",
                cur,
                slot.prev.load(Ordering::Relaxed),
                prev
            );
            ensure!(
                !slot.prev_lock.is_locked() && !slot.next_lock.is_locked(),
                "slot {} is still locked",
                cur
            );
            ensure!(!self.is_pinned(cur), "slot {} has a promotion in flight", cur);
            if cur == boundary {
                past_boundary = true;
            }
            let expected = if past_boundary {
                Temperature::Cold
            } else {
                Temperature::Hot
            };
            ensure!(
                slot.temperature() == expected,
                "slot {} is {:?} on the {:?} side of the boundary",
                cur,
                slot.temperature(),
                expected
            );
            seen.admit(slot.temperature());
            prev = cur;
            cur = slot.next.load(Ordering::Relaxed);
        }
        ensure!(
            tail.prev.load(Ordering::Relaxed) == prev,
            "tail links back to {} instead of {}",
            tail.prev.load(Ordering::Relaxed),
            prev
        );
        ensure!(
            past_boundary || boundary == TAIL,
            "boundary {} is not linked",
            boundary
        );
        ensure!(!self.token.is_locked(), "boundary token still held");
        ensure!(
            seen == self.split(),
            "counted {:?} but tracking {:?}",
            seen,
            self.split()
        );
        ensure!(self.split().is_balanced(), "unbalanced split {:?}", self.split());
        let reserved = self.reserved.load(Ordering::Relaxed);
        ensure!(
            reserved == seen.len(),
            "{} reservations for {} linked entries",
            reserved,
            seen.len()
        );
        ensure!(
            self.free_rx.len() + seen.len() == self.cap.get(),
            "{} free slots and {} linked entries for capacity {}",
            self.free_rx.len(),
            seen.len(),
            self.cap
        );
        Ok(())
    }
}

impl<K, V> fmt::Debug for ConcurrentList<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentList")
            .field("cap", &self.cap)
            .field("split", &self.split())
            .field("reserved", &self.reserved.load(Ordering::Relaxed))
            .finish()
    }
}

/// Weakly consistent head-to-tail iterator.
///
/// Holds the `next` flag of the node it last yielded, which pins that node's
/// successor. Advancing takes the successor's `next` flag before releasing
/// the current one, so two flags are held for the length of a step (lock
/// coupling) and one between steps. Entries are cloned out; the traversal
/// may or may not observe concurrent changes, but it always ends at the tail
/// sentinel. The held flag is released on exhaustion or drop.
///
/// Do not unlink anything from the thread that holds a live iterator,
/// including through a `get` whose promotion runs inline: an unlink next to
/// the held flag would wait on it forever.
pub struct WeakIter<'a, K, V> {
    list: &'a ConcurrentList<K, V>,
    held: Option<usize>,
}

impl<K: Clone, V: Clone> Iterator for WeakIter<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        loop {
            let cur = self.held?;
            let slots = &self.list.slots;
            let n = slots[cur].next.load(Ordering::Acquire);
            if n == TAIL {
                slots[cur].next_lock.unlock();
                self.held = None;
                return None;
            }
            // SAFETY: `n` cannot be unlinked, and so cannot be freed, while we
            // hold the `next` flag of its predecessor.
            let item = unsafe { (*slots[n].entry.get()).clone() };
            slots[n].next_lock.lock();
            slots[cur].next_lock.unlock();
            self.held = Some(n);
            if item.is_some() {
                return item;
            }
        }
    }
}

impl<K, V> Drop for WeakIter<'_, K, V> {
    fn drop(&mut self) {
        if let Some(cur) = self.held.take() {
            self.list.slots[cur].next_lock.unlock();
        }
    }
}

impl<K, V> fmt::Debug for WeakIter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakIter")
            .field("done", &self.held.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::String;

    fn list(cap: usize) -> ConcurrentList<char, u32> {
        ConcurrentList::new(NonZeroUsize::new(cap).unwrap())
    }

    fn push(list: &ConcurrentList<char, u32>, key: char) -> NodeRef {
        assert!(list.try_reserve());
        let node = list.alloc(key, 0);
        list.insert(node.index());
        node
    }

    fn layout(list: &ConcurrentList<char, u32>) -> String {
        let mut out = String::new();
        let mut marked = false;
        let mut cur = list.slots[HEAD].next.load(Ordering::Relaxed);
        while cur != TAIL {
            if list.temperature(cur).is_cold() && !marked {
                out.push('|');
                marked = true;
            }
            // SAFETY: single-threaded test, slot is linked.
            out.push(*unsafe { list.key(cur) }.unwrap());
            cur = list.slots[cur].next.load(Ordering::Relaxed);
        }
        out
    }

    #[test]
    fn test_insert_matches_serialized_layout() {
        let list = list(4);
        for key in ['A', 'B', 'C', 'D'] {
            push(&list, key);
            list.check_invariants().unwrap();
        }
        assert_eq!(layout(&list), "AC|DB");
        assert_eq!(list.split(), Split { hot: 2, cold: 2 });
        assert!(!list.try_reserve());
    }

    #[test]
    fn test_refresh_cold_node() {
        let list = list(4);
        for key in ['A', 'B', 'C'] {
            push(&list, key);
        }
        let d = push(&list, 'D');
        assert!(list.refresh(d.index()));
        assert_eq!(layout(&list), "DA|CB");
        list.check_invariants().unwrap();

        assert!(!list.refresh(d.index()));
        assert_eq!(layout(&list), "DA|CB");
    }

    #[test]
    fn test_unlink_with_tail_guard() {
        let list = list(4);
        for key in ['A', 'B', 'C', 'D'] {
            push(&list, key);
        }
        let guard = list.lock_tail();
        let victim = list.last(&guard).unwrap();
        // SAFETY: pinned by the tail flag.
        assert_eq!(unsafe { list.key(victim.index()) }, Some(&'B'));
        list.unlink(victim.index(), Unlink::Remove, Some(guard));
        assert!(!list.slots[TAIL].prev_lock.is_locked());
        list.rebalance();
        assert_eq!(list.free(victim.index()), Some(('B', 0)));
        assert_eq!(layout(&list), "AC|D");

        // The reservation moves to the next insert.
        let e = list.alloc('E', 0);
        list.insert(e.index());
        assert_eq!(layout(&list), "AC|ED");
        list.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_releases_slot() {
        let list = list(2);
        let a = push(&list, 'A');
        let b = push(&list, 'B');
        list.unlink(a.index(), Unlink::Remove, None);
        list.rebalance();
        list.free(a.index());
        list.release_reservation();
        assert_eq!(layout(&list), "B");
        list.check_invariants().unwrap();

        let c = push(&list, 'C');
        assert_ne!(c, a, "a reused slot gets a new stamp");
        assert_eq!(list.node_ref(b.index()), b);
        list.check_invariants().unwrap();
    }

    #[test]
    fn test_weak_iter_yields_in_order_and_releases() {
        let list = list(4);
        for key in ['A', 'B', 'C', 'D'] {
            push(&list, key);
        }
        let keys: Vec<char> = list.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ['A', 'C', 'D', 'B']);

        let mut partial = list.iter();
        assert_eq!(partial.next().map(|(k, _)| k), Some('A'));
        drop(partial);
        list.check_invariants().unwrap();
    }

    /// Runs every path that touches an entry cell with heap-owning keys and
    /// values, so `cargo +nightly miri test` checks the cell accesses.
    #[test]
    fn test_miri_slot_access_with_owned_entries() {
        let list: ConcurrentList<String, String> =
            ConcurrentList::new(NonZeroUsize::new(3).unwrap());
        let mut nodes = Vec::new();
        for key in ["a", "b", "c"] {
            assert!(list.try_reserve());
            let node = list.alloc(String::from(key), key.repeat(3));
            list.insert(node.index());
            nodes.push(node);
        }

        // "ac|b": refresh the cold tail while it is pinned.
        let b = nodes[1];
        list.pin(b.index());
        // SAFETY: linked and pinned.
        let value = unsafe { list.value(b.index()) };
        assert_eq!(value.map(String::as_str), Some("bbb"));
        assert!(list.refresh(b.index()));
        list.unpin(b.index());

        // "ba|c": evict through the tail handoff.
        let guard = list.lock_tail();
        let victim = list.last(&guard).unwrap();
        // SAFETY: pinned by the tail flag.
        let key = unsafe { list.key(victim.index()) }.cloned();
        assert_eq!(key.as_deref(), Some("c"));
        list.unlink(victim.index(), Unlink::Remove, Some(guard));
        list.rebalance();
        let evicted = list.free(victim.index());
        assert_eq!(evicted, Some((String::from("c"), String::from("ccc"))));

        // The freed slot is reused under the handed-over reservation.
        let d = list.alloc(String::from("d"), String::from("ddd"));
        assert_eq!(d.index(), victim.index());
        assert_ne!(d, victim);
        list.insert(d.index());

        let entries: Vec<(String, String)> = list.iter().collect();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["b", "d", "a"]);
        assert_eq!(entries[1].1, "ddd");

        let a = nodes[0];
        list.unlink(a.index(), Unlink::Remove, None);
        list.rebalance();
        assert_eq!(list.free(a.index()).map(|(_, v)| v), Some(String::from("aaa")));
        list.release_reservation();
        list.check_invariants().unwrap();
        // The remaining entries are dropped with the list.
    }

    #[test]
    fn test_pinning() {
        let list = list(2);
        let a = push(&list, 'A');
        list.pin(a.index());
        list.pin(a.index());
        assert!(list.is_pinned(a.index()));
        list.unpin(a.index());
        list.unpin(a.index());
        list.wait_unpinned(a.index());
        assert!(!list.is_pinned(a.index()));
    }
}
