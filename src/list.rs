//! Arena-backed midpoint recency list.
//!
//! A doubly linked list whose nodes live in a `Vec` and link to each other by
//! index. Slot `0` is the head sentinel and slot `1` the tail sentinel; both
//! stay linked for the lifetime of the list and never hold a value.
//!
//! ```text
//!   HEAD ◀──▶ [h1] ◀──▶ [h2] ◀──▶ [c1] ◀──▶ [c2] ◀──▶ TAIL
//!             └──── hot ────┘      ▲  └── cold ──┘
//!                               boundary
//! ```
//!
//! The boundary is the first cold node, or `TAIL` when nothing is cold. Every
//! node before it is hot; it and every node after it are cold. After each
//! public operation `hot - cold` is `0` or `1` (see [`Split`]).
//!
//! Freed slots go on a free list and are reused by later inserts, so the
//! arena never grows past `capacity + 2` slots.

extern crate alloc;

use crate::error::{ensure, InvariantError};
use crate::meta::{Shift, Split, Temperature};
use alloc::vec::Vec;
use core::fmt;
use core::iter::FusedIterator;
use core::num::NonZeroUsize;

pub(crate) const HEAD: usize = 0;
pub(crate) const TAIL: usize = 1;
const NIL: usize = usize::MAX;

/// Handle to a node of a [`MidpointList`].
///
/// Only valid until the node is removed; after that the slot may be reused
/// by another insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena slot of this node.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

struct Node<T> {
    value: Option<T>,
    prev: usize,
    next: usize,
    temperature: Temperature,
}

impl<T> Node<T> {
    fn sentinel(prev: usize, next: usize) -> Self {
        Node {
            value: None,
            prev,
            next,
            temperature: Temperature::Cold,
        }
    }
}

/// Recency list split into a hot prefix and a cold suffix.
pub struct MidpointList<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    boundary: usize,
    split: Split,
    cap: NonZeroUsize,
    shifts: u64,
}

impl<T> MidpointList<T> {
    /// Creates an empty list that holds at most `cap` values.
    pub fn new(cap: NonZeroUsize) -> Self {
        let mut nodes = Vec::with_capacity(cap.get() + 2);
        nodes.push(Node::sentinel(NIL, TAIL));
        nodes.push(Node::sentinel(HEAD, NIL));
        MidpointList {
            nodes,
            free: Vec::new(),
            boundary: TAIL,
            split: Split::default(),
            cap,
            shifts: 0,
        }
    }

    /// Maximum number of values.
    #[inline]
    pub fn cap(&self) -> NonZeroUsize {
        self.cap
    }

    /// Number of linked values.
    #[inline]
    pub fn len(&self) -> usize {
        self.split.len()
    }

    /// Returns `true` if the list holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.split.is_empty()
    }

    /// Returns `true` if another insert would exceed the capacity.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.cap.get()
    }

    /// Current hot/cold counts.
    #[inline]
    pub fn split(&self) -> Split {
        self.split
    }

    /// Number of boundary steps taken since construction.
    #[inline]
    pub fn boundary_shifts(&self) -> u64 {
        self.shifts
    }

    /// The boundary node, or `None` when nothing is cold.
    pub fn boundary(&self) -> Option<NodeId> {
        (self.boundary != TAIL).then_some(NodeId(self.boundary))
    }

    /// The least recent node, i.e. the next eviction victim.
    pub fn tail(&self) -> Option<NodeId> {
        let last = self.nodes[TAIL].prev;
        (last != HEAD).then_some(NodeId(last))
    }

    fn is_live(&self, id: NodeId) -> bool {
        id.0 > TAIL && self.nodes.get(id.0).is_some_and(|n| n.value.is_some())
    }

    /// Value stored at `id`, without touching recency.
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(id.0)?.value.as_ref()
    }

    /// Temperature of the node at `id`.
    pub fn temperature(&self, id: NodeId) -> Option<Temperature> {
        self.is_live(id).then(|| self.nodes[id.0].temperature)
    }

    /// Links `value` just before the boundary as a hot node.
    ///
    /// If that leaves the hot half two longer than the cold half, the new node
    /// itself turns cold and becomes the boundary. A full list hands the value
    /// back; the caller evicts and retries.
    pub fn insert(&mut self, value: T) -> Result<NodeId, T> {
        if self.is_full() {
            return Err(value);
        }
        let node = Node {
            value: Some(value),
            prev: NIL,
            next: NIL,
            temperature: Temperature::Hot,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.link_before(idx, self.boundary);
        self.split.admit(Temperature::Hot);
        self.rebalance();
        Ok(NodeId(idx))
    }

    /// Moves `id` to the head.
    ///
    /// A hot node just moves. A cold node turns hot and the boundary retreats
    /// one step toward the head. Returns the temperature the node had before.
    pub fn refresh(&mut self, id: NodeId) -> Option<Temperature> {
        if !self.is_live(id) {
            return None;
        }
        let idx = id.0;
        let was = self.nodes[idx].temperature;
        if self.nodes[HEAD].next == idx {
            return Some(was);
        }
        if was.is_cold() && self.boundary == idx {
            self.boundary = self.nodes[idx].next;
        }
        self.unlink(idx);
        self.link_before(idx, self.nodes[HEAD].next);
        if was.is_cold() {
            self.nodes[idx].temperature = Temperature::Hot;
            self.split.promote();
            self.rebalance();
        }
        Some(was)
    }

    /// Unlinks `id` from anywhere in the list and returns its value.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        if !self.is_live(id) {
            return None;
        }
        let idx = id.0;
        if self.boundary == idx {
            self.boundary = self.nodes[idx].next;
        }
        self.unlink(idx);
        self.split.release(self.nodes[idx].temperature);
        self.rebalance();
        let value = self.nodes[idx].value.take();
        self.free.push(idx);
        value
    }

    /// Removes the least recent value.
    pub fn pop_tail(&mut self) -> Option<T> {
        let id = self.tail()?;
        self.remove(id)
    }

    /// Drops every value and resets the boundary.
    pub fn clear(&mut self) {
        self.nodes.truncate(2);
        self.nodes[HEAD].next = TAIL;
        self.nodes[TAIL].prev = HEAD;
        self.free.clear();
        self.boundary = TAIL;
        self.split = Split::default();
    }

    /// Iterates from the most recent node to the least recent one.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cur: self.nodes[HEAD].next,
            remaining: self.len(),
        }
    }

    /// Walks the whole list and checks every structural invariant.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        ensure!(
            self.nodes[HEAD].prev == NIL && self.nodes[TAIL].next == NIL,
            "sentinels must not link outward"
        );
        let mut prev = HEAD;
        let mut cur = self.nodes[HEAD].next;
        let mut seen = Split::default();
        let mut past_boundary = false;
        while cur != TAIL {
            ensure!(
                seen.len() < self.cap.get(),
                "list longer than capacity {}",
                self.cap
            );
            let node = &self.nodes[cur];
            ensure!(node.value.is_some(), "linked slot {} has no value", cur);
            ensure!(
                node.prev == prev,
                "slot {} links back to {} instead of {}",
                cur,
                node.prev,
                prev
            );
            if cur == self.boundary {
                past_boundary = true;
            }
            let expected = if past_boundary {
                Temperature::Cold
            } else {
                Temperature::Hot
            };
            ensure!(
                node.temperature == expected,
                "slot {} is {:?} on the {:?} side of the boundary",
                cur,
                node.temperature,
                expected
            );
            seen.admit(node.temperature);
            prev = cur;
            cur = node.next;
        }
        ensure!(
            self.nodes[TAIL].prev == prev,
            "tail links back to {} instead of {}",
            self.nodes[TAIL].prev,
            prev
        );
        ensure!(
            past_boundary || self.boundary == TAIL,
            "boundary {} is not linked",
            self.boundary
        );
        ensure!(
            seen == self.split,
            "counted {:?} but tracking {:?}",
            seen,
            self.split
        );
        ensure!(self.split.is_balanced(), "unbalanced split {:?}", self.split);
        ensure!(
            self.free.len() + self.len() + 2 == self.nodes.len(),
            "{} free slots and {} linked nodes in an arena of {}",
            self.free.len(),
            self.len(),
            self.nodes.len()
        );
        Ok(())
    }

    /// Applies one boundary step if the split is out of balance.
    fn rebalance(&mut self) {
        let shift = self.split.shift();
        match shift {
            Shift::None => return,
            Shift::TowardHead => {
                let last_hot = self.nodes[self.boundary].prev;
                debug_assert_ne!(last_hot, HEAD);
                self.nodes[last_hot].temperature = Temperature::Cold;
                self.boundary = last_hot;
            }
            Shift::TowardTail => {
                let b = self.boundary;
                debug_assert_ne!(b, TAIL);
                self.nodes[b].temperature = Temperature::Hot;
                self.boundary = self.nodes[b].next;
            }
        }
        self.split.apply(shift);
        self.shifts += 1;
        tracing::trace!(?shift, hot = self.split.hot, cold = self.split.cold, "boundary shift");
    }

    fn unlink(&mut self, idx: usize) {
        let Node { prev, next, .. } = self.nodes[idx];
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }

    fn link_before(&mut self, idx: usize, at: usize) {
        let prev = self.nodes[at].prev;
        self.nodes[idx].prev = prev;
        self.nodes[idx].next = at;
        self.nodes[prev].next = idx;
        self.nodes[at].prev = idx;
    }
}

impl<T: fmt::Debug> fmt::Debug for MidpointList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidpointList")
            .field("cap", &self.cap)
            .field("split", &self.split)
            .field("boundary", &self.boundary())
            .field("shifts", &self.shifts)
            .finish()
    }
}

/// Head-to-tail iterator over a [`MidpointList`], yielding each value with its
/// temperature.
pub struct Iter<'a, T> {
    list: &'a MidpointList<T>,
    cur: usize,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (&'a T, Temperature);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur == TAIL || self.remaining == 0 {
            return None;
        }
        let node = &self.list.nodes[self.cur];
        self.cur = node.next;
        self.remaining -= 1;
        node.value.as_ref().map(|v| (v, node.temperature))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

impl<T> fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.remaining)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn list(cap: usize) -> MidpointList<char> {
        MidpointList::new(NonZeroUsize::new(cap).unwrap())
    }

    /// Renders the list as e.g. `"AC|DB"`, with `|` in front of the boundary.
    fn layout(list: &MidpointList<char>) -> alloc::string::String {
        let mut out = alloc::string::String::new();
        let mut marked = false;
        for (c, t) in list.iter() {
            if t.is_cold() && !marked {
                out.push('|');
                marked = true;
            }
            out.push(*c);
        }
        out
    }

    #[test]
    fn test_construct_and_cap() {
        let list = list(4);
        assert_eq!(list.cap().get(), 4);
        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        assert!(list.boundary().is_none());
        assert!(list.tail().is_none());
        list.check_invariants().unwrap();
    }

    #[test]
    fn test_inserts_land_before_boundary() {
        let mut list = list(4);
        let a = list.insert('A').unwrap();
        assert_eq!(layout(&list), "A");
        list.insert('B').unwrap();
        assert_eq!(layout(&list), "A|B");
        list.insert('C').unwrap();
        assert_eq!(layout(&list), "AC|B");
        let d = list.insert('D').unwrap();
        assert_eq!(layout(&list), "AC|DB");
        assert_eq!(list.boundary(), Some(d));
        assert_eq!(list.temperature(a), Some(Temperature::Hot));
        assert_eq!(list.split(), Split { hot: 2, cold: 2 });
        assert!(list.is_full());
        assert_eq!(list.insert('E'), Err('E'));
        list.check_invariants().unwrap();
    }

    #[test]
    fn test_refresh_hot_moves_without_rebalancing() {
        let mut list = list(4);
        list.insert('A').unwrap();
        list.insert('B').unwrap();
        let c = list.insert('C').unwrap();
        list.insert('D').unwrap();
        let shifts = list.boundary_shifts();
        assert_eq!(list.refresh(c), Some(Temperature::Hot));
        assert_eq!(layout(&list), "CA|DB");
        assert_eq!(list.boundary_shifts(), shifts);
        list.check_invariants().unwrap();
    }

    #[test]
    fn test_refresh_cold_boundary_retreats() {
        let mut list = list(4);
        list.insert('A').unwrap();
        list.insert('B').unwrap();
        list.insert('C').unwrap();
        let d = list.insert('D').unwrap();
        // D is the boundary: it moves to B, D turns hot, C turns cold.
        assert_eq!(list.refresh(d), Some(Temperature::Cold));
        assert_eq!(layout(&list), "DA|CB");
        list.check_invariants().unwrap();
    }

    #[test]
    fn test_refresh_cold_tail() {
        let mut list = list(4);
        let a = list.insert('A').unwrap();
        let b = list.insert('B').unwrap();
        list.insert('C').unwrap();
        list.insert('D').unwrap();
        assert_eq!(list.refresh(b), Some(Temperature::Cold));
        assert_eq!(layout(&list), "BA|CD");
        assert_eq!(list.temperature(a), Some(Temperature::Hot));
        list.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_rebalances() {
        let mut list = list(4);
        let a = list.insert('A').unwrap();
        list.insert('B').unwrap();
        let c = list.insert('C').unwrap();
        let d = list.insert('D').unwrap();

        // Removing a hot node pulls the boundary toward the tail.
        assert_eq!(list.remove(a), Some('A'));
        assert_eq!(layout(&list), "CD|B");
        list.check_invariants().unwrap();

        // Removing the boundary itself moves it to the successor first.
        let b = list.boundary().unwrap();
        assert_eq!(list.get(b), Some(&'B'));
        assert_eq!(list.remove(b), Some('B'));
        assert_eq!(layout(&list), "C|D");
        list.check_invariants().unwrap();

        assert_eq!(list.remove(c), Some('C'));
        assert_eq!(list.remove(d), Some('D'));
        assert!(list.is_empty());
        assert!(list.boundary().is_none());
        list.check_invariants().unwrap();
    }

    #[test]
    fn test_stale_ids_are_ignored() {
        let mut list = list(2);
        let a = list.insert('A').unwrap();
        assert_eq!(list.remove(a), Some('A'));
        assert_eq!(list.remove(a), None);
        assert_eq!(list.refresh(a), None);
        assert_eq!(list.temperature(a), None);
        assert_eq!(list.remove(NodeId(HEAD)), None);
        assert_eq!(list.remove(NodeId(TAIL)), None);
        assert_eq!(list.refresh(NodeId(99)), None);
    }

    #[test]
    fn test_pop_tail_and_slot_reuse() {
        let mut list = list(3);
        list.insert('A').unwrap();
        list.insert('B').unwrap();
        list.insert('C').unwrap();
        assert_eq!(list.pop_tail(), Some('B'));
        let d = list.insert('D').unwrap();
        assert!(d.index() < 5, "freed slot should be reused");
        assert_eq!(list.iter().count(), 3);
        list.check_invariants().unwrap();
    }

    #[test]
    fn test_clear() {
        let mut list = list(3);
        list.insert('A').unwrap();
        list.insert('B').unwrap();
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.iter().next(), None);
        list.insert('C').unwrap();
        assert_eq!(layout(&list), "C");
        list.check_invariants().unwrap();
    }

    #[test]
    fn test_mixed_operations_keep_invariants() {
        let mut list = MidpointList::new(NonZeroUsize::new(7).unwrap());
        let mut ids = vec![];
        let mut seed = 0x2545_f491_u32;
        for step in 0..500u32 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            match seed % 3 {
                0 if !ids.is_empty() => {
                    let id = ids[(seed as usize / 3) % ids.len()];
                    list.refresh(id);
                }
                1 if !ids.is_empty() => {
                    let id = ids.swap_remove((seed as usize / 3) % ids.len());
                    list.remove(id);
                }
                _ => {
                    if list.is_full() {
                        let tail = list.tail().unwrap();
                        ids.retain(|id| *id != tail);
                        list.remove(tail);
                    }
                    ids.push(list.insert(step).unwrap());
                }
            }
            list.check_invariants().unwrap();
            assert_eq!(list.len(), ids.len());
        }
    }
}
