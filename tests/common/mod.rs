//! Shared helpers for the integration tests.

#![allow(dead_code)]

use proptest::prelude::*;

/// One cache operation over a small key space.
#[derive(Debug, Clone, Copy)]
pub enum Op {
    Get(u8),
    Put(u8),
    Remove(u8),
}

/// Operation sequences biased toward a handful of keys so hits, promotions
/// and evictions all show up.
pub fn ops(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        3 => (0u8..12).prop_map(Op::Get),
        3 => (0u8..12).prop_map(Op::Put),
        1 => (0u8..12).prop_map(Op::Remove),
    ];
    proptest::collection::vec(op, 0..max_len)
}

/// Reference model of the midpoint order.
///
/// The list is kept as a plain head-to-tail vector. Because both caches keep
/// `hot - cold` at `0` or `1`, the hot half is always the first
/// `ceil(len / 2)` entries, so temperatures follow from positions alone.
#[derive(Debug, Clone)]
pub struct Model {
    cap: usize,
    order: Vec<u8>,
}

impl Model {
    pub fn new(cap: usize) -> Self {
        Model {
            cap,
            order: Vec::new(),
        }
    }

    pub fn contains(&self, key: u8) -> bool {
        self.order.contains(&key)
    }

    /// Moves a present key to the head.
    pub fn get(&mut self, key: u8) -> bool {
        match self.order.iter().position(|&k| k == key) {
            Some(at) => {
                self.order.remove(at);
                self.order.insert(0, key);
                true
            }
            None => false,
        }
    }

    /// Admits an absent key just before the boundary, evicting the tail if
    /// the model is full.
    pub fn put(&mut self, key: u8) -> Option<u8> {
        let evicted = if self.order.len() == self.cap {
            self.order.pop()
        } else {
            None
        };
        let at = self.hot_len();
        self.order.insert(at, key);
        evicted
    }

    pub fn remove(&mut self, key: u8) -> bool {
        match self.order.iter().position(|&k| k == key) {
            Some(at) => {
                self.order.remove(at);
                true
            }
            None => false,
        }
    }

    pub fn order(&self) -> &[u8] {
        &self.order
    }

    pub fn hot_len(&self) -> usize {
        self.order.len().div_ceil(2)
    }

    pub fn cold_len(&self) -> usize {
        self.order.len() - self.hot_len()
    }

    pub fn is_hot(&self, key: u8) -> Option<bool> {
        let hot = self.hot_len();
        self.order.iter().position(|&k| k == key).map(|at| at < hot)
    }
}

/// Formats a head-to-tail order with `|` before the first cold entry.
pub fn layout(keys: &[&str], hot: usize) -> String {
    let mut out = String::new();
    for (i, key) in keys.iter().enumerate() {
        if i == hot {
            out.push('|');
        }
        out.push_str(key);
    }
    out
}
