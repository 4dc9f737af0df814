//! Midpoint Metadata Types
//!
//! Per-entry temperature and the hot/cold split shared by the serialized
//! [`MidpointList`](crate::list::MidpointList) and the concurrent list.
//!
//! # The Boundary Rule
//!
//! The recency list is cut into a hot prefix and a cold suffix. The cut is a
//! *boundary* node: the first cold node, or the tail sentinel when nothing is
//! cold. Both lists keep the two halves balanced with the same rule:
//!
//! | Condition          | Shift                 | Effect                                          |
//! |--------------------|-----------------------|-------------------------------------------------|
//! | `hot > cold + 1`   | [`Shift::TowardHead`] | last hot node turns cold, boundary moves onto it |
//! | `cold > hot`       | [`Shift::TowardTail`] | boundary node turns hot, boundary moves past it  |
//! | otherwise          | [`Shift::None`]       | nothing                                          |
//!
//! When the counts are equal the next admission stays hot, so the hot half
//! holds `ceil(n / 2)` entries.
//!
//! # Usage
//!
//! ```
//! use midpoint_cache::meta::{Shift, Split, Temperature};
//!
//! let mut split = Split::default();
//! split.admit(Temperature::Hot);
//! split.admit(Temperature::Hot);
//! assert_eq!(split.shift(), Shift::TowardHead);
//!
//! split.apply(Shift::TowardHead);
//! assert_eq!((split.hot, split.cold), (1, 1));
//! assert_eq!(split.shift(), Shift::None);
//! ```

/// Which side of the boundary an entry sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Temperature {
    /// Before the boundary: recently admitted or recently read.
    #[default]
    Hot,
    /// The boundary node and everything after it up to the tail.
    Cold,
}

impl Temperature {
    /// Returns `true` for [`Temperature::Hot`].
    #[inline]
    pub fn is_hot(self) -> bool {
        matches!(self, Temperature::Hot)
    }

    /// Returns `true` for [`Temperature::Cold`].
    #[inline]
    pub fn is_cold(self) -> bool {
        matches!(self, Temperature::Cold)
    }
}

/// One step of boundary movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    /// The halves are balanced.
    None,
    /// The hot half is too long: its last node turns cold.
    TowardHead,
    /// The cold half is too long: the boundary node turns hot.
    TowardTail,
}

/// Hot and cold entry counts.
///
/// In the concurrent list a node that is being relinked at the head is still
/// counted, as hot, while it is detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Split {
    /// Entries before the boundary.
    pub hot: usize,
    /// Entries from the boundary to the tail.
    pub cold: usize,
}

impl Split {
    /// Total number of counted entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.hot + self.cold
    }

    /// Returns `true` when nothing is counted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single boundary step that brings the split closer to balance.
    #[inline]
    pub fn shift(&self) -> Shift {
        if self.hot > self.cold + 1 {
            Shift::TowardHead
        } else if self.cold > self.hot {
            Shift::TowardTail
        } else {
            Shift::None
        }
    }

    /// Returns `true` when `hot - cold` is `0` or `1`.
    #[inline]
    pub fn is_balanced(&self) -> bool {
        self.shift() == Shift::None
    }

    /// Counts a newly linked entry.
    #[inline]
    pub fn admit(&mut self, temperature: Temperature) {
        match temperature {
            Temperature::Hot => self.hot += 1,
            Temperature::Cold => self.cold += 1,
        }
    }

    /// Uncounts an unlinked entry.
    #[inline]
    pub fn release(&mut self, temperature: Temperature) {
        match temperature {
            Temperature::Hot => self.hot -= 1,
            Temperature::Cold => self.cold -= 1,
        }
    }

    /// Moves one entry from the cold count to the hot count.
    #[inline]
    pub fn promote(&mut self) {
        self.cold -= 1;
        self.hot += 1;
    }

    /// Moves the counts by one boundary step.
    #[inline]
    pub fn apply(&mut self, shift: Shift) {
        match shift {
            Shift::None => {}
            Shift::TowardHead => {
                self.hot -= 1;
                self.cold += 1;
            }
            Shift::TowardTail => {
                self.cold -= 1;
                self.hot += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_default_is_hot() {
        assert_eq!(Temperature::default(), Temperature::Hot);
        assert!(Temperature::Hot.is_hot());
        assert!(Temperature::Cold.is_cold());
        assert!(!Temperature::Cold.is_hot());
    }

    #[test]
    fn test_shift_rule() {
        let split = |hot, cold| Split { hot, cold };
        assert_eq!(split(0, 0).shift(), Shift::None);
        assert_eq!(split(1, 0).shift(), Shift::None);
        assert_eq!(split(1, 1).shift(), Shift::None);
        assert_eq!(split(2, 1).shift(), Shift::None);
        assert_eq!(split(2, 0).shift(), Shift::TowardHead);
        assert_eq!(split(4, 2).shift(), Shift::TowardHead);
        assert_eq!(split(0, 1).shift(), Shift::TowardTail);
        assert_eq!(split(2, 3).shift(), Shift::TowardTail);
    }

    #[test]
    fn test_single_step_restores_balance() {
        // Every mutation moves the split by at most one entry, so one step is enough.
        for hot in 0..6usize {
            for cold in 0..6usize {
                let mut split = Split { hot, cold };
                if !split.is_balanced() && hot.abs_diff(cold) <= 2 {
                    split.apply(split.shift());
                    assert!(split.is_balanced(), "{hot}/{cold} -> {split:?}");
                }
            }
        }
    }

    #[test]
    fn test_admit_release_promote() {
        let mut split = Split::default();
        assert!(split.is_empty());
        split.admit(Temperature::Hot);
        split.admit(Temperature::Cold);
        split.admit(Temperature::Cold);
        assert_eq!(split.len(), 3);
        split.promote();
        assert_eq!(split, Split { hot: 2, cold: 1 });
        split.release(Temperature::Hot);
        assert_eq!(split, Split { hot: 1, cold: 1 });
    }
}
