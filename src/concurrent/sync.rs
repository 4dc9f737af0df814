//! Spin flags and the tail lock handoff.
//!
//! Every link of the concurrent list is guarded by a [`SpinFlag`]: a boolean
//! taken with a `false → true` compare-and-swap and released by storing
//! `false`. There is no parking and no fairness; a thread that cannot take a
//! flag yields and tries again.
//!
//! Built with `--cfg loom`, the flag and the yield come from `loom`, and the
//! `loom_unlink` tests below model the unlink lock order exhaustively:
//!
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test --release --lib loom_unlink
//! ```

use core::fmt;
use core::sync::atomic::Ordering;

#[cfg(not(loom))]
use core::sync::atomic::AtomicBool;
#[cfg(loom)]
use loom::sync::atomic::AtomicBool;

/// Yields the current thread between two attempts at a contended flag.
#[inline]
pub(crate) fn backoff() {
    #[cfg(not(loom))]
    std::thread::yield_now();
    #[cfg(loom)]
    loom::thread::yield_now();
}

/// A CAS spin lock with no owner tracking.
pub(crate) struct SpinFlag(AtomicBool);

impl SpinFlag {
    pub(crate) fn new() -> Self {
        SpinFlag(AtomicBool::new(false))
    }

    /// Takes the flag if it is free.
    #[inline]
    #[must_use]
    pub(crate) fn try_lock(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Takes the flag, yielding until it is free.
    ///
    /// Only call this while holding no pointer flag that the current owner
    /// might be waiting on.
    pub(crate) fn lock(&self) {
        while !self.try_lock() {
            while self.0.load(Ordering::Relaxed) {
                backoff();
            }
        }
    }

    /// Releases the flag.
    #[inline]
    pub(crate) fn unlock(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_locked(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for SpinFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SpinFlag").field(&self.is_locked()).finish()
    }
}

/// Proof that the caller holds the tail sentinel's `prev` flag.
///
/// The evictor takes this flag to read the victim, and then passes the guard
/// into the victim's unlink so the unlink does not try to take the same flag
/// a second time. Dropping the guard releases the flag.
#[must_use = "dropping the guard releases the tail lock"]
pub(crate) struct TailGuard<'a> {
    flag: &'a SpinFlag,
}

impl<'a> TailGuard<'a> {
    /// Spins until the flag is taken.
    pub(crate) fn acquire(flag: &'a SpinFlag) -> Self {
        flag.lock();
        TailGuard { flag }
    }

    /// Returns `true` if this guard holds `flag`.
    pub(crate) fn guards(&self, flag: &SpinFlag) -> bool {
        core::ptr::eq(self.flag, flag)
    }
}

impl Drop for TailGuard<'_> {
    fn drop(&mut self) {
        self.flag.unlock();
    }
}

impl fmt::Debug for TailGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TailGuard").finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_try_lock_is_exclusive() {
        let flag = SpinFlag::new();
        assert!(flag.try_lock());
        assert!(!flag.try_lock());
        assert!(flag.is_locked());
        flag.unlock();
        assert!(flag.try_lock());
        flag.unlock();
    }

    #[test]
    fn test_tail_guard_releases_on_drop() {
        let flag = SpinFlag::new();
        let other = SpinFlag::new();
        {
            let guard = TailGuard::acquire(&flag);
            assert!(guard.guards(&flag));
            assert!(!guard.guards(&other));
            assert!(!flag.try_lock());
        }
        assert!(!flag.is_locked());
    }

    #[test]
    fn test_lock_provides_mutual_exclusion() {
        struct Shared {
            flag: SpinFlag,
            inside: AtomicUsize,
            total: AtomicUsize,
        }
        let shared = Arc::new(Shared {
            flag: SpinFlag::new(),
            inside: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        });

        let handles: std::vec::Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        shared.flag.lock();
                        assert_eq!(shared.inside.fetch_add(1, Ordering::SeqCst), 0);
                        shared.total.fetch_add(1, Ordering::Relaxed);
                        shared.inside.fetch_sub(1, Ordering::SeqCst);
                        shared.flag.unlock();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.total.load(Ordering::Relaxed), 8000);
    }
}
