//! Error types for the midpoint caches.
//!
//! Cache operations themselves never fail: a miss is `None` and removing an
//! absent key does nothing. Errors only come from two places:
//!
//! - [`ConfigError`]: a fallible constructor was given a zero capacity, worker
//!   count or queue bound.
//! - [`InvariantError`]: `check_invariants` found the recency list, its
//!   counters or its backing map in a state no sequence of operations should
//!   produce.
//!
//! ```
//! use midpoint_cache::error::ConfigError;
//! use midpoint_cache::MidpointCache;
//!
//! let err = MidpointCache::<u64, u64>::try_new(0).unwrap_err();
//! assert_eq!(err, ConfigError::ZeroCapacity);
//! ```

use alloc::string::String;
use thiserror::Error;

/// Invalid cache configuration.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The cache must be able to hold at least one entry.
    #[error("capacity must be greater than zero")]
    ZeroCapacity,

    /// The refresh pool needs at least one worker thread.
    #[error("refresh worker count must be greater than zero")]
    ZeroWorkers,

    /// The refresh queue must accept at least one pending promotion.
    #[error("refresh queue bound must be greater than zero")]
    ZeroQueue,
}

/// A structural invariant of a recency list or cache façade was violated.
///
/// Carries a description of the property that failed, e.g. which node sits on
/// the wrong side of the boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Returns `Err(InvariantError)` with a formatted message unless `cond` holds.
macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::InvariantError::new(alloc::format!($($arg)+)));
        }
    };
}

pub(crate) use ensure;
