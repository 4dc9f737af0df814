//! Configuration for the concurrent midpoint cache.

use super::MidpointCacheConfig;
use crate::error::ConfigError;
use core::fmt;
use core::num::NonZeroUsize;

/// Refresh workers started by default.
pub const DEFAULT_REFRESH_WORKERS: usize = 2;

/// Pending promotions the refresh queue holds before callers run them inline.
pub const DEFAULT_REFRESH_QUEUE: usize = 1024;

/// Configuration for a
/// [`ConcurrentMidpointCache`](crate::concurrent::ConcurrentMidpointCache).
///
/// # Required Parameters
///
/// - `capacity`: maximum number of live entries (set in constructor)
///
/// # Optional Parameters (Builder Methods)
///
/// - `refresh_workers`: background threads applying promotions (default: 2)
/// - `refresh_queue`: bound on queued promotions (default: 1024); a `get`
///   that finds the queue full runs its promotion itself
///
/// # Examples
///
/// ```
/// use midpoint_cache::config::ConcurrentMidpointCacheConfig;
/// use core::num::NonZeroUsize;
///
/// let config = ConcurrentMidpointCacheConfig::new(NonZeroUsize::new(10_000).unwrap())
///     .with_refresh_workers(4)
///     .with_refresh_queue(4096);
/// assert_eq!(config.refresh_workers(), 4);
/// assert_eq!(config.refresh_queue(), 4096);
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ConcurrentMidpointCacheConfig {
    /// Base configuration (capacity)
    base: MidpointCacheConfig,
    /// Number of refresh worker threads
    refresh_workers: usize,
    /// Bound of the refresh queue
    refresh_queue: usize,
}

impl ConcurrentMidpointCacheConfig {
    /// Creates a new concurrent configuration with the default refresh pool.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            base: MidpointCacheConfig::new(capacity),
            refresh_workers: DEFAULT_REFRESH_WORKERS,
            refresh_queue: DEFAULT_REFRESH_QUEUE,
        }
    }

    /// Creates a configuration from plain counts, rejecting any zero.
    pub fn try_new(
        capacity: usize,
        refresh_workers: usize,
        refresh_queue: usize,
    ) -> Result<Self, ConfigError> {
        let base = MidpointCacheConfig::try_new(capacity)?;
        if refresh_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if refresh_queue == 0 {
            return Err(ConfigError::ZeroQueue);
        }
        Ok(Self {
            base,
            refresh_workers,
            refresh_queue,
        })
    }

    /// Sets the number of refresh worker threads.
    #[must_use]
    pub fn with_refresh_workers(mut self, refresh_workers: usize) -> Self {
        assert!(refresh_workers > 0, "refresh_workers must be > 0");
        self.refresh_workers = refresh_workers;
        self
    }

    /// Sets the bound of the refresh queue.
    #[must_use]
    pub fn with_refresh_queue(mut self, refresh_queue: usize) -> Self {
        assert!(refresh_queue > 0, "refresh_queue must be > 0");
        self.refresh_queue = refresh_queue;
        self
    }

    /// Returns the maximum number of live entries.
    #[inline]
    pub fn capacity(&self) -> NonZeroUsize {
        self.base.capacity()
    }

    /// Returns the number of refresh worker threads.
    #[inline]
    pub fn refresh_workers(&self) -> usize {
        self.refresh_workers
    }

    /// Returns the bound of the refresh queue.
    #[inline]
    pub fn refresh_queue(&self) -> usize {
        self.refresh_queue
    }

    /// Returns the base configuration.
    #[inline]
    pub fn base_config(&self) -> &MidpointCacheConfig {
        &self.base
    }
}

impl fmt::Debug for ConcurrentMidpointCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMidpointCacheConfig")
            .field("capacity", &self.base.capacity())
            .field("refresh_workers", &self.refresh_workers)
            .field("refresh_queue", &self.refresh_queue)
            .finish()
    }
}
