//! Configuration for the serialized midpoint cache.

use crate::error::ConfigError;
use core::fmt;
use core::num::NonZeroUsize;

/// Configuration for a [`MidpointCache`](crate::MidpointCache).
///
/// # Examples
///
/// ```
/// use midpoint_cache::config::MidpointCacheConfig;
/// use core::num::NonZeroUsize;
///
/// let config = MidpointCacheConfig::new(NonZeroUsize::new(4).unwrap());
/// assert_eq!(config.capacity().get(), 4);
///
/// assert!(MidpointCacheConfig::try_new(0).is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MidpointCacheConfig {
    /// Maximum number of live entries
    capacity: NonZeroUsize,
}

impl MidpointCacheConfig {
    /// Creates a new configuration holding at most `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self { capacity }
    }

    /// Creates a configuration from a plain count, rejecting zero.
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        NonZeroUsize::new(capacity)
            .map(Self::new)
            .ok_or(ConfigError::ZeroCapacity)
    }

    /// Returns the maximum number of key-value pairs the cache can hold.
    #[inline]
    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }
}

impl fmt::Debug for MidpointCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidpointCacheConfig")
            .field("capacity", &self.capacity)
            .finish()
    }
}
