//! Cache Configuration Module
//!
//! Configuration structures for the two midpoint cache variants. Fields are
//! private; required parameters go through `new` (or the fallible `try_new`)
//! and optional ones through `with_*` builders.
//!
//! | Config | Cache | Description |
//! |--------|-------|-------------|
//! | `MidpointCacheConfig` | [`MidpointCache`](crate::MidpointCache) | Serialized, `&mut self` |
//! | `ConcurrentMidpointCacheConfig` | `ConcurrentMidpointCache` | Shared, `&self`, background promotions (requires `concurrent`) |
//!
//! # Examples
//!
//! ```
//! use midpoint_cache::config::MidpointCacheConfig;
//! use midpoint_cache::MidpointCache;
//! use core::num::NonZeroUsize;
//!
//! let config = MidpointCacheConfig::new(NonZeroUsize::new(1000).unwrap());
//! let cache: MidpointCache<String, i32> = MidpointCache::init(config, None);
//! assert_eq!(cache.cap().get(), 1000);
//! ```

pub mod midpoint;

#[cfg(feature = "concurrent")]
pub mod concurrent_midpoint;

pub use midpoint::MidpointCacheConfig;

#[cfg(feature = "concurrent")]
pub use concurrent_midpoint::{
    ConcurrentMidpointCacheConfig, DEFAULT_REFRESH_QUEUE, DEFAULT_REFRESH_WORKERS,
};
