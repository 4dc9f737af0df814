#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## The Midpoint Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                                                                             │
//! │   HEAD ◀──▶ [hot] ◀──▶ [hot] ◀──▶ [COLD] ◀──▶ [cold] ◀──▶ [cold] ◀──▶ TAIL  │
//! │             └───── hot ─────┘      ▲   └──────── cold ────────┘             │
//! │                                 boundary                                    │
//! │                                                                             │
//! │   get(hit)  → entry moves to HEAD (a cold entry turns hot)                  │
//! │   put(new)  → entry enters just before the boundary, as hot                 │
//! │   full      → entry before TAIL is evicted                                  │
//! │   always    → hot - cold ∈ {0, 1}, one boundary step per operation          │
//! │                                                                             │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Reference
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MidpointCache`] | Serialized cache, exact balance after every call |
//! | [`MidpointPolicy`](midpoint::MidpointPolicy) | The serialized eviction engine without the key index |
//! | `ConcurrentMidpointCache` | Shared cache with deferred promotions (requires `concurrent`) |
//! | [`MidpointCacheMetrics`] | Hits by temperature, promotions, boundary shifts |
//!
//! ## Serialized Cache
//!
//! ```rust
//! use midpoint_cache::{MidpointCache, Temperature};
//! use midpoint_cache::config::MidpointCacheConfig;
//! use core::num::NonZeroUsize;
//!
//! let config = MidpointCacheConfig::new(NonZeroUsize::new(4).unwrap());
//! let mut cache: MidpointCache<&str, i32> = MidpointCache::init(config, None);
//! for key in ["A", "B", "C", "D"] {
//!     cache.put(key, 0);
//! }
//! assert_eq!(cache.temperature(&"D"), Some(Temperature::Cold));
//!
//! cache.get(&"D");  // cold hit: D moves to the head and turns hot
//! assert_eq!(cache.temperature(&"D"), Some(Temperature::Hot));
//! assert_eq!((cache.hot_len(), cache.cold_len()), (2, 2));
//! cache.check_invariants().unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`meta`]: temperatures and the hot/cold balance rule
//! - [`midpoint`]: the serialized policy and cache
//! - [`config`]: configuration structures for both caches
//! - [`error`]: configuration and invariant errors
//! - [`metrics`]: metrics collection for cache performance monitoring
//! - `concurrent`: the thread-safe cache (requires the `concurrent` feature)

#![no_std]

extern crate alloc;

#[cfg(any(feature = "std", not(feature = "hashbrown")))]
extern crate std;

/// Temperature and hot/cold split types.
///
/// Provides the balance rule shared by both list implementations:
/// - `Temperature`: which side of the boundary an entry is on
/// - `Split`: hot and cold counters
/// - `Shift`: one step of boundary movement
pub mod meta;

/// Arena-backed recency list with a movable boundary.
///
/// **Note**: This module is internal infrastructure. Use the cache types
/// instead.
pub(crate) mod list;

/// Cache configuration structures.
pub mod config;

/// Configuration and invariant errors.
pub mod error;

/// Serialized midpoint cache implementation.
///
/// Provides a fixed-size cache that admits new entries at the midpoint of
/// its recency list and evicts from the cold tail.
pub mod midpoint;

/// Cache metrics system.
///
/// Provides the common counters, the midpoint-specific counters and the
/// [`CacheMetrics`](metrics::CacheMetrics) reporting trait.
pub mod metrics;

/// Concurrent midpoint cache implementation.
///
/// Provides a thread-safe cache whose recency list is updated under
/// per-pointer spin flags, with promotions applied by a background pool.
///
/// Available when the `concurrent` feature is enabled.
#[cfg(feature = "concurrent")]
pub mod concurrent;

// Re-export cache types
pub use midpoint::MidpointCache;

// Re-export metadata types
pub use meta::{Shift, Split, Temperature};

pub use error::{ConfigError, InvariantError};
pub use metrics::{CacheMetrics, MidpointCacheMetrics};

#[cfg(feature = "concurrent")]
pub use concurrent::ConcurrentMidpointCache;
