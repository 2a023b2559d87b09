//! Freshness-gated caches for trophy data and trophy-title metadata.
//!
//! A [`TimestampedCache`] stores each value together with a [`Watermark`].
//! A lookup names the watermark the caller needs; the cached value is only
//! returned when the stored watermark is at least that fresh. Writes never
//! move a key's watermark backwards.
//!
//! The same structure serves two policies:
//!
//! - Server-supplied watermarks: trophies keyed by communication id carry the
//!   backend's "last update" time. A newer server time invalidates the entry.
//! - Expiry watermarks: trophy-title info keyed by game id is written with
//!   `now + ttl` and read with `now`, which turns the watermark into a TTL.
//!
//! # Persistence
//!
//! Caches survive restarts through the host's [`CachePersistence`] port as
//! opaque blobs produced by [`codec::encode`]. A blob that fails to decode
//! yields a cold cache, never a partially filled one.
//!
//! # Example
//!
//! ```
//! use psnsync_cache::{TimestampedCache, Watermark};
//!
//! let mut cache: TimestampedCache<String, u32> = TimestampedCache::new();
//! cache.update("a".to_string(), 1, Watermark::new(100));
//! assert_eq!(cache.get(&"a".to_string(), Watermark::new(100)), Some(&1));
//! assert_eq!(cache.get(&"a".to_string(), Watermark::new(101)), None);
//! ```

pub mod clock;
pub mod codec;
pub mod persistence;
pub mod timestamped;
pub mod watermark;

pub use clock::{Clock, SystemClock};
pub use persistence::{
    CachePersistence, CacheSlot, InMemoryPersistence, SharedCache,
    LEGACY_COMMUNICATION_IDS_CACHE_KEY, TROPHIES_CACHE_KEY, TROPHY_TITLE_INFO_CACHE_KEY,
};
pub use timestamped::{CacheEntry, CacheStats, TimestampedCache};
pub use watermark::Watermark;
