//! Watermarks for cache freshness comparison.
//!
//! A watermark is a timestamp used purely for ordering. It is either the
//! backend's last-update time of an entity or an expiry instant computed
//! from a TTL; the cache does not care which.

use psnsync_core::UnixTimestamp;
use serde::{Deserialize, Serialize};

/// A point in the freshness history of a cached entity.
///
/// Watermarks are compared, never interpreted as wall-clock precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark {
    timestamp: UnixTimestamp,
}

impl Watermark {
    /// Create a watermark at the given timestamp.
    pub fn new(timestamp: UnixTimestamp) -> Self {
        Self { timestamp }
    }

    /// Create a zero watermark (beginning of time).
    pub fn zero() -> Self {
        Self { timestamp: 0 }
    }

    /// Watermark for an entry written at `now` that must expire after `ttl_secs`.
    pub fn expiring_after(now: UnixTimestamp, ttl_secs: i64) -> Self {
        Self {
            timestamp: now.saturating_add(ttl_secs),
        }
    }

    pub fn timestamp(&self) -> UnixTimestamp {
        self.timestamp
    }

    /// Check if this watermark is newer than another.
    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.timestamp > other.timestamp
    }

    /// Check if this watermark is at least as fresh as another.
    pub fn is_at_least(&self, other: &Watermark) -> bool {
        self.timestamp >= other.timestamp
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<UnixTimestamp> for Watermark {
    fn from(timestamp: UnixTimestamp) -> Self {
        Self::new(timestamp)
    }
}
