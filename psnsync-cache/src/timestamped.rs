//! Key-value cache gated by monotonic watermarks.

use crate::watermark::Watermark;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// A cached value and the watermark it was written with.
///
/// Value and watermark are only ever replaced together by
/// [`TimestampedCache::update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    value: V,
    watermark: Watermark,
}

impl<V> CacheEntry<V> {
    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }
}

/// Mapping from key to `(value, watermark)`.
///
/// For any key the stored watermark is the maximum ever passed to
/// [`update`](Self::update) for that key. Entries are never evicted; the
/// whole cache is replaced when a persisted copy is restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize + Eq + Hash, V: Serialize",
    deserialize = "K: Deserialize<'de> + Eq + Hash, V: Deserialize<'de>"
))]
pub struct TimestampedCache<K, V>
where
    K: Eq + Hash,
{
    entries: IndexMap<K, CacheEntry<V>>,
}

impl<K: Eq + Hash, V> Default for TimestampedCache<K, V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> TimestampedCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached value, if one was stored with a watermark at least as
    /// fresh as `watermark`.
    ///
    /// An unknown key and a stale entry are both a miss.
    pub fn get(&self, key: &K, watermark: Watermark) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|entry| entry.watermark.is_at_least(&watermark))
            .map(|entry| &entry.value)
    }

    /// Insert an unknown key, or overwrite a known one when `watermark` is
    /// strictly newer than the stored watermark.
    ///
    /// Returns whether the write was applied. An equal watermark keeps the
    /// stored value.
    pub fn update(&mut self, key: K, value: V, watermark: Watermark) -> bool {
        match self.entries.get_mut(&key) {
            Some(entry) if !watermark.is_newer_than(&entry.watermark) => false,
            Some(entry) => {
                *entry = CacheEntry { value, watermark };
                true
            }
            None => {
                self.entries.insert(key, CacheEntry { value, watermark });
                true
            }
        }
    }

    /// Stored entry regardless of freshness.
    pub fn entry(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(key, value)` pairs in insertion order.
    ///
    /// The borrow pins the cache for the lifetime of the iterator; call again
    /// to restart.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.entries.iter().map(|(key, entry)| (key, &entry.value))
    }

    /// `(key, entry)` pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &CacheEntry<V>)> + '_ {
        self.entries.iter()
    }
}

/// Hit/miss counters for a batch of lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
}

impl CacheStats {
    pub fn record<T>(&mut self, lookup: Option<T>) -> Option<T> {
        if lookup.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        lookup
    }

    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn wm(ts: i64) -> Watermark {
        Watermark::new(ts)
    }

    #[test]
    fn test_get_unknown_key_is_miss() {
        let cache: TimestampedCache<&str, u32> = TimestampedCache::new();
        assert_eq!(cache.get(&"missing", wm(0)), None);
    }

    #[test]
    fn test_get_respects_watermark() {
        let mut cache = TimestampedCache::new();
        cache.update("k", "v", wm(100));
        assert_eq!(cache.get(&"k", wm(99)), Some(&"v"));
        assert_eq!(cache.get(&"k", wm(100)), Some(&"v"));
        assert_eq!(cache.get(&"k", wm(101)), None);
    }

    #[test]
    fn test_update_older_watermark_is_dropped() {
        let mut cache = TimestampedCache::new();
        assert!(cache.update("k", 1, wm(200)));
        assert!(!cache.update("k", 2, wm(100)));
        let entry = cache.entry(&"k").expect("entry should exist");
        assert_eq!(*entry.value(), 1);
        assert_eq!(entry.watermark(), wm(200));
    }

    #[test]
    fn test_update_equal_watermark_keeps_value() {
        let mut cache = TimestampedCache::new();
        cache.update("k", 1, wm(100));
        assert!(!cache.update("k", 2, wm(100)));
        assert_eq!(cache.get(&"k", wm(100)), Some(&1));
    }

    #[test]
    fn test_update_newer_watermark_replaces() {
        let mut cache = TimestampedCache::new();
        cache.update("k", 1, wm(100));
        assert!(cache.update("k", 2, wm(200)));
        assert_eq!(cache.get(&"k", wm(150)), Some(&2));
        assert_eq!(cache.entry(&"k").map(|e| e.watermark()), Some(wm(200)));
    }

    #[test]
    fn test_iter_is_insertion_ordered_and_restartable() {
        let mut cache = TimestampedCache::new();
        cache.update("b", 2, wm(1));
        cache.update("a", 1, wm(1));
        cache.update("c", 3, wm(1));
        cache.update("b", 20, wm(5));

        let first: Vec<_> = cache.iter().map(|(k, v)| (*k, *v)).collect();
        let second: Vec<_> = cache.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(first, vec![("b", 20), ("a", 1), ("c", 3)]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_value_is_distinct_from_absent() {
        let mut cache: TimestampedCache<&str, Vec<u32>> = TimestampedCache::new();
        cache.update("dlc", Vec::new(), wm(10));
        assert_eq!(cache.get(&"dlc", wm(10)), Some(&Vec::new()));
        assert!(cache.contains_key(&"dlc"));
        assert!(!cache.contains_key(&"other"));
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.record(Some(1));
        stats.record::<u32>(None);
        stats.record(Some(2));
        stats.record::<u32>(None);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
