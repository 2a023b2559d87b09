//! Host persistence port and the slots that bind a cache to it.

use crate::codec;
use crate::timestamped::TimestampedCache;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Persisted key of the trophy cache (keyed by communication id).
pub const TROPHIES_CACHE_KEY: &str = "trophies";

/// Persisted key of the trophy-title-info cache (keyed by game id).
pub const TROPHY_TITLE_INFO_CACHE_KEY: &str = "trophy_title_info";

/// Persisted key of the pre-TTL communication id map. Only ever deleted.
pub const LEGACY_COMMUNICATION_IDS_CACHE_KEY: &str = "communication_ids";

/// A cache shared between the session's components.
pub type SharedCache<K, V> = Arc<tokio::sync::RwLock<TimestampedCache<K, V>>>;

/// Opaque blob storage provided by the host.
///
/// Blobs are written after an import or title resolution and read once at
/// session handshake.
pub trait CachePersistence: Send + Sync {
    fn restore(&self, key: &str) -> Option<String>;

    fn persist(&self, key: &str, blob: String);

    fn remove(&self, key: &str);
}

/// In-memory persistence for testing and for hosts without storage.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    blobs: RwLock<HashMap<String, String>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().contains_key(key)
    }
}

impl CachePersistence for InMemoryPersistence {
    fn restore(&self, key: &str) -> Option<String> {
        self.blobs.read().get(key).cloned()
    }

    fn persist(&self, key: &str, blob: String) {
        self.blobs.write().insert(key.to_string(), blob);
    }

    fn remove(&self, key: &str) {
        self.blobs.write().remove(key);
    }
}

/// A shared cache bound to its persisted key.
pub struct CacheSlot<K, V>
where
    K: Eq + Hash,
{
    key: &'static str,
    cache: SharedCache<K, V>,
    persistence: Arc<dyn CachePersistence>,
}

impl<K, V> Clone for CacheSlot<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            cache: Arc::clone(&self.cache),
            persistence: Arc::clone(&self.persistence),
        }
    }
}

impl<K, V> CacheSlot<K, V>
where
    K: Serialize + DeserializeOwned + Eq + Hash,
    V: Serialize + DeserializeOwned,
{
    pub fn new(key: &'static str, persistence: Arc<dyn CachePersistence>) -> Self {
        Self {
            key,
            cache: Arc::new(tokio::sync::RwLock::new(TimestampedCache::new())),
            persistence,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn cache(&self) -> &SharedCache<K, V> {
        &self.cache
    }

    /// Replace the in-memory cache with the persisted copy, or an empty one.
    pub async fn restore(&self) {
        let blob = self.persistence.restore(self.key);
        let restored = codec::restore_or_cold(blob.as_deref(), self.key);
        *self.cache.write().await = restored;
    }

    /// Write the current cache through the persistence port.
    ///
    /// Encode failures are logged; the in-memory cache is untouched.
    pub async fn persist(&self) {
        let encoded = {
            let cache = self.cache.read().await;
            codec::encode(&cache)
        };
        match encoded {
            Ok(blob) => self.persistence.persist(self.key, blob),
            Err(e) => {
                tracing::error!(cache = self.key, error = %e, "Cannot serialize cache");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::Watermark;

    #[tokio::test]
    async fn test_slot_persist_then_restore() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let slot: CacheSlot<String, Vec<String>> =
            CacheSlot::new(TROPHY_TITLE_INFO_CACHE_KEY, persistence.clone());

        slot.cache()
            .write()
            .await
            .update("CUSA1".to_string(), vec!["NPWR1".to_string()], Watermark::new(42));
        slot.persist().await;
        assert!(persistence.contains(TROPHY_TITLE_INFO_CACHE_KEY));

        let fresh: CacheSlot<String, Vec<String>> =
            CacheSlot::new(TROPHY_TITLE_INFO_CACHE_KEY, persistence);
        fresh.restore().await;
        let cache = fresh.cache().read().await;
        assert_eq!(
            cache.get(&"CUSA1".to_string(), Watermark::new(42)),
            Some(&vec!["NPWR1".to_string()])
        );
    }

    #[tokio::test]
    async fn test_slot_restore_corrupt_blob_is_cold() {
        let persistence = Arc::new(InMemoryPersistence::new());
        persistence.persist(TROPHIES_CACHE_KEY, "definitely not a cache".to_string());

        let slot: CacheSlot<String, u32> = CacheSlot::new(TROPHIES_CACHE_KEY, persistence);
        slot.cache()
            .write()
            .await
            .update("stale".to_string(), 1, Watermark::new(1));
        slot.restore().await;
        assert!(slot.cache().read().await.is_empty());
    }

    #[test]
    fn test_in_memory_remove() {
        let persistence = InMemoryPersistence::new();
        persistence.persist(LEGACY_COMMUNICATION_IDS_CACHE_KEY, "{}".to_string());
        assert!(persistence.contains(LEGACY_COMMUNICATION_IDS_CACHE_KEY));
        persistence.remove(LEGACY_COMMUNICATION_IDS_CACHE_KEY);
        assert_eq!(persistence.restore(LEGACY_COMMUNICATION_IDS_CACHE_KEY), None);
    }
}
