//! Opaque encode/decode of caches for host persistence.
//!
//! The blob is base64 over JSON. The host treats it as an uninterpreted
//! string; only this module knows its shape.

use crate::timestamped::TimestampedCache;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use psnsync_core::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::hash::Hash;

pub fn encode<K, V>(cache: &TimestampedCache<K, V>) -> Result<String, CodecError>
where
    K: Serialize + Eq + Hash,
    V: Serialize,
{
    let json = serde_json::to_vec(cache).map_err(|e| CodecError::Encode {
        reason: e.to_string(),
    })?;
    Ok(STANDARD.encode(json))
}

pub fn decode<K, V>(blob: &str) -> Result<TimestampedCache<K, V>, CodecError>
where
    K: DeserializeOwned + Eq + Hash,
    V: DeserializeOwned,
{
    let bytes = STANDARD
        .decode(blob.trim())
        .map_err(|e| CodecError::Decode {
            reason: e.to_string(),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| CodecError::Decode {
        reason: e.to_string(),
    })
}

/// Decode a persisted blob, falling back to an empty cache.
///
/// Decode failures are logged and never leave partial data behind.
pub fn restore_or_cold<K, V>(blob: Option<&str>, cache_name: &str) -> TimestampedCache<K, V>
where
    K: DeserializeOwned + Eq + Hash,
    V: DeserializeOwned,
{
    let Some(blob) = blob else {
        tracing::debug!(cache = cache_name, "No persisted cache; starting cold");
        return TimestampedCache::new();
    };

    match decode(blob) {
        Ok(cache) => {
            tracing::debug!(cache = cache_name, entries = cache.len(), "Restored persisted cache");
            cache
        }
        Err(e) => {
            tracing::warn!(cache = cache_name, error = %e, "Cannot deserialize cache; starting cold");
            TimestampedCache::new()
        }
    }
}
