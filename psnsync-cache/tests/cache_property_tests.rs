use proptest::prelude::*;
use psnsync_cache::{codec, TimestampedCache, Watermark};

fn apply(updates: &[(u8, u32, i64)]) -> TimestampedCache<u8, u32> {
    let mut cache = TimestampedCache::new();
    for (key, value, ts) in updates {
        cache.update(*key, *value, Watermark::new(*ts));
    }
    cache
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The stored watermark of every key is the max watermark written to it,
    /// and the value is the first one written with that max.
    #[test]
    fn prop_max_watermark_wins(updates in prop::collection::vec((0u8..4, any::<u32>(), 0i64..50), 1..40)) {
        let cache = apply(&updates);

        for key in 0u8..4 {
            let writes: Vec<_> = updates.iter().filter(|(k, _, _)| *k == key).collect();
            match writes.iter().map(|(_, _, ts)| *ts).max() {
                None => prop_assert!(cache.entry(&key).is_none()),
                Some(max_ts) => {
                    let expected = writes
                        .iter()
                        .find(|(_, _, ts)| *ts == max_ts)
                        .map(|(_, v, _)| *v);
                    let entry = cache.entry(&key).expect("written key must be present");
                    prop_assert_eq!(entry.watermark(), Watermark::new(max_ts));
                    prop_assert_eq!(Some(*entry.value()), expected);
                }
            }
        }
    }

    /// `get(k, w)` hits iff some update for k carried a watermark >= w.
    #[test]
    fn prop_get_hits_iff_fresh_enough(
        updates in prop::collection::vec((0u8..4, any::<u32>(), 0i64..50), 0..30),
        key in 0u8..4,
        probe in 0i64..60,
    ) {
        let cache = apply(&updates);
        let fresh_enough = updates.iter().any(|(k, _, ts)| *k == key && *ts >= probe);
        prop_assert_eq!(cache.get(&key, Watermark::new(probe)).is_some(), fresh_enough);
    }

    /// Applying a stale write after a newer one never changes the cache.
    #[test]
    fn prop_stale_write_is_noop(value_a in any::<u32>(), value_b in any::<u32>(), t1 in 1i64..1000, delta in 0i64..1000) {
        let mut cache = TimestampedCache::new();
        cache.update("k", value_a, Watermark::new(t1));
        let before = cache.clone();
        let applied = cache.update("k", value_b, Watermark::new(t1 - delta));
        prop_assert!(!applied);
        prop_assert_eq!(cache, before);
    }

    #[test]
    fn prop_codec_preserves_lookups(updates in prop::collection::vec((0u8..8, any::<u32>(), 0i64..100), 0..30)) {
        let cache = apply(&updates);
        let blob = codec::encode(&cache).expect("encode should succeed");
        let restored: TimestampedCache<u8, u32> = codec::decode(&blob).expect("decode should succeed");
        for key in 0u8..8 {
            prop_assert_eq!(
                restored.entry(&key).map(|e| (e.watermark(), *e.value())),
                cache.entry(&key).map(|e| (e.watermark(), *e.value()))
            );
        }
    }
}
