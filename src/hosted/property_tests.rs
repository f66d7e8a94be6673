//! Property-Based Tests for the hosted data cache

use proptest::prelude::*;
use std::collections::HashSet;

use chrono::{Duration, TimeZone, Utc};
use serde_json::Map;

use crate::hosted::{HostedDataCache, HostedDataLayerCacheItem};

fn id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}"
}

fn item(id: String, offset_secs: i64) -> HostedDataLayerCacheItem {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    HostedDataLayerCacheItem::new(id, Map::new(), base + Duration::seconds(offset_secs))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Size never exceeds the bound and ids stay unique.
    #[test]
    fn prop_cache_bounded_and_unique(
        max_size in 0usize..20,
        ids in prop::collection::vec(id_strategy(), 0..100),
    ) {
        let mut cache = HostedDataCache::new(max_size);
        for (index, id) in ids.into_iter().enumerate() {
            cache.insert(item(id, index as i64));
            prop_assert!(cache.len() <= max_size);
        }
        let unique: HashSet<String> = cache.ids().into_iter().collect();
        prop_assert_eq!(unique.len(), cache.len());
    }

    // Inserting one more distinct id than fits evicts exactly the oldest.
    #[test]
    fn prop_overflow_evicts_oldest(max_size in 1usize..30) {
        let mut cache = HostedDataCache::new(max_size);
        for index in 0..max_size {
            let evicted = cache.insert(item(format!("id{}", index), index as i64));
            prop_assert!(evicted.is_empty());
        }
        let evicted = cache.insert(item("overflow".to_string(), max_size as i64));
        prop_assert_eq!(evicted, vec!["id0".to_string()]);
        prop_assert_eq!(cache.len(), max_size);
        prop_assert!(cache.contains("overflow"));
    }

    // After expiry only entries newer than the cutoff remain.
    #[test]
    fn prop_expire_respects_cutoff(
        offsets in prop::collection::vec(0i64..1000, 0..40),
        cutoff in 0i64..1000,
    ) {
        let mut cache = HostedDataCache::new(usize::MAX);
        for (index, offset) in offsets.iter().enumerate() {
            cache.insert(item(format!("id{}", index), *offset));
        }
        let since = item(String::new(), cutoff).retrieved_at;
        cache.expire(since);
        for remaining in cache.to_items() {
            prop_assert!(remaining.retrieved_at > since);
        }
        let expected = offsets.iter().filter(|offset| **offset > cutoff).count();
        prop_assert_eq!(cache.len(), expected);
    }
}
