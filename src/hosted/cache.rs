//! Hosted Data Cache
//!
//! Bounded FIFO of fetched fragments with age-based pruning.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::item::HostedDataLayerCacheItem;

// == Hosted Data Cache ==
/// Entries in insertion order:
/// - Front = oldest, evicted first
/// - Back = most recently inserted
#[derive(Debug, Clone, Default)]
pub struct HostedDataCache {
    entries: VecDeque<HostedDataLayerCacheItem>,
    max_size: usize,
}

impl HostedDataCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_size,
        }
    }

    /// Rebuilds a cache from persisted entries, keeping the newest when the
    /// list is larger than `max_size`.
    pub fn from_items(items: Vec<HostedDataLayerCacheItem>, max_size: usize) -> Self {
        let mut cache = Self::new(max_size);
        for item in items {
            cache.insert(item);
        }
        cache
    }

    // == Insert ==
    /// Appends an entry, replacing any entry with the same id.
    ///
    /// Returns the ids evicted to stay within `max_size`.
    pub fn insert(&mut self, item: HostedDataLayerCacheItem) -> Vec<String> {
        self.entries.retain(|existing| existing.id != item.id);
        self.entries.push_back(item);

        let mut evicted = Vec::new();
        while self.entries.len() > self.max_size {
            match self.entries.pop_front() {
                Some(oldest) => evicted.push(oldest.id),
                None => break,
            }
        }
        evicted
    }

    pub fn get(&self, id: &str) -> Option<&HostedDataLayerCacheItem> {
        self.entries.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    // == Expire ==
    /// Drops entries retrieved at or before `since`, returning their ids.
    pub fn expire(&mut self, since: DateTime<Utc>) -> Vec<String> {
        let mut expired = Vec::new();
        self.entries.retain(|item| {
            let keep = item.is_newer_than(since);
            if !keep {
                expired.push(item.id.clone());
            }
            keep
        });
        expired
    }

    pub fn to_items(&self) -> Vec<HostedDataLayerCacheItem> {
        self.entries.iter().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|item| item.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::{json, Map};

    fn item(id: &str, retrieved_at: DateTime<Utc>) -> HostedDataLayerCacheItem {
        let mut data = Map::new();
        data.insert("id".to_string(), json!(id));
        HostedDataLayerCacheItem::new(id, data, retrieved_at)
    }

    #[test]
    fn test_cache_new() {
        let cache = HostedDataCache::new(3);
        assert!(cache.is_empty());
        assert_eq!(cache.max_size(), 3);
    }

    #[test]
    fn test_insert_over_capacity_evicts_oldest() {
        let now = Utc::now();
        let mut cache = HostedDataCache::new(3);
        assert!(cache.insert(item("a", now)).is_empty());
        assert!(cache.insert(item("b", now)).is_empty());
        assert!(cache.insert(item("c", now)).is_empty());

        let evicted = cache.insert(item("d", now));
        assert_eq!(evicted, vec!["a".to_string()]);
        assert_eq!(cache.ids(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_insert_same_id_replaces() {
        let now = Utc::now();
        let mut cache = HostedDataCache::new(3);
        cache.insert(item("a", now));
        cache.insert(item("b", now));
        cache.insert(item("a", now + Duration::seconds(5)));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.ids(), vec!["b", "a"]);
        assert_eq!(cache.get("a").unwrap().retrieved_at, now + Duration::seconds(5));
    }

    #[test]
    fn test_expire_drops_old_entries() {
        let now = Utc::now();
        let mut cache = HostedDataCache::new(5);
        cache.insert(item("old", now - Duration::days(8)));
        cache.insert(item("edge", now - Duration::days(7)));
        cache.insert(item("fresh", now - Duration::days(1)));

        let expired = cache.expire(now - Duration::days(7));
        assert_eq!(expired, vec!["old".to_string(), "edge".to_string()]);
        assert!(cache.contains("fresh"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_from_items_keeps_newest() {
        let now = Utc::now();
        let items = vec![item("a", now), item("b", now), item("c", now)];
        let cache = HostedDataCache::from_items(items, 2);
        assert_eq!(cache.ids(), vec!["b", "c"]);
    }

    #[test]
    fn test_zero_capacity_holds_nothing() {
        let mut cache = HostedDataCache::new(0);
        assert_eq!(cache.insert(item("a", Utc::now())), vec!["a".to_string()]);
        assert!(cache.is_empty());
    }
}
