use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::time::Instant;

use super::{key::CallKey, policy::MethodClass};

/// One stored daemon response.
///
/// Fresh until `expires_at`; afterwards it stays readable through
/// [`CacheStore::get_stale`] until overwritten or evicted by capacity.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: Instant,
    pub expires_at: Instant,
    pub class: MethodClass,
}

impl CacheEntry {
    #[must_use]
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub stale_served: u64,
}

/// Bounded key → value map with explicit per-entry expiry.
///
/// Capacity overflow evicts the least recently used entry, expired or not.
pub struct CacheStore {
    entries: Mutex<LruCache<CallKey, CacheEntry>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_served: AtomicU64,
}

impl CacheStore {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_served: AtomicU64::new(0),
        }
    }

    /// Returns the value only while it is still fresh.
    pub fn get_fresh(&self, key: &CallKey) -> Option<Value> {
        let now = Instant::now();
        let value = {
            let mut entries = self.entries.lock();
            entries.get(key).filter(|entry| entry.is_fresh(now)).map(|entry| entry.value.clone())
        };

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Returns the last stored value regardless of expiry.
    pub fn get_stale(&self, key: &CallKey) -> Option<Value> {
        let value = self.entries.lock().get(key).map(|entry| entry.value.clone());
        if value.is_some() {
            self.stale_served.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Stores `value` as fresh for `ttl`, replacing any previous entry for the key.
    pub fn insert(&self, key: CallKey, value: Value, ttl: Duration, class: MethodClass) {
        let now = Instant::now();
        let entry = CacheEntry { value, stored_at: now, expires_at: now + ttl, class };
        let evicted = self.entries.lock().push(key, entry);

        if let Some((evicted_key, _)) = evicted {
            tracing::trace!(key = %evicted_key, "cache entry evicted by capacity");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(hash: &str) -> CallKey {
        CallKey::new("getblock", &[json!(hash), json!(2)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_after_write_returns_value_unchanged() {
        let store = CacheStore::new(16);
        let value = json!({"height": 100, "tx": ["abc"]});
        store.insert(key("00ab"), value.clone(), Duration::from_secs(60), MethodClass::Immutable);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get_fresh(&key("00ab")), Some(value));
        assert_eq!(store.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_still_served_stale_until_overwritten() {
        let store = CacheStore::new(16);
        let original = json!({"height": 100});
        store.insert(key("00ab"), original.clone(), Duration::from_secs(3600), MethodClass::Immutable);

        tokio::time::advance(Duration::from_secs(3601)).await;
        assert_eq!(store.get_fresh(&key("00ab")), None);
        assert_eq!(store.get_stale(&key("00ab")), Some(original));

        let replacement = json!({"height": 100, "confirmations": 2});
        store.insert(key("00ab"), replacement.clone(), Duration::from_secs(3600), MethodClass::Immutable);
        assert_eq!(store.get_fresh(&key("00ab")), Some(replacement));

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.stale_served, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let store = CacheStore::new(2);
        let ttl = Duration::from_secs(60);
        store.insert(key("a"), json!(1), ttl, MethodClass::Default);
        store.insert(key("b"), json!(2), ttl, MethodClass::Default);
        assert!(store.get_fresh(&key("a")).is_some());

        store.insert(key("c"), json!(3), ttl, MethodClass::Default);
        assert_eq!(store.len(), 2);
        assert!(store.get_stale(&key("b")).is_none());
        assert!(store.get_stale(&key("a")).is_some());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let store = CacheStore::new(0);
        store.insert(key("a"), json!(1), Duration::from_secs(1), MethodClass::Default);
        assert_eq!(store.stats().capacity, 1);
        assert_eq!(store.len(), 1);
    }
}
