//! A bounded, TTL-expiring cache of recent [`AccessResult`]s.
//!
//! Entries live in a [`dashmap::DashMap`] for lock-free reads/writes; eviction order
//! is tracked separately by an [`lru::LruCache`] guarded by a [`parking_lot::Mutex`]
//! so the map never grows past its configured capacity regardless of TTL.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;

use super::access::AccessResult;

struct Entry {
    result: AccessResult,
    inserted_at: Instant,
}

/// Cache of `cache_key -> AccessResult`, keyed by [`super::access::AccessRequest::cache_key`].
pub struct PermissionCache {
    ttl: Duration,
    entries: DashMap<String, Entry>,
    order: Mutex<LruCache<String, ()>>,
}

impl PermissionCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        const ONE: NonZeroUsize = NonZeroUsize::MIN;
        let capacity = NonZeroUsize::new(capacity).unwrap_or(ONE);
        Self {
            ttl,
            entries: DashMap::new(),
            order: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<AccessResult> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            self.order.lock().pop(key);
            return None;
        }
        self.order.lock().get_or_insert(key.to_string(), || ());
        self.entries.get(key).map(|e| e.result.clone())
    }

    pub fn set(&self, key: String, result: AccessResult) {
        let evicted = self.order.lock().push(key.clone(), ());
        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                self.entries.remove(&evicted_key);
            }
        }
        self.entries.insert(
            key,
            Entry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.order.lock().clear();
    }

    pub fn cleanup_expired(&self) {
        let ttl = self.ttl;
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.inserted_at.elapsed() >= ttl)
            .map(|entry| entry.key().clone())
            .collect();
        for key in expired {
            self.entries.remove(&key);
            self.order.lock().pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let cache = PermissionCache::new(Duration::from_secs(60), 10);
        cache.set("k".to_string(), AccessResult::allow("ok"));
        assert!(cache.get("k").is_some());
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let cache = PermissionCache::new(Duration::from_millis(1), 10);
        cache.set("k".to_string(), AccessResult::allow("ok"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn capacity_overflow_evicts_oldest() {
        let cache = PermissionCache::new(Duration::from_secs(60), 2);
        cache.set("a".to_string(), AccessResult::allow("a"));
        cache.set("b".to_string(), AccessResult::allow("b"));
        cache.set("c".to_string(), AccessResult::allow("c"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
    }
}
