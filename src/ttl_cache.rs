// TTL cache - bounded in-memory memo for upstream responses and catalogs.
// Injected through constructors; nothing in the crate keeps module-level caches.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::metrics;

/// Minimal cache contract the SDK components depend on.
pub trait KeyValueCache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn set(&self, key: K, value: V);
    fn invalidate(&self, key: &K) -> bool;
    fn clear(&self);
}

#[derive(Clone, Debug)]
struct CachedEntry<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

/// LRU-bounded cache whose entries expire `ttl` after insertion.
pub struct TtlCache<K: Hash + Eq, V> {
    name: &'static str,
    entries: Mutex<LruCache<K, CachedEntry<V>>>,
    ttl: Duration,
    counters: CacheCounters,
}

#[derive(Debug, Clone)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub cache_size: usize,
    pub expirations: u64,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(name: &'static str, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            counters: CacheCounters::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, CachedEntry<V>>> {
        // a panic while holding the lock cannot leave an entry half-written
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheMetricsSnapshot {
            hits,
            misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            cache_size: self.len(),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> KeyValueCache<K, V> for TtlCache<K, V>
where
    K: Hash + Eq + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let fresh = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                self.counters.expirations.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => None,
        };
        match fresh {
            Some(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::increment_cache_hit(self.name);
                Some(value)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::increment_cache_miss(self.name);
                None
            }
        }
    }

    fn set(&self, key: K, value: V) {
        let mut entries = self.lock();
        entries.put(
            key,
            CachedEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        metrics::set_cache_size(self.name, entries.len() as f64);
    }

    fn invalidate(&self, key: &K) -> bool {
        self.lock().pop(key).is_some()
    }

    fn clear(&self) {
        self.lock().clear();
        metrics::set_cache_size(self.name, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_invalidate() {
        let cache: TtlCache<String, u32> = TtlCache::new("test", 10, Duration::from_secs(60));
        assert_eq!(cache.get(&"a".to_string()), None);
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert!(cache.invalidate(&"a".to_string()));
        assert!(!cache.invalidate(&"a".to_string()));
        assert_eq!(cache.get(&"a".to_string()), None);

        let snapshot = cache.metrics();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 2);
    }

    #[test]
    fn test_entries_expire() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", 10, Duration::from_millis(0));
        cache.set(1, 1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.metrics().expirations, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", 2, Duration::from_secs(60));
        cache.set(1, 1);
        cache.set(2, 2);
        assert_eq!(cache.get(&1), Some(1));
        cache.set(3, 3);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.len(), 2);
    }
}
