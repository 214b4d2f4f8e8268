//! LRU cache (§4.6): size- and optionally TTL-bounded, with hit/miss/
//! eviction statistics.

use indexmap::IndexMap;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed_at: Instant,
    access_count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Ordered by recency of access: the front is least-recently-used, the
/// back is most-recently-used. Eviction pops from the front.
pub struct LruCache<K: std::hash::Hash + Eq + Clone, V> {
    entries: IndexMap<K, Entry<V>>,
    max_size: usize,
    ttl: Option<Duration>,
    stats: CacheStats,
}

impl<K: std::hash::Hash + Eq + Clone, V> LruCache<K, V> {
    pub fn new(max_size: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: IndexMap::new(),
            max_size: max_size.max(1),
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn put(&mut self, key: K, value: V) {
        let now = Instant::now();
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_accessed_at: now,
                access_count: 0,
            },
        );
        while self.entries.len() > self.max_size {
            self.entries.shift_remove_index(0);
            self.stats.evictions += 1;
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        if let Some(ttl) = self.ttl {
            if let Some(entry) = self.entries.get(key) {
                if entry.inserted_at.elapsed() > ttl {
                    self.entries.shift_remove(key);
                    self.stats.evictions += 1;
                    self.stats.misses += 1;
                    return None;
                }
            }
        }

        match self.entries.shift_remove_entry(key) {
            Some((k, mut entry)) => {
                entry.last_accessed_at = Instant::now();
                entry.access_count += 1;
                self.entries.insert(k.clone(), entry);
                self.stats.hits += 1;
                self.entries.get(&k).map(|e| &e.value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Removes every entry older than the TTL; a no-op if no TTL is
    /// configured.
    pub fn prune(&mut self) -> usize {
        let Some(ttl) = self.ttl else { return 0 };
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| e.inserted_at.elapsed() > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.entries.shift_remove(key);
        }
        self.stats.evictions += expired.len() as u64;
        expired.len()
    }

    /// Rough resident size: one `(K, V, bookkeeping)` slot per entry.
    pub fn memory_usage_estimate(&self) -> usize {
        self.entries.len() * (std::mem::size_of::<K>() + std::mem::size_of::<V>() + 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_when_over_capacity() {
        let mut cache = LruCache::new(2, None);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.get(&"a"); // touch a, so b becomes LRU
        cache.put("c", 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&"a").is_some());
        assert!(cache.get(&"c").is_some());
    }

    #[test]
    fn expired_entries_are_treated_as_misses() {
        let mut cache = LruCache::new(10, Some(Duration::from_millis(1)));
        cache.put("a", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&"a").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn hit_rate_reflects_access_pattern() {
        let mut cache = LruCache::new(10, None);
        cache.put("a", 1);
        cache.get(&"a");
        cache.get(&"missing");
        assert_eq!(cache.stats().hit_rate(), 0.5);
    }
}
