//! C5: prompt-cache simulator. A metadata emulator only — it never
//! intercepts upstream traffic, it just tracks what Claude's real cache
//! would have reported so usage fields stay plausible.

mod key;

pub use key::{cache_key, CacheKey};

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
struct CacheEntry {
    token_count: u32,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheCheckResult {
    pub hit: bool,
    pub cache_creation_tokens: u32,
    pub cache_read_tokens: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    stats: CacheStats,
}

pub struct PromptCacheSimulator {
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<Inner>,
}

impl PromptCacheSimulator {
    pub fn new(ttl_seconds: u64, max_entries: usize) -> Self {
        PromptCacheSimulator {
            ttl: Duration::seconds(ttl_seconds as i64),
            max_entries,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// §4.5 `check`: evict expired entries, then record a hit or a miss.
    pub fn check(&self, key: CacheKey, token_count: u32) -> CacheCheckResult {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        self.evict_expired(&mut inner, now);

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.last_accessed = now;
            inner.stats.hits += 1;
            return CacheCheckResult {
                hit: true,
                cache_creation_tokens: 0,
                cache_read_tokens: entry.token_count,
            };
        }

        if inner.entries.len() >= self.max_entries {
            self.evict_batch(&mut inner);
        }
        inner.entries.insert(
            key,
            CacheEntry {
                token_count,
                created_at: now,
                last_accessed: now,
            },
        );
        inner.stats.misses += 1;
        CacheCheckResult {
            hit: false,
            cache_creation_tokens: token_count,
            cache_read_tokens: 0,
        }
    }

    /// Inserts entries without marking them more recently accessed than
    /// `now`, for warming the cache from e.g. a config-driven preset.
    pub fn prewarm(&self, contents: &[(CacheKey, u32)]) {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        for &(key, token_count) in contents {
            inner.entries.entry(key).or_insert(CacheEntry {
                token_count,
                created_at: now,
                last_accessed: now,
            });
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().expect("cache lock poisoned").stats
    }

    fn evict_expired(&self, inner: &mut Inner, now: DateTime<Utc>) {
        let ttl = self.ttl;
        inner
            .entries
            .retain(|_, entry| now - entry.last_accessed <= ttl);
    }

    /// §4.5 batched LRU eviction: evicts `⌈max_entries × 10%⌉` entries
    /// ordered `(last_accessed ASC, token_count ASC)` (P-C2).
    fn evict_batch(&self, inner: &mut Inner) {
        let evict_count = self.max_entries.div_ceil(10).max(1);
        let mut keys: Vec<CacheKey> = inner.entries.keys().copied().collect();
        keys.sort_by(|a, b| {
            let ea = &inner.entries[a];
            let eb = &inner.entries[b];
            ea.last_accessed
                .cmp(&eb.last_accessed)
                .then(ea.token_count.cmp(&eb.token_count))
        });
        for key in keys.into_iter().take(evict_count) {
            inner.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(byte: u8) -> CacheKey {
        let mut k = [0u8; 32];
        k[0] = byte;
        k
    }

    #[test]
    fn miss_then_hit_reports_token_counts() {
        let cache = PromptCacheSimulator::new(60, 100);
        let key = key_of(1);
        let miss = cache.check(key, 40);
        assert!(!miss.hit);
        assert_eq!(miss.cache_creation_tokens, 40);
        assert_eq!(miss.cache_read_tokens, 0);

        let hit = cache.check(key, 40);
        assert!(hit.hit);
        assert_eq!(hit.cache_creation_tokens, 0);
        assert_eq!(hit.cache_read_tokens, 40);
    }

    #[test]
    fn stats_track_hits_and_misses_exactly() {
        let cache = PromptCacheSimulator::new(60, 100);
        cache.check(key_of(1), 10);
        cache.check(key_of(1), 10);
        cache.check(key_of(2), 20);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.total_requests(), 3);
        assert!((stats.hit_rate() - (1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn eviction_picks_oldest_then_smallest_token_count() {
        // max_entries=10 -> batch of ceil(10*0.1)=1 evicted on overflow.
        let cache = PromptCacheSimulator::new(86_400, 10);
        for i in 0..10u8 {
            cache.check(key_of(i), u32::from(i));
        }
        // key 0 is least-recently-accessed with the smallest token_count.
        let inner = cache.inner.lock().unwrap();
        assert_eq!(inner.entries.len(), 10);
        drop(inner);

        cache.check(key_of(10), 99);
        let inner = cache.inner.lock().unwrap();
        assert_eq!(inner.entries.len(), 10);
        assert!(!inner.entries.contains_key(&key_of(0)));
        assert!(inner.entries.contains_key(&key_of(10)));
    }

    #[test]
    fn prewarm_inserts_without_overwriting_existing_entries() {
        let cache = PromptCacheSimulator::new(60, 100);
        cache.check(key_of(1), 5);
        cache.prewarm(&[(key_of(1), 999), (key_of(2), 7)]);
        let inner = cache.inner.lock().unwrap();
        assert_eq!(inner.entries[&key_of(1)].token_count, 5);
        assert_eq!(inner.entries[&key_of(2)].token_count, 7);
    }
}
