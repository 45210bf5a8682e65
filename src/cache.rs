//! Generalized TTL+LRU cache used for the record/path/value caches a page
//! read transaction owns. A transaction is bound to one reader thread (see
//! design note on concurrency), so there is no need for lock-guarded
//! interior mutability here: every method takes `&mut self`.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
}

/// A bounded LRU cache with an optional per-entry TTL. Loader failures are
/// never cached (design note: "wrap load results rather than caching
/// failures"), so a transient I/O error on one `get_or_load` doesn't poison
/// the entry for the next call.
pub struct TtlCache<K, V> {
    store: LruCache<K, (V, Instant)>,
    ttl: Option<Duration>,
    metrics: CacheMetrics,
}

impl<K, V> TtlCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to at least 1");
        Self { store: LruCache::new(cap), ttl, metrics: CacheMetrics::default() }
    }

    #[must_use]
    pub fn metrics(&self) -> CacheMetrics {
        self.metrics
    }

    fn is_expired(&self, inserted_at: Instant) -> bool {
        self.ttl.is_some_and(|ttl| inserted_at.elapsed() > ttl)
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = self.store.peek(key).is_some_and(|(_, at)| self.is_expired(*at));
        if expired {
            self.store.pop(key);
        }
        match self.store.get(key) {
            Some((value, _)) => {
                self.metrics.hits += 1;
                Some(value.clone())
            }
            None => {
                self.metrics.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.store.put(key, (value, Instant::now()));
    }

    pub fn invalidate(&mut self, key: &K) {
        self.store.pop(key);
    }

    pub fn invalidate_all(&mut self) {
        self.store.clear();
    }

    /// Return the cached value for `key`, or call `loader` and cache its
    /// result on success. Errors from `loader` propagate and leave the
    /// cache untouched for `key`.
    pub fn get_or_try_insert_with(
        &mut self,
        key: K,
        loader: impl FnOnce() -> Result<V>,
    ) -> Result<V> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        self.metrics.loads += 1;
        match loader() {
            Ok(value) => {
                self.insert(key, value.clone());
                Ok(value)
            }
            Err(e) => {
                self.metrics.load_failures += 1;
                Err(e)
            }
        }
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.store.len())
            .field("ttl", &self.ttl)
            .field("metrics", &self.metrics)
            .finish()
    }
}

/// Per-transaction set of the three named leaf caches (record/path/value).
/// The fourth cache, the unbounded page cache for indirect and metadata
/// pages, is a different page variant and lives separately as
/// `PageReadTxn::meta_cache`, not here.
pub struct PageCacheSet<V> {
    pub record: TtlCache<u64, V>,
    pub path: Option<TtlCache<u64, V>>,
    pub value: Option<TtlCache<u64, V>>,
}

impl<V: Clone> PageCacheSet<V> {
    #[must_use]
    pub fn new(config: &crate::config::ResourceConfig) -> Self {
        Self {
            record: TtlCache::new(
                config.record_cache_capacity,
                Some(Duration::from_secs(config.record_cache_ttl_secs)),
            ),
            path: config
                .path_cache_enabled
                .then(|| TtlCache::new(config.path_cache_capacity, None)),
            value: config
                .value_cache_enabled
                .then(|| TtlCache::new(config.value_cache_capacity, None)),
        }
    }

    pub fn clear_all(&mut self) {
        self.record.invalidate_all();
        if let Some(c) = &mut self.path {
            c.invalidate_all();
        }
        if let Some(c) = &mut self.value {
            c.invalidate_all();
        }
    }
}
