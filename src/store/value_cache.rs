//! Byte-bounded LRU cache for expensive JSON-decoded reads (§4.1/§9).
//!
//! Entries are invalidated by key on every mutation of the row they were decoded from,
//! and by the enumerate-then-delete sweep in `lifecycle::Engine::delete_jobs_before`.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Which sub-document a cache entry holds, so the same job id can carry multiple
/// independently-invalidated entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueCacheKind {
    Metadata,
    EnergyFootprint,
    Footprint,
}

#[derive(Debug, Clone)]
pub struct CachedValue {
    pub json: serde_json::Value,
    pub byte_len: usize,
}

impl CachedValue {
    pub fn new(json: serde_json::Value) -> Self {
        let byte_len = json.to_string().len();
        Self { json, byte_len }
    }
}

/// A value cache bounded by an approximate byte budget rather than an entry count: entries
/// are evicted LRU-first until the running byte total fits the configured budget.
pub struct ValueCache {
    inner: Mutex<Inner>,
    byte_budget: usize,
}

struct Inner {
    map: LruCache<(i64, ValueCacheKind), CachedValue>,
    bytes_used: usize,
}

impl ValueCache {
    /// `byte_budget` is the approximate budget (default 1 MiB, §4.1).
    pub fn new(byte_budget: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                // Capacity is just a hint to the LRU list; the real bound is byte_budget.
                map: LruCache::new(NonZeroUsize::new(4096).unwrap()),
                bytes_used: 0,
            }),
            byte_budget,
        }
    }

    pub fn get(&self, id: i64, kind: ValueCacheKind) -> Option<serde_json::Value> {
        let mut inner = self.inner.lock().expect("value cache mutex poisoned");
        inner.map.get(&(id, kind)).map(|v| v.json.clone())
    }

    pub fn put(&self, id: i64, kind: ValueCacheKind, value: serde_json::Value) {
        let entry = CachedValue::new(value);
        let mut inner = self.inner.lock().expect("value cache mutex poisoned");
        if let Some(old) = inner.map.put((id, kind), entry.clone()) {
            inner.bytes_used = inner.bytes_used.saturating_sub(old.byte_len);
        }
        inner.bytes_used += entry.byte_len;

        while inner.bytes_used > self.byte_budget {
            match inner.map.pop_lru() {
                Some((_, evicted)) => {
                    inner.bytes_used = inner.bytes_used.saturating_sub(evicted.byte_len);
                }
                None => break,
            }
        }
    }

    /// Drops every entry for `id`, regardless of kind.
    pub fn invalidate(&self, id: i64) {
        let mut inner = self.inner.lock().expect("value cache mutex poisoned");
        for kind in [
            ValueCacheKind::Metadata,
            ValueCacheKind::EnergyFootprint,
            ValueCacheKind::Footprint,
        ] {
            if let Some(old) = inner.map.pop(&(id, kind)) {
                inner.bytes_used = inner.bytes_used.saturating_sub(old.byte_len);
            }
        }
    }

    /// Enumerate-then-delete sweep invalidation (§9: "LRU cache coherence").
    pub fn invalidate_many(&self, ids: &[i64]) {
        for id in ids {
            self.invalidate(*id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = ValueCache::new(1024 * 1024);
        cache.put(1, ValueCacheKind::Metadata, serde_json::json!({"a": 1}));
        assert_eq!(
            cache.get(1, ValueCacheKind::Metadata),
            Some(serde_json::json!({"a": 1}))
        );
        assert_eq!(cache.get(1, ValueCacheKind::Footprint), None);
    }

    #[test]
    fn invalidate_drops_all_kinds_for_id() {
        let cache = ValueCache::new(1024 * 1024);
        cache.put(7, ValueCacheKind::Metadata, serde_json::json!("m"));
        cache.put(7, ValueCacheKind::Footprint, serde_json::json!("f"));
        cache.invalidate(7);
        assert_eq!(cache.get(7, ValueCacheKind::Metadata), None);
        assert_eq!(cache.get(7, ValueCacheKind::Footprint), None);
    }

    #[test]
    fn eviction_respects_byte_budget() {
        let cache = ValueCache::new(16);
        let big = serde_json::Value::String("x".repeat(32));
        cache.put(1, ValueCacheKind::Metadata, big);
        let inner = cache.inner.lock().unwrap();
        assert!(inner.bytes_used <= 16 || inner.map.len() <= 1);
    }
}
