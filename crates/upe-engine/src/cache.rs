//! Content-addressed result cache with absolute expiry and tag invalidation
//!
//! Eviction is by nearest expiry, not by access recency: when full, the
//! ~10% of entries that would expire soonest are dropped. Expired entries are
//! never served, even before they are physically removed.
//!
//! The cache is not transactional. Two concurrent identical misses may both
//! compute and store; the later write wins.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use upe_templates::{Mode, Slots};
use upe_utils::canonicalization::canonical_hash;

/// Statistics for cache performance tracking
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub invalidations: usize,
    pub writes: usize,
    pub evictions: usize,
}

impl CacheStats {
    /// Calculate cache hit ratio
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    tags: Vec<String>,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    stats: CacheStats,
}

/// Bounded in-memory cache keyed by canonical content hashes.
#[derive(Debug)]
pub struct ResultCache<V> {
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> ResultCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up `key`, treating expired entries as misses.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let lookup = inner
            .entries
            .get(key)
            .map(|e| (now < e.expires_at).then(|| e.value.clone()));
        let fresh = match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                inner.entries.remove(key);
                debug!(key, "cache entry expired");
                None
            }
            None => None,
        };
        if fresh.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        fresh
    }

    /// Store `value` under `key` until `now + ttl`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration, tags: Vec<String>) {
        self.set_at(key.into(), value, ttl, tags, Instant::now());
    }

    fn set_at(&self, key: String, value: V, ttl: Duration, tags: Vec<String>, now: Instant) {
        let mut inner = self.lock();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            inner.entries.retain(|_, e| now < e.expires_at);
            if inner.entries.len() >= self.capacity {
                let evicted = evict_nearest_expiry(&mut inner.entries, self.capacity);
                inner.stats.evictions += evicted;
                warn!(
                    evicted,
                    capacity = self.capacity,
                    "cache full, evicted nearest-expiry entries"
                );
            }
        }

        let expires_at = now.checked_add(ttl).unwrap_or(now);
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at,
                tags,
            },
        );
        inner.stats.writes += 1;
    }

    /// Remove every entry carrying `tag`; returns how many were removed.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.tags.iter().any(|t| t == tag));
        let removed = before - inner.entries.len();
        inner.stats.invalidations += removed;
        if removed > 0 {
            debug!(tag, removed, "invalidated cache entries");
        }
        removed
    }

    /// Physically stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}

fn evict_nearest_expiry<V>(
    entries: &mut HashMap<String, CacheEntry<V>>,
    capacity: usize,
) -> usize {
    let count = (capacity / 10).max(1);
    let mut by_expiry: Vec<(Instant, String)> = entries
        .iter()
        .map(|(k, e)| (e.expires_at, k.clone()))
        .collect();
    by_expiry.sort();
    for (_, key) in by_expiry.iter().take(count) {
        entries.remove(key);
    }
    count.min(by_expiry.len())
}

/// Cache key for a compile request against a specific template revision.
///
/// Hashes the JCS form of the inputs, so slot insertion order never changes
/// the key. The template checksum is part of the material: an entry stored
/// for one template body never matches another body under the same version.
///
/// # Errors
///
/// Returns an error if a slot value cannot be represented as JSON.
pub fn cache_key(
    goal: &str,
    slots: &Slots,
    mode: Mode,
    template_id: &str,
    template_version: &str,
    template_checksum: &str,
    seed_override: Option<u64>,
) -> anyhow::Result<String> {
    let mut material = json!({
        "goal": goal,
        "slots": slots,
        "mode": mode,
        "templateId": template_id,
        "templateVersion": template_version,
        "templateChecksum": template_checksum,
    });
    if let Some(seed) = seed_override {
        material["seedOverride"] = json!(seed);
    }
    canonical_hash(&material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use upe_templates::SlotValue;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_get_after_set() {
        let cache = ResultCache::new(4);
        cache.set("k", 1u32, TTL, Vec::new());
        assert_eq!(cache.get("k"), Some(1));
        assert_eq!(cache.get("other"), None);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_expired_entry_never_served() {
        let cache = ResultCache::new(4);
        let now = Instant::now();
        cache.set_at("k".to_string(), 1u32, Duration::from_millis(10), Vec::new(), now);
        assert_eq!(cache.get_at("k", now + Duration::from_millis(5)), Some(1));
        assert_eq!(cache.get_at("k", now + Duration::from_millis(10)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let cache = ResultCache::new(4);
        let now = Instant::now();
        cache.set_at("k".to_string(), 1u32, Duration::ZERO, Vec::new(), now);
        assert_eq!(cache.get_at("k", now), None);
    }

    #[test]
    fn test_full_cache_evicts_nearest_expiry() {
        let cache = ResultCache::new(10);
        let now = Instant::now();
        for i in 0..10u64 {
            cache.set_at(
                format!("k{i}"),
                i,
                Duration::from_secs(100 + i),
                Vec::new(),
                now,
            );
        }
        cache.set_at("new".to_string(), 99, TTL, Vec::new(), now);

        assert_eq!(cache.len(), 10);
        // "new" expires soonest but is inserted after eviction
        assert_eq!(cache.get_at("new", now), Some(99));
        assert_eq!(cache.get_at("k0", now), None);
        assert_eq!(cache.get_at("k1", now), Some(1));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_full_cache_purges_expired_before_evicting() {
        let cache = ResultCache::new(2);
        let now = Instant::now();
        cache.set_at("stale".to_string(), 1u32, Duration::from_millis(1), Vec::new(), now);
        cache.set_at("fresh".to_string(), 2, TTL, Vec::new(), now);
        let later = now + Duration::from_millis(5);
        cache.set_at("next".to_string(), 3, TTL, Vec::new(), later);

        assert_eq!(cache.get_at("fresh", later), Some(2));
        assert_eq!(cache.get_at("next", later), Some(3));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = ResultCache::new(1);
        cache.set("k", 1u32, TTL, Vec::new());
        cache.set("k", 2, TTL, Vec::new());
        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_invalidate_by_tag() {
        let cache = ResultCache::new(8);
        cache.set("a", 1u32, TTL, vec!["template:deck".to_string()]);
        cache.set(
            "b",
            2,
            TTL,
            vec!["template:deck".to_string(), "mode:precision".to_string()],
        );
        cache.set("c", 3, TTL, vec!["template:memo".to_string()]);

        assert_eq!(cache.invalidate_by_tag("template:deck"), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.invalidate_by_tag("template:deck"), 0);
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_cache_key_ignores_slot_insertion_order() {
        let mut a = Slots::new();
        a.insert("purpose".to_string(), SlotValue::text("raise"));
        a.insert("audience".to_string(), SlotValue::text("board"));
        let mut b = Slots::new();
        b.insert("audience".to_string(), SlotValue::text("board"));
        b.insert("purpose".to_string(), SlotValue::text("raise"));

        let ka = cache_key("g", &a, Mode::Standard, "deck", "1.0.0", "c1", None).unwrap();
        let kb = cache_key("g", &b, Mode::Standard, "deck", "1.0.0", "c1", None).unwrap();
        assert_eq!(ka, kb);
    }

    #[test]
    fn test_cache_key_distinguishes_inputs() {
        let slots = Slots::new();
        let base = cache_key("g", &slots, Mode::Standard, "deck", "1.0.0", "c1", None).unwrap();
        for other in [
            cache_key("h", &slots, Mode::Standard, "deck", "1.0.0", "c1", None),
            cache_key("g", &slots, Mode::Precision, "deck", "1.0.0", "c1", None),
            cache_key("g", &slots, Mode::Standard, "memo", "1.0.0", "c1", None),
            cache_key("g", &slots, Mode::Standard, "deck", "1.0.1", "c1", None),
            cache_key("g", &slots, Mode::Standard, "deck", "1.0.0", "c2", None),
            cache_key("g", &slots, Mode::Standard, "deck", "1.0.0", "c1", Some(7)),
        ] {
            assert_ne!(base, other.unwrap());
        }
    }
}
