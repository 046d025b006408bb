//! Capacity-bounded LRU cache with per-entry expiry.

use std::num::NonZeroUsize;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// An LRU cache keyed by string whose entries expire at a fixed instant.
///
/// Reads never return an entry at or past its expiry. There is no background
/// sweeper: expired entries stay in place until they are overwritten, deleted
/// or evicted by newer insertions.
///
/// The cache is internally synchronized and can be shared behind an `Arc`.
///
/// # Example
///
/// ```ignore
/// let cache = LruTtlCache::new(2);
/// cache.set("a", 1, Instant::now() + Duration::from_secs(60));
/// assert_eq!(cache.get_not_stale("a"), Some(1));
/// ```
pub struct LruTtlCache<V> {
    inner: Mutex<LruCache<String, Entry<V>>>,
}

impl<V: Clone> LruTtlCache<V> {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is rounded up to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get a fresh value for `key`, marking it most recently used.
    ///
    /// Returns `None` both for absent and for expired entries.
    pub fn get_not_stale(&self, key: &str) -> Option<V> {
        self.get_not_stale_at(key, Instant::now())
    }

    /// Same as [`get_not_stale`](Self::get_not_stale) with an explicit clock.
    pub fn get_not_stale_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut cache = self.inner.lock();

        // Only fresh hits count as a use.
        match cache.peek(key) {
            Some(entry) if now < entry.expires_at => {}
            _ => return None,
        }

        cache.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or replace `key`, valid until `expires_at`.
    ///
    /// Inserting past capacity evicts the least recently used entry.
    pub fn set(&self, key: impl Into<String>, value: V, expires_at: Instant) {
        self.inner
            .lock()
            .put(key.into(), Entry { value, expires_at });
    }

    /// Remove `key`, returning whether it was present (stale or not).
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().pop(key).is_some()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }
}

impl<V> std::fmt::Debug for LruTtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.inner.lock();
        f.debug_struct("LruTtlCache")
            .field("len", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fresh_entry_is_returned() {
        let cache = LruTtlCache::new(4);
        cache.set("a", 1, Instant::now() + Duration::from_secs(60));
        assert_eq!(cache.get_not_stale("a"), Some(1));
        assert_eq!(cache.get_not_stale("b"), None);
    }

    #[test]
    fn test_ttl_boundary() {
        let cache = LruTtlCache::new(4);
        let t = Instant::now();
        let ttl = Duration::from_secs(10);
        cache.set("k", "v", t + ttl);

        assert_eq!(cache.get_not_stale_at("k", t), Some("v"));
        assert_eq!(
            cache.get_not_stale_at("k", t + ttl - Duration::from_millis(1)),
            Some("v")
        );
        assert_eq!(cache.get_not_stale_at("k", t + ttl), None);
        assert_eq!(cache.get_not_stale_at("k", t + ttl * 2), None);

        // Expired entries linger until overwritten or evicted.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction_respects_touch() {
        let cache = LruTtlCache::new(2);
        let later = Instant::now() + Duration::from_secs(60);
        cache.set("a", 1, later);
        cache.set("b", 2, later);

        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(cache.get_not_stale("a"), Some(1));
        cache.set("c", 3, later);

        assert_eq!(cache.get_not_stale("a"), Some(1));
        assert_eq!(cache.get_not_stale("b"), None);
        assert_eq!(cache.get_not_stale("c"), Some(3));
    }

    #[test]
    fn test_stale_read_does_not_touch() {
        let cache = LruTtlCache::new(2);
        let now = Instant::now();
        cache.set("old", 1, now);
        cache.set("new", 2, now + Duration::from_secs(60));

        // A stale read must not promote "old" over "new".
        assert_eq!(cache.get_not_stale("old"), None);
        cache.set("third", 3, now + Duration::from_secs(60));

        assert_eq!(cache.get_not_stale("new"), Some(2));
        assert_eq!(cache.get_not_stale("third"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_overwrite_and_delete() {
        let cache = LruTtlCache::new(4);
        let later = Instant::now() + Duration::from_secs(60);
        cache.set("k", 1, later);
        cache.set("k", 2, later);
        assert_eq!(cache.get_not_stale("k"), Some(2));
        assert_eq!(cache.len(), 1);

        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_rounds_up() {
        let cache: LruTtlCache<u8> = LruTtlCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }
}
