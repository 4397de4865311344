//! Short-lived lookup cache shared across the application
//!
//! Built once at startup and handed out as `Arc<CacheManager>`. The sync
//! engine clears it after any pass that changed the mirror, and the service
//! clears it when the source repository changes, so cached existence data is
//! never older than one sync interval plus the TTL.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default time-to-live for cached values
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Application-wide cache of JSON-shaped values keyed by string
pub type CacheManager = TtlCache<String, serde_json::Value>;

/// LRU cache whose entries expire after a fixed TTL
pub struct TtlCache<K: Hash + Eq, V: Clone> {
    ttl: Duration,
    entries: Mutex<LruCache<K, (Instant, V)>>,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, (Instant, V)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a live value; expired entries are dropped on access
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let expired = match entries.peek(key) {
            Some((inserted, _)) => inserted.elapsed() >= self.ttl,
            None => return None,
        };

        if expired {
            entries.pop(key);
            return None;
        }

        entries.get(key).map(|(_, value)| value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.lock().put(key, (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.lock().pop(key).is_some()
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.lock();
        if !entries.is_empty() {
            debug!("Dropping {} cached entries", entries.len());
        }
        entries.clear();
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let ttl = self.ttl;
        self.lock()
            .iter()
            .filter(|(_, (inserted, _))| inserted.elapsed() < ttl)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(300), 8);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let cache: TtlCache<&str, u32> = TtlCache::new(DEFAULT_TTL, 8);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.len(), 2);

        cache.invalidate_all();
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache: TtlCache<&str, u32> = TtlCache::new(DEFAULT_TTL, 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");
        cache.insert("c", 3);

        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache: TtlCache<&str, u32> = TtlCache::new(DEFAULT_TTL, 0);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert!(cache.invalidate(&"a"));
        assert!(!cache.invalidate(&"a"));
    }
}
