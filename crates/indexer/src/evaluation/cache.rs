//! Process-scoped TTL cache.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Time source for expiry checks.
pub type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent key/value cache whose entries expire after a fixed TTL.
///
/// Expired entries are evicted when read. Created once at startup and
/// handed to every consumer.
pub struct TtlCache<V: Clone + Send + Sync> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    clock: Clock,
}

impl<V: Clone + Send + Sync> TtlCache<V> {
    /// Create a cache on the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(Instant::now))
    }

    /// Create a cache on a custom clock.
    pub fn with_clock(ttl: Duration, clock: Clock) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Entry TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live value for `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = (self.clock)();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    /// Insert or replace `key`; the TTL restarts.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let expires_at = (self.clock)() + self.ttl;
        self.entries
            .insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Drop `key`.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let now = (self.clock)();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Stored entries, expired ones included until read or purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone + Send + Sync> fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
