/*!
 * Time-bounded caching with an injectable clock.
 *
 * Entries remember when they were inserted and expire after a fixed TTL.
 * The clock is a trait so tests can move time forward without sleeping.
 */

use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of the current time for cache expiry
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Wall clock based on `Instant::now`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Cache with per-entry expiry
pub struct TtlCache<K, V> {
    /// Internal cache storage: value and insertion time
    entries: Arc<RwLock<HashMap<K, (V, Instant)>>>,

    /// Entry lifetime
    ttl: Duration,

    clock: Arc<dyn Clock>,

    /// Cache hit counter
    hits: Arc<RwLock<usize>>,

    /// Cache miss counter
    misses: Arc<RwLock<usize>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    /// Create a cache using the system clock
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache using the given clock
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            clock,
            hits: Arc::new(RwLock::new(0)),
            misses: Arc::new(RwLock::new(0)),
        }
    }

    /// Get a live entry; expired entries count as misses
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let found = self
            .entries
            .read()
            .get(key)
            .filter(|(_, inserted_at)| now.duration_since(*inserted_at) < self.ttl)
            .map(|(value, _)| value.clone());

        match found {
            Some(value) => {
                *self.hits.write() += 1;
                debug!("Cache hit for {:?}", key);
                Some(value)
            }
            None => {
                *self.misses.write() += 1;
                debug!("Cache miss for {:?}", key);
                None
            }
        }
    }

    /// Store an entry, resetting its age
    pub fn put(&self, key: K, value: V) {
        let now = self.clock.now();
        self.entries.write().insert(key, (value, now));
    }

    /// Drop every expired entry and return how many were removed
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, (_, inserted_at)| now.duration_since(*inserted_at) < self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Evicted {} expired cache entries", removed);
        }
        removed
    }

    /// Get cache statistics: hits, misses and hit rate
    pub fn stats(&self) -> (usize, usize, f64) {
        let hits = *self.hits.read();
        let misses = *self.misses.read();
        let total = hits + misses;

        let hit_rate = if total > 0 { hits as f64 / total as f64 } else { 0.0 };

        (hits, misses, hit_rate)
    }

    /// Get the number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            ttl: self.ttl,
            clock: self.clock.clone(),
            hits: self.hits.clone(),
            misses: self.misses.clone(),
        }
    }
}
