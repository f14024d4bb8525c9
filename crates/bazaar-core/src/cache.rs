//! # Bounded Cache
//!
//! Capacity-bounded key/value store with LRU eviction and optional per-entry
//! TTL expiry.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        BoundedCache<K, V>                               │
//! │                                                                         │
//! │   MRU (head)                                             LRU (tail)     │
//! │   ┌────────┐   ┌────────┐   ┌────────┐   ┌────────┐                     │
//! │   │  k4    │──►│  k1    │──►│  k3    │──►│  k2    │ ──► evicted first   │
//! │   └────────┘   └────────┘   └────────┘   └────────┘                     │
//! │                                                                         │
//! │  get(k)      hit: move to head, bump last_accessed                      │
//! │              expired: purge, count a miss                               │
//! │  put(k, v)   remove k if present, insert at head,                       │
//! │              then pop ONE tail entry if len > max_size                  │
//! │  contains    no recency change                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The linked hash map comes from the `lru` crate, used in unbounded mode:
//! capacity is enforced here so the eviction callback sees every evicted pair
//! and an update of an existing key is never reported as an eviction.

use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;

use crate::error::{CoreError, CoreResult};

/// Callback invoked with every entry evicted for capacity.
pub type EvictionCallback<K, V> = Box<dyn FnMut(K, V) + Send>;

// =============================================================================
// Cache Entry
// =============================================================================

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed_at: Instant,
    ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        CacheEntry {
            value,
            inserted_at: now,
            last_accessed_at: now,
            ttl,
        }
    }

    /// A zero TTL is already elapsed at insertion time.
    fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(self.inserted_at) >= ttl,
            None => false,
        }
    }
}

// =============================================================================
// Cache Stats
// =============================================================================

/// Point-in-time counters of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub max_size: usize,
    pub current_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// `hits / (hits + misses)`, 0.0 before the first lookup.
    pub hit_rate: f64,
}

// =============================================================================
// Bounded Cache
// =============================================================================

/// LRU cache with a hard entry limit and optional TTL per entry.
pub struct BoundedCache<K, V> {
    entries: LruCache<K, CacheEntry<V>>,
    max_size: usize,
    default_ttl: Option<Duration>,
    on_evict: Option<EvictionCallback<K, V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// Creates an empty cache holding at most `max_size` entries.
    ///
    /// ## Errors
    /// `CoreError::InvalidCacheSize` when `max_size` is zero.
    pub fn new(max_size: usize) -> CoreResult<Self> {
        if max_size == 0 {
            return Err(CoreError::InvalidCacheSize(max_size));
        }

        Ok(BoundedCache {
            entries: LruCache::unbounded(),
            max_size,
            default_ttl: None,
            on_evict: None,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        })
    }

    /// Sets the TTL used by `put` calls that pass `None`.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Registers the eviction callback.
    pub fn on_evict(mut self, callback: impl FnMut(K, V) + Send + 'static) -> Self {
        self.on_evict = Some(Box::new(callback));
        self
    }

    /// Looks up `key`, promoting it to most-recently-used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = Instant::now();

        let expired = match self.entries.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.misses += 1;
                return None;
            }
        };

        if expired {
            self.entries.pop(key);
            self.expirations += 1;
            self.misses += 1;
            return None;
        }

        self.hits += 1;
        self.entries.get_mut(key).map(|entry| {
            entry.last_accessed_at = now;
            &entry.value
        })
    }

    /// Inserts or replaces `key`. `ttl` falls back to the default TTL.
    ///
    /// Evicts at most one entry (the least recently used) per call.
    pub fn put(&mut self, key: K, value: V, ttl: Option<Duration>) {
        // An update counts as a fresh access: drop the old slot first.
        self.entries.pop(&key);
        self.entries
            .push(key, CacheEntry::new(value, ttl.or(self.default_ttl)));

        if self.entries.len() > self.max_size {
            if let Some((evicted_key, evicted)) = self.entries.pop_lru() {
                self.evictions += 1;
                if let Some(callback) = self.on_evict.as_mut() {
                    callback(evicted_key, evicted.value);
                }
            }
        }
    }

    /// Removes `key`, returning its value even if it had expired.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key).map(|entry| entry.value)
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns true if `key` is present and not expired. No recency change.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries
            .peek(key)
            .map(|entry| !entry.is_expired(Instant::now()))
            .unwrap_or(false)
    }

    /// Time since `key` was inserted. No recency change.
    pub fn age(&self, key: &K) -> Option<Duration> {
        self.entries
            .peek(key)
            .map(|entry| entry.inserted_at.elapsed())
    }

    /// Returns the value of `key` if present and not expired. Neither the
    /// recency order nor the counters change.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries
            .peek(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| &entry.value)
    }

    /// Live entries from most to least recently used. No recency change.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(move |(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key, &entry.value))
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn sweep_expired(&mut self) -> usize
    where
        K: Clone,
    {
        let now = Instant::now();
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.pop(key);
        }

        self.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            max_size: self.max_size,
            current_size: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
        }
    }

    /// Keys from least to most recently used.
    pub fn keys_lru_first(&self) -> Vec<&K> {
        self.entries.iter().rev().map(|(key, _)| key).collect()
    }
}

impl<K: Hash + Eq, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("len", &self.entries.len())
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .field("evictions", &self.evictions)
            .finish()
    }
}
