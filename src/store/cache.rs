//! Freshness cache for recalled context.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// A cached value and the instant it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    /// True while `now` is less than `ttl` past insertion.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.inserted_at) < ttl
    }
}

/// Keyed cache whose entries expire after a fixed TTL.
///
/// Time is always passed in, so expiry is deterministic under test.
#[derive(Debug, Clone)]
pub struct ContextCache<V> {
    ttl: Duration,
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V: Clone> ContextCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Fresh value for `key`, if any.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V, now: DateTime<Utc>) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    /// Drop every expired entry.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.is_fresh(now, ttl));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
