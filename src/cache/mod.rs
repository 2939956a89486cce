//! TTL caches keyed by `(site, identity|shared)`.
//!
//! Attendance stats and site policy metadata are both fetched from the
//! authoritative store and change rarely; callers hold one cache per
//! concern instead of ambient module-level state, and invalidate
//! explicitly when they write through.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cache key: a site, optionally specialized to one identity. `None`
/// means the site-wide (shared) value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub site: String,
    pub identity: Option<String>,
}

impl CacheKey {
    pub fn shared(site: impl Into<String>) -> Self {
        CacheKey {
            site: site.into(),
            identity: None,
        }
    }

    pub fn for_identity(site: impl Into<String>, identity: impl Into<String>) -> Self {
        CacheKey {
            site: site.into(),
            identity: Some(identity.into()),
        }
    }
}

/// A value plus the instant it was cached.
struct CachedValue<T> {
    value: T,
    fetched_at: Instant,
}

pub struct MetadataCache<T> {
    ttl: Duration,
    map: Mutex<HashMap<CacheKey, CachedValue<T>>>,
}

impl<T: Clone> MetadataCache<T> {
    pub fn new(ttl: Duration) -> Self {
        MetadataCache {
            ttl,
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh value for the key, or `None` when absent or expired.
    pub fn get(&self, key: &CacheKey) -> Option<T> {
        let map = self.map.lock().ok()?;
        let cached = map.get(key)?;
        if cached.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        Some(cached.value.clone())
    }

    /// Like `get`, but also returns expired values. Used as the
    /// last-known fallback when the authoritative read is unreachable.
    pub fn get_stale(&self, key: &CacheKey) -> Option<T> {
        let map = self.map.lock().ok()?;
        map.get(key).map(|cached| cached.value.clone())
    }

    pub fn insert(&self, key: CacheKey, value: T) {
        if let Ok(mut map) = self.map.lock() {
            map.insert(
                key,
                CachedValue {
                    value,
                    fetched_at: Instant::now(),
                },
            );
        }
    }

    pub fn invalidate(&self, key: &CacheKey) {
        if let Ok(mut map) = self.map.lock() {
            map.remove(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.map.lock() {
            map.clear();
        }
    }
}
