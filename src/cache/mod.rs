//! Result cache and clock collaborators.
//!
//! Analyzers that call expensive external services (the speed API, sitemap
//! crawls) use cache-aside: read the cache unless a refresh is forced, compute
//! on a miss, then write the whole serialized result back. Entries are never
//! partially updated, and concurrent audits racing on one key simply overwrite
//! each other (last write wins).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Source of the current time, injectable for deterministic tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a fixed instant (tests, replays).
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Key-value store for serialized analyzer results.
pub trait Cache: Send + Sync {
    /// Returns the entry for `key` if present and not expired.
    fn get(&self, key: &str) -> Option<Value>;
    /// Stores `value` under `key`, replacing any previous entry.
    fn set(&self, key: &str, value: Value, ttl: Duration);
}

/// Builds a cache key of the form `{analyzer}:{url}:{option hash}`.
pub fn cache_key<T: Hash>(analyzer: &str, url: &str, options: &T) -> String {
    let mut hasher = DefaultHasher::new();
    options.hash(&mut hasher);
    format!("{}:{}:{:016x}", analyzer, url, hasher.finish())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// In-process cache with per-entry TTL. Expired entries are dropped on read of
/// the same key and swept on every write.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let expired = {
            let entries = self.entries.read().ok()?;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            if let Ok(mut entries) = self.entries.write() {
                entries.remove(key);
            }
            log::debug!("Cache entry expired: {key}");
        }
        None
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let now = self.clock.now();
        let entry = CacheEntry {
            value,
            expires_at: now + ttl,
        };
        match self.entries.write() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, e| e.expires_at > now);
                let swept = before - entries.len();
                if swept > 0 {
                    log::debug!("Swept {swept} expired cache entries");
                }
                entries.insert(key.to_string(), entry);
            }
            Err(e) => log::warn!("Cache lock poisoned, dropping write for {key}: {e}"),
        }
    }
}

/// A cache that stores nothing, for callers that opt out of caching.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl Cache for NoopCache {
    fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    fn set(&self, _key: &str, _value: Value, _ttl: Duration) {}
}
