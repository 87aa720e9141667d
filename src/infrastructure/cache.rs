//! Cache adapters behind the idempotency gate.
//!
//! - [`LocalCache`]: in-process, bounded by an LRU capacity, every entry expires.
//! - [`FallbackCache`]: tries a primary store (e.g. Redis) and fails open to a
//!   [`LocalCache`] on any primary error.

use crate::domain::ports::{CacheStore, CacheStoreRef};
use crate::error::CacheError;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Drops every expired entry and returns how many were removed.
fn sweep(entries: &mut LruCache<String, Entry>, now: Instant) -> usize {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        entries.pop(key);
    }
    expired.len()
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bounded in-process cache. Entries stored without a TTL get `default_ttl`.
/// Once `capacity` is reached, expired entries are swept first and the least
/// recently used live entry is evicted only if none had expired.
pub struct LocalCache {
    entries: Mutex<LruCache<String, Entry>>,
    default_ttl: Duration,
}

impl LocalCache {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            default_ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for LocalCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let cached = entries
            .get(key)
            .map(|entry| (entry.is_expired(now), entry.value.clone()));
        match cached {
            Some((true, _)) => {
                entries.pop(key);
                Ok(None)
            }
            Some((false, value)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            CacheError::Operation(format!("ttl of {}s is out of range", ttl.as_secs()))
        })?;

        let mut entries = self.entries.lock().await;
        if entries.len() >= entries.cap().get() && !entries.contains(key) {
            let swept = sweep(&mut entries, now);
            if swept > 0 {
                tracing::debug!(swept, "local cache full, dropped expired entries");
            }
        }
        entries.put(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        tracing::debug!(key, "local cache stored");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.pop(key);
        Ok(())
    }
}

/// Primary cache with a local safety net. Never returns an error itself as
/// long as the local cache works.
pub struct FallbackCache {
    primary: Option<CacheStoreRef>,
    local: LocalCache,
}

impl FallbackCache {
    pub fn new(primary: Option<CacheStoreRef>, local: LocalCache) -> Self {
        Self { primary, local }
    }

    pub fn local_only(local: LocalCache) -> Self {
        Self::new(None, local)
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }
}

#[async_trait]
impl CacheStore for FallbackCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        if let Some(primary) = &self.primary {
            match primary.exists(key).await {
                Ok(found) => return Ok(found),
                Err(e) => {
                    tracing::warn!(key, error = %e, "primary cache unavailable, using local cache")
                }
            }
        }
        self.local.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(primary) = &self.primary {
            match primary.get(key).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(key, error = %e, "primary cache unavailable, using local cache")
                }
            }
        }
        self.local.get(key).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        if let Some(primary) = &self.primary {
            match primary.put(key, value, ttl).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(key, error = %e, "primary cache unavailable, using local cache")
                }
            }
        }
        self.local.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        if let Some(primary) = &self.primary
            && let Err(e) = primary.delete(key).await
        {
            tracing::warn!(key, error = %e, "primary cache delete failed");
        }
        // the key may have landed locally during an earlier outage
        self.local.delete(key).await
    }
}
