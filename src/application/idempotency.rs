//! Deduplication of retried mutating requests.
//!
//! The cache behind the gate is advisory. When it cannot be reached a request
//! is treated as new, and a marker that cannot be written is only logged: the
//! operation it guards has already committed by then.

use crate::domain::account::AccountNumber;
use crate::domain::ports::CacheStoreRef;
use crate::error::{BankError, Result};
use crate::infrastructure::hashing::fingerprint;
use crate::sync::KeyedLocks;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;

const KEY_PREFIX: &str = "idempotency";
const PROCESSED: &str = "processed";

/// (account, operation, payload fingerprint).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    account: AccountNumber,
    operation: String,
    fingerprint: String,
}

impl IdempotencyKey {
    /// Fingerprints `payload` as the SHA-256 of its JSON form.
    pub fn new(
        account: &AccountNumber,
        operation: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self {
            account: account.clone(),
            operation: operation.into(),
            fingerprint: fingerprint(&bytes),
        })
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn cache_key(&self) -> String {
        format!(
            "{KEY_PREFIX}:{}:{}:{}",
            self.account, self.operation, self.fingerprint
        )
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

pub struct IdempotencyGate {
    cache: CacheStoreRef,
    ttl: Duration,
    in_flight: KeyedLocks,
}

impl IdempotencyGate {
    pub fn new(cache: CacheStoreRef, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            in_flight: KeyedLocks::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Rejects a key already marked as processed with `DuplicateRequest`.
    pub async fn check_and_reserve(&self, key: &IdempotencyKey) -> Result<()> {
        match self.cache.exists(&key.cache_key()).await {
            Ok(false) => Ok(()),
            Ok(true) => {
                tracing::warn!(key = %key, "duplicate request rejected");
                Err(BankError::DuplicateRequest {
                    operation: key.operation().to_string(),
                })
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "idempotency check unavailable, treating request as new");
                Ok(())
            }
        }
    }

    pub async fn mark_processed(&self, key: &IdempotencyKey) {
        self.mark_processed_with_ttl(key, self.ttl).await;
    }

    pub async fn mark_processed_with_ttl(&self, key: &IdempotencyKey, ttl: Duration) {
        match self.cache.put(&key.cache_key(), PROCESSED, Some(ttl)).await {
            Ok(()) => tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "request marked processed"),
            Err(e) => tracing::error!(key = %key, error = %e, "failed to mark request processed"),
        }
    }

    /// Runs `operation` unless `key` was already processed, then marks it.
    ///
    /// Calls sharing a key are serialised in-process, so a concurrent
    /// duplicate observes the marker left by the first call.
    pub async fn execute<T, F, Fut>(&self, key: &IdempotencyKey, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.in_flight.lock(&key.cache_key()).await;
        self.check_and_reserve(key).await?;
        let output = operation().await?;
        self.mark_processed(key).await;
        Ok(output)
    }
}
