use crate::domain::ports::CacheStore;
use crate::error::CacheError;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;

/// Shared Redis cache. Every command is bounded by `timeout` so a stalled
/// server degrades to a `CacheError` instead of blocking an operation.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    timeout: Duration,
}

impl RedisCache {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let connection = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Unavailable(format!("connect to {url} timed out")))?
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        tracing::info!(url, "connected to redis");
        Ok(Self {
            connection,
            timeout,
        })
    }

    async fn run<T, F>(&self, command: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.timeout, command)
            .await
            .map_err(|_| CacheError::Unavailable("redis command timed out".to_string()))?
            .map_err(|e| {
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                    CacheError::Unavailable(e.to_string())
                } else {
                    CacheError::Operation(e.to_string())
                }
            })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();
        self.run(conn.exists(key)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        self.run(conn.get(key)).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        match ttl {
            // SETEX rejects a zero expiry
            Some(ttl) => self.run(conn.set_ex(key, value, ttl.as_secs().max(1))).await,
            None => self.run(conn.set(key, value)).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        self.run(conn.del(key)).await
    }
}
