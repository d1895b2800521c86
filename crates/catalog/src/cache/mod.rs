//! Cache backends and key layout.
//!
//! Callers treat every cache failure as a miss: the store stays the source of
//! truth and the cache is never required for correctness.

mod memory;
mod redis_cache;

pub mod keys;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::InMemoryCache;
pub use self::redis_cache::RedisCache;

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
}

/// Key-value cache with expiry and atomic counters.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    /// Sets the key only if it does not exist. Returns true if it was set.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Atomically increments an integer key, creating it at 1 if missing.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;
}

#[async_trait]
impl<T: CacheBackend + ?Sized> CacheBackend for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        (**self).set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        (**self).delete(key).await
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        (**self).incr(key).await
    }
}

/// Expiry settings for cached catalog reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub product_ttl: Duration,
    pub list_ttl: Duration,
    pub search_ttl: Duration,
    /// Lifetime of version counters; far longer than any cached result.
    pub version_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            product_ttl: Duration::from_secs(3600),
            list_ttl: Duration::from_secs(300),
            search_ttl: Duration::from_secs(300),
            version_ttl: Duration::from_secs(86_400 * 365),
        }
    }
}
