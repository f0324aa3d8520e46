use std::time::Duration;

use async_trait::async_trait;

/// Failure in a cache backend. Callers treat these as soft errors: a
/// failed read is a miss and a failed invalidation is logged, never
/// surfaced to the client.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend failure: {message}")]
    Backend { message: String },
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Key/value store with per-entry expiry and prefix sweeps.
///
/// Values are serialized JSON strings; the cache never interprets
/// them. `del` and `del_prefix` succeed on absent keys.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key starting with `prefix`, returning how many
    /// were dropped.
    async fn del_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}
