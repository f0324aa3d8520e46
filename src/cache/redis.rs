//! Redis cache backend.
//!
//! A single [`ConnectionManager`] is cloned per operation; it
//! multiplexes one connection and reconnects on failure. Prefix
//! sweeps use cursored SCAN so invalidation never blocks the server
//! the way KEYS would.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::debug;

use super::store::{CacheError, CacheStore};

const SCAN_BATCH: u32 = 200;

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(from_redis)?;
        let conn = ConnectionManager::new(client).await.map_err(from_redis)?;
        debug!(target: "mercato::cache", backend = "redis", "Cache connection established");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(from_redis)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // SETEX rejects 0, so the shortest accepted expiry is 1s.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await.map_err(from_redis)?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: u64 = conn.del(key).await.map_err(from_redis)?;
        Ok(())
    }

    async fn del_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(from_redis)?;
            if !keys.is_empty() {
                let swept: u64 = conn.del(&keys).await.map_err(from_redis)?;
                removed += swept;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }
}

fn from_redis(err: redis::RedisError) -> CacheError {
    CacheError::backend(err.to_string())
}
