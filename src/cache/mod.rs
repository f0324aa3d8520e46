//! Read-through cache for resource responses.
//!
//! Reads consult the cache before the document store and fill it on a
//! miss; writes invalidate the affected entry key plus the kind's
//! query namespace. Keys are derived in [`keys`] so that every caller
//! agrees on the same layout. Two backends implement [`CacheStore`]:
//! a Redis client for deployments and an in-process LRU for tests and
//! cacheless development setups.

pub mod keys;
pub mod lock;
pub mod memory;
pub mod redis;
pub mod store;

pub use memory::MemoryCache;
pub use redis::RedisCache;
pub use store::{CacheError, CacheStore};
