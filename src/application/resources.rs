//! Cached CRUD over registered resource kinds.
//!
//! One service instance serves every entity kind; the binding passed
//! by the HTTP layer selects the kind, its expansions, and its cache
//! namespace. Reads go through the cache, writes go to the store and
//! then invalidate the kind's keys. Cache trouble never fails a
//! request: a broken read is a miss and a broken invalidation is
//! logged and left for the TTL to mop up.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use metrics::counter;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::application::error::ResourceError;
use crate::application::features::{PageLimits, QueryFeatures};
use crate::application::registry::ResourceBinding;
use crate::application::store::DocumentStore;
use crate::cache::{CacheStore, keys};
use crate::domain::QueryParams;

const TARGET: &str = "mercato::resources";

#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub enabled: bool,
    pub ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// A read result plus the tier that served it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub cached: bool,
}

pub struct ResourceService {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn CacheStore>,
    policy: CachePolicy,
    limits: PageLimits,
    // Per-key fill gates so one stampede fills each key once.
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl ResourceService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn CacheStore>,
        policy: CachePolicy,
        limits: PageLimits,
    ) -> Self {
        Self {
            store,
            cache,
            policy,
            limits,
            inflight: DashMap::new(),
        }
    }

    pub async fn create_one(
        &self,
        binding: &ResourceBinding,
        payload: &Map<String, Value>,
    ) -> Result<Value, ResourceError> {
        let doc = self
            .store
            .create(binding.kind, payload)
            .await
            .map_err(ResourceError::from)?;
        self.invalidate(binding.kind, None).await;
        Ok(doc.to_value())
    }

    pub async fn get_one(
        &self,
        binding: &ResourceBinding,
        id: &str,
    ) -> Result<Fetched<Value>, ResourceError> {
        let key = keys::entry_key(binding.kind, id);
        if !self.policy.enabled {
            let value = self.fetch_one(binding, id).await?;
            return Ok(Fetched {
                value,
                cached: false,
            });
        }

        if let Some(value) = self.cache_lookup(binding.kind, &key, false).await {
            return Ok(Fetched {
                value,
                cached: true,
            });
        }

        let gate = self.fill_gate(&key);
        let guard = gate.lock().await;
        // A concurrent filler may have finished while we waited.
        if let Some(value) = self.cache_lookup(binding.kind, &key, false).await {
            drop(guard);
            self.inflight.remove(&key);
            return Ok(Fetched {
                value,
                cached: true,
            });
        }

        counter!("mercato_cache_miss_total", "kind" => binding.kind).increment(1);
        let result = self.fetch_one(binding, id).await;
        if let Ok(value) = &result {
            self.cache_fill(binding.kind, &key, value).await;
        }
        drop(guard);
        self.inflight.remove(&key);
        result.map(|value| Fetched {
            value,
            cached: false,
        })
    }

    pub async fn get_all(
        &self,
        binding: &ResourceBinding,
        params: &QueryParams,
    ) -> Result<Fetched<Value>, ResourceError> {
        let key = keys::query_key(binding.kind, params);
        if !self.policy.enabled {
            let value = self.fetch_many(binding, params).await?;
            return Ok(Fetched {
                value,
                cached: false,
            });
        }

        if let Some(value) = self.cache_lookup(binding.kind, &key, true).await {
            return Ok(Fetched {
                value,
                cached: true,
            });
        }

        let gate = self.fill_gate(&key);
        let guard = gate.lock().await;
        if let Some(value) = self.cache_lookup(binding.kind, &key, true).await {
            drop(guard);
            self.inflight.remove(&key);
            return Ok(Fetched {
                value,
                cached: true,
            });
        }

        counter!("mercato_cache_miss_total", "kind" => binding.kind).increment(1);
        let result = self.fetch_many(binding, params).await;
        if let Ok(value) = &result {
            self.cache_fill(binding.kind, &key, value).await;
        }
        drop(guard);
        self.inflight.remove(&key);
        result.map(|value| Fetched {
            value,
            cached: false,
        })
    }

    pub async fn update_one(
        &self,
        binding: &ResourceBinding,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Value, ResourceError> {
        let updated = self
            .store
            .update(binding.kind, id, patch)
            .await
            .map_err(ResourceError::from)?;
        let Some(doc) = updated else {
            return Err(ResourceError::NotFound);
        };
        self.invalidate(binding.kind, Some(id)).await;
        Ok(doc.to_value())
    }

    pub async fn delete_one(
        &self,
        binding: &ResourceBinding,
        id: &str,
    ) -> Result<(), ResourceError> {
        let deleted = self
            .store
            .delete(binding.kind, id)
            .await
            .map_err(ResourceError::from)?;
        if deleted.is_none() {
            return Err(ResourceError::NotFound);
        }
        self.invalidate(binding.kind, Some(id)).await;
        Ok(())
    }

    async fn fetch_one(
        &self,
        binding: &ResourceBinding,
        id: &str,
    ) -> Result<Value, ResourceError> {
        let doc = self
            .store
            .find_by_id(binding.kind, id, binding.expansions)
            .await
            .map_err(ResourceError::from)?;
        match doc {
            Some(doc) => Ok(doc.to_value()),
            None => Err(ResourceError::NotFound),
        }
    }

    async fn fetch_many(
        &self,
        binding: &ResourceBinding,
        params: &QueryParams,
    ) -> Result<Value, ResourceError> {
        let query = QueryFeatures::new(params, self.limits)
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .into_query();
        let docs = self
            .store
            .find(binding.kind, &query, binding.expansions)
            .await
            .map_err(ResourceError::from)?;
        Ok(Value::Array(docs.iter().map(|doc| doc.to_value()).collect()))
    }

    fn fill_gate(&self, key: &str) -> Arc<Mutex<()>> {
        self.inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Read and decode one cache entry. Backend failures, unreadable
    /// payloads, and wrong shapes all count as misses; the following
    /// fill overwrites whatever was there.
    async fn cache_lookup(
        &self,
        kind: &'static str,
        key: &str,
        expect_array: bool,
    ) -> Option<Value> {
        let raw = match self.cache.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(
                    target: TARGET,
                    kind,
                    error = %err,
                    "Cache read failed, falling back to store"
                );
                return None;
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) if !expect_array || value.is_array() => {
                counter!("mercato_cache_hit_total", "kind" => kind).increment(1);
                debug!(target: TARGET, kind, key, "Cache hit");
                Some(value)
            }
            Ok(_) => {
                warn!(target: TARGET, kind, key, "Cached value has wrong shape, treating as miss");
                None
            }
            Err(err) => {
                warn!(
                    target: TARGET,
                    kind,
                    key,
                    error = %err,
                    "Cached value unreadable, treating as miss"
                );
                None
            }
        }
    }

    async fn cache_fill(&self, kind: &'static str, key: &str, value: &Value) {
        counter!("mercato_cache_fill_total", "kind" => kind).increment(1);
        if let Err(err) = self
            .cache
            .set_ex(key, &value.to_string(), self.policy.ttl)
            .await
        {
            warn!(
                target: TARGET,
                kind,
                key,
                error = %err,
                "Cache fill failed, serving from store"
            );
        }
    }

    /// Drop the entry key (when a write names one) and sweep the
    /// kind's query namespace.
    async fn invalidate(&self, kind: &'static str, id: Option<&str>) {
        if !self.policy.enabled {
            return;
        }
        counter!("mercato_cache_invalidation_total", "kind" => kind).increment(1);

        if let Some(id) = id {
            let key = keys::entry_key(kind, id);
            if let Err(err) = self.cache.del(&key).await {
                warn!(
                    target: TARGET,
                    kind,
                    key,
                    error = %err,
                    "Entry invalidation failed, stale copy expires by TTL"
                );
            }
        }

        let prefix = keys::query_prefix(kind);
        match self.cache.del_prefix(&prefix).await {
            Ok(swept) => {
                debug!(target: TARGET, kind, swept, "Invalidated cached queries");
            }
            Err(err) => {
                warn!(
                    target: TARGET,
                    kind,
                    error = %err,
                    "Query sweep failed, stale lists expire by TTL"
                );
            }
        }
    }
}
