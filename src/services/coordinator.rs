// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read-through caching of filtered session queries.
//!
//! Keys look like `{namespace}:{owner}:g{generation}:{fingerprint}`. Every
//! write to an owner's sessions bumps that owner's generation in the session
//! store and then drops everything under `{namespace}:{owner}:`. A read that
//! started before the bump can still write its result afterwards, but only
//! under the old generation, which no later read will ask for.

use crate::cache::CacheStore;
use crate::db::SessionStore;
use crate::error::Result;
use crate::models::ActivitySession;
use crate::services::query::{QueryEngine, SessionFilter};
use std::sync::Arc;
use std::time::Duration;

/// Where a query result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Cache,
    Db,
}

impl CacheSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheSource::Cache => "cache",
            CacheSource::Db => "db",
        }
    }

    /// Value of the `x-cache` response header.
    pub fn header_value(&self) -> &'static str {
        match self {
            CacheSource::Cache => "HIT",
            CacheSource::Db => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub entries: Vec<ActivitySession>,
    pub source: CacheSource,
}

pub struct CacheCoordinator {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn SessionStore>,
    engine: QueryEngine,
    namespace: String,
    ttl: Duration,
}

impl CacheCoordinator {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        store: Arc<dyn SessionStore>,
        namespace: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            engine: QueryEngine::new(store.clone()),
            store,
            namespace: namespace.into(),
            ttl,
        }
    }

    /// Every key for `owner` starts with this.
    pub fn owner_prefix(&self, owner: &str) -> String {
        format!("{}:{}:", self.namespace, urlencoding::encode(owner))
    }

    pub fn cache_key(&self, owner: &str, generation: u64, fingerprint: &str) -> String {
        format!("{}g{}:{}", self.owner_prefix(owner), generation, fingerprint)
    }

    /// Serve from cache when possible, otherwise query and populate.
    ///
    /// Cache failures only cost a store read; store failures are returned.
    pub async fn read_through(&self, owner: &str, filter: &SessionFilter) -> Result<QueryResult> {
        let owner = owner.trim().to_lowercase();
        let parsed = filter.parse()?;
        let generation = self.store.cache_generation(&owner).await?;
        let key = self.cache_key(&owner, generation, &parsed.fingerprint());

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<ActivitySession>>(&raw) {
                Ok(entries) => {
                    tracing::debug!(key = %key, count = entries.len(), "Cache hit");
                    return Ok(QueryResult {
                        entries,
                        source: CacheSource::Cache,
                    });
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                }
            },
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, using store");
            }
        }

        let entries = self.engine.fetch(&owner, &parsed).await?;

        match serde_json::to_string(&entries) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&key, raw, self.ttl).await {
                    tracing::warn!(key = %key, error = %e, "Cache write failed");
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize query result");
            }
        }

        Ok(QueryResult {
            entries,
            source: CacheSource::Db,
        })
    }

    /// Make every cached result for `owner` unreachable and drop the ones
    /// currently present. Returns the dropped keys.
    pub async fn invalidate_owner(&self, owner: &str) -> Result<Vec<String>> {
        let owner = owner.trim().to_lowercase();
        let generation = self.store.bump_cache_generation(&owner).await?;

        let prefix = self.owner_prefix(&owner);
        let removed = match self.cache.delete_prefix(&prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(
                    owner = %owner,
                    error = %e,
                    "Cache prefix delete failed; stale keys are unreachable"
                );
                Vec::new()
            }
        };

        tracing::info!(
            owner = %owner,
            generation,
            removed = removed.len(),
            "Invalidated owner cache"
        );
        Ok(removed)
    }
}
