// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Key/value cache with per-key expiry.
//!
//! Only ever used as a read-through accelerator; losing any entry at any
//! time costs a store read, never correctness.

use crate::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Cache backend seam.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError>;

    /// Remove every key starting with `prefix`; returns the removed keys, sorted.
    async fn delete_prefix(&self, prefix: &str) -> Result<Vec<String>, AppError>;
}

/// Longest lifetime an entry can get; larger TTLs are clamped to it.
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Cached value with expiry information.
#[derive(Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local cache shared across requests.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Expired (or absent); the guard above is released before removal.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl.min(MAX_TTL),
            },
        );
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let mut matching: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        matching.retain(|key| self.entries.remove(key).is_some());
        matching.sort();
        Ok(matching)
    }
}
