// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account purge: removes a departing user from the viewer graph, the user
//! directory, the session store and the cache.
//!
//! Order matters. The tombstone goes first so no new grant can reference
//! the user, and the user's own relation record is deleted only after every
//! record pointing at it has been repaired, since its two lists are what
//! tell us which records those are.

use crate::db::{RelationshipStore, SessionStore};
use crate::error::{AppError, Result};
use crate::models::{SessionKey, Tombstone};
use crate::services::viewer_graph::normalize_id;
use crate::services::{CacheCoordinator, RetryPolicy};
use crate::time_utils::format_utc_rfc3339;
use futures_util::{stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Maximum concurrent neighbour repairs.
const MAX_CONCURRENT_REPAIRS: usize = 8;

/// What a purge removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PurgeReport {
    /// Other users' relation records the identifier was removed from
    pub relations_repaired: usize,
    pub sessions_deleted: usize,
    pub cache_keys_dropped: Vec<String>,
    /// Whether the whole relation collection was swept as well
    pub full_scan: bool,
}

pub struct AccountPurgeService {
    relations: Arc<dyn RelationshipStore>,
    sessions: Arc<dyn SessionStore>,
    cache: Arc<CacheCoordinator>,
    retry: RetryPolicy,
    scan_page_size: u32,
    full_scan: bool,
}

impl AccountPurgeService {
    pub fn new(
        relations: Arc<dyn RelationshipStore>,
        sessions: Arc<dyn SessionStore>,
        cache: Arc<CacheCoordinator>,
        retry: RetryPolicy,
        scan_page_size: u32,
        full_scan: bool,
    ) -> Self {
        Self {
            relations,
            sessions,
            cache,
            retry,
            scan_page_size: scan_page_size.max(1),
            full_scan,
        }
    }

    /// Remove every trace of `identifier`. Safe to re-run after a failure.
    pub async fn purge_user(&self, identifier: &str) -> Result<PurgeReport> {
        let user = normalize_id(identifier);
        if user.is_empty() {
            return Err(AppError::Validation("identifier must not be empty".to_string()));
        }
        tracing::info!(user = %user, full_scan = self.full_scan, "Starting account purge");

        self.relations
            .put_tombstone(&Tombstone {
                user_id: user.clone(),
                purged_at: format_utc_rfc3339(chrono::Utc::now()),
            })
            .await?;

        let mut relations_repaired = self.repair_neighbours(&user).await?;
        if self.full_scan {
            relations_repaired += self.sweep_references(&user).await?;
        }

        self.relations.delete_relation(&user).await?;
        self.relations.delete_profile(&user).await?;
        self.sessions.delete_settings(&user).await?;

        let sessions_deleted = self.delete_sessions(&user).await?;
        let cache_keys_dropped = self.cache.invalidate_owner(&user).await?;

        let report = PurgeReport {
            relations_repaired,
            sessions_deleted,
            cache_keys_dropped,
            full_scan: self.full_scan,
        };
        tracing::info!(
            user = %user,
            relations_repaired = report.relations_repaired,
            sessions_deleted = report.sessions_deleted,
            cache_keys = report.cache_keys_dropped.len(),
            "Account purge complete"
        );
        Ok(report)
    }

    /// Remove `user` from every record its own lists point at.
    async fn repair_neighbours(&self, user: &str) -> Result<usize> {
        let Some(own) = self.relations.get_relation(user).await? else {
            return Ok(0);
        };
        let relations = &self.relations;

        let repaired = stream::iter(own.neighbours())
            .filter(|id| std::future::ready(id != user))
            .map(|id| async move {
                let Some(mut other) = relations.get_relation(&id).await? else {
                    return Ok::<_, AppError>(false);
                };
                if !other.remove_references(user) {
                    return Ok(false);
                }
                relations.put_relation(&other).await?;
                Ok(true)
            })
            .buffer_unordered(MAX_CONCURRENT_REPAIRS)
            .collect::<Vec<Result<bool>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<bool>>>()?;

        Ok(repaired.into_iter().filter(|changed| *changed).count())
    }

    /// Page through the whole collection for references the user's own
    /// lists did not know about.
    async fn sweep_references(&self, user: &str) -> Result<usize> {
        let mut repaired = 0;
        let mut token: Option<String> = None;
        loop {
            let page = self
                .relations
                .scan_relations(token.as_deref(), self.scan_page_size)
                .await?;

            for mut record in page.items {
                if record.user_id == user || !record.remove_references(user) {
                    continue;
                }
                self.relations.put_relation(&record).await?;
                repaired += 1;
                tracing::debug!(user = %user, record = %record.user_id, "Removed stray reference");
            }

            match page.next_page_token {
                Some(next) => token = Some(next),
                None => return Ok(repaired),
            }
        }
    }

    /// Delete the owner's sessions in store-sized chunks.
    async fn delete_sessions(&self, owner: &str) -> Result<usize> {
        let keys: Vec<SessionKey> = self
            .sessions
            .sessions_for_owner(owner)
            .await?
            .iter()
            .map(|s| s.key())
            .collect();

        let chunk_size = self.sessions.max_batch_items().max(1);
        for chunk in keys.chunks(chunk_size) {
            self.delete_chunk(owner, chunk).await?;
        }
        Ok(keys.len())
    }

    /// One chunk, retrying whatever the store reports as unprocessed.
    async fn delete_chunk(&self, owner: &str, chunk: &[SessionKey]) -> Result<()> {
        let mut pending = chunk.to_vec();
        for attempt in 1..=self.retry.max_attempts {
            self.retry.wait(attempt).await;

            pending = match self.sessions.batch_delete(&pending).await {
                Ok(unprocessed) => unprocessed,
                Err(e) => {
                    tracing::warn!(owner = %owner, attempt, error = %e, "Batch delete failed");
                    pending
                }
            };
            if pending.is_empty() {
                return Ok(());
            }
            tracing::debug!(
                owner = %owner,
                attempt,
                remaining = pending.len(),
                "Batch delete left unprocessed items"
            );
        }

        Err(AppError::External(format!(
            "Gave up deleting {} sessions for {} after {} attempts",
            pending.len(),
            owner,
            self.retry.max_attempts
        )))
    }
}
