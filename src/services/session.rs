// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session upload, verification, deletion and per-user settings.
//!
//! Every write to an owner's sessions is followed by a synchronous cache
//! invalidation for that owner, before the caller gets its response.

use crate::db::SessionStore;
use crate::error::{AppError, Result};
use crate::models::{ActivitySession, Hand, RawSessionEntry, SessionKey, SessionSettings};
use crate::services::CacheCoordinator;
use crate::time_utils::format_utc_rfc3339;
use serde::Deserialize;
use std::sync::Arc;

/// Outcome of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub session: ActivitySession,
    pub invalidated_keys: Vec<String>,
}

/// Partial settings update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub default_hand: Option<String>,
    pub target_reps: Option<u32>,
}

pub struct SessionService {
    store: Arc<dyn SessionStore>,
    cache: Arc<CacheCoordinator>,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, cache: Arc<CacheCoordinator>) -> Self {
        Self { store, cache }
    }

    /// Normalize, upsert and invalidate the owner's cached queries.
    pub async fn upload_session(&self, raw: RawSessionEntry) -> Result<UploadOutcome> {
        let session = raw.normalize()?;
        self.store.put_session(&session).await?;

        let invalidated_keys = self.cache.invalidate_owner(&session.username).await?;

        tracing::info!(
            username = %session.username,
            session_id = %session.session_id,
            exercise = %session.exercise_name,
            invalidated = invalidated_keys.len(),
            "Stored session"
        );
        Ok(UploadOutcome {
            session,
            invalidated_keys,
        })
    }

    pub async fn verify_exists(&self, owner: &str, session_id: &str) -> Result<bool> {
        let key = SessionKey::new(owner, session_id);
        Ok(self.store.get_session(&key).await?.is_some())
    }

    /// Idempotent; returns the cache keys dropped for the owner.
    pub async fn delete_session(&self, owner: &str, session_id: &str) -> Result<Vec<String>> {
        let key = SessionKey::new(owner, session_id);
        self.store.delete_session(&key).await?;
        let invalidated = self.cache.invalidate_owner(&key.username).await?;

        tracing::info!(
            username = %key.username,
            session_id = %key.session_id,
            "Deleted session"
        );
        Ok(invalidated)
    }

    /// Whether the stored record equals `expected` after normalization.
    pub async fn verify_fields(&self, expected: RawSessionEntry) -> Result<bool> {
        let expected = expected.normalize()?;
        let Some(stored) = self.store.get_session(&expected.key()).await? else {
            tracing::debug!(session_id = %expected.session_id, "No stored session to verify");
            return Ok(false);
        };

        let mismatched = stored.mismatched_fields(&expected);
        if !mismatched.is_empty() {
            tracing::info!(
                username = %expected.username,
                session_id = %expected.session_id,
                fields = ?mismatched,
                "Stored session differs from expected"
            );
        }
        Ok(mismatched.is_empty())
    }

    /// Settings for `username`, creating the defaults on first lookup.
    pub async fn get_settings(&self, username: &str) -> Result<SessionSettings> {
        if let Some(settings) = self.store.get_settings(username).await? {
            return Ok(settings);
        }

        let settings = SessionSettings::default_for(username, &now());
        self.store.put_settings(&settings).await?;
        tracing::info!(username, "Created default session settings");
        Ok(settings)
    }

    pub async fn update_settings(
        &self,
        username: &str,
        patch: SettingsPatch,
    ) -> Result<SessionSettings> {
        let mut settings = self.get_settings(username).await?;

        if let Some(raw) = patch.default_hand.as_deref() {
            settings.default_hand = Hand::parse(raw).ok_or_else(|| {
                AppError::Validation(format!("Invalid defaultHand: {}", raw))
            })?;
        }
        if let Some(target) = patch.target_reps {
            if target == 0 {
                return Err(AppError::Validation(
                    "targetReps must be at least 1".to_string(),
                ));
            }
            settings.target_reps = target;
        }
        settings.updated_at = now();

        self.store.put_settings(&settings).await?;
        Ok(settings)
    }
}

fn now() -> String {
    format_utc_rfc3339(chrono::Utc::now())
}
