// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local implementation of both stores.
//!
//! Each collection sits behind its own `tokio::sync::RwLock`. Single-key
//! writes are atomic, and `apply_grant` updates both relation records under
//! one write guard, which gives the same all-or-nothing result as the
//! Firestore transaction.

use crate::db::{RelationshipStore, SessionStore};
use crate::error::AppError;
use crate::models::relation::push_unique;
use crate::models::{
    ActivitySession, GrantOutcome, Page, SessionKey, SessionSettings, Tombstone, UserProfile,
    ViewerRelation,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Small limit so chunking is exercised without huge fixtures.
const MEMORY_BATCH_SIZE: usize = 25;

/// In-memory store for development and tests.
#[derive(Default)]
pub struct MemoryStore {
    relations: RwLock<BTreeMap<String, ViewerRelation>>,
    profiles: RwLock<BTreeMap<String, UserProfile>>,
    settings: RwLock<HashMap<String, SessionSettings>>,
    tombstones: RwLock<HashMap<String, Tombstone>>,
    /// Keyed by `SessionKey::doc_id`
    sessions: RwLock<BTreeMap<String, ActivitySession>>,
    generations: RwLock<HashMap<String, u64>>,
    /// Number of upcoming `batch_delete` calls that only process one key.
    partial_batches: AtomicUsize,
    /// When set, every store call fails as if the backend were unreachable.
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` batch deletes process only their first key.
    pub fn inject_partial_batches(&self, count: usize) {
        self.partial_batches.store(count, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::External("memory store offline".to_string()));
        }
        Ok(())
    }

    /// Overwrite a relation record without any invariant maintenance.
    ///
    /// Lets tests seed graphs that a pre-transactional writer could leave behind.
    pub async fn seed_relation(&self, relation: ViewerRelation) {
        self.relations
            .write()
            .await
            .insert(relation.user_id.clone(), relation);
    }
}

/// Up to `page_size` values strictly after `page_token`, plus the next token.
fn page_of<T: Clone>(
    map: &BTreeMap<String, T>,
    page_token: Option<&str>,
    page_size: u32,
) -> Page<T> {
    let lower = match page_token {
        Some(token) => Bound::Excluded(token.to_string()),
        None => Bound::Unbounded,
    };
    let page: Vec<(&String, &T)> = map
        .range((lower, Bound::Unbounded))
        .take(page_size as usize)
        .collect();

    let next_page_token = if page.len() == page_size as usize {
        page.last().map(|(k, _)| (*k).clone())
    } else {
        None
    };

    Page {
        items: page.into_iter().map(|(_, v)| v.clone()).collect(),
        next_page_token,
    }
}

#[async_trait]
impl RelationshipStore for MemoryStore {
    async fn get_relation(&self, user_id: &str) -> Result<Option<ViewerRelation>, AppError> {
        self.check_online()?;
        Ok(self.relations.read().await.get(user_id).cloned())
    }

    async fn create_relation(&self, relation: &ViewerRelation) -> Result<(), AppError> {
        self.check_online()?;
        let mut relations = self.relations.write().await;
        if relations.contains_key(&relation.user_id) {
            return Err(AppError::Conflict(format!(
                "relation {} already exists",
                relation.user_id
            )));
        }
        relations.insert(relation.user_id.clone(), relation.clone());
        Ok(())
    }

    async fn put_relation(&self, relation: &ViewerRelation) -> Result<(), AppError> {
        self.check_online()?;
        self.relations
            .write()
            .await
            .insert(relation.user_id.clone(), relation.clone());
        Ok(())
    }

    async fn delete_relation(&self, user_id: &str) -> Result<(), AppError> {
        self.check_online()?;
        self.relations.write().await.remove(user_id);
        Ok(())
    }

    async fn apply_grant(&self, subject: &str, viewer: &str) -> Result<GrantOutcome, AppError> {
        self.check_online()?;
        // Lock order: tombstones, then relations.
        let tombstones = self.tombstones.read().await;
        for user in [subject, viewer] {
            if tombstones.contains_key(user) {
                return Err(AppError::NotFound(format!("User {} no longer exists", user)));
            }
        }

        let mut relations = self.relations.write().await;
        let mut subject_rel = relations
            .get(subject)
            .cloned()
            .unwrap_or_else(|| ViewerRelation::new(subject));
        if subject_rel.is_sharing_with(viewer) {
            return Ok(GrantOutcome::AlreadyAuthorized);
        }
        let mut viewer_rel = relations
            .get(viewer)
            .cloned()
            .unwrap_or_else(|| ViewerRelation::new(viewer));

        push_unique(&mut subject_rel.sharing_with, viewer);
        push_unique(&mut viewer_rel.allowed_to_view, subject);

        relations.insert(subject.to_string(), subject_rel);
        relations.insert(viewer.to_string(), viewer_rel);
        Ok(GrantOutcome::Granted)
    }

    async fn scan_relations(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<Page<ViewerRelation>, AppError> {
        self.check_online()?;
        Ok(page_of(&*self.relations.read().await, page_token, page_size))
    }

    async fn get_profile(&self, email: &str) -> Result<Option<UserProfile>, AppError> {
        self.check_online()?;
        Ok(self.profiles.read().await.get(email).cloned())
    }

    async fn put_profile(&self, profile: &UserProfile) -> Result<(), AppError> {
        self.check_online()?;
        self.profiles
            .write()
            .await
            .insert(profile.email.clone(), profile.clone());
        Ok(())
    }

    async fn delete_profile(&self, email: &str) -> Result<(), AppError> {
        self.check_online()?;
        self.profiles.write().await.remove(email);
        Ok(())
    }

    async fn scan_profiles(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<Page<UserProfile>, AppError> {
        self.check_online()?;
        Ok(page_of(&*self.profiles.read().await, page_token, page_size))
    }

    async fn put_tombstone(&self, tombstone: &Tombstone) -> Result<(), AppError> {
        self.check_online()?;
        self.tombstones
            .write()
            .await
            .insert(tombstone.user_id.clone(), tombstone.clone());
        Ok(())
    }

    async fn is_tombstoned(&self, user_id: &str) -> Result<bool, AppError> {
        self.check_online()?;
        Ok(self.tombstones.read().await.contains_key(user_id))
    }

    async fn delete_tombstone(&self, user_id: &str) -> Result<(), AppError> {
        self.check_online()?;
        self.tombstones.write().await.remove(user_id);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn put_session(&self, session: &ActivitySession) -> Result<(), AppError> {
        self.check_online()?;
        self.sessions
            .write()
            .await
            .insert(session.key().doc_id(), session.clone());
        Ok(())
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Option<ActivitySession>, AppError> {
        self.check_online()?;
        Ok(self.sessions.read().await.get(&key.doc_id()).cloned())
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<(), AppError> {
        self.check_online()?;
        self.sessions.write().await.remove(&key.doc_id());
        Ok(())
    }

    async fn sessions_for_owner(&self, owner: &str) -> Result<Vec<ActivitySession>, AppError> {
        self.check_online()?;
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.username == owner)
            .cloned()
            .collect())
    }

    fn max_batch_items(&self) -> usize {
        MEMORY_BATCH_SIZE
    }

    async fn batch_delete(&self, keys: &[SessionKey]) -> Result<Vec<SessionKey>, AppError> {
        self.check_online()?;
        if keys.len() > MEMORY_BATCH_SIZE {
            return Err(AppError::Validation(format!(
                "batch of {} exceeds limit of {}",
                keys.len(),
                MEMORY_BATCH_SIZE
            )));
        }

        let partial = self
            .partial_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let processed = if partial { keys.len().min(1) } else { keys.len() };

        let mut sessions = self.sessions.write().await;
        for key in &keys[..processed] {
            sessions.remove(&key.doc_id());
        }
        Ok(keys[processed..].to_vec())
    }

    async fn cache_generation(&self, owner: &str) -> Result<u64, AppError> {
        self.check_online()?;
        Ok(self
            .generations
            .read()
            .await
            .get(owner)
            .copied()
            .unwrap_or(0))
    }

    async fn bump_cache_generation(&self, owner: &str) -> Result<u64, AppError> {
        self.check_online()?;
        let mut generations = self.generations.write().await;
        let generation = generations.entry(owner.to_string()).or_insert(0);
        *generation += 1;
        Ok(*generation)
    }

    async fn get_settings(&self, username: &str) -> Result<Option<SessionSettings>, AppError> {
        self.check_online()?;
        Ok(self.settings.read().await.get(username).cloned())
    }

    async fn put_settings(&self, settings: &SessionSettings) -> Result<(), AppError> {
        self.check_online()?;
        self.settings
            .write()
            .await
            .insert(settings.username.clone(), settings.clone());
        Ok(())
    }

    async fn delete_settings(&self, username: &str) -> Result<(), AppError> {
        self.check_online()?;
        self.settings.write().await.remove(username);
        Ok(())
    }
}
