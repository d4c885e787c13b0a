// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Viewer relations (the bidirectional viewer graph)
//! - Users, session settings and purge tombstones
//! - Activity sessions (partitioned by `Username`)
//! - Cache generation counters

use crate::db::{collections, RelationshipStore, SessionStore};
use crate::error::AppError;
use crate::models::relation::push_unique;
use crate::models::{
    ActivitySession, GrantOutcome, Page, SessionKey, SessionSettings, Tombstone, UserProfile,
    ViewerRelation,
};
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::{FirestoreConsistencySelector, FirestoreTransaction};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Attempts for a read-write transaction that keeps losing lock contention.
const MAX_TRANSACTION_ATTEMPTS: u32 = 10;

/// Stored per-owner cache generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheGeneration {
    username: String,
    generation: u64,
}

fn db_err(e: impl std::fmt::Display) -> AppError {
    AppError::External(e.to_string())
}

/// Document ID for a user-keyed record.
///
/// Emails may contain `/`, which Firestore treats as a path separator.
fn doc_key(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// Why one transaction attempt did not commit.
enum AttemptError {
    /// Aborted by contention; the whole attempt can be re-run.
    Contended(FirestoreError),
    Failed(AppError),
}

impl From<AppError> for AttemptError {
    fn from(e: AppError) -> Self {
        AttemptError::Failed(e)
    }
}

impl From<FirestoreError> for AttemptError {
    fn from(e: FirestoreError) -> Self {
        match e {
            FirestoreError::DatabaseError(ref db) if db.retry_possible => {
                AttemptError::Contended(e)
            }
            other => AttemptError::Failed(db_err(other)),
        }
    }
}

/// Re-run `attempt` while it loses contention, up to [`MAX_TRANSACTION_ATTEMPTS`].
async fn with_contention_retry<T, F, Fut>(
    what: &'static str,
    mut attempt: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Failed(e)) => return Err(e),
            Err(AttemptError::Contended(e)) if tries < MAX_TRANSACTION_ATTEMPTS => {
                tracing::debug!(error = %e, attempt = tries, "{} contended, retrying", what);
                tokio::time::sleep(Duration::from_millis(25 * u64::from(tries))).await;
                tries += 1;
            }
            Err(AttemptError::Contended(e)) => {
                return Err(AppError::External(format!(
                    "{} gave up after {} attempts: {}",
                    what, tries, e
                )));
            }
        }
    }
}

/// Read a document through `tdb`, which is bound to a transaction.
///
/// The read takes part in the transaction's conflict detection.
async fn read_in<T>(
    tdb: &firestore::FirestoreDb,
    collection: &str,
    id: &str,
) -> Result<Option<T>, AttemptError>
where
    T: for<'de> Deserialize<'de> + Send,
{
    Ok(tdb
        .fluent()
        .select()
        .by_id_in(collection)
        .obj()
        .one(doc_key(id))
        .await?)
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::External(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::External(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    async fn get_doc<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.client
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(db_err)
    }

    async fn set_doc<T>(&self, collection: &str, id: &str, doc: &T) -> Result<(), AppError>
    where
        T: Serialize + Sync + Send,
        for<'de> T: Deserialize<'de>,
    {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(doc)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_doc(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.client
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Page through `collection` ordered by `field`, starting after `page_token`.
    async fn scan_page<T>(
        &self,
        collection: &str,
        field: &'static str,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<Vec<T>, AppError>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        // Every stored id sorts after the empty string, so the first page
        // uses the same filtered query as the rest.
        let after = page_token.unwrap_or_default().to_string();

        self.client
            .fluent()
            .select()
            .from(collection)
            .filter(move |q| q.field(field).greater_than(after.clone()))
            .order_by([(field, firestore::FirestoreQueryDirection::Ascending)])
            .limit(page_size)
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    /// Client whose reads run inside `transaction`.
    fn bound_to(&self, transaction: &FirestoreTransaction<'_>) -> firestore::FirestoreDb {
        self.client
            .clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ))
    }

    /// Commit `staged` writes, or roll back when nothing was staged or staging failed.
    async fn finish<T>(
        transaction: FirestoreTransaction<'_>,
        staged: Result<(T, bool), AttemptError>,
    ) -> Result<T, AttemptError> {
        match staged {
            Ok((value, true)) => {
                transaction.commit().await?;
                Ok(value)
            }
            Ok((value, false)) => {
                let _ = transaction.rollback().await;
                Ok(value)
            }
            Err(e) => {
                let _ = transaction.rollback().await;
                Err(e)
            }
        }
    }

    /// One attempt at a grant: tombstone and relation reads, then both writes.
    async fn grant_attempt(
        &self,
        subject: &str,
        viewer: &str,
    ) -> Result<GrantOutcome, AttemptError> {
        let mut transaction = self.client.begin_transaction().await?;
        let tdb = self.bound_to(&transaction);
        let staged = stage_grant(&tdb, &mut transaction, subject, viewer).await;
        Self::finish(transaction, staged).await
    }

    async fn bump_attempt(&self, owner: &str) -> Result<u64, AttemptError> {
        let mut transaction = self.client.begin_transaction().await?;
        let tdb = self.bound_to(&transaction);
        let staged = stage_bump(&tdb, &mut transaction, owner).await;
        Self::finish(transaction, staged).await
    }
}

/// Stage a grant; the flag says whether anything needs committing.
async fn stage_grant(
    tdb: &firestore::FirestoreDb,
    transaction: &mut FirestoreTransaction<'_>,
    subject: &str,
    viewer: &str,
) -> Result<(GrantOutcome, bool), AttemptError> {
    // Reading the tombstones locks them, so a purge cannot start between
    // this check and the commit.
    for user in [subject, viewer] {
        let tombstone: Option<Tombstone> = read_in(tdb, collections::TOMBSTONES, user).await?;
        if tombstone.is_some() {
            return Err(AppError::NotFound(format!("User {} no longer exists", user)).into());
        }
    }

    let mut subject_rel = read_in(tdb, collections::RELATIONS, subject)
        .await?
        .unwrap_or_else(|| ViewerRelation::new(subject));
    let mut viewer_rel = read_in(tdb, collections::RELATIONS, viewer)
        .await?
        .unwrap_or_else(|| ViewerRelation::new(viewer));

    if subject_rel.is_sharing_with(viewer) {
        return Ok((GrantOutcome::AlreadyAuthorized, false));
    }

    push_unique(&mut subject_rel.sharing_with, viewer);
    push_unique(&mut viewer_rel.allowed_to_view, subject);
    subject_rel.dedup();
    viewer_rel.dedup();

    for rel in [&subject_rel, &viewer_rel] {
        tdb.fluent()
            .update()
            .in_col(collections::RELATIONS)
            .document_id(doc_key(&rel.user_id))
            .object(rel)
            .add_to_transaction(&mut *transaction)
            .map_err(|e| {
                AppError::External(format!("Failed to add relation to transaction: {}", e))
            })?;
    }

    Ok((GrantOutcome::Granted, true))
}

async fn stage_bump(
    tdb: &firestore::FirestoreDb,
    transaction: &mut FirestoreTransaction<'_>,
    owner: &str,
) -> Result<(u64, bool), AttemptError> {
    let mut current: CacheGeneration = read_in(tdb, collections::CACHE_GENERATIONS, owner)
        .await?
        .unwrap_or_default();
    current.username = owner.to_string();
    current.generation += 1;

    tdb.fluent()
        .update()
        .in_col(collections::CACHE_GENERATIONS)
        .document_id(doc_key(owner))
        .object(&current)
        .add_to_transaction(&mut *transaction)
        .map_err(|e| {
            AppError::External(format!("Failed to add generation to transaction: {}", e))
        })?;

    Ok((current.generation, true))
}

/// Continuation token for a page that came back full.
fn next_token<T>(items: &[T], page_size: u32, id: impl Fn(&T) -> &str) -> Option<String> {
    if items.len() < page_size as usize {
        return None;
    }
    items.last().map(|item| id(item).to_string())
}

#[async_trait]
impl RelationshipStore for FirestoreDb {
    async fn get_relation(&self, user_id: &str) -> Result<Option<ViewerRelation>, AppError> {
        self.get_doc(collections::RELATIONS, &doc_key(user_id)).await
    }

    async fn create_relation(&self, relation: &ViewerRelation) -> Result<(), AppError> {
        let result: Result<(), _> = self
            .client
            .fluent()
            .insert()
            .into(collections::RELATIONS)
            .document_id(doc_key(&relation.user_id))
            .object(relation)
            .execute()
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(FirestoreError::DataConflictError(_)) => Err(AppError::Conflict(format!(
                "relation {} already exists",
                relation.user_id
            ))),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn put_relation(&self, relation: &ViewerRelation) -> Result<(), AppError> {
        self.set_doc(collections::RELATIONS, &doc_key(&relation.user_id), relation)
            .await
    }

    async fn delete_relation(&self, user_id: &str) -> Result<(), AppError> {
        self.delete_doc(collections::RELATIONS, &doc_key(user_id))
            .await
    }

    async fn apply_grant(&self, subject: &str, viewer: &str) -> Result<GrantOutcome, AppError> {
        with_contention_retry("Grant", || self.grant_attempt(subject, viewer)).await
    }

    async fn scan_relations(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<Page<ViewerRelation>, AppError> {
        let items: Vec<ViewerRelation> = self
            .scan_page(collections::RELATIONS, "userId", page_token, page_size)
            .await?;
        let next_page_token = next_token(&items, page_size, |r| r.user_id.as_str());
        Ok(Page {
            items,
            next_page_token,
        })
    }

    async fn get_profile(&self, email: &str) -> Result<Option<UserProfile>, AppError> {
        self.get_doc(collections::USERS, &doc_key(email)).await
    }

    async fn put_profile(&self, profile: &UserProfile) -> Result<(), AppError> {
        self.set_doc(collections::USERS, &doc_key(&profile.email), profile)
            .await
    }

    async fn delete_profile(&self, email: &str) -> Result<(), AppError> {
        self.delete_doc(collections::USERS, &doc_key(email)).await
    }

    async fn scan_profiles(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<Page<UserProfile>, AppError> {
        let items: Vec<UserProfile> = self
            .scan_page(collections::USERS, "email", page_token, page_size)
            .await?;
        let next_page_token = next_token(&items, page_size, |p| p.email.as_str());
        Ok(Page {
            items,
            next_page_token,
        })
    }

    async fn put_tombstone(&self, tombstone: &Tombstone) -> Result<(), AppError> {
        self.set_doc(
            collections::TOMBSTONES,
            &doc_key(&tombstone.user_id),
            tombstone,
        )
        .await
    }

    async fn is_tombstoned(&self, user_id: &str) -> Result<bool, AppError> {
        let tombstone: Option<Tombstone> = self
            .get_doc(collections::TOMBSTONES, &doc_key(user_id))
            .await?;
        Ok(tombstone.is_some())
    }

    async fn delete_tombstone(&self, user_id: &str) -> Result<(), AppError> {
        self.delete_doc(collections::TOMBSTONES, &doc_key(user_id))
            .await
    }
}

#[async_trait]
impl SessionStore for FirestoreDb {
    async fn put_session(&self, session: &ActivitySession) -> Result<(), AppError> {
        self.set_doc(collections::SESSIONS, &session.key().doc_id(), session)
            .await
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Option<ActivitySession>, AppError> {
        self.get_doc(collections::SESSIONS, &key.doc_id()).await
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<(), AppError> {
        self.delete_doc(collections::SESSIONS, &key.doc_id()).await
    }

    async fn sessions_for_owner(&self, owner: &str) -> Result<Vec<ActivitySession>, AppError> {
        self.client
            .fluent()
            .select()
            .from(collections::SESSIONS)
            .filter(|q| q.for_all([q.field("Username").eq(owner)]))
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    fn max_batch_items(&self) -> usize {
        BATCH_SIZE
    }

    async fn batch_delete(&self, keys: &[SessionKey]) -> Result<Vec<SessionKey>, AppError> {
        let mut transaction = match self.client.begin_transaction().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, count = keys.len(), "Batch delete could not begin");
                return Ok(keys.to_vec());
            }
        };

        for key in keys {
            let staged = self
                .client
                .fluent()
                .delete()
                .from(collections::SESSIONS)
                .document_id(key.doc_id())
                .add_to_transaction(&mut transaction)
                .map(|_| ());
            if let Err(e) = staged {
                let _ = transaction.rollback().await;
                return Err(AppError::External(format!(
                    "Failed to add deletion to transaction: {}",
                    e
                )));
            }
        }

        if let Err(e) = transaction.commit().await {
            tracing::warn!(error = %e, count = keys.len(), "Batch delete commit failed");
            return Ok(keys.to_vec());
        }

        Ok(Vec::new())
    }

    async fn cache_generation(&self, owner: &str) -> Result<u64, AppError> {
        let current: Option<CacheGeneration> = self
            .get_doc(collections::CACHE_GENERATIONS, &doc_key(owner))
            .await?;
        Ok(current.map(|g| g.generation).unwrap_or(0))
    }

    async fn bump_cache_generation(&self, owner: &str) -> Result<u64, AppError> {
        with_contention_retry("Generation bump", || self.bump_attempt(owner)).await
    }

    async fn get_settings(&self, username: &str) -> Result<Option<SessionSettings>, AppError> {
        self.get_doc(collections::SESSION_SETTINGS, &doc_key(username))
            .await
    }

    async fn put_settings(&self, settings: &SessionSettings) -> Result<(), AppError> {
        self.set_doc(
            collections::SESSION_SETTINGS,
            &doc_key(&settings.username),
            settings,
        )
        .await
    }

    async fn delete_settings(&self, username: &str) -> Result<(), AppError> {
        self.delete_doc(collections::SESSION_SETTINGS, &doc_key(username))
            .await
    }
}
