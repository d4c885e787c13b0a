//! Database layer.
//!
//! Services talk to the stores through [`RelationshipStore`] and
//! [`SessionStore`]. [`FirestoreDb`] backs both in production;
//! [`MemoryStore`] backs both for local development and tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{
    ActivitySession, GrantOutcome, Page, SessionKey, SessionSettings, Tombstone, UserProfile,
    ViewerRelation,
};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    /// Viewer graph records (keyed by user id)
    pub const RELATIONS: &str = "viewer_relations";
    /// User directory (keyed by email)
    pub const USERS: &str = "users";
    pub const SESSION_SETTINGS: &str = "session_settings";
    /// Purge tombstones (keyed by user id)
    pub const TOMBSTONES: &str = "purged_users";
    /// Exercise sessions (keyed by `SessionKey::doc_id`)
    pub const SESSIONS: &str = "activity_sessions";
    /// Per-owner cache generation counters
    pub const CACHE_GENERATIONS: &str = "cache_generations";
}

/// Viewer graph, user directory and purge tombstones.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn get_relation(&self, user_id: &str) -> Result<Option<ViewerRelation>, AppError>;

    /// Insert a new record. Fails with [`AppError::Conflict`] if one exists.
    async fn create_relation(&self, relation: &ViewerRelation) -> Result<(), AppError>;

    /// Overwrite a record.
    async fn put_relation(&self, relation: &ViewerRelation) -> Result<(), AppError>;

    async fn delete_relation(&self, user_id: &str) -> Result<(), AppError>;

    /// Append `viewer` to `subject.sharing_with` and `subject` to
    /// `viewer.allowed_to_view` in a single all-or-nothing write.
    ///
    /// Missing records are created. Fails with [`AppError::NotFound`] if
    /// either user has been purged.
    async fn apply_grant(&self, subject: &str, viewer: &str) -> Result<GrantOutcome, AppError>;

    /// One page of relation records in ascending user id order.
    async fn scan_relations(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<Page<ViewerRelation>, AppError>;

    async fn get_profile(&self, email: &str) -> Result<Option<UserProfile>, AppError>;
    async fn put_profile(&self, profile: &UserProfile) -> Result<(), AppError>;
    async fn delete_profile(&self, email: &str) -> Result<(), AppError>;

    /// One page of directory entries in ascending email order.
    async fn scan_profiles(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<Page<UserProfile>, AppError>;

    async fn put_tombstone(&self, tombstone: &Tombstone) -> Result<(), AppError>;
    async fn is_tombstoned(&self, user_id: &str) -> Result<bool, AppError>;
    async fn delete_tombstone(&self, user_id: &str) -> Result<(), AppError>;
}

/// Exercise sessions (partitioned by owner) and per-user session settings.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upsert keyed by (username, session id).
    async fn put_session(&self, session: &ActivitySession) -> Result<(), AppError>;

    async fn get_session(&self, key: &SessionKey) -> Result<Option<ActivitySession>, AppError>;

    /// Deleting a missing key succeeds.
    async fn delete_session(&self, key: &SessionKey) -> Result<(), AppError>;

    /// Every session owned by `owner`, in store order.
    async fn sessions_for_owner(&self, owner: &str) -> Result<Vec<ActivitySession>, AppError>;

    /// Largest number of keys one [`SessionStore::batch_delete`] call accepts.
    fn max_batch_items(&self) -> usize;

    /// Delete a batch of at most `max_batch_items` keys.
    ///
    /// Returns the keys the store did not process; callers retry those.
    async fn batch_delete(&self, keys: &[SessionKey]) -> Result<Vec<SessionKey>, AppError>;

    /// Current cache generation for `owner` (0 if never bumped).
    async fn cache_generation(&self, owner: &str) -> Result<u64, AppError>;

    /// Increment and return the cache generation for `owner`.
    async fn bump_cache_generation(&self, owner: &str) -> Result<u64, AppError>;

    async fn get_settings(&self, username: &str) -> Result<Option<SessionSettings>, AppError>;
    async fn put_settings(&self, settings: &SessionSettings) -> Result<(), AppError>;
    async fn delete_settings(&self, username: &str) -> Result<(), AppError>;
}
