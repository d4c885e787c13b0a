// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Viewer graph: who may view whose session data.
//!
//! Each user's record carries two lists, `sharing_with` and
//! `allowed_to_view`, which must mirror each other across records. Grants go
//! through [`RelationshipStore::apply_grant`], which writes both records at
//! once. [`ViewerGraphService::reconcile`] repairs records written before
//! that was the case.

use crate::db::RelationshipStore;
use crate::error::{AppError, Result};
use crate::models::relation::push_unique;
use crate::models::{GrantOutcome, UserProfile, ViewerRelation};
use crate::time_utils::format_utc_rfc3339;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use validator::ValidateEmail;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Upper bound for `search_users` results.
pub const MAX_SEARCH_RESULTS: usize = 50;

/// Result of a successful grant.
#[derive(Debug, Clone)]
pub struct GrantResult {
    pub outcome: GrantOutcome,
    pub message: String,
}

/// A subject the viewer may look at.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SubjectSummary {
    pub name: String,
    pub email: String,
}

/// Totals from one reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub records_scanned: usize,
    pub records_written: usize,
    pub edges_restored: usize,
    pub dangling_removed: usize,
    pub duplicates_collapsed: usize,
}

/// Lowercased, trimmed user identifier.
pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub struct ViewerGraphService {
    store: Arc<dyn RelationshipStore>,
    scan_page_size: u32,
}

impl ViewerGraphService {
    pub fn new(store: Arc<dyn RelationshipStore>, scan_page_size: u32) -> Self {
        Self {
            store,
            scan_page_size: scan_page_size.max(1),
        }
    }

    /// Let `viewer_candidate` view `subject`'s data.
    pub async fn grant_access(&self, subject: &str, viewer_candidate: &str) -> Result<GrantResult> {
        let subject = normalize_id(subject);
        let viewer = normalize_id(viewer_candidate);

        if !viewer.validate_email() {
            return Err(AppError::Validation(format!(
                "❌ {} is not a valid email address",
                viewer_candidate.trim()
            )));
        }
        if viewer == subject {
            return Err(AppError::SelfGrant);
        }

        let outcome = self.store.apply_grant(&subject, &viewer).await?;
        let message = match outcome {
            GrantOutcome::Granted => {
                tracing::info!(subject = %subject, viewer = %viewer, "Granted viewer access");
                format!("✅ {} can now view your sessions", viewer)
            }
            GrantOutcome::AlreadyAuthorized => {
                tracing::debug!(subject = %subject, viewer = %viewer, "Grant already present");
                format!("ℹ️ {} is already authorized", viewer)
            }
        };

        Ok(GrantResult { outcome, message })
    }

    pub async fn is_already_authorized(&self, subject: &str, candidate: &str) -> Result<bool> {
        let subject = normalize_id(subject);
        let candidate = normalize_id(candidate);
        Ok(self
            .store
            .get_relation(&subject)
            .await?
            .is_some_and(|rel| rel.is_sharing_with(&candidate)))
    }

    /// Whether `viewer` may read `subject`'s sessions. Everyone may read
    /// their own.
    pub async fn may_view(&self, viewer: &str, subject: &str) -> Result<bool> {
        let viewer = normalize_id(viewer);
        let subject = normalize_id(subject);
        if viewer == subject {
            return Ok(true);
        }
        Ok(self
            .store
            .get_relation(&viewer)
            .await?
            .is_some_and(|rel| rel.may_view(&subject)))
    }

    /// Subjects `viewer` may view, optionally narrowed by a case-insensitive
    /// match on name or email.
    pub async fn list_viewable_subjects(
        &self,
        viewer: &str,
        query: Option<&str>,
    ) -> Result<Vec<SubjectSummary>> {
        let viewer = normalize_id(viewer);
        let Some(relation) = self.store.get_relation(&viewer).await? else {
            return Ok(Vec::new());
        };

        let needle = query
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());

        let mut seen = HashSet::new();
        let mut subjects = Vec::new();
        for email in relation.allowed_to_view {
            if !seen.insert(email.clone()) {
                continue;
            }
            let name = self
                .store
                .get_profile(&email)
                .await?
                .map(|p| p.name)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| email.clone());

            let keep = match needle.as_deref() {
                Some(q) => email.contains(q) || name.to_lowercase().contains(q),
                None => true,
            };
            if keep {
                subjects.push(SubjectSummary { name, email });
            }
        }
        Ok(subjects)
    }

    /// Directory search by substring of email or name, excluding `requester`.
    pub async fn search_users(
        &self,
        requester: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let requester = normalize_id(requester);
        let needle = query.trim().to_lowercase();
        let limit = limit.clamp(1, MAX_SEARCH_RESULTS);
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .store
                .scan_profiles(token.as_deref(), self.scan_page_size)
                .await?;
            for profile in page.items {
                if profile.email == requester {
                    continue;
                }
                if profile.email.contains(&needle) || profile.name.to_lowercase().contains(&needle)
                {
                    results.push(profile.email);
                    if results.len() == limit {
                        return Ok(results);
                    }
                }
            }
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => return Ok(results),
            }
        }
    }

    /// Create the directory entry and an empty relation record.
    ///
    /// Safe to call again for an existing user: the relation is left as is
    /// and only a changed display name is written.
    pub async fn register(&self, user: &str, name: Option<&str>) -> Result<UserProfile> {
        let user = normalize_id(user);
        if !user.validate_email() {
            return Err(AppError::Validation(format!(
                "❌ {} is not a valid email address",
                user
            )));
        }
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        // A new account under a purged address starts clean.
        if self.store.is_tombstoned(&user).await? {
            self.store.delete_tombstone(&user).await?;
            tracing::info!(user = %user, "Cleared purge tombstone on re-registration");
        }

        let profile = match self.store.get_profile(&user).await? {
            Some(mut existing) => {
                if let Some(name) = name {
                    if existing.name != name {
                        existing.name = name;
                        self.store.put_profile(&existing).await?;
                    }
                }
                existing
            }
            None => {
                let profile = UserProfile {
                    email: user.clone(),
                    name: name.unwrap_or_else(|| user.clone()),
                    created_at: format_utc_rfc3339(chrono::Utc::now()),
                };
                self.store.put_profile(&profile).await?;
                profile
            }
        };

        match self.store.create_relation(&ViewerRelation::new(&user)).await {
            Ok(()) => tracing::info!(user = %user, "Registered user"),
            Err(AppError::Conflict(_)) => {
                tracing::debug!(user = %user, "Relation record already exists")
            }
            Err(e) => return Err(e),
        }

        Ok(profile)
    }

    pub async fn get_profile(&self, user: &str) -> Result<Option<UserProfile>> {
        self.store.get_profile(&normalize_id(user)).await
    }

    /// Page through every relation record and restore mirrored edges.
    ///
    /// An edge present on one side only is added to the other side when that
    /// record exists and its owner has not been purged; otherwise the
    /// dangling entry is dropped. Duplicate entries are collapsed.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .store
                .scan_relations(token.as_deref(), self.scan_page_size)
                .await?;

            for record in page.items {
                report.records_scanned += 1;
                self.reconcile_record(&record.user_id, &mut report).await?;
            }

            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tracing::info!(
            scanned = report.records_scanned,
            written = report.records_written,
            restored = report.edges_restored,
            dangling = report.dangling_removed,
            duplicates = report.duplicates_collapsed,
            "Viewer graph reconciliation finished"
        );
        Ok(report)
    }

    async fn reconcile_record(&self, user_id: &str, report: &mut ReconcileReport) -> Result<()> {
        if self.store.is_tombstoned(user_id).await? {
            return Ok(());
        }
        // Re-read: earlier records in this sweep may have touched it.
        let Some(mut record) = self.store.get_relation(user_id).await? else {
            return Ok(());
        };

        let mut changed = false;
        if record.dedup() {
            report.duplicates_collapsed += 1;
            changed = true;
        }

        for viewer in record.sharing_with.clone() {
            match self.live_relation(&viewer).await? {
                Some(mut other) => {
                    if push_unique(&mut other.allowed_to_view, user_id) {
                        self.store.put_relation(&other).await?;
                        report.edges_restored += 1;
                        report.records_written += 1;
                    }
                }
                None => {
                    record.sharing_with.retain(|u| u != &viewer);
                    report.dangling_removed += 1;
                    changed = true;
                }
            }
        }

        for subject in record.allowed_to_view.clone() {
            match self.live_relation(&subject).await? {
                Some(mut other) => {
                    if push_unique(&mut other.sharing_with, user_id) {
                        self.store.put_relation(&other).await?;
                        report.edges_restored += 1;
                        report.records_written += 1;
                    }
                }
                None => {
                    record.allowed_to_view.retain(|u| u != &subject);
                    report.dangling_removed += 1;
                    changed = true;
                }
            }
        }

        if changed {
            self.store.put_relation(&record).await?;
            report.records_written += 1;
            tracing::debug!(user = %user_id, "Repaired relation record");
        }
        Ok(())
    }

    /// The record for `user_id`, unless it is missing or purged.
    async fn live_relation(&self, user_id: &str) -> Result<Option<ViewerRelation>> {
        if self.store.is_tombstoned(user_id).await? {
            return Ok(None);
        }
        self.store.get_relation(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::Tombstone;

    fn service() -> (ViewerGraphService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ViewerGraphService::new(store.clone(), 2), store)
    }

    fn rel(id: &str, sharing: &[&str], allowed: &[&str]) -> ViewerRelation {
        ViewerRelation {
            user_id: id.to_string(),
            sharing_with: sharing.iter().map(|s| s.to_string()).collect(),
            allowed_to_view: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_self_grant_rejected_without_mutation() {
        let (svc, store) = service();
        svc.register("doc@x.com", None).await.unwrap();

        let err = svc.grant_access("doc@x.com", "DOC@x.com").await.unwrap_err();
        assert!(matches!(err, AppError::SelfGrant));
        assert_eq!(err.to_string(), "❌ You cannot grant access to yourself");

        let record = store.get_relation("doc@x.com").await.unwrap().unwrap();
        assert!(record.sharing_with.is_empty());
        assert!(record.allowed_to_view.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let (svc, store) = service();
        let err = svc.grant_access("pat@x.com", "not an email").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.get_relation("pat@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grant_is_mirrored_and_idempotent() {
        let (svc, store) = service();
        let first = svc.grant_access("pat@x.com", "doc@x.com").await.unwrap();
        assert_eq!(first.outcome, GrantOutcome::Granted);
        assert!(first.message.starts_with('✅'));

        let second = svc.grant_access("pat@x.com", "doc@x.com").await.unwrap();
        assert_eq!(second.outcome, GrantOutcome::AlreadyAuthorized);
        assert!(second.message.contains("already authorized"));

        let pat = store.get_relation("pat@x.com").await.unwrap().unwrap();
        let doc = store.get_relation("doc@x.com").await.unwrap().unwrap();
        assert_eq!(pat.sharing_with, vec!["doc@x.com"]);
        assert_eq!(doc.allowed_to_view, vec!["pat@x.com"]);
        assert!(svc.is_already_authorized("pat@x.com", "doc@x.com").await.unwrap());
        assert!(svc.may_view("doc@x.com", "pat@x.com").await.unwrap());
        assert!(!svc.may_view("pat@x.com", "doc@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_to_purged_user_rejected() {
        let (svc, store) = service();
        store
            .put_tombstone(&Tombstone {
                user_id: "gone@x.com".into(),
                purged_at: "2025-01-01T00:00:00.000Z".into(),
            })
            .await
            .unwrap();
        let err = svc.grant_access("pat@x.com", "gone@x.com").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // Signing up again under the same address lifts the block.
        svc.register("gone@x.com", Some("Back")).await.unwrap();
        svc.grant_access("pat@x.com", "gone@x.com").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_viewable_subjects_with_names_and_query() {
        let (svc, _) = service();
        svc.register("pat@x.com", Some("Pat Patient")).await.unwrap();
        svc.grant_access("pat@x.com", "doc@x.com").await.unwrap();
        svc.grant_access("other@x.com", "doc@x.com").await.unwrap();

        let all = svc.list_viewable_subjects("doc@x.com", None).await.unwrap();
        assert_eq!(
            all,
            vec![
                SubjectSummary {
                    name: "Pat Patient".into(),
                    email: "pat@x.com".into()
                },
                SubjectSummary {
                    name: "other@x.com".into(),
                    email: "other@x.com".into()
                },
            ]
        );

        let narrowed = svc
            .list_viewable_subjects("doc@x.com", Some("PATIENT"))
            .await
            .unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].email, "pat@x.com");
    }

    #[tokio::test]
    async fn test_search_users_excludes_requester_and_limits() {
        let (svc, _) = service();
        for user in ["ann@x.com", "bob@x.com", "cat@x.com", "dan@y.com"] {
            svc.register(user, None).await.unwrap();
        }

        let hits = svc.search_users("ann@x.com", "X.COM", 10).await.unwrap();
        assert_eq!(hits, vec!["bob@x.com", "cat@x.com"]);

        let limited = svc.search_users("dan@y.com", "@", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert!(svc.search_users("ann@x.com", "  ", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_twice_is_noop() {
        let (svc, store) = service();
        svc.register("pat@x.com", Some("Pat")).await.unwrap();
        svc.grant_access("pat@x.com", "doc@x.com").await.unwrap();
        svc.register("pat@x.com", None).await.unwrap();

        let pat = store.get_relation("pat@x.com").await.unwrap().unwrap();
        assert_eq!(pat.sharing_with, vec!["doc@x.com"]);
        assert_eq!(store.get_profile("pat@x.com").await.unwrap().unwrap().name, "Pat");
    }

    #[tokio::test]
    async fn test_reconcile_repairs_one_sided_edges() {
        let (svc, store) = service();
        // pat shares with doc, but doc's record never got the mirror entry.
        store
            .seed_relation(rel("pat@x.com", &["doc@x.com", "doc@x.com"], &[]))
            .await;
        store.seed_relation(rel("doc@x.com", &[], &[])).await;
        // ann claims to view a user with no record at all.
        store.seed_relation(rel("ann@x.com", &[], &["ghost@x.com"])).await;

        let report = svc.reconcile().await.unwrap();
        assert_eq!(report.records_scanned, 3);
        assert_eq!(report.edges_restored, 1);
        assert_eq!(report.dangling_removed, 1);
        assert_eq!(report.duplicates_collapsed, 1);

        let pat = store.get_relation("pat@x.com").await.unwrap().unwrap();
        let doc = store.get_relation("doc@x.com").await.unwrap().unwrap();
        let ann = store.get_relation("ann@x.com").await.unwrap().unwrap();
        assert_eq!(pat.sharing_with, vec!["doc@x.com"]);
        assert_eq!(doc.allowed_to_view, vec!["pat@x.com"]);
        assert!(ann.allowed_to_view.is_empty());

        // A second sweep finds nothing to do.
        let again = svc.reconcile().await.unwrap();
        assert_eq!(again.records_written, 0);
    }
}
