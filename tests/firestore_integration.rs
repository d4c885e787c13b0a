// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Start it with `gcloud emulators firestore start` and export
//! FIRESTORE_EMULATOR_HOST before running `cargo test`.
//!
//! Every test works on ids carrying a unique suffix, so runs never collide.

use futures_util::future::join_all;
use serde_json::json;
use therapy_tracker::db::{RelationshipStore, SessionStore};
use therapy_tracker::error::AppError;
use therapy_tracker::models::{
    ActivitySession, GrantOutcome, RawSessionEntry, SessionKey, Tombstone, ViewerRelation,
};

mod common;
use common::{test_db, unique_suffix};

fn session(owner: &str, id: &str) -> ActivitySession {
    let raw: RawSessionEntry = serde_json::from_value(json!({
        "Username": owner,
        "SessionID": id,
        "Timestamp": "2025-03-01T08:30:00Z",
        "ExerciseName": "Finger Tap",
        "Hand": "Left",
    }))
    .unwrap();
    raw.normalize().unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// VIEWER GRAPH TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_apply_grant_writes_both_sides() {
    require_emulator!();

    let db = test_db().await;
    let n = unique_suffix();
    let subject = format!("subject-{}@x.com", n);
    let viewer = format!("viewer-{}@x.com", n);

    let outcome = db.apply_grant(&subject, &viewer).await.unwrap();
    assert_eq!(outcome, GrantOutcome::Granted);

    let subject_rel = db.get_relation(&subject).await.unwrap().unwrap();
    let viewer_rel = db.get_relation(&viewer).await.unwrap().unwrap();
    assert_eq!(subject_rel.sharing_with, vec![viewer.clone()]);
    assert_eq!(viewer_rel.allowed_to_view, vec![subject.clone()]);

    // Second grant is a no-op
    let outcome = db.apply_grant(&subject, &viewer).await.unwrap();
    assert_eq!(outcome, GrantOutcome::AlreadyAuthorized);
    let subject_rel = db.get_relation(&subject).await.unwrap().unwrap();
    assert_eq!(subject_rel.sharing_with.len(), 1);
}

#[tokio::test]
async fn test_apply_grant_rejects_tombstoned_user() {
    require_emulator!();

    let db = test_db().await;
    let n = unique_suffix();
    let subject = format!("subject-{}@x.com", n);
    let gone = format!("gone-{}@x.com", n);

    db.put_tombstone(&Tombstone {
        user_id: gone.clone(),
        purged_at: chrono::Utc::now().to_rfc3339(),
    })
    .await
    .unwrap();
    assert!(db.is_tombstoned(&gone).await.unwrap());

    let err = db.apply_grant(&subject, &gone).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(db.get_relation(&subject).await.unwrap().is_none());

    db.delete_tombstone(&gone).await.unwrap();
    assert!(!db.is_tombstoned(&gone).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_grants_to_one_viewer_keep_both_sides() {
    require_emulator!();

    let db = test_db().await;
    let n = unique_suffix();
    let viewer = format!("shared-viewer-{}@x.com", n);
    let subjects: Vec<String> = (0..5).map(|i| format!("subject-{}-{}@x.com", n, i)).collect();

    let results = join_all(subjects.iter().map(|s| db.apply_grant(s, &viewer))).await;
    for result in results {
        assert_eq!(result.unwrap(), GrantOutcome::Granted);
    }

    let viewer_rel = db.get_relation(&viewer).await.unwrap().unwrap();
    assert_eq!(viewer_rel.allowed_to_view.len(), subjects.len());
    for subject in &subjects {
        assert!(viewer_rel.may_view(subject));
        let subject_rel = db.get_relation(subject).await.unwrap().unwrap();
        assert_eq!(subject_rel.sharing_with, vec![viewer.clone()]);
    }
}

#[tokio::test]
async fn test_ids_with_slash_stay_single_documents() {
    require_emulator!();

    let db = test_db().await;
    let n = unique_suffix();
    let subject = format!("a/b-{}@x.com", n);
    let viewer = format!("c/d-{}@x.com", n);

    db.apply_grant(&subject, &viewer).await.unwrap();

    let subject_rel = db.get_relation(&subject).await.unwrap().unwrap();
    assert_eq!(subject_rel.user_id, subject);
    assert!(subject_rel.is_sharing_with(&viewer));
    assert!(db.get_relation(&viewer).await.unwrap().unwrap().may_view(&subject));
}

#[tokio::test]
async fn test_create_relation_conflict() {
    require_emulator!();

    let db = test_db().await;
    let id = format!("conflict-{}@x.com", unique_suffix());

    db.create_relation(&ViewerRelation::new(id.as_str()))
        .await
        .unwrap();
    let err = db
        .create_relation(&ViewerRelation::new(id.as_str()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    db.delete_relation(&id).await.unwrap();
    assert!(db.get_relation(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_scan_relations_pages_in_order() {
    require_emulator!();

    let db = test_db().await;
    let n = unique_suffix();
    let ids: Vec<String> = (0..5).map(|i| format!("scan-{}-{}@x.com", n, i)).collect();
    for id in &ids {
        db.put_relation(&ViewerRelation::new(id.as_str()))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = db.scan_relations(token.as_deref(), 2).await.unwrap();
        assert!(page.items.len() <= 2);
        seen.extend(page.items.into_iter().map(|r| r.user_id));
        token = page.next_page_token;
        if token.is_none() {
            break;
        }
    }

    // Other tests share the emulator; only check ours came back in order.
    let ours: Vec<&String> = seen.iter().filter(|id| ids.contains(id)).collect();
    assert_eq!(ours, ids.iter().collect::<Vec<_>>());
}

// ═══════════════════════════════════════════════════════════════════════════
// SESSION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_session_upsert_and_owner_query() {
    require_emulator!();

    let db = test_db().await;
    let owner = format!("owner-{}@x.com", unique_suffix());

    db.put_session(&session(&owner, "s1")).await.unwrap();
    db.put_session(&session(&owner, "s1")).await.unwrap();
    db.put_session(&session(&owner, "s2")).await.unwrap();

    let sessions = db.sessions_for_owner(&owner).await.unwrap();
    assert_eq!(sessions.len(), 2);

    let key = SessionKey::new(&owner, "s1");
    let fetched = db.get_session(&key).await.unwrap().unwrap();
    assert_eq!(fetched, session(&owner, "s1"));

    db.delete_session(&key).await.unwrap();
    assert!(db.get_session(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_batch_delete_removes_every_key() {
    require_emulator!();

    let db = test_db().await;
    let owner = format!("batch-{}@x.com", unique_suffix());

    let mut keys = Vec::new();
    for i in 0..7 {
        let s = session(&owner, &format!("s{}", i));
        keys.push(s.key());
        db.put_session(&s).await.unwrap();
    }

    let unprocessed = db.batch_delete(&keys).await.unwrap();
    assert!(unprocessed.is_empty());
    assert!(db.sessions_for_owner(&owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cache_generation_bump() {
    require_emulator!();

    let db = test_db().await;
    let owner = format!("gen-{}@x.com", unique_suffix());

    assert_eq!(db.cache_generation(&owner).await.unwrap(), 0);
    assert_eq!(db.bump_cache_generation(&owner).await.unwrap(), 1);
    assert_eq!(db.bump_cache_generation(&owner).await.unwrap(), 2);
    assert_eq!(db.cache_generation(&owner).await.unwrap(), 2);
}

#[tokio::test]
async fn test_concurrent_generation_bumps_are_all_counted() {
    require_emulator!();

    let db = test_db().await;
    let owner = format!("gen-race-{}@x.com", unique_suffix());

    let bumps = join_all((0..5).map(|_| db.bump_cache_generation(&owner))).await;
    let mut seen: Vec<u64> = bumps.into_iter().map(|b| b.unwrap()).collect();
    seen.sort_unstable();

    assert_eq!(seen, (1..=5).collect::<Vec<u64>>());
    assert_eq!(db.cache_generation(&owner).await.unwrap(), 5);
}
