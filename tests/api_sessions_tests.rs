// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session upload, query and cache behaviour through the HTTP API.

use axum::http::StatusCode;
use serde_json::json;
use therapy_tracker::db::SessionStore;

mod common;

fn entry(user: &str, id: &str, ts: &str, exercise: &str, hand: &str) -> serde_json::Value {
    json!({
        "Username": user,
        "SessionID": id,
        "Timestamp": ts,
        "ExerciseName": exercise,
        "Hand": hand,
    })
}

#[tokio::test]
async fn test_upload_then_filtered_query_finds_it() {
    let app = common::create_test_app();

    let (status, body) = app
        .call(
            "POST",
            "/api/sessions",
            Some("a@x.com"),
            Some(json!({
                "Username": "a@x.com",
                "Timestamp": "2025-01-01T12:00:00Z",
                "ExerciseName": "Hand Reach",
                "Hand": "Right",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ok"], true);
    assert!(body["invalidatedKeys"].is_array());

    let (status, body) = app
        .call(
            "GET",
            "/api/sessions?username=a@x.com&hand=Right&start=2025-01-01T00:00:00Z&end=2025-01-02T00:00:00Z",
            Some("a@x.com"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["ExerciseName"], "Hand Reach");
    assert_eq!(entries[0]["Hand"], "Right");
    assert_eq!(entries[0]["Year"], 2025);
    assert_eq!(entries[0]["Hour"], 12);
}

#[tokio::test]
async fn test_upload_missing_fields_exact_body() {
    let app = common::create_test_app();

    let (status, body) = app
        .call(
            "POST",
            "/api/sessions",
            Some("a@x.com"),
            Some(json!({
                "Username": "a@x.com",
                "Timestamp": "2025-01-01T12:00:00Z",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "ok": false,
            "error": "Missing required fields: Username, Timestamp, ExerciseName"
        })
    );
    assert!(app
        .store
        .sessions_for_owner("a@x.com")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_upload_for_someone_else_is_forbidden() {
    let app = common::create_test_app();

    let (status, body) = app
        .call(
            "POST",
            "/api/sessions",
            Some("a@x.com"),
            Some(entry("b@x.com", "1", "2025-01-01T12:00:00Z", "Fist", "Left")),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn test_reupload_same_key_overwrites() {
    let app = common::create_test_app();
    let mut session = entry("a@x.com", "s1", "2025-01-01T12:00:00Z", "Fist", "Left");

    app.call("POST", "/api/sessions", Some("a@x.com"), Some(session.clone()))
        .await;
    session["Reps"] = json!("12");
    app.call("POST", "/api/sessions", Some("a@x.com"), Some(session))
        .await;

    let (_, body) = app
        .call("GET", "/api/sessions", Some("a@x.com"), None)
        .await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["Reps"], 12);
}

#[tokio::test]
async fn test_second_read_is_cache_hit_until_upload() {
    let app = common::create_test_app();
    app.call(
        "POST",
        "/api/sessions",
        Some("a@x.com"),
        Some(entry("a@x.com", "1", "2025-01-01T12:00:00Z", "Fist", "Left")),
    )
    .await;

    let first = app.send("GET", "/api/sessions", Some("a@x.com"), None).await;
    assert_eq!(first.headers().get("x-cache").unwrap(), "MISS");
    let first = common::body_json(first).await;
    assert_eq!(first["source"], "db");

    let second = app.send("GET", "/api/sessions", Some("a@x.com"), None).await;
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");
    let second = common::body_json(second).await;
    assert_eq!(second["source"], "cache");
    assert_eq!(second["entries"], first["entries"]);

    let (_, upload) = app
        .call(
            "POST",
            "/api/sessions",
            Some("a@x.com"),
            Some(entry("a@x.com", "2", "2025-01-02T12:00:00Z", "Fist", "Left")),
        )
        .await;
    assert_eq!(upload["invalidatedKeys"].as_array().unwrap().len(), 1);

    let third = app.send("GET", "/api/sessions", Some("a@x.com"), None).await;
    assert_eq!(third.headers().get("x-cache").unwrap(), "MISS");
    let third = common::body_json(third).await;
    assert_eq!(third["entries"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_filter_param_order_and_case_share_cache_entry() {
    let app = common::create_test_app();
    app.call(
        "POST",
        "/api/sessions",
        Some("a@x.com"),
        Some(entry("a@x.com", "1", "2025-01-01T12:00:00Z", "Fist", "Right")),
    )
    .await;

    let first = app
        .send(
            "GET",
            "/api/sessions?hand=Right&exerciseName=Fist",
            Some("a@x.com"),
            None,
        )
        .await;
    assert_eq!(first.headers().get("x-cache").unwrap(), "MISS");

    let second = app
        .send(
            "GET",
            "/api/sessions?exerciseName=fist&hand=RIGHT",
            Some("a@x.com"),
            None,
        )
        .await;
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");
}

#[tokio::test]
async fn test_invalid_date_is_bad_request() {
    let app = common::create_test_app();

    let (status, body) = app
        .call(
            "GET",
            "/api/sessions?start=yesterday&end=2025-01-01T00:00:00Z",
            Some("a@x.com"),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn test_reading_other_users_sessions_requires_grant() {
    let app = common::create_test_app();
    app.call(
        "POST",
        "/api/sessions",
        Some("pat@x.com"),
        Some(entry("pat@x.com", "1", "2025-01-01T12:00:00Z", "Fist", "Left")),
    )
    .await;

    let (status, _) = app
        .call("GET", "/api/sessions?username=pat@x.com", Some("doc@x.com"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.call(
        "POST",
        "/api/viewers",
        Some("pat@x.com"),
        Some(json!({ "authorizedUserEmail": "doc@x.com" })),
    )
    .await;

    let (status, body) = app
        .call("GET", "/api/sessions?username=pat@x.com", Some("doc@x.com"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
    assert!(body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["Username"] == "pat@x.com"));
}

#[tokio::test]
async fn test_exists_verify_and_delete() {
    let app = common::create_test_app();
    let session = json!({
        "Username": "a@x.com",
        "SessionID": "s1",
        "Timestamp": "2025-01-01T12:00:00Z",
        "ExerciseName": "Fist",
        "DeviceInfo": { "Manufacturer": "Acme", "Model": "P1" },
        "Scores": [0.5, 0.75],
    });
    app.call("POST", "/api/sessions", Some("a@x.com"), Some(session.clone()))
        .await;

    let (_, body) = app
        .call("GET", "/api/sessions/s1/exists", Some("a@x.com"), None)
        .await;
    assert_eq!(body["exists"], true);

    let (_, body) = app
        .call("POST", "/api/sessions/verify", Some("a@x.com"), Some(session.clone()))
        .await;
    assert_eq!(body["matches"], true);

    let mut changed = session.clone();
    changed["DeviceInfo"]["Model"] = json!("P2");
    let (_, body) = app
        .call("POST", "/api/sessions/verify", Some("a@x.com"), Some(changed))
        .await;
    assert_eq!(body["matches"], false);

    let (status, body) = app
        .call("DELETE", "/api/sessions/s1", Some("a@x.com"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    // Deleting again is not an error.
    let (status, _) = app
        .call("DELETE", "/api/sessions/s1", Some("a@x.com"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .call("GET", "/api/sessions/s1/exists?owner=a@x.com", Some("a@x.com"), None)
        .await;
    assert_eq!(body["exists"], false);
}

#[tokio::test]
async fn test_store_outage_returns_generic_error() {
    let app = common::create_test_app();
    app.store.set_offline(true);

    let (status, body) = app
        .call("GET", "/api/sessions", Some("a@x.com"), None)
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let app = common::create_test_app();

    let (status, body) = app
        .call("POST", "/api/sessions", Some("a@x.com"), Some(json!([1, 2])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("deserialize"));

    let (status, body) = app
        .call(
            "PUT",
            "/api/settings",
            Some("a@x.com"),
            Some(json!({"targetReps": "many"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}
