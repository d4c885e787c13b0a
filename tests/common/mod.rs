// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use therapy_tracker::cache::MemoryCache;
use therapy_tracker::config::Config;
use therapy_tracker::db::{FirestoreDb, MemoryStore};
use therapy_tracker::middleware::auth::create_jwt;
use therapy_tracker::routes::create_router;
use therapy_tracker::AppState;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Unique suffix so emulator tests never see each other's documents.
#[allow(dead_code)]
pub fn unique_suffix() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}

/// Everything a router test needs to reach behind the HTTP surface.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
}

/// Create a test app backed by the in-memory store and cache.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let state = Arc::new(AppState::new(
        config,
        store.clone(),
        store.clone(),
        cache.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        cache,
    }
}

/// Create a bearer token for `username` signed with the test key.
#[allow(dead_code)]
pub fn create_test_jwt(username: &str, signing_key: &[u8]) -> String {
    create_jwt(username, signing_key).expect("Failed to create JWT")
}

#[allow(dead_code)]
impl TestApp {
    pub fn token(&self, username: &str) -> String {
        create_test_jwt(username, &self.state.config.jwt_signing_key)
    }

    /// Send one request as `user` (or anonymously) and return the raw response.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            let bearer = format!("Bearer {}", self.token(user));
            builder = builder.header(header::AUTHORIZATION, bearer);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a request and decode the JSON body.
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.send(method, uri, user, body).await;
        let status = response.status();
        (status, body_json(response).await)
    }
}

/// Decode a response body as JSON (`Value::Null` when empty).
#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
