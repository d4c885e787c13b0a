// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise session routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{ActivitySession, RawSessionEntry};
use crate::services::viewer_graph::normalize_id;
use crate::services::SessionFilter;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Response header reporting whether a query was served from cache.
pub const CACHE_HEADER: &str = "x-cache";

/// Session routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sessions", post(upload_session).get(get_sessions))
        .route("/api/sessions/verify", post(verify_session))
        .route("/api/sessions/{session_id}", delete(delete_session))
        .route("/api/sessions/{session_id}/exists", get(session_exists))
}

/// Fail with 403 unless `user` may read `owner`'s sessions.
async fn ensure_can_read(state: &AppState, user: &AuthUser, owner: &str) -> Result<()> {
    if state.graph.may_view(&user.username, owner).await? {
        return Ok(());
    }
    tracing::warn!(
        user = %user.username,
        owner = %owner,
        "Denied read of another user's sessions"
    );
    Err(AppError::Forbidden(format!(
        "You are not authorized to view sessions for {}",
        owner
    )))
}

// ─── Upload ──────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UploadResponse {
    pub ok: bool,
    pub message: String,
    pub invalidated_keys: Vec<String>,
}

async fn upload_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<RawSessionEntry>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(raw) = body?;
    if let Some(claimed) = raw.claimed_username() {
        if claimed != user.username {
            return Err(AppError::Forbidden(
                "Sessions can only be uploaded for your own account".to_string(),
            ));
        }
    }

    let outcome = state.sessions.upload_session(raw).await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            ok: true,
            message: format!("Session {} saved", outcome.session.session_id),
            invalidated_keys: outcome.invalidated_keys,
        }),
    ))
}

// ─── Query ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionsQuery {
    /// Owner whose sessions to read; defaults to the caller
    username: Option<String>,
    hand: Option<String>,
    exercise_name: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionsResponse {
    pub entries: Vec<ActivitySession>,
    /// "db" or "cache"
    pub source: String,
}

async fn get_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<SessionsQuery>,
) -> Result<impl IntoResponse> {
    let owner = params
        .username
        .as_deref()
        .map(normalize_id)
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| user.username.clone());
    ensure_can_read(&state, &user, &owner).await?;

    let filter = SessionFilter {
        hand: params.hand,
        exercise_name: params.exercise_name,
        start: params.start,
        end: params.end,
    };
    let result = state.cache.read_through(&owner, &filter).await?;

    Ok((
        [(CACHE_HEADER, result.source.header_value())],
        Json(SessionsResponse {
            entries: result.entries,
            source: result.source.as_str().to_string(),
        }),
    ))
}

// ─── Existence / Verification / Deletion ─────────────────────

#[derive(Debug, Deserialize)]
struct ExistsQuery {
    owner: Option<String>,
}

#[derive(Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

async fn session_exists(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
    Query(params): Query<ExistsQuery>,
) -> Result<Json<ExistsResponse>> {
    let owner = params
        .owner
        .as_deref()
        .map(normalize_id)
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| user.username.clone());
    ensure_can_read(&state, &user, &owner).await?;

    let exists = state.sessions.verify_exists(&owner, &session_id).await?;
    Ok(Json(ExistsResponse { exists }))
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub matches: bool,
}

async fn verify_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<RawSessionEntry>, JsonRejection>,
) -> Result<Json<VerifyResponse>> {
    let Json(expected) = body?;
    let owner = expected
        .claimed_username()
        .unwrap_or_else(|| user.username.clone());
    ensure_can_read(&state, &user, &owner).await?;

    let matches = state.sessions.verify_fields(expected).await?;
    Ok(Json(VerifyResponse { matches }))
}

#[derive(Serialize)]
pub struct DeleteSessionResponse {
    pub ok: bool,
    pub message: String,
}

/// Delete one of the caller's own sessions.
async fn delete_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteSessionResponse>> {
    state
        .sessions
        .delete_session(&user.username, &session_id)
        .await?;

    Ok(Json(DeleteSessionResponse {
        ok: true,
        message: format!("Session {} deleted", session_id),
    }))
}
