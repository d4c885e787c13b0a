// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Viewer graph routes: granting access and finding people.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::services::viewer_graph::normalize_id;
use crate::services::SubjectSummary;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Viewer routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/viewers", post(grant_viewer))
        .route("/api/viewers/viewable", get(list_viewable))
        .route("/api/users/search", get(search_users))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantRequest {
    /// Must be the caller when present
    subject_username: Option<String>,
    authorized_user_email: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GrantResponse {
    pub message: String,
}

/// Let another user view the caller's sessions.
async fn grant_viewer(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<GrantRequest>, JsonRejection>,
) -> Result<Json<GrantResponse>> {
    let Json(body) = body?;
    if let Some(subject) = body.subject_username.as_deref() {
        if normalize_id(subject) != user.username {
            return Err(AppError::Forbidden(
                "❌ You can only share your own sessions".to_string(),
            ));
        }
    }

    let candidate = body
        .authorized_user_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::Validation("❌ authorizedUserEmail is required".to_string()))?;

    let result = state.graph.grant_access(&user.username, candidate).await?;
    Ok(Json(GrantResponse {
        message: result.message,
    }))
}

#[derive(Debug, Deserialize)]
struct ViewableQuery {
    q: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ViewableResponse {
    pub subjects: Vec<SubjectSummary>,
}

async fn list_viewable(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ViewableQuery>,
) -> Result<Json<ViewableResponse>> {
    let subjects = state
        .graph
        .list_viewable_subjects(&user.username, params.q.as_deref())
        .await?;
    Ok(Json(ViewableResponse { subjects }))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub results: Vec<String>,
}

async fn search_users(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    let results = state
        .graph
        .search_users(
            &user.username,
            params.q.as_deref().unwrap_or_default(),
            params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        )
        .await?;
    Ok(Json(SearchResponse { results }))
}
