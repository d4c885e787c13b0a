// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account and settings routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{SessionSettings, UserProfile};
use crate::services::{PurgeReport, SettingsPatch};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/account", post(register).delete(delete_account))
        .route("/api/settings", get(get_settings).put(update_settings))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub email: String,
    pub name: String,
    pub created_at: String,
}

impl From<UserProfile> for UserResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            email: profile.email,
            name: profile.name,
            created_at: profile.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RegisterRequest {
    name: Option<String>,
}

/// Create the caller's directory entry and empty viewer record.
async fn register(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Option<Json<RegisterRequest>>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let request = body?.map(|Json(b)| b).unwrap_or_default();
    let profile = state
        .graph
        .register(&user.username, request.name.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(profile.into())))
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = state
        .graph
        .get_profile(&user.username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.username)))?;

    Ok(Json(profile.into()))
}

// ─── Account Deletion ────────────────────────────────────────

/// Response for account deletion.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub message: String,
    pub report: PurgeReport,
}

/// Delete the caller's account and every trace of it.
///
/// Runs inline: the caller gets a response only once the purge has
/// finished. A failed purge can be retried by calling again.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeleteAccountResponse>> {
    tracing::info!(user = %user.username, "User-initiated account deletion");

    let report = state.purge.purge_user(&user.username).await?;

    Ok(Json(DeleteAccountResponse {
        success: true,
        message: "Account deleted. All data has been removed.".to_string(),
        report,
    }))
}

// ─── Settings ────────────────────────────────────────────────

async fn get_settings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SessionSettings>> {
    Ok(Json(state.sessions.get_settings(&user.username).await?))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<SettingsPatch>, JsonRejection>,
) -> Result<Json<SessionSettings>> {
    let Json(patch) = body?;
    Ok(Json(
        state
            .sessions
            .update_settings(&user.username, patch)
            .await?,
    ))
}
