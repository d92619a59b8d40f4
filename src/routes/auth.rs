// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Registration, sign-in and session routes.

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::models::UserProfile;
use crate::routes::form::{FormData, JsonBody};
use crate::services::auth::{
    GoogleCompleteRequest, GoogleSignInRequest, LoginRequest, RefreshTokenRequest,
    RegisterRequest,
};
use crate::services::{SessionResponse, TokenPair};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/google", post(google_sign_in))
        .route("/api/auth/google/complete", post(google_complete))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
}

/// Plain acknowledgement body.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MessageResponse {
    pub message: String,
}

/// Create a password account (JSON or multipart with `profilePicture`).
async fn register(
    State(state): State<Arc<AppState>>,
    mut form: FormData,
) -> Result<Json<UserProfile>> {
    let request = RegisterRequest {
        user_name: form.take("userName"),
        email: form.take("email"),
        password: form.take("password"),
        profile_picture: form.picture.take(),
    };

    let profile = state
        .auth
        .register(request)
        .await
        .map_err(AppError::conflict_as_bad_request)?;

    Ok(Json(profile))
}

async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    Ok(Json(state.auth.login(request).await?))
}

async fn google_sign_in(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<GoogleSignInRequest>,
) -> Result<Json<SessionResponse>> {
    Ok(Json(state.auth.google_sign_in(request).await?))
}

async fn google_complete(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<GoogleCompleteRequest>,
) -> Result<Json<SessionResponse>> {
    Ok(Json(state.auth.google_complete(request).await?))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<RefreshTokenRequest>,
) -> Result<Json<TokenPair>> {
    Ok(Json(state.auth.refresh(request).await?))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<RefreshTokenRequest>,
) -> Result<Json<MessageResponse>> {
    state.auth.logout(request).await?;
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}
