// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public profile routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::PublicUser;
use crate::routes::form::FormData;
use crate::services::ProfileChanges;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, put},
    Extension, Json, Router,
};
use std::sync::Arc;

/// Anyone may read a profile.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/users/{user_name}", get(get_user))
}

/// Profile edits. The auth middleware is applied in routes/mod.rs.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/users/{user_name}", put(update_user))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_name): Path<String>,
) -> Result<Json<PublicUser>> {
    Ok(Json(state.profiles.get_by_username(&user_name).await?))
}

/// Update own profile (JSON or multipart with `profilePicture`).
async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(user_name): Path<String>,
    mut form: FormData,
) -> Result<Json<PublicUser>> {
    let changes = ProfileChanges {
        user_name: form.take("userName"),
        bio: form.take("bio"),
        profile_picture: form.picture.take(),
    };

    let updated = state
        .profiles
        .update(&user, &user_name, changes)
        .await
        .map_err(AppError::conflict_as_bad_request)?;

    Ok(Json(updated))
}
