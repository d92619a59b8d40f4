// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer-token authentication middleware.

use crate::error::AppError;
use crate::services::AuthError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub use crate::services::AuthUser;

/// Middleware that requires a valid access token.
///
/// On success the caller's `AuthUser` is available to handlers through
/// `Extension<AuthUser>`.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let auth_user = state.auth.authenticate(auth_header).map_err(|e| match e {
        // A missing secret is reported as a client-visible 400 on guarded routes
        AuthError::Configuration(msg) => {
            tracing::error!("Token secret not configured, rejecting authenticated request");
            AppError::BadRequest(msg)
        }
        other => {
            tracing::debug!(error = %other, "Request authentication failed");
            AppError::from(other)
        }
    })?;

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}
