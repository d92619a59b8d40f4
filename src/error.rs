// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::services::AuthError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        email: Option<String>,
        suggested_user_name: Option<String>,
    },

    #[error("Server misconfigured: {0}")]
    Misconfigured(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Map an auth error for endpoints that report conflicts as plain
    /// validation failures (registration, profile edits).
    pub fn conflict_as_bad_request(err: AuthError) -> Self {
        match err {
            AuthError::Conflict { message, .. } => AppError::BadRequest(message),
            other => other.into(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(msg) => AppError::BadRequest(msg),
            AuthError::Conflict {
                message,
                email,
                suggested_user_name,
            } => AppError::Conflict {
                message,
                email,
                suggested_user_name,
            },
            e @ (AuthError::InvalidCredentials | AuthError::InvalidCredential) => {
                AppError::InvalidCredentials(e.to_string())
            }
            e @ AuthError::InvalidToken => AppError::InvalidToken(e.to_string()),
            e @ AuthError::Replay => AppError::BadRequest(e.to_string()),
            AuthError::NotFound(msg) => AppError::NotFound(msg),
            AuthError::Forbidden(msg) => AppError::Forbidden(msg),
            AuthError::Unauthenticated => AppError::Unauthorized,
            AuthError::Configuration(msg) => AppError::Misconfigured(msg),
            AuthError::Internal(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_user_name: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut email = None;
        let mut suggested_user_name = None;

        let (status, error, details) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                Some("Access denied".to_string()),
            ),
            AppError::InvalidToken(msg) => (StatusCode::FORBIDDEN, "invalid_token", Some(msg)),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg)),
            AppError::InvalidCredentials(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_credentials", Some(msg))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", Some(msg)),
            AppError::Conflict {
                message,
                email: conflict_email,
                suggested_user_name: suggestion,
            } => {
                email = conflict_email;
                suggested_user_name = suggestion;
                (StatusCode::CONFLICT, "conflict", Some(message))
            }
            AppError::Misconfigured(msg) => {
                tracing::error!(error = %msg, "Server misconfigured");
                (StatusCode::INTERNAL_SERVER_ERROR, "misconfigured", Some(msg))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            email,
            suggested_user_name,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
