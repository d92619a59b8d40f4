// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account registration, sign-in and session lifecycle.
//!
//! A session is one refresh token stored on the user. Logging in or signing
//! in with Google adds one; refreshing swaps it for a new one; logging out
//! removes it. Presenting a refresh token that is validly signed but no
//! longer stored is treated as theft: every session of that user is revoked.

use crate::config::Config;
use crate::db::{DbError, TokenSwap, UniqueField, UserRepository};
use crate::models::{User, UserProfile};
use crate::services::file_store::{FileStore, UploadedFile};
use crate::services::google_oidc::{GoogleIdentity, GoogleIdentityVerifier, OidcError};
use crate::services::password::CredentialHasher;
use crate::services::tokens::{TokenError, TokenKind, TokenPair, TokenService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::ValidateEmail;

/// Username given to Google accounts whose email has an empty local part.
const FALLBACK_USER_NAME: &str = "New User";

/// Domain errors for auth and profile operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Conflict {
        message: String,
        email: Option<String>,
        suggested_user_name: Option<String>,
    },

    /// Login failed. Deliberately says nothing about which part was wrong.
    #[error("Wrong username or password")]
    InvalidCredentials,

    /// Google rejected the presented ID token.
    #[error("Invalid Google credential")]
    InvalidCredential,

    #[error("Invalid token")]
    InvalidToken,

    /// A refresh token was reused after rotation or logout.
    #[error("Invalid refresh token")]
    Replay,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Access denied")]
    Unauthenticated,

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    fn conflict(message: &str) -> Self {
        AuthError::Conflict {
            message: message.to_string(),
            email: None,
            suggested_user_name: None,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MissingSecret => AuthError::Configuration("Token secret not set".to_string()),
            TokenError::Invalid(_) => AuthError::InvalidToken,
            TokenError::Signing(msg) => AuthError::Internal(format!("Error generating tokens: {msg}")),
        }
    }
}

/// Caller identity established by a valid access token.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

// ─── Requests / Responses ────────────────────────────────────

/// Registration form. Fields are optional so that missing ones produce a
/// validation error rather than a deserialization failure.
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub profile_picture: Option<UploadedFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSignInRequest {
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCompleteRequest {
    pub credential: Option<String>,
    pub new_username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

/// Profile plus a fresh token pair, returned by every sign-in flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_name: String,
    pub email: String,
    pub profile_picture_url: String,
    pub access_token: String,
    pub refresh_token: String,
}

// ─── Service ─────────────────────────────────────────────────

/// Orchestrates credentials, identity and session storage.
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    google: Arc<dyn GoogleIdentityVerifier>,
    files: Arc<dyn FileStore>,
    tokens: TokenService,
    hasher: CredentialHasher,
}

impl AuthService {
    pub fn new(
        config: &Config,
        users: Arc<dyn UserRepository>,
        google: Arc<dyn GoogleIdentityVerifier>,
        files: Arc<dyn FileStore>,
    ) -> Self {
        Self {
            users,
            google,
            files,
            tokens: TokenService::new(config),
            hasher: CredentialHasher::new(config.bcrypt_cost),
        }
    }

    /// Create a password account. No session is started.
    pub async fn register(&self, request: RegisterRequest) -> Result<UserProfile, AuthError> {
        let (Some(user_name), Some(email), Some(password)) = (
            present(request.user_name.as_deref()),
            present(request.email.as_deref()),
            request
                .password
                .as_deref()
                .filter(|p| !p.trim().is_empty()),
        ) else {
            return Err(AuthError::Validation(
                "Email, username, and password required".to_string(),
            ));
        };

        if !email.validate_email() {
            return Err(AuthError::Validation("Invalid email address".to_string()));
        }

        if self
            .users
            .find_by_username(user_name)
            .await
            .map_err(|e| internal("Server error", e))?
            .is_some()
        {
            return Err(AuthError::conflict("Username already exists"));
        }

        if self
            .users
            .find_by_email(email)
            .await
            .map_err(|e| internal("Server error", e))?
            .is_some()
        {
            return Err(AuthError::conflict("Email already exists"));
        }

        let digest = self.hasher.hash(password).await.map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            AuthError::Internal("Error registering user".to_string())
        })?;

        let picture = match request.profile_picture {
            Some(file) => match self.files.upload(file).await {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        user_name = %user_name,
                        "Profile picture upload failed, using placeholder"
                    );
                    None
                }
            },
            None => None,
        };

        let user = User::with_password(user_name, email, digest, picture.clone());

        if let Err(e) = self.users.create(&user).await {
            if let Some(url) = picture {
                self.discard_upload(&url).await;
            }
            return Err(match e {
                DbError::Duplicate(UniqueField::UserName) => {
                    AuthError::conflict("Username already exists")
                }
                DbError::Duplicate(UniqueField::Email) => AuthError::conflict("Email already exists"),
                DbError::Backend(msg) => {
                    tracing::error!(error = %msg, "Failed to store new user");
                    AuthError::Internal(format!("Error registering user: {msg}"))
                }
            });
        }

        tracing::info!(user_id = %user.id, user_name = %user.user_name, "User registered");
        Ok(user.profile())
    }

    /// Password login. Starts a new session on success.
    pub async fn login(&self, request: LoginRequest) -> Result<SessionResponse, AuthError> {
        let (Some(user_name), Some(password)) = (
            present(request.user_name.as_deref()),
            request.password.as_deref().filter(|p| !p.is_empty()),
        ) else {
            tracing::debug!("Login rejected: missing fields");
            return Err(AuthError::InvalidCredentials);
        };

        let user = self
            .users
            .find_by_username(user_name)
            .await
            .map_err(|e| internal("Error logging in", e))?;

        let Some(user) = user else {
            self.hasher.burn(password).await;
            tracing::info!(user_name = %user_name, "Login rejected: unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        let Some(digest) = user.password_hash.as_deref() else {
            self.hasher.burn(password).await;
            tracing::info!(user_id = %user.id, "Login rejected: account has no password");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(password, digest).await {
            tracing::info!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let pair = self.tokens.issue_pair(&user.id, Some(&user.email))?;
        self.store_session(&user, pair).await
    }

    /// Sign in with a Google ID token, creating the account on first use.
    pub async fn google_sign_in(
        &self,
        request: GoogleSignInRequest,
    ) -> Result<SessionResponse, AuthError> {
        let credential = present(request.credential.as_deref())
            .ok_or_else(|| AuthError::Validation("Credential is required.".to_string()))?;

        let identity = self.verify_google(credential).await?;
        let email = require_email(&identity)?;

        if let Some(user) = self
            .users
            .find_by_email(email)
            .await
            .map_err(|e| internal("Internal Server Error", e))?
        {
            return self.sign_in_existing(user).await;
        }

        let user_name = user_name_from_email(email);
        let username_conflict = || AuthError::Conflict {
            message: "Username already exists".to_string(),
            email: Some(email.to_string()),
            suggested_user_name: Some(user_name.clone()),
        };

        if self
            .users
            .find_by_username(&user_name)
            .await
            .map_err(|e| internal("Internal Server Error", e))?
            .is_some()
        {
            tracing::info!(user_name = %user_name, "Google sign-in needs a different username");
            return Err(username_conflict());
        }

        let user = User::with_google(
            user_name.as_str(),
            email,
            identity.subject.as_str(),
            identity.picture.clone(),
        );
        let pair = self.tokens.issue_pair(&user.id, Some(&user.email))?;

        match self.users.create(&user).await {
            Ok(()) => {
                tracing::info!(user_id = %user.id, user_name = %user.user_name, "Google user created");
                self.store_session(&user, pair).await
            }
            Err(DbError::Duplicate(UniqueField::UserName)) => Err(username_conflict()),
            Err(DbError::Duplicate(UniqueField::Email)) => {
                // Another request created this account first
                let user = self
                    .users
                    .find_by_email(email)
                    .await
                    .map_err(|e| internal("Internal Server Error", e))?
                    .ok_or_else(|| {
                        AuthError::Internal("Google user vanished during sign-in".to_string())
                    })?;
                self.sign_in_existing(user).await
            }
            Err(e) => Err(internal("Internal Server Error", e)),
        }
    }

    /// Finish a Google sign-in that hit a username conflict, using the
    /// username the user picked.
    pub async fn google_complete(
        &self,
        request: GoogleCompleteRequest,
    ) -> Result<SessionResponse, AuthError> {
        let (Some(credential), Some(new_username)) = (
            present(request.credential.as_deref()),
            present(request.new_username.as_deref()),
        ) else {
            return Err(AuthError::Validation(
                "Credential and newUsername are required.".to_string(),
            ));
        };

        let identity = self.verify_google(credential).await?;
        let email = require_email(&identity)?;

        if self
            .users
            .find_by_username(new_username)
            .await
            .map_err(|e| internal("Internal server error", e))?
            .is_some()
        {
            return Err(AuthError::conflict("Username already exists"));
        }

        let existing = self
            .users
            .find_by_email(email)
            .await
            .map_err(|e| internal("Internal server error", e))?;

        let user = match existing {
            Some(mut user) => {
                let pair = self.tokens.issue_pair(&user.id, Some(&user.email))?;
                user.user_name = new_username.to_string();
                self.users.save(&user).await.map_err(username_taken)?;
                tracing::info!(user_id = %user.id, user_name = %user.user_name, "Google user renamed");
                return self.store_session(&user, pair).await;
            }
            None => User::with_google(
                new_username,
                email,
                identity.subject.as_str(),
                identity.picture.clone(),
            ),
        };

        let pair = self.tokens.issue_pair(&user.id, Some(&user.email))?;
        self.users.create(&user).await.map_err(username_taken)?;
        tracing::info!(user_id = %user.id, user_name = %user.user_name, "Google user created");
        self.store_session(&user, pair).await
    }

    /// Rotate a refresh token. Reuse of a rotated token revokes everything.
    pub async fn refresh(&self, request: RefreshTokenRequest) -> Result<TokenPair, AuthError> {
        let token = present(request.refresh_token.as_deref())
            .ok_or_else(|| AuthError::Validation("Refresh token required".to_string()))?;

        let claims = self.tokens.verify(token, TokenKind::Refresh)?;

        let user = self
            .users
            .find_by_id(&claims.sub)
            .await
            .map_err(|e| internal("Error refreshing token", e))?
            .ok_or_else(|| AuthError::NotFound("Invalid token".to_string()))?;

        let pair = self.tokens.issue_pair(&user.id, Some(&user.email))?;

        let swap = self
            .users
            .swap_refresh_token(&user.id, token, &pair.refresh_token)
            .await
            .map_err(|e| internal("Error refreshing token", e))?;

        match swap {
            TokenSwap::Rotated => {
                tracing::debug!(user_id = %user.id, "Refresh token rotated");
                Ok(pair)
            }
            TokenSwap::NotPresent => {
                tracing::warn!(user_id = %user.id, "Refresh token reuse detected, revoking all sessions");
                self.users
                    .clear_refresh_tokens(&user.id)
                    .await
                    .map_err(|e| internal("Error refreshing token", e))?;
                Err(AuthError::Replay)
            }
            TokenSwap::UserMissing => Err(AuthError::NotFound("Invalid token".to_string())),
        }
    }

    /// End one session. Logging out an already-ended session succeeds.
    pub async fn logout(&self, request: RefreshTokenRequest) -> Result<(), AuthError> {
        let token = present(request.refresh_token.as_deref())
            .ok_or_else(|| AuthError::Validation("Refresh token required".to_string()))?;

        let claims = self.tokens.verify(token, TokenKind::Refresh)?;

        let found = self
            .users
            .remove_refresh_token(&claims.sub, token)
            .await
            .map_err(|e| internal("Error logging out", e))?;

        if !found {
            return Err(AuthError::NotFound("Invalid Token".to_string()));
        }

        tracing::info!(user_id = %claims.sub, "User logged out");
        Ok(())
    }

    /// Resolve the caller of a protected route from its `Authorization`
    /// header value. Does not touch the database.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<AuthUser, AuthError> {
        let token = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::Unauthenticated)?;

        let claims = self.tokens.verify(token, TokenKind::Access)?;

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email,
        })
    }

    // ─── Helpers ─────────────────────────────────────────────

    async fn verify_google(&self, credential: &str) -> Result<GoogleIdentity, AuthError> {
        self.google.verify(credential).await.map_err(|e| match e {
            OidcError::Forbidden(reason) => {
                tracing::info!(reason = %reason, "Google credential rejected");
                AuthError::InvalidCredential
            }
            OidcError::Transient(reason) => {
                tracing::error!(reason = %reason, "Google verification unavailable");
                AuthError::Internal("Internal Server Error".to_string())
            }
        })
    }

    async fn sign_in_existing(&self, user: User) -> Result<SessionResponse, AuthError> {
        // Accounts are joined on email; googleId is left as stored
        if user.google_id.is_none() {
            tracing::info!(user_id = %user.id, "Google sign-in matched a password account by email");
        }
        let pair = self.tokens.issue_pair(&user.id, Some(&user.email))?;
        self.store_session(&user, pair).await
    }

    /// Record the pair's refresh token on the user and build the response.
    async fn store_session(
        &self,
        user: &User,
        pair: TokenPair,
    ) -> Result<SessionResponse, AuthError> {
        let stored = self
            .users
            .push_refresh_token(&user.id, &pair.refresh_token)
            .await
            .map_err(|e| internal("Error generating tokens", e))?;

        if !stored {
            return Err(AuthError::Internal(format!(
                "user {} disappeared while starting a session",
                user.id
            )));
        }

        tracing::info!(user_id = %user.id, "Session started");
        Ok(SessionResponse {
            id: user.id.clone(),
            user_name: user.user_name.clone(),
            email: user.email.clone(),
            profile_picture_url: user.profile_picture_url.clone(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        })
    }

    async fn discard_upload(&self, url: &str) {
        if let Err(e) = self.files.delete(url).await {
            tracing::warn!(error = %e, "Failed to remove orphaned upload");
        }
    }
}

/// Trimmed value if present and not blank.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn require_email(identity: &GoogleIdentity) -> Result<&str, AuthError> {
    identity.email.as_deref().ok_or_else(|| {
        AuthError::Validation("Google authentication failed: No email found.".to_string())
    })
}

/// Default username for a new Google account: the email's local part.
fn user_name_from_email(email: &str) -> String {
    email
        .split('@')
        .next()
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .unwrap_or(FALLBACK_USER_NAME)
        .to_string()
}

fn username_taken(err: DbError) -> AuthError {
    match err {
        DbError::Duplicate(_) => AuthError::conflict("Username already exists"),
        DbError::Backend(msg) => {
            tracing::error!(error = %msg, "Failed to store Google user");
            AuthError::Internal("Internal server error".to_string())
        }
    }
}

fn internal(message: &str, err: DbError) -> AuthError {
    tracing::error!(error = %err, "{}", message);
    AuthError::Internal(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name_from_email() {
        assert_eq!(user_name_from_email("bob@g.com"), "bob");
        assert_eq!(user_name_from_email("@g.com"), FALLBACK_USER_NAME);
        assert_eq!(user_name_from_email("plain"), "plain");
    }

    #[test]
    fn test_present() {
        assert_eq!(present(Some("  alice ")), Some("alice"));
        assert_eq!(present(Some("   ")), None);
        assert_eq!(present(None), None);
    }

    #[test]
    fn test_token_errors_map_to_domain() {
        assert!(matches!(
            AuthError::from(TokenError::MissingSecret),
            AuthError::Configuration(_)
        ));
        assert!(matches!(
            AuthError::from(TokenError::Invalid("bad".into())),
            AuthError::InvalidToken
        ));
        assert!(matches!(
            AuthError::from(TokenError::Signing("rng".into())),
            AuthError::Internal(_)
        ));
    }
}
