// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth;
pub mod file_store;
pub mod google_oidc;
pub mod password;
pub mod profile;
pub mod tokens;

pub use auth::{AuthError, AuthService, AuthUser, SessionResponse};
pub use file_store::{FileStore, LocalFileStore, UploadedFile};
pub use google_oidc::{GoogleIdentity, GoogleIdentityVerifier, GoogleOidcVerifier, OidcError};
pub use password::CredentialHasher;
pub use profile::{ProfileChanges, ProfileService};
pub use tokens::{TokenClaims, TokenError, TokenKind, TokenPair, TokenService};
