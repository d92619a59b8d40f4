//! Database layer.
//!
//! `UserRepository` is the seam the auth and profile services talk to.
//! Uniqueness of usernames and emails is enforced here, not by callers:
//! any pre-check a service performs is an optimization only.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::models::{User, UserUpdate};
use async_trait::async_trait;
use std::fmt;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Username claims (document ID = URL-encoded username)
    pub const USER_NAMES: &str = "user_names";
    /// Email claims (document ID = URL-encoded email)
    pub const USER_EMAILS: &str = "user_emails";
}

/// Field whose uniqueness a write violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    UserName,
    Email,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::UserName => f.write_str("userName"),
            UniqueField::Email => f.write_str("email"),
        }
    }
}

/// Repository errors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("{0} already exists")]
    Duplicate(UniqueField),

    #[error("Database error: {0}")]
    Backend(String),
}

/// Outcome of an atomic refresh-token rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSwap {
    /// The presented token was live and has been replaced.
    Rotated,
    /// The presented token was not live; nothing changed.
    NotPresent,
    /// No user with that ID.
    UserMissing,
}

/// Persistence operations on user accounts.
///
/// The refresh-token methods are atomic per user: concurrent calls for the
/// same user never interleave their read-modify-write.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DbError>;

    async fn find_by_username(&self, user_name: &str) -> Result<Option<User>, DbError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError>;

    /// Insert a new user. Fails with `Duplicate` if the username or email is taken.
    async fn create(&self, user: &User) -> Result<(), DbError>;

    /// Overwrite an existing user document, re-checking uniqueness if the
    /// username or email changed. The stored refresh tokens are kept as they
    /// are; sessions only change through the refresh-token methods below.
    async fn save(&self, user: &User) -> Result<(), DbError>;

    /// Apply a partial update. Returns `None` if the user does not exist.
    async fn update(&self, id: &str, changes: &UserUpdate) -> Result<Option<User>, DbError>;

    /// Append a refresh token. Returns `false` if the user does not exist.
    async fn push_refresh_token(&self, id: &str, token: &str) -> Result<bool, DbError>;

    /// Replace `old` by `new` only if `old` is currently live.
    async fn swap_refresh_token(&self, id: &str, old: &str, new: &str)
        -> Result<TokenSwap, DbError>;

    /// Normalize the stored tokens and drop `token`. Returns `false` if the
    /// user does not exist.
    async fn remove_refresh_token(&self, id: &str, token: &str) -> Result<bool, DbError>;

    /// Revoke every session of the user.
    async fn clear_refresh_tokens(&self, id: &str) -> Result<(), DbError>;
}
