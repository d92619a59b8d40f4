// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the production `UserRepository`:
//! - Users (`users/{id}`)
//! - Username and email claims (`user_names/{name}`, `user_emails/{email}`)
//!
//! Firestore has no unique indexes, so uniqueness rests on claim documents
//! created with create-only semantics: the second writer of a claim gets
//! `AlreadyExists` from Firestore itself. Refresh-token edits are serialized
//! per user with an in-process lock around the read-modify-write.

use super::{collections, DbError, TokenSwap, UniqueField, UserRepository};
use crate::models::{User, UserUpdate};
use async_trait::async_trait;
use dashmap::DashMap;
use firestore::errors::FirestoreError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-user write locks, shared across clones of the client.
type UserLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Claim document reserving a username or email for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UniqueClaim {
    user_id: String,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    locks: UserLocks,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, DbError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| DbError::Backend(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self::with_client(Some(client)))
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, DbError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            DbError::Backend(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self::with_client(Some(client)))
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self::with_client(None)
    }

    fn with_client(client: Option<firestore::FirestoreDb>) -> Self {
        Self {
            client,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, DbError> {
        self.client
            .as_ref()
            .ok_or_else(|| DbError::Backend("Database not connected (offline mode)".to_string()))
    }

    /// Run `work` while holding `id`'s write lock. The lock entry is dropped
    /// from the map once no other task holds or waits on it.
    async fn with_user_lock<R>(&self, id: &str, work: impl Future<Output = R> + Send) -> R {
        let lock = self
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            work.await
        };

        drop(lock);
        self.locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    // ─── User Documents ──────────────────────────────────────────

    async fn find_one_by_field(&self, field: &str, value: &str) -> Result<Option<User>, DbError> {
        let mut users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.for_all([q.field(field).eq(value)]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| DbError::Backend(e.to_string()))?;

        Ok(users.pop())
    }

    async fn write_user(&self, user: &User) -> Result<(), DbError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| DbError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Load a user under its lock, let `f` edit it, and write it back if
    /// `f` reports a change. Returns `None` if the user does not exist.
    async fn modify_user<R, F>(&self, id: &str, f: F) -> Result<Option<R>, DbError>
    where
        F: FnOnce(&mut User) -> (R, bool) + Send,
        R: Send,
    {
        self.with_user_lock(id, async {
            let Some(mut user) = self.find_by_id(id).await? else {
                return Ok(None);
            };

            let (result, dirty) = f(&mut user);
            if dirty {
                self.write_user(&user).await?;
            }

            Ok(Some(result))
        })
        .await
    }

    // ─── Uniqueness Claims ───────────────────────────────────────

    fn claim_collection(field: UniqueField) -> &'static str {
        match field {
            UniqueField::UserName => collections::USER_NAMES,
            UniqueField::Email => collections::USER_EMAILS,
        }
    }

    /// Reserve `value` for `user_id`. Fails with `Duplicate` if another
    /// account holds it; re-claiming one's own value succeeds.
    async fn claim(&self, field: UniqueField, value: &str, user_id: &str) -> Result<(), DbError> {
        let collection = Self::claim_collection(field);
        let doc_id = urlencoding::encode(value);
        let claim = UniqueClaim {
            user_id: user_id.to_string(),
        };

        let inserted: Result<UniqueClaim, FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(doc_id.as_ref())
            .object(&claim)
            .execute()
            .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(FirestoreError::DataConflictError(_)) => {
                let holder: Option<UniqueClaim> = self
                    .get_client()?
                    .fluent()
                    .select()
                    .by_id_in(collection)
                    .obj()
                    .one(doc_id.as_ref())
                    .await
                    .map_err(|e| DbError::Backend(e.to_string()))?;

                match holder {
                    Some(holder) if holder.user_id == user_id => Ok(()),
                    _ => Err(DbError::Duplicate(field)),
                }
            }
            Err(e) => Err(DbError::Backend(e.to_string())),
        }
    }

    /// Drop a claim. Failures are logged; a stale claim only blocks reuse
    /// of the value, it never grants access.
    async fn release(&self, field: UniqueField, value: &str) {
        let collection = Self::claim_collection(field);
        let doc_id = urlencoding::encode(value);

        let result = match self.get_client() {
            Ok(client) => client
                .fluent()
                .delete()
                .from(collection)
                .document_id(doc_id.as_ref())
                .execute()
                .await
                .map_err(|e| DbError::Backend(e.to_string())),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, field = %field, "Failed to release uniqueness claim");
        }
    }

    /// Write `updated` over `current`, moving claims for any changed
    /// username or email. Caller holds the user lock.
    async fn replace_user(&self, current: &User, updated: &User) -> Result<(), DbError> {
        let moved = changed_claims(current, updated);

        let mut taken = Vec::with_capacity(moved.len());
        for &(field, _, new) in &moved {
            if let Err(e) = self.claim(field, new, &updated.id).await {
                self.release_all(&taken).await;
                return Err(e);
            }
            taken.push((field, new));
        }

        if let Err(e) = self.write_user(updated).await {
            self.release_all(&taken).await;
            return Err(e);
        }

        for (field, old, _) in moved {
            self.release(field, old).await;
        }

        Ok(())
    }

    async fn release_all(&self, claims: &[(UniqueField, &str)]) {
        for &(field, value) in claims {
            self.release(field, value).await;
        }
    }
}

/// Unique fields whose value differs between `current` and `updated`, as
/// `(field, old, new)`.
fn changed_claims<'a>(
    current: &'a User,
    updated: &'a User,
) -> Vec<(UniqueField, &'a str, &'a str)> {
    [
        (UniqueField::UserName, &current.user_name, &updated.user_name),
        (UniqueField::Email, &current.email, &updated.email),
    ]
    .into_iter()
    .filter(|(_, old, new)| old != new)
    .map(|(field, old, new)| (field, old.as_str(), new.as_str()))
    .collect()
}

#[async_trait]
impl UserRepository for FirestoreDb {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DbError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| DbError::Backend(e.to_string()))
    }

    async fn find_by_username(&self, user_name: &str) -> Result<Option<User>, DbError> {
        self.find_one_by_field("userName", user_name).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        self.find_one_by_field("email", email).await
    }

    async fn create(&self, user: &User) -> Result<(), DbError> {
        self.claim(UniqueField::UserName, &user.user_name, &user.id)
            .await?;

        if let Err(e) = self.claim(UniqueField::Email, &user.email, &user.id).await {
            self.release(UniqueField::UserName, &user.user_name).await;
            return Err(e);
        }

        if let Err(e) = self.write_user(user).await {
            self.release(UniqueField::UserName, &user.user_name).await;
            self.release(UniqueField::Email, &user.email).await;
            return Err(e);
        }

        tracing::debug!(user_id = %user.id, "User document created");
        Ok(())
    }

    async fn save(&self, user: &User) -> Result<(), DbError> {
        self.with_user_lock(&user.id, async {
            let current = self
                .find_by_id(&user.id)
                .await?
                .ok_or_else(|| DbError::Backend(format!("user {} does not exist", user.id)))?;

            let mut updated = user.clone();
            updated.refresh_tokens = current.refresh_tokens.clone();
            self.replace_user(&current, &updated).await
        })
        .await
    }

    async fn update(&self, id: &str, changes: &UserUpdate) -> Result<Option<User>, DbError> {
        self.with_user_lock(id, async {
            let Some(current) = self.find_by_id(id).await? else {
                return Ok(None);
            };

            let mut updated = current.clone();
            changes.apply(&mut updated);
            self.replace_user(&current, &updated).await?;
            Ok(Some(updated))
        })
        .await
    }

    async fn push_refresh_token(&self, id: &str, token: &str) -> Result<bool, DbError> {
        let pushed = self
            .modify_user(id, |user| {
                user.refresh_tokens.push(token.to_string());
                ((), true)
            })
            .await?;
        Ok(pushed.is_some())
    }

    async fn swap_refresh_token(
        &self,
        id: &str,
        old: &str,
        new: &str,
    ) -> Result<TokenSwap, DbError> {
        let outcome = self
            .modify_user(id, |user| {
                if user.revoke_refresh_token(old) {
                    user.refresh_tokens.push(new.to_string());
                    (TokenSwap::Rotated, true)
                } else {
                    (TokenSwap::NotPresent, false)
                }
            })
            .await?;
        Ok(outcome.unwrap_or(TokenSwap::UserMissing))
    }

    async fn remove_refresh_token(&self, id: &str, token: &str) -> Result<bool, DbError> {
        let removed = self
            .modify_user(id, |user| {
                user.normalize_refresh_tokens();
                user.revoke_refresh_token(token.trim());
                ((), true)
            })
            .await?;
        Ok(removed.is_some())
    }

    async fn clear_refresh_tokens(&self, id: &str) -> Result<(), DbError> {
        self.modify_user(id, |user| {
            let dirty = !user.refresh_tokens.is_empty();
            user.refresh_tokens.clear();
            ((), dirty)
        })
        .await?;
        Ok(())
    }
}
