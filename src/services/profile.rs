// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public profile lookup and owner-only profile edits.

use crate::config::DEFAULT_PROFILE_PICTURE;
use crate::db::{DbError, UserRepository};
use crate::models::{PublicUser, UserUpdate};
use crate::services::auth::{AuthError, AuthUser};
use crate::services::file_store::{FileStore, UploadedFile};
use std::sync::Arc;

const USERNAME_TAKEN: &str = "Username already exists, Please choose another one";

/// Requested profile edits. Absent fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub user_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<UploadedFile>,
}

pub struct ProfileService {
    users: Arc<dyn UserRepository>,
    files: Arc<dyn FileStore>,
}

impl ProfileService {
    pub fn new(users: Arc<dyn UserRepository>, files: Arc<dyn FileStore>) -> Self {
        Self { users, files }
    }

    pub async fn get_by_username(&self, user_name: &str) -> Result<PublicUser, AuthError> {
        self.users
            .find_by_username(user_name)
            .await
            .map_err(internal)?
            .map(|user| user.public())
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))
    }

    /// Apply `changes` to the profile of `user_name`, which must belong to the caller.
    pub async fn update(
        &self,
        caller: &AuthUser,
        user_name: &str,
        changes: ProfileChanges,
    ) -> Result<PublicUser, AuthError> {
        let user = self
            .users
            .find_by_username(user_name)
            .await
            .map_err(internal)?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

        if user.id != caller.user_id {
            tracing::warn!(
                caller = %caller.user_id,
                target = %user.id,
                "Refusing profile update of another user"
            );
            return Err(AuthError::Forbidden(
                "You can only update your own profile".to_string(),
            ));
        }

        let new_picture = match changes.profile_picture {
            Some(file) => match self.files.upload(file).await {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Profile picture upload failed, keeping old picture");
                    None
                }
            },
            None => None,
        };

        let update = UserUpdate {
            user_name: changes
                .user_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty() && *name != user.user_name),
            bio: changes.bio,
            profile_picture_url: new_picture.clone(),
        };

        if update.is_empty() {
            return Ok(user.public());
        }

        let updated = match self.users.update(&user.id, &update).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.discard(new_picture.as_deref()).await;
                return Err(AuthError::NotFound("User not found".to_string()));
            }
            Err(DbError::Duplicate(_)) => {
                self.discard(new_picture.as_deref()).await;
                return Err(AuthError::Conflict {
                    message: USERNAME_TAKEN.to_string(),
                    email: None,
                    suggested_user_name: None,
                });
            }
            Err(e) => {
                self.discard(new_picture.as_deref()).await;
                return Err(internal(e));
            }
        };

        if new_picture.is_some() && user.profile_picture_url != DEFAULT_PROFILE_PICTURE {
            self.discard(Some(&user.profile_picture_url)).await;
        }

        tracing::info!(user_id = %updated.id, user_name = %updated.user_name, "Profile updated");
        Ok(updated.public())
    }

    async fn discard(&self, url: Option<&str>) {
        let Some(url) = url else { return };
        if let Err(e) = self.files.delete(url).await {
            tracing::warn!(error = %e, "Failed to delete profile picture");
        }
    }
}

fn internal(err: DbError) -> AuthError {
    tracing::error!(error = %err, "Profile storage error");
    AuthError::Internal("Failed to update user".to_string())
}
