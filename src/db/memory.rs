// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process user store for local development and tests.
//!
//! Every operation runs under one write lock, so uniqueness checks and
//! refresh-token rotation are trivially atomic.

use super::{DbError, TokenSwap, UniqueField, UserRepository};
use crate::models::{User, UserUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory `UserRepository`.
#[derive(Clone, Default)]
pub struct MemoryDb {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

/// Check `candidate` against every other stored user.
fn check_unique(users: &HashMap<String, User>, candidate: &User) -> Result<(), DbError> {
    for other in users.values().filter(|u| u.id != candidate.id) {
        if other.user_name == candidate.user_name {
            return Err(DbError::Duplicate(UniqueField::UserName));
        }
        if other.email == candidate.email {
            return Err(DbError::Duplicate(UniqueField::Email));
        }
    }
    Ok(())
}

#[async_trait]
impl UserRepository for MemoryDb {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DbError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_username(&self, user_name: &str) -> Result<Option<User>, DbError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.user_name == user_name)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create(&self, user: &User) -> Result<(), DbError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(DbError::Backend(format!("user {} already stored", user.id)));
        }
        check_unique(&users, user)?;
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn save(&self, user: &User) -> Result<(), DbError> {
        let mut users = self.users.write().await;
        let Some(current) = users.get(&user.id) else {
            return Err(DbError::Backend(format!("user {} does not exist", user.id)));
        };

        let mut updated = user.clone();
        updated.refresh_tokens = current.refresh_tokens.clone();
        check_unique(&users, &updated)?;
        users.insert(updated.id.clone(), updated);
        Ok(())
    }

    async fn update(&self, id: &str, changes: &UserUpdate) -> Result<Option<User>, DbError> {
        let mut users = self.users.write().await;
        let Some(current) = users.get(id) else {
            return Ok(None);
        };

        let mut updated = current.clone();
        changes.apply(&mut updated);
        check_unique(&users, &updated)?;
        users.insert(updated.id.clone(), updated.clone());
        Ok(Some(updated))
    }

    async fn push_refresh_token(&self, id: &str, token: &str) -> Result<bool, DbError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id) else {
            return Ok(false);
        };
        user.refresh_tokens.push(token.to_string());
        Ok(true)
    }

    async fn swap_refresh_token(
        &self,
        id: &str,
        old: &str,
        new: &str,
    ) -> Result<TokenSwap, DbError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id) else {
            return Ok(TokenSwap::UserMissing);
        };
        if !user.revoke_refresh_token(old) {
            return Ok(TokenSwap::NotPresent);
        }
        user.refresh_tokens.push(new.to_string());
        Ok(TokenSwap::Rotated)
    }

    async fn remove_refresh_token(&self, id: &str, token: &str) -> Result<bool, DbError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id) else {
            return Ok(false);
        };
        user.normalize_refresh_tokens();
        user.revoke_refresh_token(token.trim());
        Ok(true)
    }

    async fn clear_refresh_tokens(&self, id: &str) -> Result<(), DbError> {
        if let Some(user) = self.users.write().await.get_mut(id) {
            user.refresh_tokens.clear();
        }
        Ok(())
    }
}
