//! User model for storage and API.

use crate::config::DEFAULT_PROFILE_PICTURE;
use serde::{Deserialize, Deserializer, Serialize};
use subtle::ConstantTimeEq;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// User account stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Opaque account ID (also used as document ID)
    pub id: String,
    /// Unique handle, mutable
    pub user_name: String,
    /// Unique email address
    pub email: String,
    /// bcrypt digest, password accounts only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    /// Google subject ID, Google-linked accounts only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    pub profile_picture_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// Live refresh tokens, one per signed-in device
    #[serde(default, deserialize_with = "lenient_token_list")]
    pub refresh_tokens: Vec<String>,
    /// When the account was created (RFC 3339)
    #[serde(default)]
    pub created_at: String,
}

impl User {
    /// Build a new password-based account.
    pub fn with_password(
        user_name: impl Into<String>,
        email: impl Into<String>,
        password_hash: String,
        profile_picture_url: Option<String>,
    ) -> Self {
        let mut user = Self::blank(user_name.into(), email.into(), profile_picture_url);
        user.password_hash = Some(password_hash);
        user
    }

    /// Build a new account whose identity is vouched for by Google.
    pub fn with_google(
        user_name: impl Into<String>,
        email: impl Into<String>,
        google_id: impl Into<String>,
        profile_picture_url: Option<String>,
    ) -> Self {
        let mut user = Self::blank(user_name.into(), email.into(), profile_picture_url);
        user.google_id = Some(google_id.into());
        user
    }

    fn blank(user_name: String, email: String, profile_picture_url: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_name,
            email,
            password_hash: None,
            google_id: None,
            profile_picture_url: profile_picture_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROFILE_PICTURE.to_string()),
            bio: None,
            refresh_tokens: Vec::new(),
            created_at: crate::time_utils::format_utc_rfc3339(chrono::Utc::now()),
        }
    }

    /// Trim stored tokens and drop empty entries left behind by bad writes.
    pub fn normalize_refresh_tokens(&mut self) {
        self.refresh_tokens = std::mem::take(&mut self.refresh_tokens)
            .into_iter()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .collect();
    }

    /// Remove `token` from the live set. Returns whether anything was removed.
    pub fn revoke_refresh_token(&mut self, token: &str) -> bool {
        let before = self.refresh_tokens.len();
        self.refresh_tokens
            .retain(|live| !bool::from(live.as_bytes().ct_eq(token.as_bytes())));
        self.refresh_tokens.len() != before
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            user_name: self.user_name.clone(),
            email: self.email.clone(),
            profile_picture_url: self.profile_picture_url.clone(),
        }
    }

    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            user_name: self.user_name.clone(),
            email: self.email.clone(),
            profile_picture_url: self.profile_picture_url.clone(),
            bio: self.bio.clone(),
            google_linked: self.google_id.is_some(),
        }
    }
}

/// Profile fields returned after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_name: String,
    pub email: String,
    pub profile_picture_url: String,
}

/// Publicly visible account data. Never carries credentials or sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_name: String,
    pub email: String,
    pub profile_picture_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub google_linked: bool,
}

/// Partial profile update applied by the repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUpdate {
    pub user_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.user_name.is_none() && self.bio.is_none() && self.profile_picture_url.is_none()
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(user_name) = &self.user_name {
            user.user_name = user_name.clone();
        }
        if let Some(bio) = &self.bio {
            user.bio = Some(bio.clone());
        }
        if let Some(url) = &self.profile_picture_url {
            user.profile_picture_url = url.clone();
        }
    }
}

/// Accept anything for `refreshTokens`; only a list of strings is kept.
fn lenient_token_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        List(Vec<Option<String>>),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Stored::deserialize(deserializer)? {
        Stored::List(tokens) => tokens.into_iter().flatten().collect(),
        Stored::Other(_) => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(refresh_tokens: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "u1",
            "userName": "alice",
            "email": "alice@x.com",
            "passwordHash": "$2b$04$abc",
            "profilePictureUrl": "default_profile.png",
            "refreshTokens": refresh_tokens,
            "createdAt": "2026-01-01T00:00:00Z"
        })
    }

    #[test]
    fn test_refresh_tokens_tolerate_corrupted_values() {
        let user: User = serde_json::from_value(stored(json!("not-a-list"))).unwrap();
        assert!(user.refresh_tokens.is_empty());

        let user: User = serde_json::from_value(stored(json!(null))).unwrap();
        assert!(user.refresh_tokens.is_empty());

        let user: User = serde_json::from_value(stored(json!(["a", null, "b"]))).unwrap();
        assert_eq!(user.refresh_tokens, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_refresh_tokens_field() {
        let mut value = stored(json!([]));
        value.as_object_mut().unwrap().remove("refreshTokens");
        let user: User = serde_json::from_value(value).unwrap();
        assert!(user.refresh_tokens.is_empty());
    }

    #[test]
    fn test_normalize_and_revoke() {
        let mut user = User::with_password("alice", "alice@x.com", "hash".into(), None);
        user.refresh_tokens = vec![" t1 ".into(), "".into(), "t2".into()];

        user.normalize_refresh_tokens();
        assert_eq!(user.refresh_tokens, vec!["t1", "t2"]);

        assert!(user.revoke_refresh_token("t1"));
        assert!(!user.revoke_refresh_token("t1"));
        assert_eq!(user.refresh_tokens, vec!["t2"]);
    }

    #[test]
    fn test_new_users_default_picture() {
        let user = User::with_google("bob", "bob@g.com", "g1", Some("  ".into()));
        assert_eq!(user.profile_picture_url, DEFAULT_PROFILE_PICTURE);
        assert_eq!(user.google_id.as_deref(), Some("g1"));
        assert!(user.password_hash.is_none());
    }

    #[test]
    fn test_public_view_hides_secrets() {
        let mut user = User::with_password("alice", "alice@x.com", "hash".into(), None);
        user.refresh_tokens.push("secret-refresh".into());

        let body = serde_json::to_string(&user.public()).unwrap();
        assert!(!body.contains("hash"));
        assert!(!body.contains("secret-refresh"));
        assert!(body.contains("\"_id\""));
        assert!(body.contains("\"googleLinked\":false"));
    }
}
