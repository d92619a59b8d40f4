// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session token issuance and verification.
//!
//! Access and refresh tokens are both HS256 JWTs signed with the same
//! secret. They differ in the `kind` claim and in lifetime, and every token
//! carries a random nonce so two pairs minted in the same second still
//! differ.

use crate::config::Config;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const NONCE_BYTES: usize = 16;

/// Which half of a pair a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims for session tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Email, access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// 128-bit random value, hex-encoded
    pub nonce: String,
    pub kind: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Access/refresh token pair handed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Token errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token secret is not configured")]
    MissingSecret,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Token signing failed: {0}")]
    Signing(String),
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct TokenService {
    keys: Option<SigningKeys>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    rng: SystemRandom,
}

impl TokenService {
    pub fn new(config: &Config) -> Self {
        let keys = config.token_secret.as_deref().map(|secret| SigningKeys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        });

        Self {
            keys,
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
            rng: SystemRandom::new(),
        }
    }

    fn keys(&self) -> Result<&SigningKeys, TokenError> {
        self.keys.as_ref().ok_or(TokenError::MissingSecret)
    }

    /// Mint a fresh access/refresh pair for `user_id`.
    pub fn issue_pair(&self, user_id: &str, email: Option<&str>) -> Result<TokenPair, TokenError> {
        let keys = self.keys()?;
        let now = now_unix_secs();

        let access = TokenClaims {
            sub: user_id.to_string(),
            email: email.map(str::to_string),
            nonce: self.nonce()?,
            kind: TokenKind::Access,
            iat: now,
            exp: expiry(now, self.access_ttl)?,
        };
        let refresh = TokenClaims {
            sub: user_id.to_string(),
            email: None,
            nonce: self.nonce()?,
            kind: TokenKind::Refresh,
            iat: now,
            exp: expiry(now, self.refresh_ttl)?,
        };

        Ok(TokenPair {
            access_token: sign(&access, &keys.encoding)?,
            refresh_token: sign(&refresh, &keys.encoding)?,
        })
    }

    /// Verify signature, expiry and kind, returning the claims.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, TokenError> {
        let keys = self.keys()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<TokenClaims>(token, &keys.decoding, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?
            .claims;

        if claims.kind != kind {
            return Err(TokenError::Invalid(format!(
                "expected {kind:?} token, got {:?}",
                claims.kind
            )));
        }

        Ok(claims)
    }

    fn nonce(&self) -> Result<String, TokenError> {
        let mut bytes = [0u8; NONCE_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| TokenError::Signing("system RNG failure".to_string()))?;
        Ok(hex::encode(bytes))
    }
}

fn sign(claims: &TokenClaims, key: &EncodingKey) -> Result<String, TokenError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| TokenError::Signing(e.to_string()))
}

fn expiry(now: u64, ttl: Duration) -> Result<u64, TokenError> {
    now.checked_add(ttl.as_secs())
        .ok_or_else(|| TokenError::Signing(format!("token lifetime {ttl:?} is out of range")))
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
