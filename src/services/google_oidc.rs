// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google ID token verification for "Sign in with Google".
//!
//! Tokens are RS256 JWTs checked against Google's published JWKS, which is
//! discovered through the OpenID configuration document and cached for as
//! long as the response's `Cache-Control: max-age` allows.

use crate::config::Config;
use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

const DISCOVERY_URL: &str = "https://accounts.google.com/.well-known/openid-configuration";
const DEFAULT_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Identity vouched for by a valid Google ID token.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleIdentity {
    pub email: Option<String>,
    /// Google account ID (`sub` claim)
    pub subject: String,
    pub picture: Option<String>,
}

/// OIDC verification error categories.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OidcError {
    /// The token is invalid or its claims do not match expectations.
    #[error("Google credential rejected: {0}")]
    Forbidden(String),
    /// Google's key endpoints could not be reached or parsed.
    #[error("Google verification unavailable: {0}")]
    Transient(String),
}

/// Verifies Google ID tokens ("credentials") presented by the frontend.
#[async_trait]
pub trait GoogleIdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<GoogleIdentity, OidcError>;
}

/// Where signing keys come from.
enum KeySource {
    /// Google's JWKS, discovered and cached.
    Google,
    /// A single fixed key, for offline verification in tests.
    Static {
        kid: String,
        decoding_key: Arc<DecodingKey>,
    },
}

#[derive(Clone)]
struct DiscoveryCacheEntry {
    jwks_uri: String,
    expires_at: Instant,
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for Google-issued OIDC ID tokens.
pub struct GoogleOidcVerifier {
    http_client: reqwest::Client,
    expected_audience: String,
    keys: KeySource,
    discovery_cache: RwLock<Option<DiscoveryCacheEntry>>,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl GoogleOidcVerifier {
    /// Create a production verifier that discovers and caches Google JWKS keys.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let verifier = Self::with_keys(config, KeySource::Google)?;

        tracing::info!(
            expected_audience = %verifier.expected_audience,
            "Initialized Google sign-in verifier"
        );

        Ok(verifier)
    }

    /// Create a verifier that trusts one RSA public key under `kid`.
    ///
    /// Lets the full claim checks run without reaching Google.
    pub fn new_with_static_key(
        config: &Config,
        kid: impl Into<String>,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static key id must not be empty");
        }

        Self::with_keys(
            config,
            KeySource::Static {
                kid,
                decoding_key: Arc::new(decoding_key),
            },
        )
    }

    fn with_keys(config: &Config, keys: KeySource) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building OIDC HTTP client")?;

        let expected_audience = config.google_client_id.trim().to_string();
        if expected_audience.is_empty() {
            anyhow::bail!("Google client ID must not be empty");
        }

        Ok(Self {
            http_client,
            expected_audience,
            keys,
            discovery_cache: RwLock::new(None),
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    async fn verify_id_token(&self, token: &str) -> Result<GoogleIdentity, OidcError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(OidcError::Forbidden("credential is empty".to_string()));
        }

        let header = decode_header(token)
            .map_err(|e| OidcError::Forbidden(format!("invalid JWT header: {e}")))?;

        if header.alg != Algorithm::RS256 {
            return Err(OidcError::Forbidden(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| OidcError::Forbidden("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&["https://accounts.google.com", "accounts.google.com"]);
        validation.set_audience(&[self.expected_audience.as_str()]);
        validation.validate_nbf = true;
        validation.leeway = CLOCK_SKEW_SECS;

        let token_data =
            decode::<GoogleIdTokenClaims>(token, decoding_key.as_ref(), &validation)
                .map_err(|e| OidcError::Forbidden(format!("JWT validation failed: {e}")))?;

        let claims = token_data.claims;

        tracing::debug!(
            email_verified = ?claims.email_verified,
            subject = %claims.sub,
            issuer = %claims.iss,
            exp = claims.exp,
            "Google ID token claims"
        );

        validate_iat(claims.iat)?;

        if claims.email_verified == Some(false) {
            return Err(OidcError::Forbidden(
                "email_verified claim is false".to_string(),
            ));
        }

        Ok(GoogleIdentity {
            email: claims.email.filter(|email| !email.trim().is_empty()),
            subject: claims.sub,
            picture: claims.picture,
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, OidcError> {
        if let KeySource::Static {
            kid: static_kid,
            decoding_key,
        } = &self.keys
        {
            return if kid == static_kid {
                Ok(decoding_key.clone())
            } else {
                Err(OidcError::Forbidden(format!("unknown JWT kid: {kid}")))
            };
        }

        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(OidcError::Forbidden(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), OidcError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        let jwks_uri = self.resolve_jwks_uri(force_refresh).await;
        let jwks_uri = match jwks_uri {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(error = ?e, "Failed to resolve JWKS URI");
                return Err(e);
            }
        };

        tracing::debug!(jwks_uri = %jwks_uri, "Refreshing Google JWKS cache");

        let response = self
            .http_client
            .get(&jwks_uri)
            .send()
            .await
            .map_err(|e| OidcError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OidcError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| OidcError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let mut keys_by_kid: HashMap<String, Arc<DecodingKey>> = HashMap::new();

        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                continue;
            }

            if jwk.kid.trim().is_empty() {
                continue;
            }

            if let Some(alg) = &jwk.alg {
                if alg != "RS256" {
                    continue;
                }
            }

            if let Some(use_) = &jwk.use_ {
                if use_ != "sig" {
                    continue;
                }
            }

            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys_by_kid.insert(jwk.kid, Arc::new(key));
                }
                Err(e) => {
                    tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
                }
            }
        }

        if keys_by_kid.is_empty() {
            return Err(OidcError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        let entry = JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        };

        *self.jwks_cache.write().await = Some(entry);

        tracing::debug!(ttl_secs = ttl.as_secs(), "Google JWKS cache refreshed");
        Ok(())
    }

    async fn resolve_jwks_uri(&self, force_refresh: bool) -> Result<String, OidcError> {
        if !force_refresh {
            let cache = self.discovery_cache.read().await;
            if let Some(entry) = cache
                .as_ref()
                .filter(|entry| entry.expires_at > Instant::now())
            {
                return Ok(entry.jwks_uri.clone());
            }
        }

        let cached_jwks_uri = self
            .discovery_cache
            .read()
            .await
            .as_ref()
            .map(|entry| entry.jwks_uri.clone());

        let response = self.http_client.get(DISCOVERY_URL).send().await;
        match response {
            Ok(resp) if resp.status().is_success() => {
                let ttl = cache_ttl_from_headers(resp.headers(), DEFAULT_CACHE_TTL);
                let discovery: OpenIdConfig = resp
                    .json()
                    .await
                    .map_err(|e| OidcError::Transient(format!("invalid discovery JSON: {e}")))?;

                *self.discovery_cache.write().await = Some(DiscoveryCacheEntry {
                    jwks_uri: discovery.jwks_uri.clone(),
                    expires_at: Instant::now() + ttl,
                });

                Ok(discovery.jwks_uri)
            }
            Ok(resp) => {
                tracing::warn!(
                    status = %resp.status(),
                    "OIDC discovery returned non-success status; using fallback JWKS URI"
                );
                Ok(cached_jwks_uri.unwrap_or_else(|| DEFAULT_JWKS_URL.to_string()))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "OIDC discovery request failed; using fallback JWKS URI"
                );
                Ok(cached_jwks_uri.unwrap_or_else(|| DEFAULT_JWKS_URL.to_string()))
            }
        }
    }
}

#[async_trait]
impl GoogleIdentityVerifier for GoogleOidcVerifier {
    async fn verify(&self, credential: &str) -> Result<GoogleIdentity, OidcError> {
        self.verify_id_token(credential).await
    }
}

#[derive(Debug, Deserialize)]
struct OpenIdConfig {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleIdTokenClaims {
    iss: String,
    sub: String,
    exp: usize,
    iat: Option<usize>,
    email: Option<String>,
    email_verified: Option<bool>,
    picture: Option<String>,
}

fn validate_iat(iat: Option<usize>) -> Result<(), OidcError> {
    let now = now_unix_secs();

    let Some(iat) = iat else {
        return Err(OidcError::Forbidden("missing iat claim".to_string()));
    };

    if iat as u64 > now + CLOCK_SKEW_SECS {
        return Err(OidcError::Forbidden(
            "iat claim is in the future".to_string(),
        ));
    }

    Ok(())
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    let Some(cache_control) = headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
    else {
        return fallback;
    };

    Duration::from_secs(cache_control)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    for directive in value.split(',') {
        let directive = directive.trim();

        if let Some(raw) = directive.strip_prefix("max-age=") {
            let raw = raw.trim_matches('"');
            if let Ok(seconds) = raw.parse::<u64>() {
                return Some(seconds);
            }
        }
    }

    None
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};

    const TEST_KID: &str = "test-kid";
    const PRIVATE_KEY: &[u8] = include_bytes!("../../tests/fixtures/google_test_key.pem");
    const PUBLIC_KEY: &[u8] = include_bytes!("../../tests/fixtures/google_test_key.pub.pem");

    fn static_verifier() -> GoogleOidcVerifier {
        let key = DecodingKey::from_rsa_pem(PUBLIC_KEY).unwrap();
        GoogleOidcVerifier::new_with_static_key(&Config::default(), TEST_KID, key).unwrap()
    }

    fn claims() -> Value {
        let now = now_unix_secs();
        json!({
            "iss": "https://accounts.google.com",
            "aud": Config::default().google_client_id,
            "sub": "1234567890",
            "iat": now,
            "exp": now + 3600,
            "email": "bob@gmail.com",
            "email_verified": true,
            "picture": "https://lh3.googleusercontent.com/a/bob.jpg",
        })
    }

    fn sign(claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(TEST_KID.to_string());
        let key = EncodingKey::from_rsa_pem(PRIVATE_KEY).unwrap();
        encode(&header, claims, &key).unwrap()
    }

    #[tokio::test]
    async fn verify_accepts_valid_credential() {
        let identity = static_verifier().verify(&sign(&claims())).await.unwrap();

        assert_eq!(
            identity,
            GoogleIdentity {
                email: Some("bob@gmail.com".to_string()),
                subject: "1234567890".to_string(),
                picture: Some("https://lh3.googleusercontent.com/a/bob.jpg".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn verify_rejects_other_audience() {
        let mut claims = claims();
        claims["aud"] = json!("someone-else.apps.googleusercontent.com");

        assert!(matches!(
            static_verifier().verify(&sign(&claims)).await,
            Err(OidcError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn verify_rejects_unverified_email() {
        let mut claims = claims();
        claims["email_verified"] = json!(false);

        assert!(matches!(
            static_verifier().verify(&sign(&claims)).await,
            Err(OidcError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn verify_rejects_foreign_issuer_and_expired() {
        let verifier = static_verifier();

        let mut foreign = claims();
        foreign["iss"] = json!("https://evil.example.com");
        assert!(matches!(
            verifier.verify(&sign(&foreign)).await,
            Err(OidcError::Forbidden(_))
        ));

        let mut expired = claims();
        let now = now_unix_secs();
        expired["iat"] = json!(now - 7200);
        expired["exp"] = json!(now - 3600);
        assert!(matches!(
            verifier.verify(&sign(&expired)).await,
            Err(OidcError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn verify_treats_blank_email_as_missing() {
        let mut claims = claims();
        claims["email"] = json!("  ");
        claims.as_object_mut().unwrap().remove("picture");
        claims.as_object_mut().unwrap().remove("email_verified");

        let identity = static_verifier().verify(&sign(&claims)).await.unwrap();
        assert_eq!(identity.email, None);
        assert_eq!(identity.picture, None);
        assert_eq!(identity.subject, "1234567890");
    }

    #[tokio::test]
    async fn verify_rejects_unknown_kid() {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("rotated-away".to_string());
        let key = EncodingKey::from_rsa_pem(PRIVATE_KEY).unwrap();
        let token = encode(&header, &claims(), &key).unwrap();

        assert!(matches!(
            static_verifier().verify(&token).await,
            Err(OidcError::Forbidden(_))
        ));
    }

    #[test]
    fn parse_cache_control_max_age_valid() {
        assert_eq!(
            parse_cache_control_max_age("public, max-age=3600"),
            Some(3600)
        );
        assert_eq!(parse_cache_control_max_age("max-age=60"), Some(60));
        assert_eq!(parse_cache_control_max_age("max-age=\"120\""), Some(120));
    }

    #[test]
    fn parse_cache_control_max_age_invalid() {
        assert_eq!(parse_cache_control_max_age("public, immutable"), None);
        assert_eq!(parse_cache_control_max_age("max-age=abc"), None);
        assert_eq!(parse_cache_control_max_age(""), None);
    }

    #[test]
    fn validate_iat_rejects_future_and_missing() {
        let now = now_unix_secs() as usize;

        assert!(validate_iat(Some(now)).is_ok());
        assert!(validate_iat(Some(now - 3600)).is_ok());
        assert!(matches!(
            validate_iat(Some(now + 3600)),
            Err(OidcError::Forbidden(_))
        ));
        assert!(matches!(validate_iat(None), Err(OidcError::Forbidden(_))));
    }

    #[tokio::test]
    async fn verify_rejects_malformed_credentials_offline() {
        let verifier = GoogleOidcVerifier::new(&Config::default()).unwrap();

        assert!(matches!(
            verifier.verify("").await,
            Err(OidcError::Forbidden(_))
        ));
        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(OidcError::Forbidden(_))
        ));
    }

    #[test]
    fn new_requires_client_id() {
        let config = Config {
            google_client_id: "  ".to_string(),
            ..Config::default()
        };
        assert!(GoogleOidcVerifier::new(&config).is_err());
    }
}
