//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup. The token signing secret is the one
//! value allowed to be absent: the server still boots, but every operation
//! that needs to sign or verify a session token fails with a configuration
//! error until it is set.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder stored for users without an uploaded picture.
pub const DEFAULT_PROFILE_PICTURE: &str = "default_profile.png";

/// Default and production floor for the bcrypt work factor.
pub const RECOMMENDED_BCRYPT_COST: u32 = 10;

const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Which `UserRepository` implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Repository backend
    pub storage_backend: StorageBackend,
    /// OAuth client ID the Google ID tokens must be issued for
    pub google_client_id: String,
    /// bcrypt work factor
    pub bcrypt_cost: u32,
    /// Directory uploaded files are written to and served from
    pub public_dir: PathBuf,
    /// Public base URL prefixed to uploaded file names
    pub public_base_url: String,

    // --- Secrets ---
    /// Session token signing secret (raw bytes). `None` means not configured.
    pub token_secret: Option<Vec<u8>>,
    /// Lifetime of access tokens
    pub access_token_ttl: Duration,
    /// Lifetime of refresh tokens
    pub refresh_token_ttl: Duration,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 3000,
            storage_backend: StorageBackend::Memory,
            google_client_id: "test-client-id.apps.googleusercontent.com".to_string(),
            // bcrypt's minimum cost keeps tests fast
            bcrypt_cost: 4,
            public_dir: PathBuf::from("public"),
            public_base_url: "http://localhost:3000".to_string(),
            token_secret: Some(b"test_token_secret_32_bytes_min!!".to_vec()),
            access_token_ttl: Duration::from_secs(60 * 60),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honoured for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let storage_backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "firestore".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "firestore" => StorageBackend::Firestore,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let bcrypt_cost = match env::var("BCRYPT_COST") {
            Ok(raw) => parse_bcrypt_cost(&raw).ok_or(ConfigError::Invalid {
                name: "BCRYPT_COST",
                value: raw,
            })?,
            Err(_) => RECOMMENDED_BCRYPT_COST,
        };
        if bcrypt_cost < RECOMMENDED_BCRYPT_COST {
            tracing::warn!(
                bcrypt_cost,
                recommended = RECOMMENDED_BCRYPT_COST,
                "BCRYPT_COST is below the recommended minimum; only use this outside production"
            );
        }

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            storage_backend,
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            bcrypt_cost,
            public_dir: PathBuf::from(env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".to_string())),
            public_base_url: env::var("DOMAIN_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            token_secret: env::var("TOKEN_SECRET")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(String::into_bytes),
            access_token_ttl: ttl_from_env("ACCESS_TOKEN_EXPIRATION", "1h")?,
            refresh_token_ttl: ttl_from_env("REFRESH_TOKEN_EXPIRATION", "7d")?,
        })
    }
}

/// Parse `BCRYPT_COST`, accepting only what bcrypt itself accepts (4..=31).
pub fn parse_bcrypt_cost(raw: &str) -> Option<u32> {
    raw.trim()
        .parse()
        .ok()
        .filter(|cost| BCRYPT_COST_RANGE.contains(cost))
}

fn ttl_from_env(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_ttl(&raw).ok_or(ConfigError::Invalid { name, value: raw })
}

/// Parse a token lifetime such as `900`, `30s`, `15m`, `1h` or `7d`.
pub fn parse_ttl(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);

    let value: u64 = digits.parse().ok()?;
    let multiplier = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };

    if value == 0 {
        return None;
    }

    value.checked_mul(multiplier).map(Duration::from_secs)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
