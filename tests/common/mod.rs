// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use astroshare_api::config::Config;
use astroshare_api::db::{FirestoreDb, MemoryDb};
use astroshare_api::routes::create_router;
use astroshare_api::services::{
    FileStore, GoogleIdentity, GoogleIdentityVerifier, OidcError, UploadedFile,
};
use astroshare_api::AppState;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ─── Fakes ───────────────────────────────────────────────────

/// Google verifier that accepts a fixed set of credentials.
#[derive(Default)]
pub struct FakeGoogleVerifier {
    identities: Mutex<HashMap<String, Result<GoogleIdentity, OidcError>>>,
}

#[allow(dead_code)]
impl FakeGoogleVerifier {
    /// Accept `credential` as the Google account `subject` with `email`.
    pub fn accept(&self, credential: &str, email: Option<&str>, subject: &str) {
        self.identities.lock().unwrap().insert(
            credential.to_string(),
            Ok(GoogleIdentity {
                email: email.map(str::to_string),
                subject: subject.to_string(),
                picture: Some(format!("https://lh3.googleusercontent.com/{subject}.jpg")),
            }),
        );
    }

    /// Make `credential` fail as if Google's keys could not be fetched.
    pub fn fail_transiently(&self, credential: &str) {
        self.identities.lock().unwrap().insert(
            credential.to_string(),
            Err(OidcError::Transient("JWKS request failed".to_string())),
        );
    }
}

#[async_trait]
impl GoogleIdentityVerifier for FakeGoogleVerifier {
    async fn verify(&self, credential: &str) -> Result<GoogleIdentity, OidcError> {
        self.identities
            .lock()
            .unwrap()
            .get(credential)
            .cloned()
            .unwrap_or_else(|| Err(OidcError::Forbidden("unknown credential".to_string())))
    }
}

/// File store that keeps uploads in memory, or fails every upload.
#[derive(Default)]
pub struct FakeFileStore {
    pub fail_uploads: bool,
    pub uploaded: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeFileStore {
    pub fn failing() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl FileStore for FakeFileStore {
    async fn upload(&self, file: UploadedFile) -> anyhow::Result<String> {
        if self.fail_uploads {
            anyhow::bail!("storage unavailable");
        }
        let mut uploaded = self.uploaded.lock().unwrap();
        let name = file.file_name.unwrap_or_else(|| "upload".to_string());
        let url = format!("http://localhost:3000/public/{}-{}", uploaded.len(), name);
        uploaded.push(url.clone());
        Ok(url)
    }

    async fn delete(&self, url: &str) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

// ─── Test App ────────────────────────────────────────────────

/// Router plus handles on its fakes.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub users: MemoryDb,
    pub google: Arc<FakeGoogleVerifier>,
    pub files: Arc<FakeFileStore>,
}

/// Create a test app with in-memory dependencies and the default test config.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::default(), FakeFileStore::default())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config, files: FakeFileStore) -> TestApp {
    let users = MemoryDb::new();
    let google = Arc::new(FakeGoogleVerifier::default());
    let files = Arc::new(files);

    let state = Arc::new(AppState::new(
        config,
        Arc::new(users.clone()),
        google.clone(),
        files.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        users,
        google,
        files,
    }
}

// ─── Request Helpers ─────────────────────────────────────────

/// Send a request and decode the JSON body (`Value::Null` if not JSON).
#[allow(dead_code)]
pub async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[allow(dead_code)]
pub async fn post_json(app: &TestApp, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, json_request(Method::POST, uri, body, None)).await
}

#[allow(dead_code)]
pub fn json_request(
    method: Method,
    uri: &str,
    body: Value,
    bearer: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Build a multipart body from text fields and an optional picture.
#[allow(dead_code)]
pub fn multipart_request(
    method: Method,
    uri: &str,
    fields: &[(&str, &str)],
    picture: Option<(&str, &[u8])>,
    bearer: Option<&str>,
) -> Request<Body> {
    const BOUNDARY: &str = "astroshare-test-boundary";
    let mut body: Vec<u8> = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = picture {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"profilePicture\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder().method(method).uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

/// Register a password account, panicking on failure.
#[allow(dead_code)]
pub async fn register(app: &TestApp, user_name: &str, email: &str, password: &str) -> Value {
    let (status, body) = post_json(
        app,
        "/api/auth/register",
        serde_json::json!({ "userName": user_name, "email": email, "password": password }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "register failed: {body}");
    body
}

/// Log in, panicking on failure. Returns the session response body.
#[allow(dead_code)]
pub async fn login(app: &TestApp, user_name: &str, password: &str) -> Value {
    let (status, body) = post_json(
        app,
        "/api/auth/login",
        serde_json::json!({ "userName": user_name, "password": password }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body
}
