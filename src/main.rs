// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AstroShare API Server
//!
//! Accounts, password and Google sign-in, and refresh-token sessions for
//! the AstroShare frontend.

use astroshare_api::{
    config::{Config, StorageBackend},
    db::{FirestoreDb, MemoryDb, UserRepository},
    services::{GoogleOidcVerifier, LocalFileStore},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting AstroShare API");

    if config.token_secret.is_none() {
        tracing::error!(
            "TOKEN_SECRET is not set: login, refresh and authenticated routes will fail until it is configured"
        );
    }

    // Initialize user storage
    let users: Arc<dyn UserRepository> = match config.storage_backend {
        StorageBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory user storage, data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    let google = Arc::new(GoogleOidcVerifier::new(&config)?);

    let files = Arc::new(LocalFileStore::new(
        config.public_dir.clone(),
        &config.public_base_url,
    ));
    tracing::info!(dir = %config.public_dir.display(), "Serving uploads");

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), users, google, files));

    // Build router
    let app = astroshare_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("astroshare_api=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
