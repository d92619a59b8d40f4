// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! AstroShare API: accounts, sign-in and sessions
//!
//! This crate provides the authentication backend for AstroShare:
//! password and Google sign-in, rotating refresh-token sessions, and
//! public user profiles.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::UserRepository;
use services::{AuthService, FileStore, GoogleIdentityVerifier, ProfileService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth: AuthService,
    pub profiles: ProfileService,
}

impl AppState {
    /// Wire the services from their collaborators.
    pub fn new(
        config: Config,
        users: Arc<dyn UserRepository>,
        google: Arc<dyn GoogleIdentityVerifier>,
        files: Arc<dyn FileStore>,
    ) -> Self {
        let auth = AuthService::new(&config, users.clone(), google, files.clone());
        let profiles = ProfileService::new(users, files);
        Self {
            config,
            auth,
            profiles,
        }
    }
}
