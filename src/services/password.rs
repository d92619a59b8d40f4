// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Password hashing with bcrypt.
//!
//! bcrypt is slow on purpose, so every call runs on the blocking pool
//! instead of stalling a runtime worker.

/// Plaintext used by `burn` when there is no stored digest to compare with.
const BURN_DIGEST_INPUT: &str = "astroshare-login-burn";

/// bcrypt hasher with a fixed work factor.
#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    cost: u32,
}

impl CredentialHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash `plaintext` with a fresh random salt.
    pub async fn hash(&self, plaintext: &str) -> anyhow::Result<String> {
        let plaintext = plaintext.to_string();
        let cost = self.cost;

        let digest = tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost)).await??;
        Ok(digest)
    }

    /// Check `plaintext` against a stored digest. Any failure counts as a mismatch.
    pub async fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let plaintext = plaintext.to_string();
        let digest = digest.to_string();

        match tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &digest)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Stored password digest is malformed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Password verification task failed");
                false
            }
        }
    }

    /// Spend one hash worth of work and discard the result.
    ///
    /// Called on login paths that fail before a digest comparison, so that
    /// an unknown username costs about as much as a wrong password.
    pub async fn burn(&self, plaintext: &str) {
        let input = format!("{BURN_DIGEST_INPUT}:{plaintext}");
        if let Err(e) = self.hash(&input).await {
            tracing::debug!(error = %e, "Burn hash failed");
        }
    }
}
