// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage for uploaded profile pictures.

use anyhow::Context;
use async_trait::async_trait;
use axum::body::Bytes;
use std::path::PathBuf;

const MAX_EXTENSION_LEN: usize = 8;

/// A file received in a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied file name, used only for its extension
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Somewhere uploaded files can be put and later removed.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store the file and return the URL it is served from.
    async fn upload(&self, file: UploadedFile) -> anyhow::Result<String>;

    /// Remove a file previously returned by `upload`. Unknown URLs are ignored.
    async fn delete(&self, url: &str) -> anyhow::Result<()>;
}

/// Writes uploads into a local directory that the router serves at `/public`.
pub struct LocalFileStore {
    dir: PathBuf,
    base_url: String,
}

impl LocalFileStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            base_url: format!("{}/public/", public_base_url.trim_end_matches('/')),
        }
    }

    /// Map a URL we handed out back to a file in our directory.
    fn local_path(&self, url: &str) -> Option<PathBuf> {
        let name = url.strip_prefix(&self.base_url)?;
        let is_plain_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
            && !name.starts_with('.');
        is_plain_name.then(|| self.dir.join(name))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn upload(&self, file: UploadedFile) -> anyhow::Result<String> {
        if file.bytes.is_empty() {
            anyhow::bail!("uploaded file is empty");
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating upload directory {}", self.dir.display()))?;

        let mut name = uuid::Uuid::new_v4().simple().to_string();
        if let Some(ext) = file.file_name.as_deref().and_then(sanitized_extension) {
            name.push('.');
            name.push_str(&ext);
        }

        let path = self.dir.join(&name);
        tokio::fs::write(&path, &file.bytes)
            .await
            .with_context(|| format!("writing upload {}", path.display()))?;

        tracing::debug!(
            file = %name,
            size = file.bytes.len(),
            content_type = file.content_type.as_deref().unwrap_or("<unknown>"),
            "Stored uploaded file"
        );

        Ok(format!("{}{}", self.base_url, name))
    }

    async fn delete(&self, url: &str) -> anyhow::Result<()> {
        let Some(path) = self.local_path(url) else {
            tracing::debug!(url = %url, "Not a locally stored file, skipping delete");
            return Ok(());
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}

/// Lowercased alphanumeric extension of `file_name`, if it has a usable one.
fn sanitized_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    (!ext.is_empty()).then_some(ext)
}
