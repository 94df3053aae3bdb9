//! Filesystem-backed document store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::traits::DocumentStore;
use crate::error::StoreError;

/// Stores each document as a compact JSON file under one directory.
///
/// Writes go to `<name>.tmp` first and are renamed into place, so a crash
/// mid-write leaves the previous version intact.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn ensure_root(&self, name: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::Write {
                name: name.to_string(),
                source,
            })
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn load(&self, name: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.path_for(name);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    name: name.to_string(),
                    source,
                });
            }
        };

        if raw.trim().is_empty() {
            return Ok(None);
        }

        let document = serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            name: name.to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded document");
        Ok(Some(document))
    }

    async fn save(&self, name: &str, document: &serde_json::Value) -> Result<(), StoreError> {
        self.ensure_root(name).await?;

        let path = self.path_for(name);
        let temp = self.path_for(&format!("{name}.tmp"));
        let body = serde_json::to_vec(document)?;

        let write_err = |source: std::io::Error| StoreError::Write {
            name: name.to_string(),
            source,
        };
        tokio::fs::write(&temp, body).await.map_err(write_err)?;
        tokio::fs::rename(&temp, &path).await.map_err(write_err)?;
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        tokio::fs::try_exists(self.path_for(name))
            .await
            .map_err(|source| StoreError::Read {
                name: name.to_string(),
                source,
            })
    }

    async fn append_line(&self, name: &str, line: &str) -> Result<(), StoreError> {
        self.ensure_root(name).await?;

        let write_err = |source: std::io::Error| StoreError::Write {
            name: name.to_string(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(name))
            .await
            .map_err(write_err)?;
        file.write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(write_err)?;
        Ok(())
    }
}
