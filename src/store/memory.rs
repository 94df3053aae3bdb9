//! In-memory document store for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::DocumentStore;
use crate::error::StoreError;

/// Keeps documents in a map. Writes can be made to fail on demand.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, serde_json::Value>>,
    logs: Mutex<HashMap<String, Vec<String>>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save`/`append_line` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful `save` calls so far.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Lines appended to a log so far.
    pub async fn log_lines(&self, name: &str) -> Vec<String> {
        self.logs.lock().await.get(name).cloned().unwrap_or_default()
    }

    fn check_writable(&self, name: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                name: name.to_string(),
                source: std::io::Error::other("writes disabled"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, name: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.documents.lock().await.get(name).cloned())
    }

    async fn save(&self, name: &str, document: &serde_json::Value) -> Result<(), StoreError> {
        self.check_writable(name)?;
        self.documents
            .lock()
            .await
            .insert(name.to_string(), document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        if self.documents.lock().await.contains_key(name) {
            return Ok(true);
        }
        Ok(self.logs.lock().await.contains_key(name))
    }

    async fn append_line(&self, name: &str, line: &str) -> Result<(), StoreError> {
        self.check_writable(name)?;
        self.logs
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .push(line.to_string());
        Ok(())
    }
}
