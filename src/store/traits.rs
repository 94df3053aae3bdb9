//! `DocumentStore` trait: named JSON documents plus append-only logs.
//!
//! The ledger, conversation histories and block list each live in one
//! document that is rewritten whole on every mutation, so a restart reloads
//! exactly what was last flushed.

use async_trait::async_trait;

use crate::error::StoreError;

/// Ledger document name.
pub const LEDGER_DOC: &str = "processed_numbers.json";
/// Conversation history document name.
pub const HISTORY_DOC: &str = "conversation_history.json";
/// Block list document name.
pub const BLOCKLIST_DOC: &str = "blocked_numbers.json";
/// Send audit log name.
pub const AUDIT_LOG: &str = "message_history.log";

/// Backend-agnostic persistence for whole JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a document. `Ok(None)` when it has never been written.
    async fn load(&self, name: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Replace a document atomically.
    async fn save(&self, name: &str, document: &serde_json::Value) -> Result<(), StoreError>;

    /// Whether a document or log has been written.
    async fn exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Append one line to a log.
    async fn append_line(&self, name: &str, line: &str) -> Result<(), StoreError>;
}
