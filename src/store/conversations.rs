//! ConversationStore: per-contact conversation state and the block list.
//!
//! State lives in memory behind one async mutex and is written through to
//! the [`DocumentStore`] after every mutation. A failed write is logged and
//! the in-memory state stays authoritative until a later write succeeds.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::traits::{BLOCKLIST_DOC, DocumentStore, HISTORY_DOC};
use crate::conversation::{ConversationState, ConversationTurn, Intent};
use crate::error::StoreError;

/// Why a contact was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    AggressiveMessage,
    StopRequest,
}

impl BlockReason {
    /// Block reason for an intent that ends the conversation, if it does.
    pub fn for_intent(intent: Intent) -> Option<Self> {
        if !intent.is_terminal() {
            return None;
        }
        match intent {
            Intent::Aggressive => Some(Self::AggressiveMessage),
            _ => Some(Self::StopRequest),
        }
    }
}

/// A block-list record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEntry {
    pub blocked_at: DateTime<Utc>,
    pub reason: BlockReason,
}

/// Result of trying to open a new turn for a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStart {
    /// The conversation already ended or the contact is blocked.
    Closed,
    /// Turn reserved. `first` is true for the contact's first-ever turn.
    Open { first: bool },
}

#[derive(Default)]
struct Inner {
    conversations: HashMap<String, ConversationState>,
    blocked: HashMap<String, BlockEntry>,
}

/// Durable conversation history and block list.
pub struct ConversationStore {
    inner: Mutex<Inner>,
    store: Arc<dyn DocumentStore>,
    history_cap: usize,
}

impl ConversationStore {
    /// Load both documents. Unreadable documents start empty.
    pub async fn load(store: Arc<dyn DocumentStore>, history_cap: usize) -> Self {
        let conversations: HashMap<String, ConversationState> =
            load_or_empty(store.as_ref(), HISTORY_DOC).await;
        let blocked: HashMap<String, BlockEntry> =
            load_or_empty(store.as_ref(), BLOCKLIST_DOC).await;

        info!(
            conversations = conversations.len(),
            blocked = blocked.len(),
            "Conversation store loaded"
        );

        Self {
            inner: Mutex::new(Inner {
                conversations,
                blocked,
            }),
            store,
            history_cap,
        }
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    /// Reserve the next turn for a contact.
    ///
    /// The check and the message-count increment happen under one lock, so
    /// two concurrent messages from a new contact cannot both be "first".
    pub async fn begin_turn(&self, contact_id: &str) -> TurnStart {
        let mut inner = self.inner.lock().await;
        if inner.blocked.contains_key(contact_id) {
            return TurnStart::Closed;
        }

        let state = inner
            .conversations
            .entry(contact_id.to_string())
            .or_default();
        if state.stage().is_terminal() {
            return TurnStart::Closed;
        }

        let first = state.message_count == 0;
        state.message_count += 1;
        state.introduced = true;
        TurnStart::Open { first }
    }

    /// End a conversation and block the contact.
    pub async fn end_and_block(&self, contact_id: &str, reason: BlockReason) {
        let mut inner = self.inner.lock().await;
        inner
            .conversations
            .entry(contact_id.to_string())
            .or_default()
            .end();
        inner
            .blocked
            .entry(contact_id.to_string())
            .or_insert_with(|| BlockEntry {
                blocked_at: Utc::now(),
                reason,
            });
        info!(contact = %contact_id, reason = ?reason, "Contact blocked");

        self.persist_locked(&inner, HISTORY_DOC).await;
        self.persist_locked(&inner, BLOCKLIST_DOC).await;
    }

    /// Append a completed turn and fold the inbound text into the state.
    pub async fn record_turn(&self, contact_id: &str, turn: ConversationTurn, intent: Intent) {
        let mut inner = self.inner.lock().await;
        let state = inner
            .conversations
            .entry(contact_id.to_string())
            .or_default();
        state.absorb_inbound(&turn.inbound, intent);
        state.push_turn(turn, self.history_cap);
        debug!(
            contact = %contact_id,
            turns = state.turns.len(),
            stage = %state.stage(),
            "Turn recorded"
        );

        self.persist_locked(&inner, HISTORY_DOC).await;
    }

    pub async fn get(&self, contact_id: &str) -> Option<ConversationState> {
        self.inner.lock().await.conversations.get(contact_id).cloned()
    }

    pub async fn is_blocked(&self, contact_id: &str) -> bool {
        self.inner.lock().await.blocked.contains_key(contact_id)
    }

    pub async fn block_entry(&self, contact_id: &str) -> Option<BlockEntry> {
        self.inner.lock().await.blocked.get(contact_id).cloned()
    }

    pub async fn blocked_count(&self) -> usize {
        self.inner.lock().await.blocked.len()
    }

    /// Write both documents, returning the first failure.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let inner = self.inner.lock().await;
        self.store
            .save(HISTORY_DOC, &serde_json::to_value(&inner.conversations)?)
            .await?;
        self.store
            .save(BLOCKLIST_DOC, &serde_json::to_value(&inner.blocked)?)
            .await?;
        Ok(())
    }

    async fn persist_locked(&self, inner: &Inner, name: &str) {
        let result = match name {
            BLOCKLIST_DOC => serde_json::to_value(&inner.blocked),
            _ => serde_json::to_value(&inner.conversations),
        };
        let outcome = match result {
            Ok(document) => self.store.save(name, &document).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = outcome {
            warn!(document = %name, error = %e, "Failed to persist conversation data");
        }
    }
}

async fn load_or_empty<T>(store: &dyn DocumentStore, name: &str) -> HashMap<String, T>
where
    T: serde::de::DeserializeOwned,
{
    match store.load(name).await {
        Ok(Some(document)) => serde_json::from_value(document).unwrap_or_else(|e| {
            warn!(document = %name, error = %e, "Discarding unreadable document");
            HashMap::new()
        }),
        Ok(None) => HashMap::new(),
        Err(e) => {
            warn!(document = %name, error = %e, "Failed to load document");
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_first_turn_only_once() {
        let store = ConversationStore::load(Arc::new(MemoryStore::new()), 20).await;
        assert_eq!(
            store.begin_turn("+31612345678").await,
            TurnStart::Open { first: true }
        );
        assert_eq!(
            store.begin_turn("+31612345678").await,
            TurnStart::Open { first: false }
        );
        assert_eq!(store.get("+31612345678").await.unwrap().message_count, 2);
    }

    #[tokio::test]
    async fn test_blocked_contact_is_closed() {
        let store = ConversationStore::load(Arc::new(MemoryStore::new()), 20).await;
        store
            .end_and_block("+31612345678", BlockReason::StopRequest)
            .await;

        assert!(store.is_blocked("+31612345678").await);
        assert_eq!(store.begin_turn("+31612345678").await, TurnStart::Closed);
        assert!(store.get("+31612345678").await.unwrap().ended);
        assert_eq!(
            store.block_entry("+31612345678").await.unwrap().reason,
            BlockReason::StopRequest
        );
    }

    #[tokio::test]
    async fn test_ended_without_block_is_closed() {
        let backing = Arc::new(MemoryStore::new());
        let mut state = ConversationState::default();
        state.end();
        let history = HashMap::from([("+31612345678".to_string(), state)]);
        backing
            .save(HISTORY_DOC, &serde_json::to_value(&history).unwrap())
            .await
            .unwrap();

        let store = ConversationStore::load(backing, 20).await;
        assert!(!store.is_blocked("+31612345678").await);
        assert_eq!(store.begin_turn("+31612345678").await, TurnStart::Closed);
    }

    #[test]
    fn test_block_reason_for_intent() {
        assert_eq!(
            BlockReason::for_intent(Intent::Aggressive),
            Some(BlockReason::AggressiveMessage)
        );
        assert_eq!(
            BlockReason::for_intent(Intent::StopConversation),
            Some(BlockReason::StopRequest)
        );
        assert_eq!(BlockReason::for_intent(Intent::Rejection), None);
        assert_eq!(BlockReason::for_intent(Intent::General), None);
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let backing = Arc::new(MemoryStore::new());
        {
            let store = ConversationStore::load(backing.clone(), 20).await;
            store.begin_turn("+31611111111").await;
            store
                .record_turn(
                    "+31611111111",
                    ConversationTurn::new("ik ben schilder", "Leuk!"),
                    Intent::Profession,
                )
                .await;
            store
                .end_and_block("+31622222222", BlockReason::AggressiveMessage)
                .await;
        }

        let reloaded = ConversationStore::load(backing, 20).await;
        let state = reloaded.get("+31611111111").await.unwrap();
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.attributes.profession.as_deref(), Some("schilder"));
        assert!(reloaded.is_blocked("+31622222222").await);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_memory_state() {
        let backing = Arc::new(MemoryStore::new());
        let store = ConversationStore::load(backing.clone(), 20).await;
        backing.set_fail_writes(true);

        store
            .record_turn(
                "+31633333333",
                ConversationTurn::new("hallo", "Hoi!"),
                Intent::Greeting,
            )
            .await;
        assert_eq!(store.get("+31633333333").await.unwrap().turns.len(), 1);
        assert!(store.flush().await.is_err());

        backing.set_fail_writes(false);
        assert!(store.flush().await.is_ok());
    }
}
