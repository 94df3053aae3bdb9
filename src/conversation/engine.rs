//! ConversationEngine: turns one inbound message into at most one reply.
//!
//! Order of decisions per message:
//! 1. too short or closed conversation: no reply
//! 2. stop/aggressive intent: end, block, de-escalate
//! 3. first-ever turn: opening message
//! 4. canned intent: template
//! 5. anything else: generated reply, fallback text on failure
//!
//! Every reply is paced like a human typing it, then recorded.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::intent::{Intent, classify};
use super::prompt::{build_system_prompt, build_transcript, conversation_summary};
use super::state::{ConversationTurn, TurnMetadata};
use crate::config::ResponderConfig;
use crate::error::LlmError;
use crate::llm::LlmProvider;
use crate::scheduler::typing_delay;
use crate::store::{BlockReason, ConversationStore, TurnStart};
use crate::templates::{BusinessFacts, FALLBACK_REPLY, MessageTemplates};

/// Shortest inbound text (in characters) that gets processed.
const MIN_MESSAGE_CHARS: usize = 2;

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplySource {
    Opening,
    Canned,
    Generated,
    Fallback,
}

pub struct ConversationEngine {
    store: Arc<ConversationStore>,
    llm: Arc<dyn LlmProvider>,
    templates: Arc<MessageTemplates>,
    facts: Arc<BusinessFacts>,
    config: ResponderConfig,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<ConversationStore>,
        llm: Arc<dyn LlmProvider>,
        templates: Arc<MessageTemplates>,
        facts: Arc<BusinessFacts>,
        config: ResponderConfig,
    ) -> Self {
        Self {
            store,
            llm,
            templates,
            facts,
            config,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// Process one inbound message and return the reply to send, if any.
    ///
    /// Never fails: generator errors become the fallback reply.
    pub async fn process_incoming_message(&self, contact_id: &str, text: &str) -> Option<String> {
        let text = text.trim();
        if text.chars().count() < MIN_MESSAGE_CHARS {
            debug!(contact = %contact_id, "Ignoring message below minimum length");
            return None;
        }

        let first = match self.store.begin_turn(contact_id).await {
            TurnStart::Closed => {
                debug!(contact = %contact_id, "Conversation closed, not replying");
                return None;
            }
            TurnStart::Open { first } => first,
        };

        let intent = classify(text);
        debug!(contact = %contact_id, intent = %intent, first, "Classified inbound message");

        if let Some(reason) = BlockReason::for_intent(intent) {
            return Some(self.end_conversation(contact_id, text, intent, reason).await);
        }

        let (reply, source) = self.choose_reply(contact_id, text, intent, first).await;
        info!(
            contact = %contact_id,
            intent = %intent,
            source = ?source,
            "Reply prepared"
        );

        self.pace(&reply).await;

        let metadata = TurnMetadata {
            intent: Some(intent),
            error: source == ReplySource::Fallback,
            final_turn: false,
        };
        self.store
            .record_turn(
                contact_id,
                ConversationTurn::new(text, reply.clone()).with_metadata(metadata),
                intent,
            )
            .await;

        Some(reply)
    }

    async fn end_conversation(
        &self,
        contact_id: &str,
        text: &str,
        intent: Intent,
        reason: BlockReason,
    ) -> String {
        self.store.end_and_block(contact_id, reason).await;

        let reply = self
            .templates
            .canned_reply(intent, None, &self.facts, &mut rand::thread_rng())
            .unwrap_or_else(|| FALLBACK_REPLY.to_string());

        self.pace(&reply).await;

        let metadata = TurnMetadata {
            intent: Some(intent),
            error: false,
            final_turn: true,
        };
        self.store
            .record_turn(
                contact_id,
                ConversationTurn::new(text, reply.clone()).with_metadata(metadata),
                intent,
            )
            .await;
        reply
    }

    async fn choose_reply(
        &self,
        contact_id: &str,
        text: &str,
        intent: Intent,
        first: bool,
    ) -> (String, ReplySource) {
        if first {
            let opening = self
                .templates
                .random_opening(&mut rand::thread_rng())
                .map(str::to_string);
            if let Some(opening) = opening {
                return (opening, ReplySource::Opening);
            }
        }

        if self.config.canned_intents.contains(&intent) {
            let profession = self
                .store
                .get(contact_id)
                .await
                .and_then(|s| s.attributes.profession);
            let canned = self.templates.canned_reply(
                intent,
                profession.as_deref(),
                &self.facts,
                &mut rand::thread_rng(),
            );
            if let Some(reply) = canned {
                return (reply, ReplySource::Canned);
            }
        }

        match self.generate(contact_id, text).await {
            Some(reply) => (reply, ReplySource::Generated),
            None => (FALLBACK_REPLY.to_string(), ReplySource::Fallback),
        }
    }

    async fn generate(&self, contact_id: &str, text: &str) -> Option<String> {
        let state = self.store.get(contact_id).await;
        let summary = conversation_summary(state.as_ref(), &self.config.persona_name);
        let system_prompt = build_system_prompt(&self.config, &self.facts, &summary);
        let turns = state.as_ref().map(|s| s.turns.iter()).into_iter().flatten();
        let messages = build_transcript(&system_prompt, turns, text);

        let result = match tokio::time::timeout(self.config.generate_timeout, self.llm.generate(&messages)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                provider: self.llm.model_name().to_string(),
                elapsed: self.config.generate_timeout,
            }),
        };

        match result {
            Ok(reply) if !reply.trim().is_empty() => Some(reply.trim().to_string()),
            Ok(_) => {
                warn!(contact = %contact_id, model = %self.llm.model_name(), "Empty generated reply, using fallback");
                None
            }
            Err(e) => {
                warn!(contact = %contact_id, error = %e, "Generation failed, using fallback");
                None
            }
        }
    }

    async fn pace(&self, reply: &str) {
        if !self.config.pacing.enabled {
            return;
        }
        let delay = typing_delay(reply, &self.config.pacing, &mut rand::thread_rng());
        debug!(delay_ms = delay.as_millis() as u64, "Pacing reply");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplyPacing;
    use crate::llm::{ChatMessage, Role};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies with a fixed text, or fails, and records what it was sent.
    struct StubLlm {
        reply: Result<String, ()>,
        delay: Duration,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl StubLlm {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok("te laat".to_string()),
                delay,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(messages.to_vec());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(|_| LlmError::RequestFailed {
                provider: "stub".to_string(),
                reason: "boom".to_string(),
            })
        }
    }

    async fn engine_with(llm: Arc<StubLlm>) -> ConversationEngine {
        let config = ResponderConfig {
            pacing: ReplyPacing::disabled(),
            ..ResponderConfig::default()
        };
        let store = ConversationStore::load(Arc::new(MemoryStore::new()), config.history_cap).await;
        ConversationEngine::new(
            Arc::new(store),
            llm,
            Arc::new(MessageTemplates::default()),
            Arc::new(BusinessFacts::default()),
            config,
        )
    }

    const CONTACT: &str = "+31612345678";

    #[tokio::test]
    async fn test_short_message_ignored() {
        let engine = engine_with(StubLlm::ok("hoi")).await;
        assert_eq!(engine.process_incoming_message(CONTACT, "k").await, None);
        assert_eq!(engine.process_incoming_message(CONTACT, "  ").await, None);
        assert!(engine.store().get(CONTACT).await.is_none());
    }

    #[tokio::test]
    async fn test_first_turn_gets_opening() {
        let llm = StubLlm::ok("gegenereerd");
        let engine = engine_with(llm.clone()).await;

        let reply = engine
            .process_incoming_message(CONTACT, "Wat kost het?")
            .await
            .unwrap();
        let templates = MessageTemplates::default();
        assert!(templates.opening_messages().contains(&reply));
        assert_eq!(llm.call_count(), 0);

        let state = engine.store().get(CONTACT).await.unwrap();
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.turns[0].inbound, "Wat kost het?");
        assert_eq!(state.turns[0].metadata.intent, Some(Intent::Costs));
    }

    #[tokio::test]
    async fn test_canned_intent_uses_template() {
        let llm = StubLlm::ok("gegenereerd");
        let engine = engine_with(llm.clone()).await;
        engine.process_incoming_message(CONTACT, "Hallo").await;

        let reply = engine
            .process_incoming_message(CONTACT, "Wat kost het per maand?")
            .await
            .unwrap();
        assert!(
            MessageTemplates::default()
                .canned_replies(Intent::Costs)
                .contains(&reply)
        );
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_general_message_is_generated_with_transcript() {
        let llm = StubLlm::ok("  Prima, ik stuur je de link.  ");
        let engine = engine_with(llm.clone()).await;
        engine.process_incoming_message(CONTACT, "Hallo").await;

        let reply = engine
            .process_incoming_message(CONTACT, "ik twijfel nog een beetje eigenlijk")
            .await;
        assert_eq!(reply.as_deref(), Some("Prima, ik stuur je de link."));

        let calls = llm.calls.lock().unwrap();
        let messages = &calls[0];
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("Klant: Hallo"));
        assert_eq!(messages[1].content, "Hallo");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages.last().unwrap().content, "ik twijfel nog een beetje eigenlijk");
    }

    #[tokio::test]
    async fn test_generation_error_uses_fallback() {
        let engine = engine_with(StubLlm::failing()).await;
        engine.process_incoming_message(CONTACT, "Hallo").await;

        let reply = engine
            .process_incoming_message(CONTACT, "ik twijfel nog een beetje eigenlijk")
            .await;
        assert_eq!(reply.as_deref(), Some(FALLBACK_REPLY));

        let state = engine.store().get(CONTACT).await.unwrap();
        assert!(!state.ended);
        assert!(state.turns.back().unwrap().metadata.error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_uses_fallback() {
        let engine = engine_with(StubLlm::slow(Duration::from_secs(120))).await;
        engine.process_incoming_message(CONTACT, "Hallo").await;

        let reply = engine
            .process_incoming_message(CONTACT, "ik twijfel nog een beetje eigenlijk")
            .await;
        assert_eq!(reply.as_deref(), Some(FALLBACK_REPLY));
    }

    #[tokio::test]
    async fn test_stop_ends_and_blocks() {
        let engine = engine_with(StubLlm::ok("gegenereerd")).await;
        engine.process_incoming_message(CONTACT, "Hallo").await;

        let reply = engine
            .process_incoming_message(CONTACT, "stop, geen interesse meer")
            .await
            .unwrap();
        assert!(
            MessageTemplates::default()
                .canned_replies(Intent::StopConversation)
                .contains(&reply)
        );

        assert!(engine.store().is_blocked(CONTACT).await);
        let entry = engine.store().block_entry(CONTACT).await.unwrap();
        assert_eq!(entry.reason, BlockReason::StopRequest);

        let state = engine.store().get(CONTACT).await.unwrap();
        assert!(state.ended);
        assert!(state.turns.back().unwrap().metadata.final_turn);

        assert_eq!(engine.process_incoming_message(CONTACT, "Hallo?").await, None);
        assert_eq!(engine.process_incoming_message(CONTACT, "wat kost het").await, None);
    }

    #[tokio::test]
    async fn test_aggressive_on_first_turn_blocks() {
        let engine = engine_with(StubLlm::ok("gegenereerd")).await;

        let reply = engine
            .process_incoming_message(CONTACT, "rot op klootzak")
            .await
            .unwrap();
        assert!(
            MessageTemplates::default()
                .canned_replies(Intent::Aggressive)
                .contains(&reply)
        );
        let entry = engine.store().block_entry(CONTACT).await.unwrap();
        assert_eq!(entry.reason, BlockReason::AggressiveMessage);
    }

    #[tokio::test]
    async fn test_history_capped() {
        let engine = engine_with(StubLlm::ok("oké")).await;
        for i in 0..25 {
            engine
                .process_incoming_message(CONTACT, &format!("bericht nummer {i}"))
                .await;
        }
        let state = engine.store().get(CONTACT).await.unwrap();
        assert_eq!(state.turns.len(), 20);
        assert_eq!(state.message_count, 25);
        assert_eq!(state.turns.front().unwrap().inbound, "bericht nummer 5");
    }
}
