//! End-to-end tests: scheduler → account → ledger for outreach, and
//! transport → engine → reply for inbound conversations.
//!
//! Transports and the LLM are in-process stubs; nothing leaves the test.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use campaign_assist::accounts::{Account, AccountPool, SelectionPolicy, SendPacing, spawn_outbound_worker};
use campaign_assist::channels::{InboundMessage, InboundStream, Transport};
use campaign_assist::config::{AccountConfig, ReplyPacing, ResponderConfig};
use campaign_assist::contact::Contact;
use campaign_assist::conversation::{ConversationEngine, Intent};
use campaign_assist::error::{ChannelError, LlmError};
use campaign_assist::inbox::spawn_inbox;
use campaign_assist::ledger::{Ledger, LedgerStatus};
use campaign_assist::llm::{ChatMessage, LlmProvider};
use campaign_assist::scheduler::{CampaignScheduler, DistributionPattern, SchedulerSettings};
use campaign_assist::store::{ConversationStore, DocumentStore, FileStore, MemoryStore};
use campaign_assist::templates::{BusinessFacts, FALLBACK_REPLY, MessageTemplates};

/// Maximum time any test is allowed to wait for background tasks.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const PHONE: &str = "+31612345678";

/// Transport fed from a channel; records everything it sends.
struct StubTransport {
    name: String,
    ready: AtomicBool,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl StubTransport {
    fn new(name: &str) -> (Arc<Self>, mpsc::UnboundedSender<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            name: name.to_string(),
            ready: AtomicBool::new(true),
            inbound: Mutex::new(Some(rx)),
            sent: Mutex::new(Vec::new()),
        });
        (transport, tx)
    }

    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    async fn wait_for_sent(&self, count: usize) -> Vec<(String, String)> {
        timeout(TEST_TIMEOUT, async {
            loop {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for sends")
    }
}

#[async_trait]
impl Transport for StubTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<InboundStream, ChannelError> {
        let rx = self
            .inbound
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ChannelError::StartupFailed {
                name: self.name.clone(),
                reason: "already started".to_string(),
            })?;
        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        })))
    }

    async fn send(&self, contact_id: &str, text: &str) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((contact_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// LLM stub: fixed reply or a failure.
struct StubLlm {
    fail: bool,
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        if self.fail {
            Err(LlmError::RequestFailed {
                provider: "stub".to_string(),
                reason: "unavailable".to_string(),
            })
        } else {
            Ok("Dat snap ik, laat maar weten als je vragen hebt.".to_string())
        }
    }
}

struct Outreach {
    ledger: Arc<Ledger>,
    scheduler: Arc<CampaignScheduler>,
    account: Arc<Account>,
    transport: Arc<StubTransport>,
}

async fn outreach_with(store: Arc<dyn DocumentStore>) -> Outreach {
    let ledger = Arc::new(Ledger::load(store, true).await);
    let (transport, _inbound) = StubTransport::new("stub");
    let account = Arc::new(Account::new(
        &AccountConfig::new("account1", "Account 1"),
        transport.clone(),
    ));
    let pool = Arc::new(AccountPool::new(vec![account.clone()], SelectionPolicy::Random));
    let scheduler = Arc::new(CampaignScheduler::new(
        ledger.clone(),
        pool,
        Arc::new(MessageTemplates::default()),
        SchedulerSettings {
            pattern: DistributionPattern::Even,
            base_delay: Duration::from_millis(10),
            batch_size: 50,
            backlog_capacity: 1000,
        },
    ));
    Outreach {
        ledger,
        scheduler,
        account,
        transport,
    }
}

fn fast_pacing() -> SendPacing {
    SendPacing {
        pattern: DistributionPattern::Even,
        base: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn outreach_is_sent_once_and_committed() {
    let o = outreach_with(Arc::new(MemoryStore::new())).await;
    let contact = Contact::new(PHONE, "schilder");

    assert_eq!(o.scheduler.schedule_batch(std::slice::from_ref(&contact)).await, 1);
    assert_eq!(o.ledger.status(PHONE).await, Some(LedgerStatus::Pending));

    // Same contact again: already claimed.
    assert_eq!(o.scheduler.schedule_batch(&[contact.clone()]).await, 0);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = spawn_outbound_worker(o.account.clone(), o.ledger.clone(), fast_pacing(), shutdown_rx);

    let sent = o.transport.wait_for_sent(1).await;
    assert_eq!(sent[0].0, PHONE);
    assert_eq!(sent[0].1, MessageTemplates::default().outreach_for("schilder"));

    timeout(TEST_TIMEOUT, async {
        while !o.ledger.is_processed(PHONE).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("contact never committed");

    let entry = o.ledger.entry(PHONE).await.unwrap();
    assert_eq!(entry.success, Some(true));
    assert_eq!(entry.account_id.as_deref(), Some("account1"));
    assert_eq!(entry.category, "schilder");

    shutdown_tx.send(true).unwrap();
    timeout(TEST_TIMEOUT, worker).await.unwrap().unwrap();

    assert_eq!(o.transport.sent().len(), 1);
    assert_eq!(o.scheduler.schedule_batch(&[contact]).await, 0);
}

#[tokio::test]
async fn unready_account_leaves_claim_pending_for_resume() {
    let o = outreach_with(Arc::new(MemoryStore::new())).await;
    o.transport.ready.store(false, Ordering::SeqCst);

    let contact = Contact::new(PHONE, "dakdekker");
    assert_eq!(o.scheduler.schedule_batch(&[contact]).await, 0);
    assert!(o.ledger.is_pending(PHONE).await);
    assert_eq!(o.account.queue_len().await, 0);

    o.transport.ready.store(true, Ordering::SeqCst);
    assert_eq!(o.scheduler.resume_pending().await, 1);
    assert_eq!(o.account.queue_len().await, 1);
    // Resuming does not re-claim.
    assert!(o.ledger.is_pending(PHONE).await);
}

#[tokio::test]
async fn pending_claims_survive_restart() {
    let dir = TempDir::new().unwrap();

    {
        let o = outreach_with(Arc::new(FileStore::new(dir.path()))).await;
        o.scheduler
            .schedule_batch(&[Contact::new(PHONE, "schilder")])
            .await;
    }

    let ledger = Ledger::load(Arc::new(FileStore::new(dir.path())), true).await;
    let pending = ledger.list_pending().await;
    assert_eq!(pending, vec![Contact::new(PHONE, "schilder")]);
    assert!(!ledger.claim(PHONE, "schilder").await);
}

async fn inbound_engine(fail: bool) -> Arc<ConversationEngine> {
    let config = ResponderConfig {
        pacing: ReplyPacing::disabled(),
        ..ResponderConfig::default()
    };
    let store = ConversationStore::load(Arc::new(MemoryStore::new()), config.history_cap).await;
    Arc::new(ConversationEngine::new(
        Arc::new(store),
        Arc::new(StubLlm { fail }),
        Arc::new(MessageTemplates::default()),
        Arc::new(BusinessFacts::default()),
        config,
    ))
}

#[tokio::test]
async fn conversation_flow_until_stop() {
    let engine = inbound_engine(false).await;
    let (transport, inbound) = StubTransport::new("stub");
    let account = Arc::new(Account::new(
        &AccountConfig::new("account1", "Account 1"),
        transport.clone(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let inbox = spawn_inbox(account, engine.clone(), shutdown_rx);
    let templates = MessageTemplates::default();

    inbound
        .send(InboundMessage::new("31612345678@c.us", "Hallo, wie is dit?"))
        .unwrap();
    let sent = transport.wait_for_sent(1).await;
    assert!(templates.opening_messages().contains(&sent[0].1));

    inbound
        .send(InboundMessage::new("31612345678@c.us", "Wat kost het per maand?"))
        .unwrap();
    let sent = transport.wait_for_sent(2).await;
    assert!(templates.canned_replies(Intent::Costs).contains(&sent[1].1));

    inbound
        .send(InboundMessage::new("31612345678@c.us", "ik twijfel nog een beetje"))
        .unwrap();
    let sent = transport.wait_for_sent(3).await;
    assert_eq!(sent[2].1, "Dat snap ik, laat maar weten als je vragen hebt.");

    inbound
        .send(InboundMessage::new("31612345678@c.us", "stop met berichten sturen"))
        .unwrap();
    let sent = transport.wait_for_sent(4).await;
    assert!(
        templates
            .canned_replies(Intent::StopConversation)
            .contains(&sent[3].1)
    );
    assert!(engine.store().is_blocked(PHONE).await);

    inbound
        .send(InboundMessage::new("31612345678@c.us", "Hallo? Ben je er nog?"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.sent().len(), 4);

    let state = engine.store().get(PHONE).await.unwrap();
    assert!(state.ended);
    assert_eq!(state.turns.len(), 4);

    shutdown_tx.send(true).unwrap();
    timeout(TEST_TIMEOUT, inbox).await.unwrap().unwrap();
}

#[tokio::test]
async fn generator_failure_falls_back_without_ending() {
    let engine = inbound_engine(true).await;

    engine.process_incoming_message(PHONE, "Goedemorgen").await;
    let reply = engine
        .process_incoming_message(PHONE, "ik twijfel nog een beetje")
        .await;
    assert_eq!(reply.as_deref(), Some(FALLBACK_REPLY));

    let reply = engine.process_incoming_message(PHONE, "ik twijfel nog steeds").await;
    assert_eq!(reply.as_deref(), Some(FALLBACK_REPLY));
    assert!(!engine.store().is_blocked(PHONE).await);
}

#[tokio::test]
async fn history_is_bounded() {
    let engine = inbound_engine(false).await;
    for i in 0..30 {
        engine
            .process_incoming_message(PHONE, &format!("bericht {i}"))
            .await;
    }
    let state = engine.store().get(PHONE).await.unwrap();
    assert_eq!(state.turns.len(), 20);
    assert_eq!(state.message_count, 30);
}
