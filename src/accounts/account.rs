//! A single sending identity with its own FIFO outbound queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::channels::Transport;
use crate::config::AccountConfig;
use crate::contact::Contact;
use crate::error::ChannelError;
use crate::ledger::Ledger;

/// A claimed contact waiting to be sent.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub contact: Contact,
    pub text: String,
    pub enqueued_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(contact: Contact, text: impl Into<String>) -> Self {
        Self {
            contact,
            text: text.into(),
            enqueued_at: Utc::now(),
        }
    }
}

/// Result of draining one queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Failed,
    /// Already processed by someone else; nothing sent.
    Skipped,
}

/// Point-in-time view of an account.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStats {
    pub id: String,
    pub name: String,
    pub ready: bool,
    pub enabled: bool,
    pub queue_size: usize,
    pub sent: u64,
    pub failed: u64,
    pub busy: bool,
}

/// One sending identity. Sends through it are serialized.
pub struct Account {
    id: String,
    name: String,
    enabled: AtomicBool,
    transport: Arc<dyn Transport>,
    queue: Mutex<VecDeque<OutboundMessage>>,
    sent: AtomicU64,
    failed: AtomicU64,
    /// Held for the duration of every send on this account.
    send_gate: Mutex<()>,
    busy: AtomicBool,
    queued: Notify,
}

impl Account {
    pub fn new(config: &AccountConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            enabled: AtomicBool::new(config.enabled),
            transport,
            queue: Mutex::new(VecDeque::new()),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            send_gate: Mutex::new(()),
            busy: AtomicBool::new(false),
            queued: Notify::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Enabled and the transport can send.
    pub fn is_ready(&self) -> bool {
        self.is_enabled() && self.transport.is_ready()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Append to the back of the queue and wake the worker.
    pub async fn enqueue(&self, message: OutboundMessage) {
        debug!(
            account = %self.id,
            contact = %message.contact.phone_number,
            "Message queued"
        );
        self.queue.lock().await.push_back(message);
        self.queued.notify_one();
    }

    /// Wait until something is enqueued.
    pub async fn wait_for_work(&self) {
        self.queued.notified().await;
    }

    /// Send one message, holding the account's send gate.
    pub async fn send(&self, contact_id: &str, text: &str) -> Result<(), ChannelError> {
        let _gate = self.send_gate.lock().await;
        self.busy.store(true, Ordering::SeqCst);
        let result = self.transport.send(contact_id, text).await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    /// Best-effort typing indicator.
    pub async fn send_typing(&self, contact_id: &str) {
        if let Err(e) = self.transport.send_typing(contact_id).await {
            debug!(account = %self.id, contact = %contact_id, error = %e, "Typing indicator failed");
        }
    }

    /// Pop the next queued message, send it, and commit the outcome.
    ///
    /// Returns `None` when the queue is empty. A failed send is committed as
    /// `success = false` and never retried.
    pub async fn process_next(&self, ledger: &Ledger) -> Option<SendOutcome> {
        let message = self.queue.lock().await.pop_front()?;
        let contact = &message.contact;

        if ledger.is_processed(contact.id()).await {
            debug!(account = %self.id, contact = %contact.id(), "Skipping already processed contact");
            return Some(SendOutcome::Skipped);
        }

        let outcome = match self.send(contact.id(), &message.text).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::SeqCst);
                info!(account = %self.id, contact = %contact.id(), "Outreach sent");
                SendOutcome::Sent
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                warn!(account = %self.id, contact = %contact.id(), error = %e, "Outreach failed");
                SendOutcome::Failed
            }
        };

        ledger
            .commit(
                contact.id(),
                &self.id,
                &contact.category,
                outcome == SendOutcome::Sent,
            )
            .await;
        Some(outcome)
    }

    pub async fn stats(&self) -> AccountStats {
        AccountStats {
            id: self.id.clone(),
            name: self.name.clone(),
            ready: self.is_ready(),
            enabled: self.is_enabled(),
            queue_size: self.queue_len().await,
            sent: self.sent.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            busy: self.is_busy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::test_support::RecordingTransport;
    use crate::store::MemoryStore;

    fn make_account(transport: Arc<RecordingTransport>) -> Account {
        Account::new(&AccountConfig::new("account1", "Primary"), transport)
    }

    async fn make_ledger() -> Ledger {
        Ledger::load(Arc::new(MemoryStore::new()), false).await
    }

    #[tokio::test]
    async fn test_process_next_commits_success() {
        let transport = Arc::new(RecordingTransport::new("t1"));
        let account = make_account(transport.clone());
        let ledger = make_ledger().await;
        let contact = Contact::new("+31612345678", "schilder");

        assert!(ledger.claim(contact.id(), &contact.category).await);
        account
            .enqueue(OutboundMessage::new(contact.clone(), "Hoi!"))
            .await;

        assert_eq!(account.process_next(&ledger).await, Some(SendOutcome::Sent));
        assert_eq!(account.process_next(&ledger).await, None);

        let entry = ledger.entry(contact.id()).await.unwrap();
        assert_eq!(entry.success, Some(true));
        assert_eq!(transport.sent(), vec![("+31612345678".to_string(), "Hoi!".to_string())]);
        assert_eq!(account.stats().await.sent, 1);
    }

    #[tokio::test]
    async fn test_failed_send_is_committed_not_retried() {
        let transport = Arc::new(RecordingTransport::new("t1"));
        transport.set_fail_sends(true);
        let account = make_account(transport.clone());
        let ledger = make_ledger().await;
        let contact = Contact::new("+31612345678", "schilder");

        ledger.claim(contact.id(), &contact.category).await;
        account.enqueue(OutboundMessage::new(contact.clone(), "Hoi!")).await;

        assert_eq!(account.process_next(&ledger).await, Some(SendOutcome::Failed));
        assert_eq!(account.queue_len().await, 0);
        assert!(ledger.is_processed(contact.id()).await);
        assert_eq!(ledger.entry(contact.id()).await.unwrap().success, Some(false));

        let stats = account.stats().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.sent, 0);
        assert!(!stats.busy);
    }

    #[tokio::test]
    async fn test_queue_is_fifo_and_skips_processed() {
        let transport = Arc::new(RecordingTransport::new("t1"));
        let account = make_account(transport.clone());
        let ledger = make_ledger().await;

        let first = Contact::new("+31611111111", "schilder");
        let second = Contact::new("+31622222222", "schilder");
        let done = Contact::new("+31633333333", "schilder");
        ledger.commit(done.id(), "other", "schilder", true).await;

        account.enqueue(OutboundMessage::new(first.clone(), "1")).await;
        account.enqueue(OutboundMessage::new(done, "x")).await;
        account.enqueue(OutboundMessage::new(second.clone(), "2")).await;

        assert_eq!(account.process_next(&ledger).await, Some(SendOutcome::Sent));
        assert_eq!(account.process_next(&ledger).await, Some(SendOutcome::Skipped));
        assert_eq!(account.process_next(&ledger).await, Some(SendOutcome::Sent));

        let sent: Vec<String> = transport.sent().into_iter().map(|(to, _)| to).collect();
        assert_eq!(sent, vec![first.phone_number, second.phone_number]);
    }

    #[test]
    fn test_readiness_requires_enabled_and_transport() {
        let transport = Arc::new(RecordingTransport::new("t1"));
        let account = make_account(transport.clone());
        assert!(account.is_ready());

        transport.set_ready(false);
        assert!(!account.is_ready());

        transport.set_ready(true);
        account.set_enabled(false);
        assert!(!account.is_ready());
    }
}
