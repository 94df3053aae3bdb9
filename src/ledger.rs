//! Dedup ledger: at most one engagement per contact.
//!
//! Every contact moves through `pending → processed` exactly once. The
//! check-and-insert in [`Ledger::claim`] runs under one async mutex that is
//! held until the new state is flushed, so concurrent schedulers cannot both
//! claim the same contact and a restart sees exactly what callers observed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::contact::Contact;
use crate::error::StoreError;
use crate::store::{AUDIT_LOG, DocumentStore, LEDGER_DOC};

/// Header line of the send audit log.
pub const AUDIT_HEADER: &str = "TIMESTAMP,PHONE_NUMBER,CATEGORY,ACCOUNT,STATUS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    Processed,
}

/// One contact's ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub status: LedgerStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub category: String,
    /// Send outcome; only set once processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl LedgerEntry {
    fn pending(category: &str) -> Self {
        Self {
            status: LedgerStatus::Pending,
            timestamp: Utc::now(),
            account_id: None,
            category: category.to_string(),
            success: None,
        }
    }
}

/// Aggregate counts over the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub processed: usize,
    pub pending: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_account: BTreeMap<String, usize>,
}

/// Durable per-contact status record.
pub struct Ledger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
    store: Arc<dyn DocumentStore>,
    audit_log: bool,
}

impl Ledger {
    /// Rebuild the ledger from its persisted document.
    ///
    /// A missing document starts an empty ledger. An unreadable one also does,
    /// with a warning, rather than refusing to start.
    pub async fn load(store: Arc<dyn DocumentStore>, audit_log: bool) -> Self {
        let entries: HashMap<String, LedgerEntry> = match store.load(LEDGER_DOC).await {
            Ok(Some(document)) => serde_json::from_value(document).unwrap_or_else(|e| {
                warn!(error = %e, "Ledger document unreadable, starting empty");
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load ledger, starting empty");
                HashMap::new()
            }
        };

        let pending = entries
            .values()
            .filter(|e| e.status == LedgerStatus::Pending)
            .count();
        info!(
            processed = entries.len() - pending,
            pending, "Ledger loaded"
        );

        if audit_log {
            if let Err(e) = Self::ensure_audit_header(store.as_ref()).await {
                warn!(error = %e, "Failed to initialise audit log");
            }
        }

        Self {
            entries: Mutex::new(entries),
            store,
            audit_log,
        }
    }

    async fn ensure_audit_header(store: &dyn DocumentStore) -> Result<(), StoreError> {
        if store.exists(AUDIT_LOG).await? {
            return Ok(());
        }
        store.append_line(AUDIT_LOG, AUDIT_HEADER).await
    }

    /// Reserve a contact. Returns `false` if it is already pending or processed.
    pub async fn claim(&self, contact_id: &str, category: &str) -> bool {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(contact_id) {
            debug!(contact = %contact_id, "Claim conflict, contact already tracked");
            return false;
        }

        entries.insert(contact_id.to_string(), LedgerEntry::pending(category));
        debug!(contact = %contact_id, category = %category, "Contact claimed");
        self.persist_locked(&entries).await;
        true
    }

    /// Claim several contacts under one lock and one write.
    ///
    /// The result lines up with `contacts`. A contact repeated in the input
    /// only wins its first slot.
    pub async fn claim_many(&self, contacts: &[Contact]) -> Vec<bool> {
        let mut entries = self.entries.lock().await;
        let claimed: Vec<bool> = contacts
            .iter()
            .map(|contact| {
                if entries.contains_key(contact.id()) {
                    debug!(contact = %contact.id(), "Claim conflict, contact already tracked");
                    return false;
                }
                entries.insert(contact.id().to_string(), LedgerEntry::pending(&contact.category));
                true
            })
            .collect();

        let won = claimed.iter().filter(|c| **c).count();
        if won > 0 {
            debug!(claimed = won, requested = contacts.len(), "Contacts claimed");
            self.persist_locked(&entries).await;
        }
        claimed
    }

    /// Record the send outcome. A second commit for the same contact is a no-op.
    pub async fn commit(&self, contact_id: &str, account_id: &str, category: &str, success: bool) {
        let mut entries = self.entries.lock().await;

        if entries
            .get(contact_id)
            .is_some_and(|existing| existing.status == LedgerStatus::Processed)
        {
            debug!(contact = %contact_id, "Commit ignored, already processed");
            return;
        }

        let timestamp = Utc::now();
        entries.insert(
            contact_id.to_string(),
            LedgerEntry {
                status: LedgerStatus::Processed,
                timestamp,
                account_id: Some(account_id.to_string()),
                category: category.to_string(),
                success: Some(success),
            },
        );
        info!(
            contact = %contact_id,
            account = %account_id,
            success,
            "Contact processed"
        );
        self.persist_locked(&entries).await;

        if self.audit_log {
            let status = if success { "SENT" } else { "FAILED" };
            let line = format!(
                "{},{},{},{},{}",
                timestamp.to_rfc3339(),
                contact_id,
                category,
                account_id,
                status
            );
            if let Err(e) = self.store.append_line(AUDIT_LOG, &line).await {
                warn!(contact = %contact_id, error = %e, "Failed to append audit log");
            }
        }
    }

    pub async fn is_pending(&self, contact_id: &str) -> bool {
        self.status(contact_id).await == Some(LedgerStatus::Pending)
    }

    pub async fn is_processed(&self, contact_id: &str) -> bool {
        self.status(contact_id).await == Some(LedgerStatus::Processed)
    }

    pub async fn status(&self, contact_id: &str) -> Option<LedgerStatus> {
        self.entries.lock().await.get(contact_id).map(|e| e.status)
    }

    pub async fn entry(&self, contact_id: &str) -> Option<LedgerEntry> {
        self.entries.lock().await.get(contact_id).cloned()
    }

    /// Contacts claimed but never committed, oldest claim first.
    pub async fn list_pending(&self) -> Vec<Contact> {
        let entries = self.entries.lock().await;
        let mut pending: Vec<(&String, &LedgerEntry)> = entries
            .iter()
            .filter(|(_, e)| e.status == LedgerStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then(a.0.cmp(b.0)));
        pending
            .into_iter()
            .map(|(id, entry)| Contact::new(id.clone(), entry.category.clone()))
            .collect()
    }

    /// Copy of every entry.
    pub async fn snapshot(&self) -> HashMap<String, LedgerEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn stats(&self) -> LedgerStats {
        let entries = self.entries.lock().await;
        let mut stats = LedgerStats::default();

        for entry in entries.values() {
            match entry.status {
                LedgerStatus::Pending => stats.pending += 1,
                LedgerStatus::Processed => {
                    stats.processed += 1;
                    if entry.success == Some(true) {
                        stats.succeeded += 1;
                    } else {
                        stats.failed += 1;
                    }
                    *stats.by_category.entry(entry.category.clone()).or_default() += 1;
                    let account = entry.account_id.clone().unwrap_or_else(|| "unknown".into());
                    *stats.by_account.entry(account).or_default() += 1;
                }
            }
        }
        stats
    }

    /// Write the current state, surfacing any error.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let entries = self.entries.lock().await;
        let document = serde_json::to_value(&*entries)?;
        self.store.save(LEDGER_DOC, &document).await
    }

    async fn persist_locked(&self, entries: &HashMap<String, LedgerEntry>) {
        let outcome = match serde_json::to_value(entries) {
            Ok(document) => self.store.save(LEDGER_DOC, &document).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = outcome {
            warn!(error = %e, "Failed to persist ledger, keeping in-memory state");
        }
    }
}
