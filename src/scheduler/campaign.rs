//! Campaign scheduler: claims contacts and hands them to accounts in batches.
//!
//! `schedule_batch` handles the first `batch_size` contacts immediately and
//! parks the rest in a bounded backlog. A single drain task releases one
//! batch from the backlog per pacing interval (`compute_delay × batch_size`),
//! so large contact lists are drip-fed rather than enqueued all at once.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::pacing::{DistributionPattern, compute_delay};
use crate::accounts::{AccountPool, OutboundMessage};
use crate::config::CampaignConfig;
use crate::contact::Contact;
use crate::error::CampaignError;
use crate::ledger::Ledger;
use crate::templates::MessageTemplates;

/// Scheduling knobs taken from [`CampaignConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub pattern: DistributionPattern,
    pub base_delay: Duration,
    pub batch_size: usize,
    pub backlog_capacity: usize,
}

impl From<&CampaignConfig> for SchedulerSettings {
    fn from(config: &CampaignConfig) -> Self {
        Self {
            pattern: config.pattern,
            base_delay: config.base_delay(),
            batch_size: config.batch_size.max(1),
            backlog_capacity: config.backlog_capacity,
        }
    }
}

/// Counters kept by the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub total_queued: u64,
    pub by_category: BTreeMap<String, u64>,
    pub by_account: BTreeMap<String, u64>,
    pub started_at: DateTime<Utc>,
    pub last_scheduled_at: Option<DateTime<Utc>>,
    pub backlog: usize,
}

impl SchedulerStats {
    fn new() -> Self {
        Self {
            total_queued: 0,
            by_category: BTreeMap::new(),
            by_account: BTreeMap::new(),
            started_at: Utc::now(),
            last_scheduled_at: None,
            backlog: 0,
        }
    }

    /// Average queued messages per hour since start.
    pub fn messages_per_hour(&self) -> f64 {
        let elapsed = (Utc::now() - self.started_at).num_milliseconds().max(1) as f64;
        self.total_queued as f64 / (elapsed / 3_600_000.0)
    }
}

pub struct CampaignScheduler {
    ledger: Arc<Ledger>,
    pool: Arc<AccountPool>,
    templates: Arc<MessageTemplates>,
    settings: SchedulerSettings,
    backlog: Mutex<VecDeque<Contact>>,
    backlog_ready: Notify,
    stats: Mutex<SchedulerStats>,
}

impl CampaignScheduler {
    pub fn new(
        ledger: Arc<Ledger>,
        pool: Arc<AccountPool>,
        templates: Arc<MessageTemplates>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            ledger,
            pool,
            templates,
            settings,
            backlog: Mutex::new(VecDeque::new()),
            backlog_ready: Notify::new(),
            stats: Mutex::new(SchedulerStats::new()),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Schedule a list of contacts. Returns how many were handed to an account
    /// in this pass; the remainder waits in the backlog.
    pub async fn schedule_batch(&self, contacts: &[Contact]) -> usize {
        let split = contacts.len().min(self.settings.batch_size);
        let (now, later) = contacts.split_at(split);

        let scheduled = self.dispatch_all(now).await;

        if !later.is_empty() {
            match self.push_backlog(later).await {
                Ok(()) => debug!(deferred = later.len(), "Contacts deferred to backlog"),
                Err(e) => warn!(error = %e, "Backlog overflow, contacts dropped"),
            }
        }

        info!(
            requested = contacts.len(),
            scheduled,
            deferred = later.len(),
            "Batch scheduled"
        );
        scheduled
    }

    /// Re-dispatch contacts left pending by an earlier run. Does not claim.
    ///
    /// Intended for startup, before any new batch is scheduled.
    pub async fn resume_pending(&self) -> usize {
        let pending = self.ledger.list_pending().await;
        if pending.is_empty() {
            return 0;
        }

        info!(count = pending.len(), "Resuming pending contacts");
        let mut resumed = 0;
        for contact in &pending {
            match self.enqueue(contact).await {
                Ok(()) => resumed += 1,
                Err(e) => {
                    warn!(contact = %contact.id(), error = %e, "Pending contact left for a later run");
                }
            }
        }
        resumed
    }

    /// Drain the backlog one batch per pacing interval until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut rng = StdRng::from_entropy();
        info!(
            pattern = %self.settings.pattern,
            batch_size = self.settings.batch_size,
            "Campaign scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.backlog_len().await == 0 {
                tokio::select! {
                    _ = self.backlog_ready.notified() => continue,
                    _ = shutdown.changed() => break,
                }
            }

            let delay = self.batch_interval(&mut rng);
            debug!(delay_ms = delay.as_millis() as u64, "Next batch scheduled");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }

            let batch = self.pop_backlog(self.settings.batch_size).await;
            let scheduled = self.dispatch_all(&batch).await;
            let remaining = self.backlog_len().await;
            info!(
                released = batch.len(),
                scheduled,
                remaining,
                "Backlog batch released"
            );
        }

        info!("Campaign scheduler stopped");
    }

    /// Spawn [`run`](Self::run) on its own task.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Delay before releasing the next backlog batch.
    pub fn batch_interval(&self, rng: &mut StdRng) -> Duration {
        let per_message = compute_delay(self.settings.pattern, self.settings.base_delay, rng);
        per_message.saturating_mul(self.settings.batch_size as u32)
    }

    pub async fn backlog_len(&self) -> usize {
        self.backlog.lock().await.len()
    }

    pub async fn stats(&self) -> SchedulerStats {
        let mut stats = self.stats.lock().await.clone();
        stats.backlog = self.backlog_len().await;
        stats
    }

    /// Claim a pass of contacts in one ledger write, then queue the winners.
    ///
    /// Contacts someone else already claimed are skipped. When no account is
    /// ready the claim stays pending for [`resume_pending`](Self::resume_pending).
    async fn dispatch_all(&self, contacts: &[Contact]) -> usize {
        let claimed = self.ledger.claim_many(contacts).await;
        let mut scheduled = 0;
        for (contact, won) in contacts.iter().zip(claimed) {
            if !won {
                continue;
            }
            match self.enqueue(contact).await {
                Ok(()) => scheduled += 1,
                Err(e) => {
                    warn!(contact = %contact.id(), error = %e, "Claimed contact left pending");
                }
            }
        }
        scheduled
    }

    async fn enqueue(&self, contact: &Contact) -> Result<(), CampaignError> {
        let account = self
            .pool
            .select()
            .await
            .ok_or(CampaignError::NoReadyAccount)?;

        let text = self.templates.outreach_for(&contact.category).to_string();
        account
            .enqueue(OutboundMessage::new(contact.clone(), text))
            .await;

        let mut stats = self.stats.lock().await;
        stats.total_queued += 1;
        *stats
            .by_category
            .entry(contact.category_key())
            .or_default() += 1;
        *stats
            .by_account
            .entry(account.id().to_string())
            .or_default() += 1;
        stats.last_scheduled_at = Some(Utc::now());
        Ok(())
    }

    async fn push_backlog(&self, contacts: &[Contact]) -> Result<(), CampaignError> {
        let mut backlog = self.backlog.lock().await;
        let room = self.settings.backlog_capacity.saturating_sub(backlog.len());
        let accepted = contacts.len().min(room);
        backlog.extend(contacts[..accepted].iter().cloned());
        drop(backlog);

        if accepted > 0 {
            self.backlog_ready.notify_one();
        }
        if accepted < contacts.len() {
            return Err(CampaignError::BacklogFull {
                capacity: self.settings.backlog_capacity,
            });
        }
        Ok(())
    }

    async fn pop_backlog(&self, count: usize) -> Vec<Contact> {
        let mut backlog = self.backlog.lock().await;
        let take = count.min(backlog.len());
        backlog.drain(..take).collect()
    }
}
