//! Account pool and the policy for picking an account per contact.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::account::{Account, AccountStats};

/// How a ready account is chosen for a claimed contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Uniformly random among ready accounts.
    Random,
    /// Ready account with the shortest queue; ties go to the first configured.
    LeastLoaded,
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => write!(f, "random"),
            Self::LeastLoaded => write!(f, "least_loaded"),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "random" => Ok(Self::Random),
            "least_loaded" | "shortest_queue" => Ok(Self::LeastLoaded),
            other => Err(format!("unknown selection policy '{other}'")),
        }
    }
}

/// All configured accounts.
pub struct AccountPool {
    accounts: Vec<Arc<Account>>,
    policy: SelectionPolicy,
}

impl AccountPool {
    pub fn new(accounts: Vec<Arc<Account>>, policy: SelectionPolicy) -> Self {
        Self { accounts, policy }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn accounts(&self) -> &[Arc<Account>] {
        &self.accounts
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Account>> {
        self.accounts.iter().find(|a| a.id() == id)
    }

    pub fn ready_accounts(&self) -> Vec<Arc<Account>> {
        self.accounts
            .iter()
            .filter(|a| a.is_ready())
            .cloned()
            .collect()
    }

    /// Pick a ready account, or `None` if none is ready.
    pub async fn select(&self) -> Option<Arc<Account>> {
        let ready = self.ready_accounts();
        match self.policy {
            SelectionPolicy::Random => {
                let mut rng = rand::thread_rng();
                ready.choose(&mut rng).cloned()
            }
            SelectionPolicy::LeastLoaded => {
                let mut best: Option<(usize, Arc<Account>)> = None;
                for account in ready {
                    let len = account.queue_len().await;
                    if best.as_ref().is_none_or(|(best_len, _)| len < *best_len) {
                        best = Some((len, account));
                    }
                }
                best.map(|(_, account)| account)
            }
        }
    }

    pub async fn stats(&self) -> Vec<AccountStats> {
        let mut stats = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            stats.push(account.stats().await);
        }
        stats
    }
}
