//! Outbound worker: drains one account's queue at the configured pace.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::account::{Account, SendOutcome};
use crate::ledger::Ledger;
use crate::scheduler::{DistributionPattern, compute_delay};

/// Per-account pacing between sends.
#[derive(Debug, Clone, Copy)]
pub struct SendPacing {
    pub pattern: DistributionPattern,
    pub base: Duration,
}

/// Spawn the outbound loop for one account.
///
/// The loop sends one message, sleeps for a pattern-shaped delay, and
/// repeats. It parks on the account's notifier while the queue is empty and
/// exits when `shutdown` flips to `true`.
pub fn spawn_outbound_worker(
    account: Arc<Account>,
    ledger: Arc<Ledger>,
    pacing: SendPacing,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(account = %account.id(), pattern = %pacing.pattern, "Outbound worker started");
        let mut rng = StdRng::from_entropy();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = if account.is_ready() {
                account.process_next(&ledger).await
            } else {
                None
            };

            match outcome {
                Some(SendOutcome::Sent) | Some(SendOutcome::Failed) => {
                    let delay = compute_delay(pacing.pattern, pacing.base, &mut rng);
                    debug!(account = %account.id(), delay_ms = delay.as_millis() as u64, "Pacing next send");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Some(SendOutcome::Skipped) => continue,
                None => {
                    // Empty queue or account not ready: wait for new work, or
                    // re-check readiness periodically.
                    tokio::select! {
                        _ = account.wait_for_work() => {}
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        info!(account = %account.id(), "Outbound worker stopped");
    })
}
