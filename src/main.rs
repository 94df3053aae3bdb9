use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::prelude::*;

use campaign_assist::accounts::{Account, AccountPool, SendPacing, spawn_outbound_worker};
use campaign_assist::channels::{CliCommand, CliTransport, Transport};
use campaign_assist::config::{CampaignConfig, ResponderConfig};
use campaign_assist::conversation::ConversationEngine;
use campaign_assist::inbox::spawn_inbox;
use campaign_assist::ledger::Ledger;
use campaign_assist::llm::{LlmConfig, create_provider};
use campaign_assist::scheduler::{CampaignScheduler, SchedulerSettings};
use campaign_assist::store::{ConversationStore, DocumentStore, FileStore};
use campaign_assist::templates::{BusinessFacts, MessageTemplates};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CampaignConfig::from_env().context("invalid campaign configuration")?;
    let responder = ResponderConfig::from_env().context("invalid responder configuration")?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("cannot create data dir {}", config.data_dir.display()))?;

    // Console plus a daily log file; the guard flushes the file writer on exit.
    let file_appender = tracing_appender::rolling::daily(&config.data_dir, "campaign.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    let llm_config = LlmConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  export DEEPSEEK_API_KEY=sk-...");
        eprintln!("  or CAMPAIGN_LLM_BACKEND=anthropic with ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    eprintln!("📨 Campaign Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!(
        "   Pacing: {} msg/hour, pattern {}, batches of {}",
        config.max_per_hour, config.pattern, config.batch_size
    );
    eprintln!("   Data: {}", config.data_dir.display());

    // ── Persistence ──────────────────────────────────────────────────────
    let store: Arc<dyn DocumentStore> = Arc::new(FileStore::new(&config.data_dir));
    let ledger = Arc::new(Ledger::load(Arc::clone(&store), config.audit_log).await);
    let conversations =
        Arc::new(ConversationStore::load(Arc::clone(&store), responder.history_cap).await);

    // ── Accounts ─────────────────────────────────────────────────────────
    // The first account owns the console; the rest only print.
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<CliCommand>();
    let accounts: Vec<Arc<Account>> = config
        .accounts
        .iter()
        .enumerate()
        .map(|(i, account_config)| {
            let transport: Arc<dyn Transport> = if i == 0 {
                Arc::new(CliTransport::interactive(&account_config.id, command_tx.clone()))
            } else {
                Arc::new(CliTransport::new(&account_config.id))
            };
            Arc::new(Account::new(account_config, transport))
        })
        .collect();
    drop(command_tx);

    let names: Vec<String> = accounts
        .iter()
        .map(|a| {
            if a.is_enabled() {
                a.id().to_string()
            } else {
                format!("{} (disabled)", a.id())
            }
        })
        .collect();
    eprintln!("   Accounts: {} ({})", names.join(", "), config.selection);

    let pool = Arc::new(AccountPool::new(accounts.clone(), config.selection));
    let templates = Arc::new(MessageTemplates::default());
    let facts = Arc::new(BusinessFacts::default());

    // ── Conversation engine ─────────────────────────────────────────────
    let llm = create_provider(&llm_config).context("failed to create LLM provider")?;
    let engine = Arc::new(ConversationEngine::new(
        Arc::clone(&conversations),
        llm,
        Arc::clone(&templates),
        facts,
        responder,
    ));

    // ── Scheduler ────────────────────────────────────────────────────────
    let scheduler = Arc::new(CampaignScheduler::new(
        Arc::clone(&ledger),
        Arc::clone(&pool),
        templates,
        SchedulerSettings::from(&config),
    ));

    let resumed = scheduler.resume_pending().await;
    if resumed > 0 {
        eprintln!("   Resumed {} pending contacts from the ledger", resumed);
    }
    eprintln!("   Type '<phone>: <message>', /schedule <phone> <category>, /stats or /quit.\n");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pacing = SendPacing {
        pattern: config.pattern,
        base: config.base_delay(),
    };

    let mut handles = Vec::new();
    for account in &accounts {
        handles.push(spawn_outbound_worker(
            Arc::clone(account),
            Arc::clone(&ledger),
            pacing,
            shutdown_rx.clone(),
        ));
        handles.push(spawn_inbox(
            Arc::clone(account),
            Arc::clone(&engine),
            shutdown_rx.clone(),
        ));
    }
    handles.push(Arc::clone(&scheduler).spawn(shutdown_rx.clone()));

    // ── Console loop ─────────────────────────────────────────────────────
    loop {
        tokio::select! {
            command = command_rx.recv() => match command {
                Some(CliCommand::Schedule(contact)) => {
                    let scheduled = scheduler.schedule_batch(std::slice::from_ref(&contact)).await;
                    if scheduled == 0 {
                        eprintln!("  {} was not scheduled (already contacted or no account ready)", contact);
                    }
                }
                Some(CliCommand::Stats) => print_stats(&ledger, &scheduler, &pool, &conversations).await,
                Some(CliCommand::Quit) | None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────────────
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
    for account in &accounts {
        if let Err(e) = account.transport().shutdown().await {
            tracing::warn!(account = %account.id(), error = %e, "Transport shutdown failed");
        }
    }
    for handle in handles {
        let _ = handle.await;
    }

    ledger.flush().await.context("failed to flush ledger")?;
    conversations
        .flush()
        .await
        .context("failed to flush conversation history")?;

    Ok(())
}

async fn print_stats(
    ledger: &Ledger,
    scheduler: &CampaignScheduler,
    pool: &AccountPool,
    conversations: &ConversationStore,
) {
    let report = serde_json::json!({
        "ledger": ledger.stats().await,
        "scheduler": scheduler.stats().await,
        "accounts": pool.stats().await,
        "blocked": conversations.blocked_count().await,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(text) => eprintln!("{}", text),
        Err(e) => eprintln!("  stats unavailable: {}", e),
    }
}
