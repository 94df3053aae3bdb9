//! Inbound routing: messages arriving on an account are run through the
//! conversation engine and any reply goes back out on the same account.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::accounts::Account;
use crate::channels::InboundMessage;
use crate::contact::{from_transport_id, normalize_phone_number};
use crate::conversation::ConversationEngine;

/// Canonical contact id for a sender, accepting transport ids
/// (`31612345678@c.us`) or plain numbers.
pub fn sender_contact_id(from: &str) -> Option<String> {
    let phone = if from.contains('@') {
        from_transport_id(from)
    } else {
        from.to_string()
    };
    normalize_phone_number(&phone)
}

/// Handle one inbound message end to end.
pub async fn handle_inbound(account: &Account, engine: &ConversationEngine, message: InboundMessage) {
    let Some(contact_id) = sender_contact_id(&message.from) else {
        warn!(account = %account.id(), from = %message.from, "Ignoring message from unparseable sender");
        return;
    };
    debug!(
        account = %account.id(),
        contact = %contact_id,
        message_id = %message.id,
        "Inbound message"
    );

    account.send_typing(&contact_id).await;

    let Some(reply) = engine.process_incoming_message(&contact_id, &message.text).await else {
        return;
    };

    match account.send(&contact_id, &reply).await {
        Ok(()) => info!(account = %account.id(), contact = %contact_id, "Reply sent"),
        Err(e) => warn!(account = %account.id(), contact = %contact_id, error = %e, "Reply failed"),
    }
}

/// Start the account's transport and answer inbound messages until the
/// stream ends or `shutdown` flips to `true`.
///
/// Each message is handled on its own task, so a slow reply to one contact
/// does not hold up the others. In-flight handlers are awaited before the
/// inbox reports stopped.
pub fn spawn_inbox(
    account: Arc<Account>,
    engine: Arc<ConversationEngine>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut inbound = match account.transport().start().await {
            Ok(stream) => stream,
            Err(e) => {
                error!(account = %account.id(), error = %e, "Transport failed to start");
                return;
            }
        };
        info!(account = %account.id(), transport = %account.transport().name(), "Inbox started");

        let mut handlers = JoinSet::new();
        loop {
            tokio::select! {
                next = inbound.next() => match next {
                    Some(message) => {
                        let account = Arc::clone(&account);
                        let engine = Arc::clone(&engine);
                        handlers.spawn(async move { handle_inbound(&account, &engine, message).await });
                    }
                    None => break,
                },
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    log_handler_exit(&account, joined);
                }
                _ = shutdown.changed() => break,
            }
        }

        if !handlers.is_empty() {
            debug!(account = %account.id(), in_flight = handlers.len(), "Waiting for inbound handlers");
        }
        while let Some(joined) = handlers.join_next().await {
            log_handler_exit(&account, joined);
        }

        info!(account = %account.id(), "Inbox stopped");
    })
}

fn log_handler_exit(account: &Account, joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(account = %account.id(), error = %e, "Inbound handler failed");
    }
}
