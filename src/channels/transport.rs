//! Transport trait: how an account talks to the outside world.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;

/// A message received from a contact.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: Uuid,
    /// Sender as the transport reports it (phone number or chat id).
    pub from: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.into(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Stream of inbound messages produced by a started transport.
pub type InboundStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// Delivery backend behind one sending account.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether the transport can send right now.
    fn is_ready(&self) -> bool;

    /// Start receiving. Called once per transport.
    async fn start(&self) -> Result<InboundStream, ChannelError>;

    /// Deliver `text` to the contact with canonical id `contact_id`.
    async fn send(&self, contact_id: &str, text: &str) -> Result<(), ChannelError>;

    /// Show a typing indicator. Best effort.
    async fn send_typing(&self, _contact_id: &str) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
