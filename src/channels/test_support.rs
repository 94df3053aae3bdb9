//! In-process transport used by unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;

use super::{InboundMessage, InboundStream, Transport};
use crate::error::ChannelError;

/// Records every send; can be switched to fail or to report not-ready.
/// Built with [`RecordingTransport::with_inbound`] it also feeds inbound messages.
pub struct RecordingTransport {
    name: String,
    ready: AtomicBool,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<(String, String)>>,
    typing: Mutex<Vec<String>>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
}

impl RecordingTransport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ready: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            typing: Mutex::new(Vec::new()),
            inbound: Mutex::new(None),
        }
    }

    /// A transport whose `start` stream yields what is pushed on the sender.
    pub fn with_inbound(name: &str) -> (Self, mpsc::UnboundedSender<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self::new(name);
        *transport.inbound.lock().unwrap() = Some(rx);
        (transport, tx)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn typing(&self) -> Vec<String> {
        self.typing.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<InboundStream, ChannelError> {
        let inbound = self.inbound.lock().unwrap().take();
        let Some(rx) = inbound else {
            return Ok(Box::pin(stream::empty::<InboundMessage>()));
        };
        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        })))
    }

    async fn send(&self, contact_id: &str, text: &str) -> Result<(), ChannelError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed {
                name: self.name.clone(),
                reason: "simulated failure".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((contact_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_typing(&self, contact_id: &str) -> Result<(), ChannelError> {
        self.typing.lock().unwrap().push(contact_id.to_string());
        Ok(())
    }
}
