//! CLI transport: stdin/stdout stand-in for a messaging account.
//!
//! Input lines are either inbound messages (`+31612345678: hallo`) or
//! operator commands (`/schedule 0612345678 schilder`, `/stats`, `/quit`).
//! Outbound messages are printed to stdout.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::channels::{InboundMessage, InboundStream, Transport};
use crate::contact::{Contact, normalize_phone_number};
use crate::error::ChannelError;

/// Operator command typed on the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Schedule(Contact),
    Stats,
    Quit,
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliInput {
    Command(CliCommand),
    Message { from: String, text: String },
    Invalid(String),
}

/// Parse a console line.
pub fn parse_line(line: &str) -> CliInput {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix('/') {
        let mut parts = rest.split_whitespace();
        return match parts.next() {
            Some("schedule") => {
                let phone = parts.next().unwrap_or_default();
                let mut category = parts.collect::<Vec<_>>().join(" ");
                if category.is_empty() {
                    category = "default".to_string();
                }
                match Contact::parse(phone, category) {
                    Some(contact) => CliInput::Command(CliCommand::Schedule(contact)),
                    None => CliInput::Invalid(format!("invalid phone number '{phone}'")),
                }
            }
            Some("stats") => CliInput::Command(CliCommand::Stats),
            Some("quit") | Some("exit") => CliInput::Command(CliCommand::Quit),
            _ => CliInput::Invalid(format!("unknown command '{line}'")),
        };
    }

    let Some((from, text)) = line.split_once(':') else {
        return CliInput::Invalid("expected '<phone>: <message>'".to_string());
    };
    match normalize_phone_number(from) {
        Some(from) => CliInput::Message {
            from,
            text: text.trim().to_string(),
        },
        None => CliInput::Invalid(format!("invalid phone number '{}'", from.trim())),
    }
}

/// A transport that reads stdin and writes stdout.
///
/// Only one interactive instance should exist per process; the others just
/// print what they send.
pub struct CliTransport {
    name: String,
    interactive: bool,
    commands: Option<mpsc::UnboundedSender<CliCommand>>,
    ready: AtomicBool,
}

impl CliTransport {
    /// Output-only transport.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interactive: false,
            commands: None,
            ready: AtomicBool::new(true),
        }
    }

    /// Transport that also reads stdin, forwarding commands to `commands`.
    pub fn interactive(name: impl Into<String>, commands: mpsc::UnboundedSender<CliCommand>) -> Self {
        Self {
            interactive: true,
            commands: Some(commands),
            ..Self::new(name)
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for CliTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<InboundStream, ChannelError> {
        if !self.interactive {
            return Ok(Box::pin(stream::pending::<InboundMessage>()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        match parse_line(&line) {
                            CliInput::Message { from, text } => {
                                if tx.send(InboundMessage::new(from, text)).is_err() {
                                    break;
                                }
                            }
                            CliInput::Command(command) => {
                                let quit = command == CliCommand::Quit;
                                if let Some(ref commands) = commands {
                                    let _ = commands.send(command);
                                }
                                if quit {
                                    break;
                                }
                                eprint!("> ");
                            }
                            CliInput::Invalid(reason) => {
                                eprintln!("⚠️  {}", reason);
                                eprint!("> ");
                            }
                        }
                    }
                    Ok(None) => {
                        if let Some(ref commands) = commands {
                            let _ = commands.send(CliCommand::Quit);
                        }
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, contact_id: &str, text: &str) -> Result<(), ChannelError> {
        if !self.is_ready() {
            return Err(ChannelError::NotReady {
                name: self.name.clone(),
            });
        }
        println!("\n[{}] → {}\n{}\n", self.name, contact_id, text);
        eprint!("> ");
        Ok(())
    }

    async fn send_typing(&self, contact_id: &str) -> Result<(), ChannelError> {
        eprintln!("✍️  [{}] typing to {}...", self.name, contact_id);
        Ok(())
    }
}
