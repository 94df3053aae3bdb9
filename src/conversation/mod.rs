//! Inbound conversation handling: intent classification, per-contact state,
//! prompt assembly, and the engine that picks a reply.

mod engine;
pub mod intent;
pub mod prompt;
pub mod state;

pub use engine::ConversationEngine;
pub use intent::{Intent, classify};
pub use state::{ConversationState, ConversationTurn, Stage, TurnMetadata};
