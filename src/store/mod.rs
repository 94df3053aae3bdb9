//! Persistence layer: JSON documents on disk or in memory.

pub mod conversations;
pub mod file;
pub mod memory;
pub mod traits;

pub use conversations::{BlockEntry, BlockReason, ConversationStore, TurnStart};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::*;
