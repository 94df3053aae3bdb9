//! Sending accounts: identity, queue, selection and the outbound worker.

pub mod account;
pub mod pool;
pub mod worker;

pub use account::{Account, AccountStats, OutboundMessage, SendOutcome};
pub use pool::{AccountPool, SelectionPolicy};
pub use worker::{SendPacing, spawn_outbound_worker};
