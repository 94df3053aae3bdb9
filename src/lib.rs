//! Campaign Assist: paced outbound campaigns with automatic follow-up
//! conversations.

pub mod accounts;
pub mod channels;
pub mod config;
pub mod contact;
pub mod conversation;
pub mod error;
pub mod inbox;
pub mod ledger;
pub mod llm;
pub mod scheduler;
pub mod store;
pub mod templates;
