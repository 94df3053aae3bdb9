//! Transports: message I/O for sending accounts.

pub mod cli;
pub mod transport;

pub use cli::{CliCommand, CliTransport};
pub use transport::*;

#[cfg(test)]
pub(crate) mod test_support;
