//! Core traits for dnsup
//!
//! - [`Transport`]: Move one encoded DNS exchange over the network
//! - [`StateStore`]: Persist reconciled record state between runs

pub mod state_store;
pub mod transport;

pub use state_store::{RecordState, StateStore};
pub use transport::Transport;
