// # dnsup-core
//
// Declarative management of address records on an authoritative DNS server
// through RFC 2136 dynamic updates, optionally authenticated with TSIG.
//
// ## Architecture Overview
//
// - **ClientConfig**: Validates connection parameters into an immutable client
// - **AuthenticatedClient**: Sends one signed, retried exchange
// - **message**: Tagged query/update messages and the wire codec boundary
// - **Reconciler**: Diffs desired against stored addresses, updates, verifies
// - **StateStore**: Persists what the reconciler last observed
//
// ## Design Principles
//
// 1. **Library-agnostic engine**: only `message::wire` touches the DNS codec
// 2. **Immutable client**: safe to share across concurrent reconciliations
// 3. **Fail safe**: uncertain live state clears stored state instead of guessing
// 4. **Testable without a network**: the transport is a trait

pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod reconciler;
pub mod state;
pub mod traits;
pub mod transport;
pub mod tsig;

// Re-export core types for convenience
pub use client::AuthenticatedClient;
pub use config::{ClientConfig, StateStoreConfig, TransportKind, TsigAlgorithm};
pub use error::{Error, Result};
pub use message::{Rcode, RecordType};
pub use reconciler::{ChangeSet, ReadOutcome, RecordSet, Reconciler};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{RecordState, StateStore, Transport};
pub use transport::{TcpTransport, UdpTransport};
pub use tsig::TsigKey;
