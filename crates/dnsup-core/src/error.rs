//! Error types for dnsup
//!
//! This module defines all error types used throughout the crate.
//!
//! ## Taxonomy
//!
//! - **Configuration** ([`Error::Config`]): fatal at build time, never retried
//! - **Transport** ([`Error::Transport`], [`Error::Timeout`], [`Error::Network`]):
//!   retried by the client up to the configured count
//! - **Protocol** ([`Error::Protocol`], [`Error::Rcode`]): the server answered,
//!   but not with what we needed; never retried
//! - **Parse** ([`Error::Parse`]): malformed address values, never retried
//!
//! Reconciler operations wrap their cause in [`Error::Query`], [`Error::Update`]
//! or [`Error::Delete`] so callers see which step failed.

use std::time::Duration;

use thiserror::Error;

use crate::message::Rcode;

/// Result type alias for dnsup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dnsup
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failure that prevented receiving any response
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response within the per-attempt timeout
    #[error("Timed out after {timeout:?} waiting for {server}")]
    Timeout {
        /// Server endpoint
        server: String,
        /// Per-attempt timeout
        timeout: Duration,
    },

    /// Socket-level errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// Malformed, unexpected or unauthenticated response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Well-formed response carrying a non-success code
    #[error("server responded with {0}")]
    Rcode(Rcode),

    /// Address value that does not parse
    #[error("Parse error: {0}")]
    Parse(String),

    /// Structurally invalid input (names, record text)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Querying a record set failed
    #[error("Error querying DNS record {fqdn}: {source}")]
    Query {
        /// Record set identity
        fqdn: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Applying an update failed
    #[error("Error updating DNS record {fqdn}: {source}")]
    Update {
        /// Record set identity
        fqdn: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Deleting a record set failed
    #[error("Error deleting DNS record {fqdn}: {source}")]
    Delete {
        /// Record set identity
        fqdn: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Live records differ from the expected set
    #[error("DNS record {fqdn} differs: expected {expected:?}, observed {observed:?}")]
    Drift {
        /// Record set identity
        fqdn: String,
        /// Canonical expected addresses
        expected: Vec<String>,
        /// Canonical addresses the server answered with
        observed: Vec<String>,
    },

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Wrap a cause as a query failure
    pub fn query(fqdn: impl Into<String>, source: Error) -> Self {
        Self::Query {
            fqdn: fqdn.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a cause as an update failure
    pub fn update(fqdn: impl Into<String>, source: Error) -> Self {
        Self::Update {
            fqdn: fqdn.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a cause as a delete failure
    pub fn delete(fqdn: impl Into<String>, source: Error) -> Self {
        Self::Delete {
            fqdn: fqdn.into(),
            source: Box::new(source),
        }
    }

    /// Whether the client should try the exchange again
    ///
    /// Only failures that prevented receiving any response qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout { .. } | Self::Network(_)
        )
    }

    /// The server-reported response code, looking through operation wrappers
    pub fn rcode(&self) -> Option<Rcode> {
        match self {
            Self::Rcode(code) => Some(*code),
            Self::Query { source, .. }
            | Self::Update { source, .. }
            | Self::Delete { source, .. } => source.rcode(),
            _ => None,
        }
    }

    /// Whether this is a drift report from a read
    pub fn is_drift(&self) -> bool {
        matches!(self, Self::Drift { .. })
    }
}
