// # Transport Trait
//
// Defines how an encoded DNS message reaches a server and how the reply
// comes back.
//
// ## Purpose
//
// The client owns framing-independent concerns (IDs, signing, retries).
// A transport only moves bytes: one request out, one response in, bounded
// by a per-attempt timeout.
//
// ## Implementations
//
// - `UdpTransport`: one datagram each way
// - `TcpTransport`: two-byte length prefix over a fresh connection

use async_trait::async_trait;
use std::time::Duration;

use crate::Error;

/// Trait for moving one DNS exchange over the network
///
/// # Error Classification
///
/// Implementations report failures that prevented receiving a response as
/// [`Error::Transport`], [`Error::Timeout`] or [`Error::Network`]. The client
/// retries exactly those.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for one response
    ///
    /// # Parameters
    ///
    /// - `server`: Endpoint as `host:port` (IPv6 literals bracketed)
    /// - `request`: Encoded (and possibly signed) message
    /// - `timeout`: Upper bound for this attempt
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<u8>)`: Raw response bytes
    /// - `Err(Error)`: No response was received
    async fn send(&self, server: &str, request: &[u8], timeout: Duration) -> Result<Vec<u8>, Error>;

    /// Short transport name for logging
    fn name(&self) -> &'static str;
}
