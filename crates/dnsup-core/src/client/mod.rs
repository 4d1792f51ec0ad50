// # Authenticated Client
//
// Sends one DNS message to the configured server and returns the decoded
// response.
//
// ## Exchange
//
// 1. Pick a random message ID and encode
// 2. Sign with TSIG when a key is configured
// 3. Send; on a transport failure try again, up to `retries + 1` attempts
// 4. Verify the response signature against the request MAC
// 5. Decode and check the response ID
//
// Only failures that produced no response are retried. A response with a
// non-success code is returned as-is; interpreting it is the caller's job.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TransportKind;
use crate::error::{Error, Result};
use crate::message::{DnsMessage, Rcode, Response, wire};
use crate::traits::Transport;
use crate::tsig::TsigKey;

/// Immutable, validated client for one server
///
/// Built by [`ClientConfig::build`](crate::config::ClientConfig::build).
/// Safe to share between concurrent tasks; every exchange uses its own
/// message ID and socket.
#[derive(Clone)]
pub struct AuthenticatedClient {
    server: String,
    transport_kind: TransportKind,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    retries: usize,
    retry_delay: Duration,
    key: Option<TsigKey>,
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("server", &self.server)
            .field("transport", &self.transport.name())
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("key", &self.key)
            .finish()
    }
}

impl AuthenticatedClient {
    pub(crate) fn new(
        server: String,
        transport_kind: TransportKind,
        transport: Arc<dyn Transport>,
        timeout: Duration,
        retries: usize,
        retry_delay: Duration,
        key: Option<TsigKey>,
    ) -> Self {
        Self {
            server,
            transport_kind,
            transport,
            timeout,
            retries,
            retry_delay,
            key,
        }
    }

    /// Server endpoint as `host:port`
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Configured transport protocol
    pub fn transport_kind(&self) -> TransportKind {
        self.transport_kind
    }

    /// Per-attempt timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Additional attempts after the first
    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Delay between attempts
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// TSIG key, if authentication is configured
    pub fn key(&self) -> Option<&TsigKey> {
        self.key.as_ref()
    }

    /// Send `message` and return the server's response
    ///
    /// # Parameters
    ///
    /// - `message`: Query or update to send
    /// - `use_retries`: Whether transport failures are retried
    ///
    /// # Returns
    ///
    /// - `Ok(Response)`: A verified response, whatever its response code
    /// - `Err(Error)`: No acceptable response was received
    pub async fn exchange(&self, message: &DnsMessage, use_retries: bool) -> Result<Response> {
        let attempts = if use_retries { self.retries + 1 } else { 1 };
        let id: u16 = rand::thread_rng().r#gen();
        let encoded = wire::encode(message, id)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(
                "Sending {} #{} to {} over {} (attempt {}/{})",
                message.kind(),
                id,
                self.server,
                self.transport.name(),
                attempt,
                attempts
            );

            match self.attempt(&encoded, id).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        "Attempt {}/{} to {} failed: {}. Retrying...",
                        attempt,
                        attempts,
                        self.server,
                        e
                    );
                    if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(
                            "Giving up on {} after {} attempt(s): {}",
                            self.server,
                            attempt,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&self, encoded: &[u8], id: u16) -> Result<Response> {
        let (request, request_mac) = match &self.key {
            Some(key) => {
                let signed = key.sign(encoded, None, unix_now())?;
                (signed.message, Some(signed.mac))
            }
            None => (encoded.to_vec(), None),
        };

        let raw = self.transport.send(&self.server, &request, self.timeout).await?;

        let response = match (&self.key, request_mac) {
            (Some(key), Some(mac)) => match key.verify(&raw, Some(&mac), unix_now()) {
                Ok(verified) => wire::decode_response(&verified.message)?,
                Err(e) => return Err(unsigned_rejection(&raw).unwrap_or(e)),
            },
            _ => wire::decode_response(&raw)?,
        };

        if response.id != id {
            return Err(Error::protocol(format!(
                "Response ID {} does not match request ID {}",
                response.id, id
            )));
        }

        tracing::debug!("Received {} from {} for #{}", response.rcode, self.server, id);
        Ok(response)
    }
}

// Servers answer a request they cannot authenticate with an unsigned NOTAUTH
fn unsigned_rejection(raw: &[u8]) -> Option<Error> {
    match wire::decode_response(raw) {
        Ok(response) if response.rcode == Rcode::NotAuth => Some(Error::Rcode(Rcode::NotAuth)),
        _ => None,
    }
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
