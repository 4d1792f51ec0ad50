//! Configuration types for dnsup
//!
//! [`ClientConfig`] holds the connection parameters for one authoritative
//! server. [`ClientConfig::build`] validates them and produces the immutable
//! [`AuthenticatedClient`] every reconciliation runs through.
//!
//! ## Validation order
//!
//! 1. Join server host and port into one endpoint
//! 2. Authentication fields are all empty or all non-empty
//! 3. A key name must be fully qualified; it is lower-cased
//! 4. The algorithm must be one of hmac-md5, hmac-sha1, hmac-sha256, hmac-sha512
//!
//! Building has no side effects and can be repeated with the same input.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::client::AuthenticatedClient;
use crate::error::{Error, Result};
use crate::message::wire::check_fqdn;
use crate::traits::Transport;
use crate::transport::{TcpTransport, UdpTransport};
use crate::tsig::TsigKey;

/// Transport protocol used to reach the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Datagrams
    #[default]
    Udp,
    /// Length-prefixed stream
    Tcp,
}

impl TransportKind {
    /// Lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Udp => "udp",
            TransportKind::Tcp => "tcp",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "udp" => Ok(TransportKind::Udp),
            "tcp" => Ok(TransportKind::Tcp),
            other => Err(Error::config(format!(
                "Unknown transport: {} (expected udp or tcp)",
                other
            ))),
        }
    }
}

/// TSIG HMAC algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TsigAlgorithm {
    /// HMAC-MD5
    #[serde(rename = "hmac-md5")]
    HmacMd5,
    /// HMAC-SHA1
    #[serde(rename = "hmac-sha1")]
    HmacSha1,
    /// HMAC-SHA256
    #[serde(rename = "hmac-sha256")]
    HmacSha256,
    /// HMAC-SHA512
    #[serde(rename = "hmac-sha512")]
    HmacSha512,
}

impl TsigAlgorithm {
    /// Configuration name
    pub fn as_str(&self) -> &'static str {
        match self {
            TsigAlgorithm::HmacMd5 => "hmac-md5",
            TsigAlgorithm::HmacSha1 => "hmac-sha1",
            TsigAlgorithm::HmacSha256 => "hmac-sha256",
            TsigAlgorithm::HmacSha512 => "hmac-sha512",
        }
    }

    /// Canonical algorithm identifier carried in the TSIG record
    pub fn wire_name(&self) -> &'static str {
        match self {
            TsigAlgorithm::HmacMd5 => "hmac-md5.sig-alg.reg.int.",
            TsigAlgorithm::HmacSha1 => "hmac-sha1.",
            TsigAlgorithm::HmacSha256 => "hmac-sha256.",
            TsigAlgorithm::HmacSha512 => "hmac-sha512.",
        }
    }
}

impl fmt::Display for TsigAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TsigAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hmac-md5" => Ok(TsigAlgorithm::HmacMd5),
            "hmac-sha1" => Ok(TsigAlgorithm::HmacSha1),
            "hmac-sha256" => Ok(TsigAlgorithm::HmacSha256),
            "hmac-sha512" => Ok(TsigAlgorithm::HmacSha512),
            other => Err(Error::config(format!("Unknown HMAC algorithm: {}", other))),
        }
    }
}

/// Connection parameters for one authoritative server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host name or IP literal
    pub server: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport protocol
    #[serde(default)]
    pub transport: TransportKind,

    /// Per-attempt timeout (in milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Additional attempts after the first on transport failure
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Delay between attempts (in milliseconds)
    ///
    /// Does not change the number of attempts.
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// TSIG key name (fully qualified)
    #[serde(default)]
    pub key_name: String,

    /// TSIG secret, base64
    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub key_secret: String,

    /// TSIG algorithm name
    #[serde(default)]
    pub key_algorithm: String,
}

// Custom Debug implementation that hides the key secret
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("transport", &self.transport)
            .field("timeout_ms", &self.timeout_ms)
            .field("retries", &self.retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("key_name", &self.key_name)
            .field("key_secret", &"<REDACTED>")
            .field("key_algorithm", &self.key_algorithm)
            .finish()
    }
}

impl ClientConfig {
    /// Unauthenticated configuration with default port, transport and timing
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port: default_port(),
            transport: TransportKind::default(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            retry_delay_ms: 0,
            key_name: String::new(),
            key_secret: String::new(),
            key_algorithm: String::new(),
        }
    }

    /// Set the TSIG key
    pub fn with_key(
        mut self,
        name: impl Into<String>,
        secret: impl Into<String>,
        algorithm: impl Into<String>,
    ) -> Self {
        self.key_name = name.into();
        self.key_secret = secret.into();
        self.key_algorithm = algorithm.into();
        self
    }

    /// Per-attempt timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay between attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn endpoint(&self) -> String {
        if self.server.contains(':') && !self.server.starts_with('[') {
            format!("[{}]:{}", self.server, self.port)
        } else {
            format!("{}:{}", self.server, self.port)
        }
    }

    /// Validate and build a client over the configured transport
    pub fn build(&self) -> Result<AuthenticatedClient> {
        let transport: Arc<dyn Transport> = match self.transport {
            TransportKind::Udp => Arc::new(UdpTransport),
            TransportKind::Tcp => Arc::new(TcpTransport),
        };
        self.build_with_transport(transport)
    }

    /// Validate and build a client over a caller-supplied transport
    pub fn build_with_transport(&self, transport: Arc<dyn Transport>) -> Result<AuthenticatedClient> {
        tracing::debug!("Building DNS client for {}", self.endpoint());

        let server = self.endpoint();
        let key = self.resolve_key()?;

        if let Some(ref key) = key {
            tracing::debug!("Using TSIG key {} ({})", key.name(), key.algorithm());
        }

        Ok(AuthenticatedClient::new(
            server,
            self.transport,
            transport,
            self.timeout(),
            self.retries,
            self.retry_delay(),
            key,
        ))
    }

    fn resolve_key(&self) -> Result<Option<TsigKey>> {
        let present = [&self.key_name, &self.key_secret, &self.key_algorithm]
            .iter()
            .filter(|field| !field.is_empty())
            .count();

        match present {
            0 => return Ok(None),
            3 => {}
            _ => {
                return Err(Error::config(
                    "when using authentication, key_name, key_secret and key_algorithm must all be non-empty",
                ));
            }
        }

        check_fqdn(&self.key_name)
            .map_err(|_| Error::config("key_name should be fully-qualified"))?;
        let name = self.key_name.to_ascii_lowercase();
        let algorithm: TsigAlgorithm = self.key_algorithm.parse()?;
        let secret = STANDARD
            .decode(self.key_secret.trim())
            .map_err(|e| Error::config(format!("key_secret is not valid base64: {}", e)))?;

        Ok(Some(TsigKey::new(&name, algorithm, secret)))
    }
}

fn default_port() -> u16 {
    53
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_retries() -> usize {
    3
}

/// State store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,
}
