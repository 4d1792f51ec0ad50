// # dnsup - declarative address records over RFC 2136
//
// This is a THIN integration layer: it reads configuration, loads stored
// state, runs one reconciliation through dnsup-core and saves the result.
// All DNS logic lives in dnsup-core.
//
// ## Usage
//
// ```bash
// dnsup apply    # create or update the record set (default)
// dnsup read     # compare live records with the declared addresses
// dnsup destroy  # remove the record set
// ```
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Server
// - `DNSUP_SERVER`: Authoritative server host or IP (required)
// - `DNSUP_PORT`: Server port (default 53)
// - `DNSUP_TRANSPORT`: udp or tcp (default udp)
// - `DNSUP_TIMEOUT_MS`: Per-attempt timeout (default 2000)
// - `DNSUP_RETRIES`: Additional attempts on transport failure (default 3)
// - `DNSUP_RETRY_DELAY_MS`: Delay between attempts (default 0)
//
// ### Authentication (all or none)
// - `DNSUP_KEY_NAME`: TSIG key name, fully qualified
// - `DNSUP_KEY_SECRET`: TSIG secret, base64
// - `DNSUP_KEY_ALGORITHM`: hmac-md5, hmac-sha1, hmac-sha256 or hmac-sha512
//
// ### Record set
// - `DNSUP_ZONE`: Zone, fully qualified (required)
// - `DNSUP_NAME`: Name relative to the zone (required)
// - `DNSUP_RECORD_TYPE`: A or AAAA (default A)
// - `DNSUP_TTL`: TTL for inserted records (default 3600)
// - `DNSUP_ADDRESSES`: Comma-separated addresses
//
// ### State Store
// - `DNSUP_STATE_STORE_TYPE`: file or memory (default file)
// - `DNSUP_STATE_STORE_PATH`: Path to state file (for file store)
//
// ## Example
//
// ```bash
// export DNSUP_SERVER=ns1.example.com
// export DNSUP_KEY_NAME=update-key.example.com.
// export DNSUP_KEY_SECRET=c2VjcmV0
// export DNSUP_KEY_ALGORITHM=hmac-sha256
// export DNSUP_ZONE=example.com.
// export DNSUP_NAME=www
// export DNSUP_ADDRESSES=192.0.2.10,192.0.2.11
// export DNSUP_STATE_STORE_PATH=/var/lib/dnsup/state.json
//
// dnsup apply
// ```

use anyhow::{Context, Result};
use dnsup_core::{
    ClientConfig, ReadOutcome, RecordSet, RecordType, Reconciler,
    StateStoreConfig, TransportKind,
};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean exit
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy)]
enum DnsupExitCode {
    /// Operation completed
    Clean = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// The operation failed
    RuntimeError = 2,
}

impl From<DnsupExitCode> for ExitCode {
    fn from(code: DnsupExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Operation selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Apply,
    Read,
    Destroy,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "apply" => Ok(Command::Apply),
            "read" => Ok(Command::Read),
            "destroy" => Ok(Command::Destroy),
            other => anyhow::bail!(
                "Unknown command '{}'. Valid commands: apply, read, destroy",
                other
            ),
        }
    }
}

/// TTL for inserted records when `DNSUP_TTL` is unset
const DEFAULT_TTL: u32 = 3600;

/// Application configuration
struct Config {
    client: ClientConfig,
    zone: String,
    name: String,
    record_type: RecordType,
    ttl: u32,
    addresses: Vec<String>,
    state_store_type: String,
    state_store_path: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let mut client = ClientConfig::new(env::var("DNSUP_SERVER").unwrap_or_default());
        if let Some(port) = parsed("DNSUP_PORT")? {
            client.port = port;
        }
        if let Ok(transport) = env::var("DNSUP_TRANSPORT") {
            client.transport = transport.parse::<TransportKind>()?;
        }
        if let Some(timeout_ms) = parsed("DNSUP_TIMEOUT_MS")? {
            client.timeout_ms = timeout_ms;
        }
        if let Some(retries) = parsed("DNSUP_RETRIES")? {
            client.retries = retries;
        }
        if let Some(delay) = parsed("DNSUP_RETRY_DELAY_MS")? {
            client.retry_delay_ms = delay;
        }
        client.key_name = env::var("DNSUP_KEY_NAME").unwrap_or_default();
        client.key_secret = env::var("DNSUP_KEY_SECRET").unwrap_or_default();
        client.key_algorithm = env::var("DNSUP_KEY_ALGORITHM").unwrap_or_default();

        Ok(Self {
            client,
            zone: env::var("DNSUP_ZONE").unwrap_or_default(),
            name: env::var("DNSUP_NAME").unwrap_or_default(),
            record_type: env::var("DNSUP_RECORD_TYPE")
                .unwrap_or_else(|_| "A".to_string())
                .parse()?,
            ttl: parsed("DNSUP_TTL")?.unwrap_or(DEFAULT_TTL),
            addresses: env::var("DNSUP_ADDRESSES")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            state_store_type: env::var("DNSUP_STATE_STORE_TYPE")
                .unwrap_or_else(|_| "file".to_string()),
            state_store_path: env::var("DNSUP_STATE_STORE_PATH").ok(),
            log_level: env::var("DNSUP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Connection and key checks happen in `ClientConfig::build`; this covers
    /// what only the binary knows about.
    fn validate(&self, command: Command) -> Result<()> {
        if self.client.server.is_empty() {
            anyhow::bail!(
                "DNSUP_SERVER is required. \
                Set it via: export DNSUP_SERVER=ns1.example.com"
            );
        }

        if !self.zone.ends_with('.') {
            anyhow::bail!(
                "DNSUP_ZONE must be fully qualified (end with '.'). Got: '{}'",
                self.zone
            );
        }

        if self.name.is_empty() || self.name.ends_with('.') {
            anyhow::bail!(
                "DNSUP_NAME must be a non-empty name relative to DNSUP_ZONE. Got: '{}'",
                self.name
            );
        }

        if command != Command::Destroy && self.addresses.is_empty() {
            anyhow::bail!(
                "DNSUP_ADDRESSES must contain at least one address. \
                Set it via: export DNSUP_ADDRESSES=192.0.2.10"
            );
        }

        match self.state_store_type.as_str() {
            "memory" => {}
            "file" => {
                if self.state_store_path.as_ref().is_none_or(|p| p.is_empty()) {
                    anyhow::bail!(
                        "DNSUP_STATE_STORE_PATH is required when DNSUP_STATE_STORE_TYPE=file. \
                        Set it via: export DNSUP_STATE_STORE_PATH=/var/lib/dnsup/state.json"
                    );
                }
            }
            other => anyhow::bail!(
                "DNSUP_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DNSUP_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn state_store(&self) -> StateStoreConfig {
        match (self.state_store_type.as_str(), &self.state_store_path) {
            ("file", Some(path)) => StateStoreConfig::File { path: path.clone() },
            _ => StateStoreConfig::Memory,
        }
    }

    fn record_set(&self) -> RecordSet {
        RecordSet::new(
            &self.zone,
            &self.name,
            self.ttl,
            self.record_type,
            self.addresses.iter().cloned(),
        )
    }
}

/// Parse an optional numeric environment variable
fn parsed<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} is not a valid number: '{}'", key, value)),
        Err(_) => Ok(None),
    }
}

fn main() -> ExitCode {
    let command = match env::args().nth(1).as_deref().unwrap_or("apply").parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            return DnsupExitCode::ConfigError.into();
        }
    };

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DnsupExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate(command) {
        eprintln!("Configuration validation error: {}", e);
        return DnsupExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DnsupExitCode::ConfigError.into();
    }

    // Validate connection parameters before touching the network
    let client = match config.client.build() {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            return DnsupExitCode::ConfigError.into();
        }
    };

    info!("dnsup {:?} {} via {}", command, config.record_set().fqdn(), client.server());

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnsupExitCode::RuntimeError.into();
        }
    };

    let reconciler = Reconciler::new(Arc::new(client));
    rt.block_on(async {
        match run(command, &config, &reconciler).await {
            Ok(()) => DnsupExitCode::Clean,
            Err(e) => {
                error!("{:#}", e);
                DnsupExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Run one reconciliation and persist the resulting state
async fn run(command: Command, config: &Config, reconciler: &Reconciler) -> Result<()> {
    let store = dnsup_core::state::open(&config.state_store()).await?;
    let record = config.record_set();
    let key = record.fqdn();
    let mut state = store.get(&key).await?.unwrap_or_default();

    let outcome = match command {
        Command::Apply => reconciler.apply(&record, &mut state).await,
        Command::Read => match reconciler.read(&record, &mut state).await {
            Ok(ReadOutcome::Present(addresses)) => {
                info!("{} is up to date: {:?}", key, addresses);
                Ok(())
            }
            Ok(ReadOutcome::Absent) => {
                info!("{} does not exist", key);
                Ok(())
            }
            // Reported, and the cleared state makes the next apply start over
            Err(e) if e.is_drift() => {
                warn!("{} has drifted: {}", key, e);
                Ok(())
            }
            Err(e) => Err(e),
        },
        Command::Destroy => reconciler.delete(&record, &mut state).await,
    };

    // State changes even when the operation fails
    if state.is_present() {
        store.set(&key, &state).await?;
    } else {
        store.delete(&key).await?;
    }
    store.flush().await?;

    outcome.with_context(|| format!("{:?} failed for {}", command, key))?;
    info!("Done");
    Ok(())
}
