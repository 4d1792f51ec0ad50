//! Test doubles and common utilities for contract tests
//!
//! [`FakeNameserver`] is an in-memory authoritative server behind the
//! `Transport` trait. It decodes requests with the real wire codec, applies
//! updates to its zone and answers queries, so the reconciler can be tested
//! end to end without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use dnsup_core::error::{Error, Result};
use dnsup_core::message::wire;
use dnsup_core::message::{Answer, DnsMessage, Rcode, RecordType, Response, UpdateMessage, UpdateOperation};
use dnsup_core::{AuthenticatedClient, ClientConfig, Reconciler, Transport, TsigAlgorithm, TsigKey};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ZONE: &str = "example.com.";
pub const KEY_NAME: &str = "update-key.example.com.";
pub const KEY_SECRET: &str = "ZG5zdXAtdGVzdC1zZWNyZXQtMDEyMzQ1Njc4OWFiY2Q=";
pub const KEY_SECRET_BYTES: &[u8] = b"dnsup-test-secret-0123456789abcd";

type Zone = HashMap<(String, RecordType), BTreeSet<String>>;

/// In-memory authoritative server for one zone
///
/// Clones share the zone and counters.
#[derive(Clone)]
pub struct FakeNameserver {
    zone: String,
    records: Arc<Mutex<Zone>>,
    key: Option<TsigKey>,
    query_rcode: Arc<Mutex<Option<Rcode>>>,
    update_rcode: Arc<Mutex<Option<Rcode>>>,
    queries: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
    last_update: Arc<Mutex<Option<UpdateMessage>>>,
}

impl FakeNameserver {
    /// Unauthenticated server for [`ZONE`]
    pub fn new() -> Self {
        Self {
            zone: ZONE.to_string(),
            records: Arc::new(Mutex::new(HashMap::new())),
            key: None,
            query_rcode: Arc::new(Mutex::new(None)),
            update_rcode: Arc::new(Mutex::new(None)),
            queries: Arc::new(AtomicUsize::new(0)),
            updates: Arc::new(AtomicUsize::new(0)),
            last_update: Arc::new(Mutex::new(None)),
        }
    }

    /// Require and produce TSIG signatures with `key`
    pub fn with_key(mut self, key: TsigKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Put records in the zone directly
    pub fn seed(&self, fqdn: &str, record_type: RecordType, values: &[&str]) {
        self.records.lock().unwrap().insert(
            (fqdn.to_string(), record_type),
            values.iter().map(|v| v.to_string()).collect(),
        );
    }

    /// Records currently held for a name and type
    pub fn records(&self, fqdn: &str, record_type: RecordType) -> BTreeSet<String> {
        self.records
            .lock()
            .unwrap()
            .get(&(fqdn.to_string(), record_type))
            .cloned()
            .unwrap_or_default()
    }

    /// Answer every query with `rcode`
    pub fn force_query_rcode(&self, rcode: Rcode) {
        *self.query_rcode.lock().unwrap() = Some(rcode);
    }

    /// Answer every update with `rcode` without applying it
    pub fn force_update_rcode(&self, rcode: Rcode) {
        *self.update_rcode.lock().unwrap() = Some(rcode);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn exchange_count(&self) -> usize {
        self.query_count() + self.update_count()
    }

    /// The most recent update received
    pub fn last_update(&self) -> Option<UpdateMessage> {
        self.last_update.lock().unwrap().clone()
    }

    fn answer(&self, id: u16, message: &DnsMessage) -> Response {
        match message {
            DnsMessage::Query(query) => {
                self.queries.fetch_add(1, Ordering::SeqCst);
                if let Some(rcode) = *self.query_rcode.lock().unwrap() {
                    return Response::new(id, rcode);
                }

                let records = self.records.lock().unwrap();
                let name_exists = records.keys().any(|(name, _)| name == &query.fqdn);
                if !name_exists {
                    return Response::new(id, Rcode::NxDomain);
                }

                let mut response = Response::new(id, Rcode::NoError);
                if let Some(values) = records.get(&(query.fqdn.clone(), query.record_type)) {
                    response.answers = values
                        .iter()
                        .map(|value| Answer {
                            name: query.fqdn.clone(),
                            ttl: 300,
                            record_type: query.record_type.as_str().to_string(),
                            value: value.clone(),
                        })
                        .collect();
                }
                response
            }
            DnsMessage::Update(update) => {
                self.updates.fetch_add(1, Ordering::SeqCst);
                *self.last_update.lock().unwrap() = Some(update.clone());
                if let Some(rcode) = *self.update_rcode.lock().unwrap() {
                    return Response::new(id, rcode);
                }
                if update.zone() != self.zone {
                    return Response::new(id, Rcode::NotZone);
                }

                let mut records = self.records.lock().unwrap();
                for operation in update.operations() {
                    match operation {
                        UpdateOperation::Insert { fqdn, data, .. } => {
                            records
                                .entry((fqdn.clone(), data.record_type()))
                                .or_default()
                                .insert(data.to_string());
                        }
                        UpdateOperation::Remove { fqdn, data } => {
                            let key = (fqdn.clone(), data.record_type());
                            if let Some(values) = records.get_mut(&key) {
                                values.remove(&data.to_string());
                                if values.is_empty() {
                                    records.remove(&key);
                                }
                            }
                        }
                        UpdateOperation::RemoveSet { fqdn, record_type } => {
                            records.remove(&(fqdn.clone(), *record_type));
                        }
                    }
                }
                Response::new(id, Rcode::NoError)
            }
        }
    }
}

#[async_trait]
impl Transport for FakeNameserver {
    async fn send(&self, _server: &str, request: &[u8], _timeout: Duration) -> Result<Vec<u8>> {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap();

        let (bytes, request_mac) = match &self.key {
            Some(key) => match key.verify(request, None, now) {
                Ok(verified) => (verified.message, Some(verified.mac)),
                Err(_) => {
                    // Unsigned NOTAUTH, as real servers do
                    let (id, message) = wire::decode_request(request)?;
                    return wire::encode_response(&Response::new(id, Rcode::NotAuth), &message);
                }
            },
            None => (request.to_vec(), None),
        };

        let (id, message) = wire::decode_request(&bytes)?;
        let response = self.answer(id, &message);
        let encoded = wire::encode_response(&response, &message)?;

        match (&self.key, request_mac) {
            (Some(key), Some(mac)) => Ok(key.sign(&encoded, Some(&mac), now)?.message),
            _ => Ok(encoded),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Transport that fails every attempt with a timeout
#[derive(Clone, Default)]
pub struct FailingTransport {
    attempts: Arc<AtomicUsize>,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, server: &str, _request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::Timeout {
            server: server.to_string(),
            timeout,
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Transport that refuses the first `failures` attempts, then delegates
#[derive(Clone)]
pub struct FlakyTransport {
    inner: FakeNameserver,
    failures: usize,
    attempts: Arc<AtomicUsize>,
}

impl FlakyTransport {
    pub fn new(inner: FakeNameserver, failures: usize) -> Self {
        Self {
            inner,
            failures,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn send(&self, server: &str, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(Error::transport("connection refused"));
        }
        self.inner.send(server, request, timeout).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Unauthenticated client over `transport` with `retries`
pub fn client_over<T: Transport + 'static>(transport: T, retries: usize) -> AuthenticatedClient {
    let mut config = ClientConfig::new("127.0.0.1");
    config.retries = retries;
    config.build_with_transport(Arc::new(transport)).unwrap()
}

/// Reconciler talking to `nameserver` without authentication
pub fn reconciler_for(nameserver: &FakeNameserver) -> Reconciler {
    Reconciler::new(Arc::new(client_over(nameserver.clone(), 0)))
}

/// Server-side copy of the shared test key
pub fn server_key() -> TsigKey {
    TsigKey::new(KEY_NAME, TsigAlgorithm::HmacSha256, KEY_SECRET_BYTES.to_vec())
}

/// Transport whose signed replies carry a TSIG error code
///
/// The MAC is computed by `inner` with a zero error field; the code is
/// patched in afterwards, as a server rejecting the request would report it.
#[derive(Clone)]
pub struct TsigErrorTransport {
    inner: FakeNameserver,
    error: u16,
}

impl TsigErrorTransport {
    pub fn new(inner: FakeNameserver, error: u16) -> Self {
        Self { inner, error }
    }
}

#[async_trait]
impl Transport for TsigErrorTransport {
    async fn send(&self, server: &str, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let mut reply = self.inner.send(server, request, timeout).await?;
        // error and an empty other-data length end the record
        let at = reply.len() - 4;
        reply[at..at + 2].copy_from_slice(&self.error.to_be_bytes());
        Ok(reply)
    }

    fn name(&self) -> &'static str {
        "tsig-error"
    }
}
