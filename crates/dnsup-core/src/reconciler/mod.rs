// # Reconciler
//
// Converges the live address records of one name with a desired set.
//
// ## Lifecycle
//
// Driven by the caller, not by an internal loop:
//
// - **Absent → Present**: [`Reconciler::create`]
// - **Present → Present**: [`Reconciler::update`] (possibly a no-op)
// - **Present → Absent**: [`Reconciler::delete`]
//
// [`Reconciler::read`] observes live state and reports drift.
//
// ## Stored State
//
// Every operation takes the caller's [`RecordState`] and updates it.
// Whenever the live state becomes uncertain (a failed update, drift, or a
// missing name) the state is cleared, so the next apply starts over with a
// create-style update instead of guessing.
//
// ## Addresses
//
// Addresses are compared in canonical form: parsed, then printed again.
// `"::ffff:1.2.3.4"` and `"1.2.3.4"` are the same A value. A value that
// does not parse, whether desired or answered by the server, fails the
// operation.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::client::AuthenticatedClient;
use crate::error::{Error, Result};
use crate::message::{RecordType, build_query, build_update};
use crate::traits::RecordState;

/// Desired address records for one name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    /// Zone the name lives in (fully qualified)
    pub zone: String,
    /// Name relative to the zone
    pub name: String,
    /// TTL for inserted records
    pub ttl: u32,
    /// A or AAAA
    pub record_type: RecordType,
    /// Desired addresses, in any textual form
    pub addresses: BTreeSet<String>,
}

impl RecordSet {
    /// Create a record set
    pub fn new<I, S>(zone: &str, name: &str, ttl: u32, record_type: RecordType, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            zone: zone.to_string(),
            name: name.to_string(),
            ttl,
            record_type,
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    /// Identity of the record set: `name.zone`
    pub fn fqdn(&self) -> String {
        fqdn(&self.zone, &self.name)
    }
}

/// Join a relative name and its zone
pub fn fqdn(zone: &str, name: &str) -> String {
    format!("{}.{}", name, zone)
}

/// Canonical text of one address
pub fn canonicalize(record_type: RecordType, value: &str) -> Result<String> {
    Ok(record_type.parse_value(value)?.to_string())
}

/// Canonical form of a set of addresses; duplicates collapse
pub fn canonicalize_all<'a, I>(record_type: RecordType, values: I) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = &'a String>,
{
    values
        .into_iter()
        .map(|value| canonicalize(record_type, value))
        .collect()
}

/// Additions and removals that turn one address set into another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// `new − old`
    pub add: BTreeSet<String>,
    /// `old − new`
    pub remove: BTreeSet<String>,
}

impl ChangeSet {
    /// Plain set difference in both directions
    pub fn between(old: &BTreeSet<String>, new: &BTreeSet<String>) -> Self {
        Self {
            add: new.difference(old).cloned().collect(),
            remove: old.difference(new).cloned().collect(),
        }
    }

    /// Whether nothing needs to change
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Result of a successful read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The server holds exactly the expected addresses
    Present(BTreeSet<String>),
    /// The name does not exist; stored state was cleared
    Absent,
}

/// Reconciles record sets against one server
#[derive(Debug, Clone)]
pub struct Reconciler {
    client: Arc<AuthenticatedClient>,
}

impl Reconciler {
    /// Create a reconciler over a shared client
    pub fn new(client: Arc<AuthenticatedClient>) -> Self {
        Self { client }
    }

    /// Create or update, depending on whether `state` manages a record set
    pub async fn apply(&self, record: &RecordSet, state: &mut RecordState) -> Result<()> {
        if state.is_present() {
            let old = state.addresses.clone();
            self.update(record, &old, state).await
        } else {
            self.create(record, state).await.map(|_| ())
        }
    }

    /// Start managing `record` and insert all of its addresses
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The record set identity (its FQDN)
    /// - `Err(Error)`: The update failed; `state` is cleared
    pub async fn create(&self, record: &RecordSet, state: &mut RecordState) -> Result<String> {
        let fqdn = record.fqdn();
        tracing::info!("Creating {} record set {}", record.record_type, fqdn);

        state.id = Some(fqdn.clone());
        if let Err(e) = self.update(record, &BTreeSet::new(), state).await {
            state.clear();
            return Err(e);
        }
        Ok(fqdn)
    }

    /// Query the live addresses and compare them with `record.addresses`
    ///
    /// # Returns
    ///
    /// - `Ok(ReadOutcome::Present(_))`: No drift; `state.addresses` refreshed
    /// - `Ok(ReadOutcome::Absent)`: Name does not exist; `state` cleared
    /// - `Err(Error::Drift { .. })`: Live set differs; `state` cleared
    /// - `Err(Error::Query { .. })`: The query failed or returned another code
    pub async fn read(&self, record: &RecordSet, state: &mut RecordState) -> Result<ReadOutcome> {
        let fqdn = record.fqdn();
        let query = build_query(&fqdn, record.record_type).map_err(|e| Error::query(&fqdn, e))?;

        let response = self
            .client
            .exchange(&query.into(), true)
            .await
            .map_err(|e| Error::query(&fqdn, e))?;

        if response.rcode == crate::message::Rcode::NxDomain {
            tracing::info!("{} does not exist; forgetting stored state", fqdn);
            state.clear();
            return Ok(ReadOutcome::Absent);
        }
        if !response.rcode.is_success() {
            return Err(Error::query(&fqdn, Error::Rcode(response.rcode)));
        }

        let mut observed = BTreeSet::new();
        for answer in &response.answers {
            if answer.record_type != record.record_type.as_str() {
                return Err(Error::query(
                    &fqdn,
                    Error::protocol(format!(
                        "unexpected {} record {} in answer",
                        answer.record_type, answer.name
                    )),
                ));
            }
            observed.insert(
                canonicalize(record.record_type, &answer.value).map_err(|e| Error::query(&fqdn, e))?,
            );
        }

        let expected = canonicalize_all(record.record_type, &record.addresses)
            .map_err(|e| Error::query(&fqdn, e))?;
        if observed != expected {
            tracing::warn!(
                "{} drifted: expected {:?}, observed {:?}; forgetting stored state",
                fqdn,
                expected,
                observed
            );
            state.clear();
            return Err(Error::Drift {
                fqdn,
                expected: expected.into_iter().collect(),
                observed: observed.into_iter().collect(),
            });
        }

        tracing::debug!("{} matches: {:?}", fqdn, observed);
        state.addresses = observed.clone();
        state.touch();
        Ok(ReadOutcome::Present(observed))
    }

    /// Move the live record set from `old` to `record.addresses`
    ///
    /// Sends one update with a removal per address in `old − new` and an
    /// insertion per address in `new − old`, then reads back to verify.
    /// Does nothing at all when the two sets are equal.
    pub async fn update(
        &self,
        record: &RecordSet,
        old: &BTreeSet<String>,
        state: &mut RecordState,
    ) -> Result<()> {
        let fqdn = record.fqdn();
        let old = canonicalize_all(record.record_type, old).map_err(|e| Error::update(&fqdn, e))?;
        let new = canonicalize_all(record.record_type, &record.addresses)
            .map_err(|e| Error::update(&fqdn, e))?;

        let changes = ChangeSet::between(&old, &new);
        if changes.is_empty() {
            tracing::debug!("{} already up to date, skipping update", fqdn);
            return Ok(());
        }

        tracing::info!(
            "Updating {}: adding {:?}, removing {:?}",
            fqdn,
            changes.add,
            changes.remove
        );

        let mut update = build_update(&record.zone).map_err(|e| Error::update(&fqdn, e))?;
        for address in &changes.remove {
            update
                .add_removal(&fqdn, record.ttl, record.record_type, address)
                .map_err(|e| Error::update(&fqdn, e))?;
        }
        for address in &changes.add {
            update
                .add_insertion(&fqdn, record.ttl, record.record_type, address)
                .map_err(|e| Error::update(&fqdn, e))?;
        }

        let response = match self.client.exchange(&update.into(), true).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Update of {} failed: {}", fqdn, e);
                state.clear();
                return Err(Error::update(&fqdn, e));
            }
        };
        if !response.rcode.is_success() {
            tracing::error!("Update of {} rejected with {}", fqdn, response.rcode);
            state.clear();
            return Err(Error::update(&fqdn, Error::Rcode(response.rcode)));
        }

        let id = state.id.clone();
        match self.read(record, state).await? {
            ReadOutcome::Present(_) => Ok(()),
            // Removing every address can take the name with it
            ReadOutcome::Absent if new.is_empty() => {
                state.id = id;
                state.touch();
                Ok(())
            }
            ReadOutcome::Absent => Err(Error::update(
                &fqdn,
                Error::protocol("record set missing after a successful update"),
            )),
        }
    }

    /// Remove every record of `record.record_type` at the name
    pub async fn delete(&self, record: &RecordSet, state: &mut RecordState) -> Result<()> {
        let fqdn = record.fqdn();
        tracing::info!("Deleting {} record set {}", record.record_type, fqdn);

        let mut update = build_update(&record.zone).map_err(|e| Error::delete(&fqdn, e))?;
        update
            .add_removal_of_set(&fqdn, record.record_type)
            .map_err(|e| Error::delete(&fqdn, e))?;

        let response = self
            .client
            .exchange(&update.into(), true)
            .await
            .map_err(|e| Error::delete(&fqdn, e))?;
        if !response.rcode.is_success() {
            return Err(Error::delete(&fqdn, Error::Rcode(response.rcode)));
        }

        state.clear();
        Ok(())
    }
}
