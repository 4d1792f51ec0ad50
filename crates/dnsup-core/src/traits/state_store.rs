// # State Store Trait
//
// Defines the interface for persisting reconciled record state between runs.
//
// ## Purpose
//
// The reconciler keeps what it last observed for a record set in a
// [`RecordState`]. A store keeps those states across process restarts so
// the next `read` or `update` starts from the right baseline.
//
// ## Implementations
//
// - Memory: lost on restart
// - File: JSON, atomic write-then-rename with backup recovery

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Stored state of one managed record set
///
/// An empty `id` means the record set is not (or no longer) managed.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RecordState {
    /// Identity of the managed record set (its FQDN), once created
    #[serde(default)]
    pub id: Option<String>,
    /// Canonical addresses last known to be live
    #[serde(default)]
    pub addresses: BTreeSet<String>,
    /// Timestamp of the last successful change or read
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl RecordState {
    /// Fresh state with nothing managed
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a record set is currently managed
    pub fn is_present(&self) -> bool {
        self.id.is_some()
    }

    /// Forget the managed record set entirely
    pub fn clear(&mut self) {
        self.id = None;
        self.addresses.clear();
        self.last_updated = None;
    }

    /// Record a successful observation
    pub(crate) fn touch(&mut self) {
        self.last_updated = Some(Utc::now());
    }
}

/// Trait for state store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
/// They perform storage I/O only; deciding what to store belongs to the
/// reconciler.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the stored state for a key
    ///
    /// # Returns
    ///
    /// - `Ok(Some(RecordState))`: The stored state
    /// - `Ok(None)`: Nothing stored
    /// - `Err(Error)`: Storage error
    async fn get(&self, key: &str) -> Result<Option<RecordState>, crate::Error>;

    /// Store the state for a key, replacing any previous value
    async fn set(&self, key: &str, state: &RecordState) -> Result<(), crate::Error>;

    /// Delete the state for a key
    ///
    /// Deleting a key that does not exist is not an error.
    async fn delete(&self, key: &str) -> Result<(), crate::Error>;

    /// List all stored keys
    async fn list(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
