// # Memory State Store
//
// In-memory implementation of StateStore.
//
// Nothing survives a restart: the next apply after a restart sees no
// managed record set and issues a create, which inserts only what is
// missing on the server side once verified.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{RecordState, StateStore};

/// In-memory state store
///
/// States live in a HashMap behind a RwLock; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<HashMap<String, RecordState>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored states
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<RecordState>, Error> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, state: &RecordState) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .insert(key.to_string(), state.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.inner.write().await.remove(key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        let mut keys: Vec<String> = guard.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
