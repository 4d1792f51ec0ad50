// # State Store Implementations
//
// Persistence for [`RecordState`](crate::traits::RecordState) between runs.

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

use crate::Error;
use crate::config::StateStoreConfig;
use crate::traits::StateStore;

/// Open the store selected by `config`
pub async fn open(config: &StateStoreConfig) -> Result<Box<dyn StateStore>, Error> {
    match config {
        StateStoreConfig::Memory => {
            tracing::debug!("Using in-memory state store");
            Ok(Box::new(MemoryStateStore::new()))
        }
        StateStoreConfig::File { path } => {
            tracing::debug!("Using file state store at {}", path);
            Ok(Box::new(FileStateStore::new(path).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RecordState;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_each_kind() {
        let memory = open(&StateStoreConfig::Memory).await.unwrap();
        assert!(memory.list().await.unwrap().is_empty());

        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let file = open(&StateStoreConfig::File {
            path: path.to_string_lossy().into_owned(),
        })
        .await
        .unwrap();

        let mut state = RecordState::new();
        state.id = Some("www.example.com.".to_string());
        file.set("www.example.com.", &state).await.unwrap();
        assert!(path.exists());
    }
}
