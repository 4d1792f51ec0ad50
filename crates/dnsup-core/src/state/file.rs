// # File State Store
//
// JSON file implementation of StateStore.
//
// ## Durability
//
// - Every change is written immediately: temp file, then rename
// - The previous file is copied to `<name>.backup` before each rename
// - A state file that no longer parses is replaced by its backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": {
//     "www.example.com.": {
//       "id": "www.example.com.",
//       "addresses": ["1.2.3.4"],
//       "last_updated": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{RecordState, StateStore};

/// State file format version
const STATE_FILE_VERSION: &str = "1.0";

type Records = BTreeMap<String, RecordState>;

/// File-based state store with backup recovery
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    records: Arc<RwLock<Records>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StateFile {
    version: String,
    #[serde(default)]
    records: Records,
}

impl FileStateStore {
    /// Open (or start) a state file at `path`
    ///
    /// Creates missing parent directories. A corrupted file falls back to
    /// its backup, and to empty state when the backup is unusable too.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state_store(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let records = Self::load_with_recovery(&path).await?;
        tracing::debug!(
            "Loaded {} record state(s) from {}",
            records.len(),
            path.display()
        );

        Ok(Self {
            path,
            records: Arc::new(RwLock::new(records)),
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_with_recovery(path: &Path) -> Result<Records, Error> {
        let Some(content) = Self::read(path).await? else {
            return Ok(Records::new());
        };

        let err = match Self::parse(path, &content) {
            Ok(records) => return Ok(records),
            Err(e) => e,
        };
        tracing::warn!(
            "State file {} is corrupted: {}. Attempting recovery from backup.",
            path.display(),
            err
        );

        let backup = Self::backup_path(path);
        let recovered = match Self::read(&backup).await {
            Ok(Some(content)) => Self::parse(&backup, &content),
            Ok(None) => {
                tracing::warn!("No backup file found. Starting with empty state.");
                return Ok(Records::new());
            }
            Err(e) => Err(e),
        };

        match recovered {
            Ok(records) => {
                tracing::info!("Recovered {} record state(s) from backup", records.len());
                if let Err(e) = fs::copy(&backup, path).await {
                    tracing::error!("Failed to restore state file from backup: {}", e);
                }
                Ok(records)
            }
            Err(e) => {
                tracing::error!("Backup also unusable: {}. Starting with empty state.", e);
                Ok(Records::new())
            }
        }
    }

    async fn read(path: &Path) -> Result<Option<String>, Error> {
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(path).await.map(Some).map_err(|e| {
            Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            ))
        })
    }

    fn parse(path: &Path, content: &str) -> Result<Records, Error> {
        let file: StateFile = serde_json::from_str(content).map_err(|e| {
            Error::state_store(format!(
                "Failed to parse state file {}: {}",
                path.display(),
                e
            ))
        })?;

        if file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Loading anyway.",
                STATE_FILE_VERSION,
                file.version
            );
        }
        Ok(file.records)
    }

    async fn write(&self, records: &Records) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(&StateFile {
            version: STATE_FILE_VERSION.to_string(),
            records: records.clone(),
        })?;

        let temp = self.path.with_extension("tmp");
        let io_err = |action: &str, e: std::io::Error| {
            Error::state_store(format!("Failed to {} {}: {}", action, temp.display(), e))
        };
        {
            let mut file = fs::File::create(&temp)
                .await
                .map_err(|e| io_err("create", e))?;
            file.write_all(json.as_bytes())
                .await
                .map_err(|e| io_err("write", e))?;
            file.sync_all().await.map_err(|e| io_err("sync", e))?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to {}", self.path.display());
        Ok(())
    }

    fn backup_path(path: &Path) -> PathBuf {
        path.with_extension("backup")
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, key: &str) -> Result<Option<RecordState>, Error> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, state: &RecordState) -> Result<(), Error> {
        let mut records = self.records.write().await;
        records.insert(key.to_string(), state.clone());
        self.write(&records).await
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut records = self.records.write().await;
        if records.remove(key).is_none() {
            return Ok(());
        }
        self.write(&records).await
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every change is already on disk
        Ok(())
    }
}
