//! Durable key/value storage
//!
//! The candidate store is written under one fixed key. Keys are global, not
//! per workspace, so every workspace shares the same persisted map.
//!
//! # Disk Format
//!
//! [`FileKeyValueStore`] keeps one file per key:
//! - **Location**: `<data dir>/markdown-heading-server/v1/<key>.json`
//! - **Writes**: a temp file unique to each write, then rename, so neither a
//!   crash nor two overlapping writers ever leave a torn value

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;
use tracing::debug;

use super::{PersistenceError, Result};

/// Storage format version; bumping it moves persisted state to a fresh directory.
pub const STORAGE_VERSION: u32 = 1;

/// Distinguishes temp files of concurrent writes within this process.
static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `<path>.<pid>.<n>.tmp`, next to the final file so the rename stays on one filesystem
fn temp_path_for(path: &Path) -> PathBuf {
    let n = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.{}.tmp", std::process::id(), n));
    path.with_file_name(name)
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// File-backed store, one file per key.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    /// Default location: `<data dir>/markdown-heading-server/v{STORAGE_VERSION}/`
    ///
    /// Falls back to the temp directory when the platform has no data directory.
    pub fn default_dir() -> PathBuf {
        let base = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        base.join("markdown-heading-server")
            .join(format!("v{}", STORAGE_VERSION))
    }

    /// Opens (and creates if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|source| PersistenceError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        debug!("Opened key/value storage at {:?}", dir);
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => {
                debug!("Read {} bytes for key `{}` from {:?}", data.len(), key, path);
                Ok(Some(data))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        let io_error = |source: io::Error| PersistenceError::Io {
            key: key.to_string(),
            source,
        };

        // Write to disk atomically (write to temp file, then rename)
        let temp_path = temp_path_for(&path);
        fs::write(&temp_path, value).await.map_err(io_error)?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(e));
        }

        debug!("Wrote {} bytes for key `{}` to {:?}", value.len(), key, path);
        Ok(())
    }
}

/// In-memory store, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    values: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.values.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
