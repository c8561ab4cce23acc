//! Serialization of the candidate store to durable key/value storage
//!
//! The persisted form is a JSON object keyed by file identifier:
//!
//! ```text
//! {
//!   "/notes/a.md": {
//!     "candidates": [{ "lineNumber": 0, "line": "Title", "filePath": "/notes/a.md" }],
//!     "timestamp": 1700000000000
//!   }
//! }
//! ```
//!
//! Timestamps are milliseconds since the Unix epoch, negative before it, so
//! they keep millisecond precision. The whole store is written on every save,
//! never a delta.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::candidates::{Candidate, CandidateStore, FileId, FileRecord};

use super::kv::KeyValueStore;
use super::{PersistenceError, Result};

/// Key under which the store is persisted unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "changedFiles";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedCandidate {
    line_number: u32,
    line: String,
    file_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRecord {
    candidates: Vec<PersistedCandidate>,
    timestamp: i64,
}

fn to_epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_millis()).map_or(i64::MIN, |ms| -ms),
    }
}

fn from_epoch_millis(millis: i64) -> SystemTime {
    let offset = Duration::from_millis(millis.unsigned_abs());
    let time = if millis >= 0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    };
    time.unwrap_or(UNIX_EPOCH)
}

type PersistedStore = BTreeMap<String, PersistedRecord>;

/// Serializes every record of `store`.
pub fn save(store: &CandidateStore) -> Result<Vec<u8>> {
    let persisted: PersistedStore = store
        .records()
        .iter()
        .map(|record| {
            let candidates = record
                .candidates
                .iter()
                .map(|c| PersistedCandidate {
                    line_number: c.line_number,
                    line: c.text.clone(),
                    file_path: c.source_file.as_str().to_string(),
                })
                .collect();
            (
                record.file.as_str().to_string(),
                PersistedRecord {
                    candidates,
                    timestamp: to_epoch_millis(record.last_updated),
                },
            )
        })
        .collect();

    serde_json::to_vec(&persisted).map_err(PersistenceError::Encode)
}

/// Deserializes persisted records.
///
/// A candidate whose `filePath` differs from its record key is reassigned to
/// the key, so every record only holds its own file's candidates.
pub fn load(data: &[u8]) -> Result<Vec<FileRecord>> {
    let persisted: PersistedStore = serde_json::from_slice(data).map_err(PersistenceError::Decode)?;

    let records = persisted
        .into_iter()
        .map(|(key, record)| {
            let file = FileId::new(key);
            let candidates = record
                .candidates
                .into_iter()
                .map(|c| {
                    if c.file_path != file.as_str() {
                        warn!(
                            "Persisted candidate on line {} claims {} but is stored under {}",
                            c.line_number, c.file_path, file
                        );
                    }
                    Candidate {
                        line_number: c.line_number,
                        text: c.line,
                        source_file: file.clone(),
                    }
                })
                .collect();
            FileRecord {
                file,
                candidates,
                last_updated: from_epoch_millis(record.timestamp),
            }
        })
        .collect();

    Ok(records)
}

/// Reads and writes the candidate store under a fixed key.
#[derive(Clone)]
pub struct PersistenceBridge {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl std::fmt::Debug for PersistenceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceBridge")
            .field("key", &self.key)
            .finish()
    }
}

impl PersistenceBridge {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    /// Writes the entire store.
    pub async fn persist(&self, store: &CandidateStore) -> Result<()> {
        let data = save(store)?;
        self.kv.set(&self.key, &data).await?;
        debug!("Persisted {} file records under `{}`", store.len(), self.key);
        Ok(())
    }

    /// Reads previously persisted records; an absent key yields no records.
    pub async fn restore(&self) -> Result<Vec<FileRecord>> {
        match self.kv.get(&self.key).await? {
            Some(data) => {
                let records = load(&data)?;
                info!("Loaded {} persisted file records from `{}`", records.len(), self.key);
                Ok(records)
            }
            None => {
                debug!("No persisted state under `{}`", self.key);
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::scan;
    use crate::persistence::MemoryKeyValueStore;

    fn sample_store() -> CandidateStore {
        let store = CandidateStore::new();
        let t = SystemTime::UNIX_EPOCH + Duration::new(1_700_000_000, 123_000_000);
        store.rebuild_all([
            scan(&FileId::new("/notes/a.md"), ["# Title", "body", "## Sub heading"], t),
            scan(&FileId::new("/notes/b.md"), ["####", "# Title"], t + Duration::from_secs(5)),
            scan(&FileId::new("/notes/c.md"), ["no headings"], t),
        ]);
        store
    }

    fn sorted(mut records: Vec<FileRecord>) -> Vec<FileRecord> {
        records.sort_by(|a, b| a.file.cmp(&b.file));
        records
    }

    #[test]
    fn test_load_of_save_reconstructs_records() {
        let store = sample_store();
        let data = save(&store).unwrap();
        let loaded = sorted(load(&data).unwrap());

        let expected = sorted(store.records().iter().map(|r| (**r).clone()).collect());
        assert_eq!(loaded, expected);
    }

    #[test]
    fn test_save_uses_plain_mapping() {
        let data = save(&sample_store()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&data).unwrap();

        let a = &value["/notes/a.md"];
        assert_eq!(a["candidates"][1]["lineNumber"], 2);
        assert_eq!(a["candidates"][1]["line"], "Sub heading");
        assert_eq!(a["candidates"][1]["filePath"], "/notes/a.md");
        assert_eq!(a["timestamp"], 1_700_000_000_123i64);
        assert_eq!(value["/notes/c.md"]["candidates"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_load_reassigns_foreign_candidates() {
        let data = br#"{
            "/x.md": {
                "candidates": [{ "lineNumber": 3, "line": "Moved", "filePath": "/y.md" }],
                "timestamp": 10000
            }
        }"#;
        let records = load(data).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].candidates[0].source_file.as_str(), "/x.md");
        assert_eq!(records[0].last_updated, SystemTime::UNIX_EPOCH + Duration::from_secs(10));
    }

    #[test]
    fn test_timestamps_before_the_epoch_are_saved() {
        let store = CandidateStore::new();
        let before_epoch = UNIX_EPOCH - Duration::from_millis(86_400_250);
        store.rebuild_all([scan(&FileId::new("/old.md"), ["# Old"], before_epoch)]);

        let data = save(&store).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(value["/old.md"]["timestamp"], -86_400_250i64);
        assert_eq!(load(&data).unwrap()[0].last_updated, before_epoch);
    }

    #[test]
    fn test_load_rejects_malformed_state() {
        assert!(matches!(load(b"not json"), Err(PersistenceError::Decode(_))));
        let missing_timestamp = br#"{ "/x.md": { "candidates": [] } }"#;
        assert!(matches!(load(missing_timestamp), Err(PersistenceError::Decode(_))));
    }

    #[tokio::test]
    async fn test_bridge_persist_and_restore() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let bridge = PersistenceBridge::new(kv.clone(), DEFAULT_STORAGE_KEY);

        assert!(bridge.restore().await.unwrap().is_empty());

        let store = sample_store();
        bridge.persist(&store).await.unwrap();
        assert_eq!(kv.len(), 1);

        let restored = bridge.restore().await.unwrap();
        assert_eq!(restored.len(), 3);
    }
}
