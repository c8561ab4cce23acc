//! Heading index: the candidate store together with its persistence
//!
//! This is the host-agnostic entry point. The LSP backend (or any other
//! integration layer) calls:
//! - [`HeadingIndex::seed`] once with the workspace root
//! - [`HeadingIndex::restore`] right after, to merge persisted records
//! - [`HeadingIndex::on_document_changed`] for every edit
//! - [`HeadingIndex::persist`] to write the whole store
//! - [`HeadingIndex::completions`] on completion requests

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::candidates::{scan_text, CandidateStore, FileId, FileRecord};
use crate::completion::{provide_completions, Suggestion};
use crate::persistence::{self, PersistenceBridge};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("workspace scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Returns `true` when `path` has one of `extensions` (case-insensitive).
pub fn is_markdown_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Enumerates markdown files below `root`, recursively.
///
/// Entries that cannot be read are skipped with a warning.
pub fn find_markdown_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|result| match result {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Failed to read directory entry under {:?}: {}", root, e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_markdown_file(entry.path(), extensions))
        .map(|entry| entry.into_path())
        .collect()
}

/// Reads one file and scans it, stamped with its modification time.
pub fn scan_file(path: &Path) -> Result<FileRecord, WorkspaceError> {
    let read_error = |source: io::Error| WorkspaceError::Read {
        path: path.to_path_buf(),
        source,
    };
    let modified = std::fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .map_err(read_error)?;
    let text = std::fs::read_to_string(path).map_err(read_error)?;
    Ok(scan_text(&FileId::from_path(path), &text, modified))
}

/// Scans every markdown file below `root` in parallel.
///
/// Files that fail to read are left out, so they simply have no candidates.
pub fn scan_workspace(root: &Path, extensions: &[String]) -> Vec<FileRecord> {
    let start = Instant::now();
    let paths = find_markdown_files(root, extensions);
    info!("Found {} markdown files to scan in {:?}", paths.len(), root);

    let records: Vec<FileRecord> = paths
        .par_iter()
        .filter_map(|path| match scan_file(path) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping file: {}", e);
                None
            }
        })
        .collect();

    info!("Scanned {} files in {:?}", records.len(), start.elapsed());
    records
}

#[derive(Debug, Clone)]
pub struct HeadingIndex {
    store: CandidateStore,
    bridge: PersistenceBridge,
}

impl HeadingIndex {
    pub fn new(bridge: PersistenceBridge) -> Self {
        Self {
            store: CandidateStore::new(),
            bridge,
        }
    }

    pub fn store(&self) -> &CandidateStore {
        &self.store
    }

    /// Scans the workspace below `root` and stores every record, replacing
    /// any record already present for the same file.
    pub async fn seed(&self, root: &Path, extensions: &[String]) -> Result<usize, WorkspaceError> {
        let root = root.to_path_buf();
        let extensions = extensions.to_vec();
        let records = tokio::task::spawn_blocking(move || scan_workspace(&root, &extensions)).await?;
        Ok(self.store.rebuild_all(records))
    }

    /// Merges persisted records for files the scan did not produce.
    ///
    /// Unreadable or malformed persisted state is logged and ignored.
    pub async fn restore(&self) -> usize {
        match self.bridge.restore().await {
            Ok(records) => self.store.merge_missing(records),
            Err(e) => {
                warn!("Ignoring persisted candidates: {}", e);
                0
            }
        }
    }

    /// Re-scans the whole text of a changed document and replaces its record.
    pub fn on_document_changed(&self, file: FileId, text: &str, timestamp: SystemTime) -> Arc<FileRecord> {
        let record = scan_text(&file, text, timestamp);
        debug!("Re-scanned {}: {} candidates", file, record.len());
        self.store.update(record)
    }

    /// Writes the entire store through the persistence bridge.
    pub async fn persist(&self) -> persistence::Result<()> {
        self.bridge.persist(&self.store).await
    }

    pub fn completions(&self, current_line: &str) -> Vec<Suggestion> {
        provide_completions(current_line, &self.store)
    }
}
