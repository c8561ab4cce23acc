//! In-memory candidate store
//!
//! One [`FileRecord`] per known file, keyed by [`FileId`]. Records are only
//! ever replaced whole; candidate lists of the same file are never merged.
//!
//! There is no removal: a file deleted from the workspace keeps its record
//! until an edit to the same path overwrites it.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, trace, warn};

use super::model::{Candidate, FileId, FileRecord};

/// Reassigns candidates that claim another file to the record's own file, so
/// every candidate's `source_file` equals the key it is stored under.
fn normalized(mut record: FileRecord) -> FileRecord {
    for candidate in &mut record.candidates {
        if candidate.source_file != record.file {
            warn!(
                "Candidate on line {} of {} claimed {}; reassigning",
                candidate.line_number, record.file, candidate.source_file
            );
            candidate.source_file = record.file.clone();
        }
    }
    record
}

#[derive(Debug, Default, Clone)]
pub struct CandidateStore {
    records: Arc<DashMap<FileId, Arc<FileRecord>>>,
}

impl CandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets every record at its key, overwriting existing entries.
    ///
    /// Used for the bulk workspace scan at startup.
    pub fn rebuild_all<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = FileRecord>,
    {
        let mut count = 0;
        for record in records {
            let record = normalized(record);
            self.records.insert(record.file.clone(), Arc::new(record));
            count += 1;
        }
        debug!("Rebuilt {} file records", count);
        count
    }

    /// Inserts each record only if its key is not present yet.
    ///
    /// Used when loading persisted state after the workspace scan, so fresh
    /// scan results always win over stale persisted ones. Returns the number
    /// of records inserted.
    pub fn merge_missing<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = FileRecord>,
    {
        let mut inserted = 0;
        for record in records {
            match self.records.entry(record.file.clone()) {
                Entry::Occupied(_) => {
                    trace!("Keeping existing record for {}", record.file);
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::new(normalized(record)));
                    inserted += 1;
                }
            }
        }
        debug!("Merged {} missing file records", inserted);
        inserted
    }

    /// Replaces the record stored under `record.file` unconditionally (last
    /// writer wins).
    pub fn update(&self, record: FileRecord) -> Arc<FileRecord> {
        let record = Arc::new(normalized(record));
        self.records.insert(record.file.clone(), record.clone());
        record
    }

    pub fn get(&self, file: &FileId) -> Option<Arc<FileRecord>> {
        self.records.get(file).map(|entry| entry.value().clone())
    }

    /// Flattens every record's candidates.
    ///
    /// File order follows the map's iteration order and is unspecified; line
    /// order is preserved within each file.
    pub fn all_candidates(&self) -> Vec<Candidate> {
        self.records
            .iter()
            .flat_map(|entry| entry.value().candidates.clone())
            .collect()
    }

    /// Snapshot of all records, for persistence.
    pub fn records(&self) -> Vec<Arc<FileRecord>> {
        self.records.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn candidate_count(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }
}
