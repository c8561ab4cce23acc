//! Heading candidates: extraction, per-file scanning and the in-memory store.
//!
//! The pipeline is leaf first:
//! - [`extractor`] turns one line into zero or one candidate text
//! - [`scanner`] applies the extractor to every line of a document
//! - [`store`] keeps one [`FileRecord`] per known file

pub mod extractor;
pub mod model;
pub mod scanner;
pub mod store;

pub use extractor::{extract, is_candidate_line, TRIGGER};
pub use model::{Candidate, FileId, FileRecord};
pub use scanner::{scan, scan_text};
pub use store::CandidateStore;
