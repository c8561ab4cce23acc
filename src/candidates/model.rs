use std::fmt;
use std::path::Path;
use std::time::SystemTime;

use tower_lsp::lsp_types::Url;

/// Identifier of a file known to the store.
///
/// For `file://` URIs this is the filesystem path, so completion notes show a
/// readable location. Any other URI keeps its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn from_uri(uri: &Url) -> Self {
        match uri.to_file_path() {
            Ok(path) => Self::from_path(&path),
            Err(()) => Self(uri.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A cleaned heading text found on a given line of a given file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// 0-based line index within the source file
    pub line_number: u32,
    /// Line text with every `#` removed, then trimmed
    pub text: String,
    pub source_file: FileId,
}

/// All candidates extracted from one file, in line order.
///
/// Candidates are not deduplicated: two identical heading lines produce two
/// candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub file: FileId,
    pub candidates: Vec<Candidate>,
    pub last_updated: SystemTime,
}

impl FileRecord {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
