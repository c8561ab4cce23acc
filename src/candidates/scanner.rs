use std::time::SystemTime;

use super::extractor::extract;
use super::model::{Candidate, FileId, FileRecord};

/// Scans the lines of one document and collects its candidates.
///
/// Line numbers are the 0-based indices of the lines in `lines`, so they are
/// strictly increasing. Lines without `#` produce nothing.
pub fn scan<I, S>(file: &FileId, lines: I, timestamp: SystemTime) -> FileRecord
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let candidates = lines
        .into_iter()
        .enumerate()
        .filter_map(|(index, line)| {
            extract(line.as_ref()).map(|text| Candidate {
                line_number: index as u32,
                text,
                source_file: file.clone(),
            })
        })
        .collect();

    FileRecord {
        file: file.clone(),
        candidates,
        last_updated: timestamp,
    }
}

/// Splits `text` into lines on `\n`, `\r\n` and lone `\r`.
///
/// These are the same breaks the open-document rope uses, so line numbers of
/// scanned candidates match the lines the editor addresses. A trailing break
/// yields a final empty line.
pub fn lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(text);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.find(['\n', '\r']) {
            Some(index) => {
                let break_len = if current[index..].starts_with("\r\n") { 2 } else { 1 };
                rest = Some(&current[index + break_len..]);
                Some(&current[..index])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

/// Scans a whole document text.
pub fn scan_text(file: &FileId, text: &str, timestamp: SystemTime) -> FileRecord {
    scan(file, lines(text), timestamp)
}
