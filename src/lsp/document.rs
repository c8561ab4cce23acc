use ropey::{Rope, RopeSlice};

use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent};

pub use crate::lsp::models::{LspDocument, LspDocumentState};

/// Strips the line break (`\n`, `\r\n` or `\r`) from the end of a rope line.
fn without_line_break(line: RopeSlice<'_>) -> RopeSlice<'_> {
    let mut end = line.len_chars();
    if end > 0 && line.char(end - 1) == '\n' {
        end -= 1;
    }
    if end > 0 && line.char(end - 1) == '\r' {
        end -= 1;
    }
    line.slice(..end)
}

/// Converts an LSP position to a char index in the Rope.
///
/// `position.character` counts UTF-16 code units. Positions past the end of a
/// line clamp to the end of its content; lines past the end clamp to the end
/// of the text.
fn position_to_char_index(position: &Position, text: &Rope) -> usize {
    let line = position.line as usize;
    if line >= text.len_lines() {
        return text.len_chars();
    }
    let line_start = text.line_to_char(line);
    let content = without_line_break(text.line(line));
    let utf16_units = (position.character as usize).min(content.len_utf16_cu());
    line_start + content.utf16_cu_to_char(utf16_units)
}

/// Returns the text of line `line` without its line ending.
pub fn line_text(text: &Rope, line: usize) -> Option<String> {
    text.get_line(line).map(|slice| without_line_break(slice).to_string())
}

impl LspDocumentState {
    pub fn new(text: &str, version: i32) -> Self {
        Self {
            text: Rope::from_str(text),
            version,
        }
    }

    /// Applies a list of content changes to the document state.
    /// Returns the updated text if the version is newer, otherwise an error.
    pub fn apply(
        &mut self,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32
    ) -> Result<String, String> {
        if version <= self.version {
            return Err(format!("Version {} not newer than {}", version, self.version));
        }
        for change in &changes {
            if let Some(range) = change.range {
                let start = position_to_char_index(&range.start, &self.text);
                let end = position_to_char_index(&range.end, &self.text).max(start);
                self.text.remove(start..end);
                self.text.insert(start, &change.text);
            } else {
                self.text = Rope::from_str(&change.text);
            }
        }
        self.version = version;
        Ok(self.text.to_string())
    }
}

impl LspDocument {
    pub fn new(id: u32, text: &str, version: i32) -> Self {
        Self {
            id,
            state: tokio::sync::RwLock::new(LspDocumentState::new(text, version)),
        }
    }

    /// Returns the current text of the document as a string.
    pub async fn text(&self) -> String {
        self.state.read().await.text.to_string()
    }

    /// Returns the current version of the document.
    pub async fn version(&self) -> i32 {
        self.state.read().await.version
    }

    /// Returns the text of the given line, if it exists.
    pub async fn line(&self, line: usize) -> Option<String> {
        line_text(&self.state.read().await.text, line)
    }

    /// Applies changes to the document, returning the new full text.
    pub async fn apply(
        &self,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32
    ) -> Option<String> {
        let mut state = self.state.write().await;
        state.apply(changes, version).ok()
    }
}
