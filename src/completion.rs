//! Completion adapter
//!
//! Turns the candidate store into completion suggestions for the current line.
//! Suggestions are offered only when the line contains `#`; then every
//! candidate of every file is returned, without prefix filtering, ranking or
//! deduplication.

use tower_lsp::lsp_types::{Command, CompletionItem, CompletionItemKind, Documentation};

use crate::candidates::{is_candidate_line, CandidateStore};

/// Command the editor runs after inserting a suggestion, reopening the list.
pub const RETRIGGER_COMMAND: &str = "editor.action.triggerSuggest";
pub const RETRIGGER_TITLE: &str = "Re-trigger completions...";

/// A completion suggestion derived from one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub label: String,
    pub insert_text: String,
    /// Source file identifier of the candidate
    pub documentation_note: String,
    pub post_insert_command: Command,
}

fn retrigger_command() -> Command {
    Command {
        title: RETRIGGER_TITLE.to_string(),
        command: RETRIGGER_COMMAND.to_string(),
        arguments: None,
    }
}

pub fn provide_completions(current_line: &str, store: &CandidateStore) -> Vec<Suggestion> {
    if !is_candidate_line(current_line) {
        return Vec::new();
    }

    store
        .all_candidates()
        .into_iter()
        .map(|candidate| Suggestion {
            label: candidate.text.clone(),
            insert_text: candidate.text,
            documentation_note: candidate.source_file.to_string(),
            post_insert_command: retrigger_command(),
        })
        .collect()
}

impl From<Suggestion> for CompletionItem {
    fn from(suggestion: Suggestion) -> Self {
        CompletionItem {
            label: suggestion.label,
            kind: Some(CompletionItemKind::TEXT),
            insert_text: Some(suggestion.insert_text),
            documentation: Some(Documentation::String(suggestion.documentation_note)),
            command: Some(suggestion.post_insert_command),
            ..Default::default()
        }
    }
}
