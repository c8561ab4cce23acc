/// Character that marks a heading-like line and triggers completion.
pub const TRIGGER: char = '#';

/// Returns `true` when `line` contains the trigger character anywhere.
pub fn is_candidate_line(line: &str) -> bool {
    line.contains(TRIGGER)
}

/// Extracts the candidate text of a single line.
///
/// Lines without `#` yield `None`. Otherwise every `#` is removed and the
/// rest is trimmed. A line made only of `#` yields `Some("")`.
pub fn extract(line: &str) -> Option<String> {
    if !is_candidate_line(line) {
        return None;
    }
    Some(line.replace(TRIGGER, "").trim().to_string())
}
