//! Tab completion for `file:` tokens.
//!
//! Completion only operates on a recognized `file:<partial>` token in the
//! buffer. Matching filesystem entries narrow the partial path to the longest
//! unambiguous common prefix; a unique directory match gains a trailing
//! separator so the next Tab descends into it.

use std::path::{MAIN_SEPARATOR, Path};

use super::editor::EditorState;

const FILE_TOKEN: &str = "file:";

/// Attempts completion at the cursor. Returns the matching entry names so the
/// caller can list them when the match is ambiguous.
pub fn complete_file_token(state: &mut EditorState) -> Vec<String> {
    let cursor_byte = state
        .buffer
        .char_indices()
        .nth(state.cursor)
        .map_or(state.buffer.len(), |(i, _)| i);
    let head = &state.buffer[..cursor_byte];

    let Some(token_at) = head.rfind(FILE_TOKEN) else {
        return Vec::new();
    };
    let partial = &head[token_at + FILE_TOKEN.len()..];
    if partial.contains(' ') {
        // Cursor is past the end of the file token
        return Vec::new();
    }

    // Owned copies: the buffer is mutated below while these are still needed
    let (dir, stem): (String, String) = match partial.rfind(MAIN_SEPARATOR) {
        Some(i) => (partial[..=i].to_string(), partial[i + 1..].to_string()),
        None => (String::new(), partial.to_string()),
    };
    let search_dir = if dir.is_empty() {
        ".".to_string()
    } else {
        dir
    };

    let Ok(entries) = std::fs::read_dir(&search_dir) else {
        return Vec::new();
    };
    let mut matches: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.starts_with(&stem))
        .collect();
    matches.sort();

    if matches.is_empty() {
        return matches;
    }

    let prefix = common_prefix(&matches);
    if prefix.len() > stem.len() {
        let extension = &prefix[stem.len()..];
        for c in extension.chars() {
            let at = state
                .buffer
                .char_indices()
                .nth(state.cursor)
                .map_or(state.buffer.len(), |(i, _)| i);
            state.buffer.insert(at, c);
            state.cursor += 1;
        }
    }

    if matches.len() == 1 {
        let full = Path::new(&search_dir).join(&matches[0]);
        if full.is_dir() {
            let at = state
                .buffer
                .char_indices()
                .nth(state.cursor)
                .map_or(state.buffer.len(), |(i, _)| i);
            state.buffer.insert(at, MAIN_SEPARATOR);
            state.cursor += 1;
        }
        return Vec::new();
    }
    matches
}

/// Longest common prefix of a non-empty, sorted candidate list.
fn common_prefix(candidates: &[String]) -> String {
    let first = &candidates[0];
    let last = &candidates[candidates.len() - 1];
    first
        .char_indices()
        .zip(last.chars())
        .take_while(|((_, a), b)| a == b)
        .map(|((_, a), _)| a)
        .collect()
}
