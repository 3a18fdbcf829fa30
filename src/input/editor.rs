//! Editable line buffer with cursor and recall history.
//!
//! The editor is an explicit state value plus pure transition functions keyed
//! by decoded keystroke. No terminal I/O happens here; rendering and raw-mode
//! handling live in the [`super::LineEditor`] wrapper so the transitions stay
//! testable byte-for-byte.

use super::keys::Keystroke;

/// Result of feeding one keystroke to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    /// Line still being edited.
    InProgress,
    /// A line was committed with Enter.
    LineReady(String),
}

/// Explicit editor state threaded through every transition.
#[derive(Debug, Default)]
pub struct EditorState {
    /// Current line contents.
    pub buffer: String,
    /// Cursor position as a character offset into `buffer`.
    pub cursor: usize,
    /// Prompt text rendered before the buffer.
    pub prompt: String,
    /// Committed lines, oldest first.
    pub history: Vec<String>,
    /// Replay cursor; `history.len()` means "one past newest".
    pub history_cursor: usize,
    /// One-shot: Enter on an empty buffer commits an affirmative default.
    pub default_yes: bool,
    /// One-shot: this prompt is transient and never recorded in history.
    pub transient: bool,
    /// One-shot: erase the prompt line on commit instead of advancing.
    pub suppress_newline: bool,
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the buffer and one-shot flags for the next prompt.
    pub fn begin(&mut self, prompt: &str) {
        self.buffer.clear();
        self.cursor = 0;
        self.prompt = prompt.to_string();
        self.history_cursor = self.history.len();
        self.default_yes = false;
        self.transient = false;
        self.suppress_newline = false;
    }

    /// Byte index of the character offset `at`.
    fn byte_index(&self, at: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(at)
            .map_or(self.buffer.len(), |(i, _)| i)
    }

    fn char_count(&self) -> usize {
        self.buffer.chars().count()
    }
}

/// Applies one decoded keystroke to the editor state.
///
/// Every transition is idempotent against buffer and cursor bounds: moving
/// past either end of the buffer or the history is a no-op.
pub fn apply(state: &mut EditorState, key: Keystroke) -> Poll {
    match key {
        Keystroke::Insert(c) => {
            let at = state.byte_index(state.cursor);
            state.buffer.insert(at, c);
            state.cursor += 1;
        }
        Keystroke::Backspace => {
            if state.cursor > 0 {
                let at = state.byte_index(state.cursor - 1);
                state.buffer.remove(at);
                state.cursor -= 1;
            }
        }
        Keystroke::Delete => {
            if state.cursor < state.char_count() {
                let at = state.byte_index(state.cursor);
                state.buffer.remove(at);
            }
        }
        Keystroke::CursorLeft => {
            state.cursor = state.cursor.saturating_sub(1);
        }
        Keystroke::CursorRight => {
            if state.cursor < state.char_count() {
                state.cursor += 1;
            }
        }
        Keystroke::Home => state.cursor = 0,
        Keystroke::End => state.cursor = state.char_count(),
        Keystroke::HistoryPrev => recall_previous(state),
        Keystroke::HistoryNext => recall_next(state),
        Keystroke::Enter => return commit(state),
        Keystroke::Tab | Keystroke::Ignored => {}
    }
    Poll::InProgress
}

fn recall_previous(state: &mut EditorState) {
    if state.history_cursor == 0 {
        return;
    }
    state.history_cursor -= 1;
    state.buffer = state.history[state.history_cursor].clone();
    state.cursor = state.char_count();
}

fn recall_next(state: &mut EditorState) {
    if state.history_cursor >= state.history.len() {
        return;
    }
    state.history_cursor += 1;
    state.buffer = state
        .history
        .get(state.history_cursor)
        .cloned()
        .unwrap_or_default();
    state.cursor = state.char_count();
}

/// Commit semantics for Enter.
///
/// An empty buffer commits only when the prompt carries an affirmative
/// default (yes/no prompts); otherwise the editor stays in progress and the
/// caller re-prompts.
fn commit(state: &mut EditorState) -> Poll {
    if state.buffer.is_empty() {
        if state.default_yes {
            return Poll::LineReady(String::new());
        }
        return Poll::InProgress;
    }

    let line = std::mem::take(&mut state.buffer);
    state.cursor = 0;

    if !state.transient && state.history.last().map(String::as_str) != Some(line.as_str()) {
        state.history.push(line.clone());
    }
    state.history_cursor = state.history.len();

    Poll::LineReady(line)
}
