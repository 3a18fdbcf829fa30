//! InputEngine: raw keystrokes to editable, recallable command lines.
//!
//! No line-discipline library is involved: the terminal is switched to raw
//! mode (crossterm toggles it, an RAII guard restores it) and incoming bytes
//! are decoded by [`keys::Decoder`], then applied to an explicit
//! [`EditorState`] by the pure transitions in [`editor`]. The pollable core is
//! [`LineEditor::feed_byte`]; `read_line` is the blocking loop over it.

pub mod complete;
pub mod editor;
pub mod keys;

pub use editor::{EditorState, Poll};
pub use keys::{Decoder, Keystroke};

use std::io::{self, BufRead, IsTerminal, Read, Write};

use console::style;
use tracing::trace;

use crate::error::Result;

/// Restores cooked mode when dropped, whatever path exits the read loop.
struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    fn enable(interactive: bool) -> Result<Self> {
        if interactive {
            crossterm::terminal::enable_raw_mode()
                .map_err(|e| crate::error::LibrarianError::Other(format!("raw mode: {e}")))?;
        }
        Ok(Self {
            active: interactive,
        })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}

/// Interactive line editor over stdin/stdout.
pub struct LineEditor {
    state: EditorState,
    decoder: Decoder,
    /// Ambiguous completion candidates awaiting display.
    pending_listing: Vec<String>,
    interactive: bool,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditor {
    pub fn new() -> Self {
        Self {
            state: EditorState::new(),
            decoder: Decoder::new(),
            pending_listing: Vec::new(),
            interactive: io::stdin().is_terminal() && io::stdout().is_terminal(),
        }
    }

    /// Reads one command line, with full editing and history recall.
    ///
    /// Returns `None` when the input stream is closed.
    pub fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.state.begin(prompt);
        self.run()
    }

    /// One-shot question that is never recorded in history.
    pub fn read_transient(&mut self, prompt: &str) -> Result<Option<String>> {
        self.state.begin(prompt);
        self.state.transient = true;
        self.run()
    }

    /// Yes/no question; Enter on an empty buffer is an affirmative default.
    pub fn read_confirm(&mut self, prompt: &str) -> Result<bool> {
        self.state.begin(prompt);
        self.state.transient = true;
        self.state.suppress_newline = true;
        self.state.default_yes = true;
        let answer = self.run()?;
        Ok(answer.is_some_and(|a| {
            let a = a.trim().to_ascii_lowercase();
            a.is_empty() || a == "y" || a == "yes"
        }))
    }

    /// Feeds a single raw byte through decode and editor transition.
    ///
    /// This is the non-blocking poll contract: it returns promptly with
    /// `Poll::InProgress` until a full line commits.
    pub fn feed_byte(&mut self, byte: u8) -> Poll {
        let Some(key) = self.decoder.feed(byte) else {
            return Poll::InProgress;
        };
        trace!(?key, "decoded keystroke");
        if key == Keystroke::Tab {
            self.pending_listing = complete::complete_file_token(&mut self.state);
            return Poll::InProgress;
        }
        editor::apply(&mut self.state, key)
    }

    fn run(&mut self) -> Result<Option<String>> {
        if !self.interactive {
            return self.run_plain();
        }

        let _guard = RawModeGuard::enable(true)?;
        self.render()?;

        let mut stdin = io::stdin().lock();
        let mut byte = [0u8; 1];
        loop {
            if stdin.read(&mut byte)? == 0 {
                // Stream closed mid-line
                print!("\r\n");
                io::stdout().flush()?;
                return Ok(None);
            }
            match self.feed_byte(byte[0]) {
                Poll::LineReady(line) => {
                    if self.state.suppress_newline {
                        // Transient prompt: wipe the line rather than scroll
                        print!("\r\x1b[K");
                    } else {
                        print!("\r\n");
                    }
                    io::stdout().flush()?;
                    return Ok(Some(line));
                }
                Poll::InProgress => {
                    if !self.pending_listing.is_empty() {
                        let listing = std::mem::take(&mut self.pending_listing);
                        print!("\r\n{}\r\n", listing.join("  "));
                    }
                    self.render()?;
                }
            }
        }
    }

    /// Cooked-mode fallback for piped or redirected input.
    fn run_plain(&mut self) -> Result<Option<String>> {
        print!("{}", self.state.prompt);
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        if !line.is_empty() && !self.state.transient {
            if self.state.history.last() != Some(&line) {
                self.state.history.push(line.clone());
            }
            self.state.history_cursor = self.state.history.len();
        }
        Ok(Some(line))
    }

    /// Redraws the prompt and buffer from the line start, then repositions
    /// the cursor.
    fn render(&self) -> Result<()> {
        let mut out = io::stdout().lock();
        write!(
            out,
            "\r{}{}\x1b[K",
            style(&self.state.prompt).cyan().bold(),
            self.state.buffer
        )?;
        let tail = self.state.buffer.chars().count() - self.state.cursor;
        if tail > 0 {
            write!(out, "\x1b[{tail}D")?;
        }
        out.flush()?;
        Ok(())
    }
}
