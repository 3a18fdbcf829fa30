//! Interactive prompt seam.
//!
//! Engines that need a mid-operation answer (conflict resolution, destructive
//! confirmations, overwrite checks) go through [`Prompter`] so they can run
//! against the real line editor or a scripted double in tests.

use std::collections::VecDeque;

use crate::error::{LibrarianError, Result};
use crate::input::LineEditor;

/// Answers questions during an operation.
pub trait Prompter {
    /// Free-form single-shot question; the answer is never recorded in
    /// command history.
    fn ask(&mut self, prompt: &str) -> Result<String>;

    /// Yes/no question where a bare Enter means yes.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

impl Prompter for LineEditor {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        self.read_transient(prompt)?
            .ok_or_else(|| LibrarianError::Other("input stream closed".to_string()))
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        self.read_confirm(prompt)
    }
}

/// Scripted prompter for tests: pops pre-seeded answers in order.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    /// Prompts seen so far, for assertions.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        self.asked.push(prompt.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| LibrarianError::Other("scripted prompter ran out of answers".to_string()))
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        let answer = self.ask(prompt)?;
        let answer = answer.trim().to_ascii_lowercase();
        Ok(answer.is_empty() || answer == "y" || answer == "yes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_answers_in_order() {
        let mut p = ScriptedPrompter::new(["k", "0"]);
        assert_eq!(p.ask("first?").unwrap(), "k");
        assert_eq!(p.ask("second?").unwrap(), "0");
        assert!(p.ask("third?").is_err());
        assert_eq!(p.asked().len(), 3);
    }

    #[test]
    fn test_scripted_confirm_default_yes() {
        let mut p = ScriptedPrompter::new(["", "n", "yes"]);
        assert!(p.confirm("a?").unwrap());
        assert!(!p.confirm("b?").unwrap());
        assert!(p.confirm("c?").unwrap());
    }
}
