//! Operator interaction seam.
//!
//! Core logic never reads the terminal directly. The CLI supplies a
//! [`Prompter`] backed by the terminal; tests supply a scripted one.

use crate::error::Result;

/// Asks the operator questions during an interactive run.
pub trait Prompter {
    /// Asks a yes/no question.
    fn confirm(&mut self, question: &str) -> Result<bool>;

    /// Asks for free-form input and returns it unvalidated.
    fn input(&mut self, question: &str) -> Result<String>;

    /// Shows an informational line to the operator.
    fn show(&mut self, line: &str);
}

/// A prompter that answers from a fixed script, for tests and dry runs.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    confirmations: Vec<bool>,
    inputs: Vec<String>,
    /// Every question asked and line shown, in order.
    pub transcript: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an answer for the next [`Prompter::confirm`] call.
    pub fn with_confirm(mut self, answer: bool) -> Self {
        self.confirmations.insert(0, answer);
        self
    }

    /// Queues an answer for the next [`Prompter::input`] call.
    pub fn with_input(mut self, answer: impl Into<String>) -> Self {
        self.inputs.insert(0, answer.into());
        self
    }

    /// Number of questions asked so far.
    pub fn questions_asked(&self) -> usize {
        self.transcript.iter().filter(|l| l.starts_with("? ")).count()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        self.transcript.push(format!("? {}", question));
        self.confirmations
            .pop()
            .ok_or_else(|| crate::error::Error::Prompt {
                message: format!("no scripted answer for '{}'", question),
            })
    }

    fn input(&mut self, question: &str) -> Result<String> {
        self.transcript.push(format!("? {}", question));
        self.inputs.pop().ok_or_else(|| crate::error::Error::Prompt {
            message: format!("no scripted input for '{}'", question),
        })
    }

    fn show(&mut self, line: &str) {
        self.transcript.push(line.to_string());
    }
}
