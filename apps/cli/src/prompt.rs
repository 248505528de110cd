//! Terminal prompter.

use dialoguer::{Confirm, Input};
use emergency_hub_core::{Error, Prompter, Result};

/// [`Prompter`] reading answers from the controlling terminal.
pub struct TerminalPrompter;

fn prompt_error(e: dialoguer::Error) -> Error {
    Error::Prompt {
        message: e.to_string(),
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(question)
            .default(false)
            .interact()
            .map_err(prompt_error)
    }

    fn input(&mut self, question: &str) -> Result<String> {
        Input::<String>::new()
            .with_prompt(question)
            .interact_text()
            .map_err(prompt_error)
    }

    fn show(&mut self, line: &str) {
        println!("{}", line);
    }
}
