//! Interactive input.

use std::io::{self, BufRead, Write};

use dialoguer::{Confirm, Input};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    /// The user pressed Ctrl-C while a prompt was active
    #[error("Input interrupted")]
    Interrupted,

    #[error("Failed to read input: {0}")]
    Io(#[from] io::Error),
}

impl From<dialoguer::Error> for PromptError {
    fn from(err: dialoguer::Error) -> Self {
        match err {
            dialoguer::Error::IO(e) if e.kind() == io::ErrorKind::Interrupted => Self::Interrupted,
            dialoguer::Error::IO(e) => Self::Io(e),
        }
    }
}

/// Source of answers for the questions asked during a run
pub trait Prompter {
    /// Ask for a line of text; an empty answer is allowed
    fn input(&mut self, label: &str) -> Result<String, PromptError>;

    /// Ask a yes/no question; defaults to no
    fn confirm(&mut self, label: &str) -> Result<bool, PromptError>;
}

/// Prompts rendered on an interactive terminal
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&mut self, label: &str) -> Result<String, PromptError> {
        Ok(Input::<String>::new()
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()?)
    }

    fn confirm(&mut self, label: &str) -> Result<bool, PromptError> {
        Ok(Confirm::new().with_prompt(label).default(false).interact()?)
    }
}

/// Plain line-based prompts, used when stdin is not a terminal
pub struct LinePrompter<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    fn read_answer(&mut self, label: &str) -> Result<Option<String>, PromptError> {
        write!(self.writer, "{}: ", label)?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn input(&mut self, label: &str) -> Result<String, PromptError> {
        self.read_answer(label)?.ok_or_else(|| {
            PromptError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input ended before a value was entered",
            ))
        })
    }

    fn confirm(&mut self, label: &str) -> Result<bool, PromptError> {
        // End of input counts as "no"
        let answer = self
            .read_answer(&format!("{} [y/N]", label))?
            .unwrap_or_default();
        Ok(matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }
}
