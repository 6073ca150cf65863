//! Checker text protocol
//!
//! Each `/tapi` command answers with exactly one block:
//!
//! ```text
//! $success | <digits> | $eot
//! $error
//! <severity code>
//! <message, possibly several lines>
//! [$
//! <snippet>]
//! ... more $error entries ...
//! $eot
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Serialize, Deserialize};

use crate::error::{to_protocol_error, CoreError};
use crate::sql::split_script;

/// Prompt that ends the checker banner
pub const PROMPT: &str = "DES-SQL> ";

/// Message the checker emits for syntax it does not support
pub const UNRECOGNIZED_INPUT: &str = "Unrecognized start of input";

/// Annotation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Error
    Error,
    /// Warning
    Warning,
    /// Information
    Info,
}

impl Severity {
    fn from_code(code: &str) -> Result<Self, CoreError> {
        match code.trim() {
            "0" => Ok(Severity::Error),
            "1" => Ok(Severity::Warning),
            "2" => Ok(Severity::Info),
            other => Err(to_protocol_error(format!("unknown severity code <{}>", other))),
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// A message from the checker about one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Severity
    pub severity: Severity,

    /// Message text
    pub message: String,

    /// Fragment of the code the message refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// How the submitted code is handed to the checker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// A single query, parsed with `/mparse`
    Query,
    /// A sequence of statements, one command each
    Statements,
}

/// Build the checker's stdin script.
///
/// Returns the script and the number of commands whose output must be parsed.
pub fn build_input(schema: &str, seed: &str, code: &str, mode: CheckMode) -> (String, usize) {
    let mut input = String::from("/type_casting on\n/sql\n");
    let mut commands = 0;

    for statement in split_script(schema).iter().chain(split_script(seed).iter()) {
        input.push_str(&format!("/tapi {}\n", statement.flattened()));
        commands += 1;
    }

    match mode {
        CheckMode::Query => {
            input.push_str(&format!("/tapi /mparse\n{}\n$eot\n", code.trim()));
            commands += 1;
        }
        CheckMode::Statements => {
            for statement in split_script(code) {
                input.push_str(&format!("/tapi {}\n", statement.flattened()));
                commands += 1;
            }
        }
    }

    input.push_str("/exit\n");
    (input, commands)
}

fn next_line<'a, I: Iterator<Item = &'a str>>(lines: &mut I, expecting: &str) -> Result<&'a str, CoreError> {
    lines
        .next()
        .ok_or_else(|| to_protocol_error(format!("output ended while expecting {}", expecting)))
}

/// Parse the output block of one command
pub fn parse_command<'a, I: Iterator<Item = &'a str>>(lines: &mut I) -> Result<Vec<Annotation>, CoreError> {
    let first = next_line(lines, "a command result")?.trim();
    if first == "$success" || first == "$eot" || (!first.is_empty() && first.chars().all(|c| c.is_ascii_digit())) {
        return Ok(Vec::new());
    }
    if first != "$error" {
        return Err(to_protocol_error(format!("unexpected command result <{}>", first)));
    }

    let mut annotations = Vec::new();
    loop {
        let severity = Severity::from_code(next_line(lines, "a severity code")?)?;

        let mut message = Vec::new();
        let mut terminator = next_line(lines, "a message")?;
        while !matches!(terminator.trim_end(), "$error" | "$eot" | "$") {
            message.push(terminator);
            terminator = next_line(lines, "the end of a message")?;
        }

        let mut snippet = None;
        if terminator.trim_end() == "$" {
            let mut fragment = Vec::new();
            terminator = next_line(lines, "a snippet")?;
            while !matches!(terminator.trim_end(), "$error" | "$eot") {
                fragment.push(terminator);
                terminator = next_line(lines, "the end of a snippet")?;
            }
            snippet = Some(fragment.join("\n"));
        }

        annotations.push(Annotation {
            severity,
            message: message.join("\n"),
            snippet,
        });

        if terminator.trim_end() == "$eot" {
            return Ok(annotations);
        }
    }
}

/// Parse the checker's stdout into one annotation list per command.
///
/// Everything up to and including the first prompt is banner and is skipped.
pub fn parse_output(output: &str, commands: usize) -> Result<Vec<Vec<Annotation>>, CoreError> {
    let body = match output.find(PROMPT) {
        Some(pos) => &output[pos + PROMPT.len()..],
        None => output,
    };
    let mut lines = body.lines();
    (0..commands).map(|_| parse_command(&mut lines)).collect()
}

/// Split off annotations that only reveal checker limitations
pub fn partition_unrecognized(annotations: Vec<Annotation>) -> (Vec<Annotation>, Vec<Annotation>) {
    annotations
        .into_iter()
        .partition(|a| !a.message.contains(UNRECOGNIZED_INPUT))
}
