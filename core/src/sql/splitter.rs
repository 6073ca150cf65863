//! Statement splitting
//!
//! Splits SQL source into statements without parsing it. The scanner only
//! tracks enough lexical context to find top-level semicolons: quoted strings
//! (including `E''` escapes), quoted identifiers, nested block comments and
//! dollar-quoted bodies.
//!
//! Every returned statement keeps its position in the source: it is prefixed
//! with a blank copy of everything before it, so an error position reported
//! by the engine for the statement is also a position in the source.

use std::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::models::Verdict;

/// Separator line between seed variants
pub const VARIANT_SEPARATOR: &str = "-- @new data base@";

/// Inclusive bounds on the number of statements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementBounds {
    /// Minimum count
    pub min: Option<usize>,

    /// Maximum count
    pub max: Option<usize>,
}

impl StatementBounds {
    /// Create bounds
    pub fn new(min: Option<usize>, max: Option<usize>) -> Self {
        StatementBounds { min, max }
    }

    /// No bounds
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Exactly `n` statements
    pub fn exactly(n: usize) -> Self {
        Self::new(Some(n), Some(n))
    }

    /// At least `n` statements
    pub fn at_least(n: usize) -> Self {
        Self::new(Some(n), None)
    }

    /// Whether `count` satisfies the bounds
    pub fn contains(&self, count: usize) -> bool {
        self.min.map_or(true, |min| count >= min) && self.max.map_or(true, |max| count <= max)
    }
}

impl Display for StatementBounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min == max => write!(f, "exactly {}", min),
            (Some(min), Some(max)) => write!(f, "between {} and {}", min, max),
            (Some(min), None) => write!(f, "at least {}", min),
            (None, Some(max)) => write!(f, "at most {}", max),
            (None, None) => write!(f, "any number of"),
        }
    }
}

/// Statement-count violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrepareError {
    /// No statements at all
    #[error("The submission does not contain any SQL statement")]
    Empty,

    /// Statement count outside the bounds
    #[error("The submission must contain {bounds} statements but contains {found}")]
    OutOfRange {
        /// Statements found
        found: usize,
        /// Bounds that were violated
        bounds: StatementBounds,
    },
}

impl From<PrepareError> for Verdict {
    fn from(err: PrepareError) -> Self {
        Verdict::validation_error(err.to_string())
    }
}

/// A statement cut out of a larger source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Statement text between blank padding, ready to send to the engine.
    ///
    /// The padding before and after has the shape of the surrounding source,
    /// so the text is as long as the source and engine positions, including
    /// "end of input", land where they would in the whole submission.
    pub text: String,

    /// Character offset of the statement's first character in the source
    pub start: usize,

    /// Character offset one past the statement's last character
    pub end: usize,
}

impl Statement {
    /// Statement text without the padding
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }

    /// Statement on a single line, as line-based tools expect it
    pub fn flattened(&self) -> String {
        self.trimmed().split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Context {
    Code,
    Single { backslash_escapes: bool },
    Double,
    Dollar(Vec<char>),
    Block(usize),
}

struct Scan {
    chars: Vec<char>,
    significant: Vec<bool>,
    separators: Vec<usize>,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Length of the dollar-quote tag starting at `i`, if there is one
fn dollar_tag_len(chars: &[char], i: usize) -> Option<usize> {
    if i > 0 && is_ident_char(chars[i - 1]) {
        return None;
    }
    let mut j = i + 1;
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    if j >= chars.len() || chars[j] != '$' {
        return None;
    }
    if j > i + 1 && chars[i + 1].is_ascii_digit() {
        return None;
    }
    Some(j - i + 1)
}

fn scan(source: &str) -> Scan {
    let mut chars: Vec<char> = source.chars().map(|c| if c == '\r' { ' ' } else { c }).collect();
    let n = chars.len();
    let mut significant = vec![false; n];
    let mut separators = Vec::new();
    let mut context = Context::Code;
    let mut i = 0;

    while i < n {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match &mut context {
            Context::Code => match c {
                '-' if next == Some('-') => {
                    while i < n && chars[i] != '\n' {
                        chars[i] = ' ';
                        i += 1;
                    }
                    continue;
                }
                '/' if next == Some('*') => {
                    context = Context::Block(1);
                    i += 2;
                    continue;
                }
                '\'' => {
                    let escaped = i > 0
                        && matches!(chars[i - 1], 'e' | 'E')
                        && (i < 2 || !is_ident_char(chars[i - 2]));
                    context = Context::Single { backslash_escapes: escaped };
                    significant[i] = true;
                }
                '"' => {
                    context = Context::Double;
                    significant[i] = true;
                }
                '$' => {
                    significant[i] = true;
                    if let Some(len) = dollar_tag_len(&chars, i) {
                        let tag = chars[i..i + len].to_vec();
                        for flag in significant.iter_mut().skip(i).take(len) {
                            *flag = true;
                        }
                        context = Context::Dollar(tag);
                        i += len;
                        continue;
                    }
                }
                ';' => {
                    separators.push(i);
                    chars[i] = ' ';
                }
                c if c.is_whitespace() => {}
                _ => significant[i] = true,
            },
            Context::Single { backslash_escapes } => {
                significant[i] = true;
                if c == '\\' && *backslash_escapes && i + 1 < n {
                    significant[i + 1] = true;
                    i += 2;
                    continue;
                }
                if c == '\'' {
                    if next == Some('\'') {
                        significant[i + 1] = true;
                        i += 2;
                        continue;
                    }
                    context = Context::Code;
                }
            }
            Context::Double => {
                significant[i] = true;
                if c == '"' {
                    if next == Some('"') {
                        significant[i + 1] = true;
                        i += 2;
                        continue;
                    }
                    context = Context::Code;
                }
            }
            Context::Dollar(tag) => {
                significant[i] = true;
                if c == '$' && chars[i..].starts_with(tag) {
                    let len = tag.len();
                    for flag in significant.iter_mut().skip(i).take(len) {
                        *flag = true;
                    }
                    context = Context::Code;
                    i += len;
                    continue;
                }
            }
            Context::Block(depth) => {
                if c == '/' && next == Some('*') {
                    *depth += 1;
                    i += 2;
                    continue;
                }
                if c == '*' && next == Some('/') {
                    *depth -= 1;
                    if *depth == 0 {
                        context = Context::Code;
                    }
                    i += 2;
                    continue;
                }
            }
        }
        i += 1;
    }

    Scan { chars, significant, separators }
}

/// Replace line comments with spaces of the same length and `\r` with a space
pub fn strip_comments(source: &str) -> String {
    let mut scanned = scan(source);
    for &i in &scanned.separators {
        scanned.chars[i] = ';';
    }
    scanned.chars.into_iter().collect()
}

/// Split a script into statements without checking the count
pub fn split_script(source: &str) -> Vec<Statement> {
    let scanned = scan(source);
    let n = scanned.chars.len();

    let mut bounds = Vec::with_capacity(scanned.separators.len() + 1);
    let mut start = 0;
    for &sep in &scanned.separators {
        bounds.push((start, sep + 1));
        start = sep + 1;
    }
    if start < n {
        bounds.push((start, n));
    }

    bounds
        .into_iter()
        .filter(|&(s, e)| scanned.significant[s..e].iter().any(|&b| b))
        .map(|(s, e)| {
            let blank = |&c: &char| if c == '\n' { '\n' } else { ' ' };
            let mut text = String::with_capacity(n);
            text.extend(scanned.chars[..s].iter().map(blank));
            text.extend(scanned.chars[s..e].iter());
            text.extend(scanned.chars[e..].iter().map(blank));
            Statement { text, start: s, end: e }
        })
        .collect()
}

/// Split submitted code and check its statement count
pub fn split(source: &str, bounds: StatementBounds) -> Result<Vec<Statement>, PrepareError> {
    let statements = split_script(source);
    if statements.is_empty() && bounds.min.map_or(false, |min| min > 0) {
        return Err(PrepareError::Empty);
    }
    if !bounds.contains(statements.len()) {
        return Err(PrepareError::OutOfRange { found: statements.len(), bounds });
    }
    Ok(statements)
}

/// Split a seed script into its database variants.
///
/// Variants are separated by a line holding only [`VARIANT_SEPARATOR`].
/// Blank variants are dropped, but there is always at least one.
pub fn split_variants(seed: &str) -> Vec<String> {
    let mut variants = Vec::new();
    let mut current = String::new();
    for line in seed.split_inclusive('\n') {
        if line.trim().eq_ignore_ascii_case(VARIANT_SEPARATOR) {
            variants.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
        }
    }
    variants.push(current);

    let non_blank: Vec<String> = variants.iter().filter(|v| !v.trim().is_empty()).cloned().collect();
    if non_blank.is_empty() {
        vec![variants.swap_remove(0)]
    } else {
        non_blank
    }
}
