//! Verdicts and feedback
//!
//! The result of a judging call. A verdict always carries a code; the feedback
//! payload depends on which stage produced it: comparator diffs for `WA`,
//! compile errors for `CE`, an engine message for `RE`.

use std::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Serialize, Deserialize};

use super::snapshot::DatabaseSnapshot;
use super::table::{Cell, Column, ResultTable, Row};

/// Verdict code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerdictCode {
    /// Accepted
    AC,

    /// Wrong answer
    WA,

    /// Runtime error
    RE,

    /// Time limit exceeded
    TLE,

    /// Validation error
    VE,

    /// Compilation error
    CE,

    /// Internal error
    IE,
}

impl VerdictCode {
    /// Short code as used in logs and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictCode::AC => "AC",
            VerdictCode::WA => "WA",
            VerdictCode::RE => "RE",
            VerdictCode::TLE => "TLE",
            VerdictCode::VE => "VE",
            VerdictCode::CE => "CE",
            VerdictCode::IE => "IE",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            VerdictCode::AC => "Accepted",
            VerdictCode::WA => "Wrong answer",
            VerdictCode::RE => "Runtime error",
            VerdictCode::TLE => "Time limit exceeded",
            VerdictCode::VE => "Validation error",
            VerdictCode::CE => "Compilation error",
            VerdictCode::IE => "Internal error",
        }
    }
}

impl Display for VerdictCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// 0-based line and column in the submitted source, counted in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line number
    pub line: usize,

    /// Column number
    pub col: usize,
}

impl Position {
    /// Create a new position
    pub fn new(line: usize, col: usize) -> Self {
        Position { line, col }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "line {}, column {}", self.line + 1, self.col + 1)
    }
}

/// One row of a compile-error table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    /// Name of the object that failed to compile, when known
    pub object: Option<String>,

    /// Location in the submitted source
    pub position: Option<Position>,

    /// Engine message
    pub message: String,

    /// Engine severity, e.g. `ERROR`
    pub severity: String,
}

/// Tables the reference solution added, modified or removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChanges {
    /// Tables present only after the reference ran
    pub added: DatabaseSnapshot,

    /// Tables whose contents changed, with their expected contents
    pub modified: DatabaseSnapshot,

    /// Tables present only before the reference ran
    pub removed: DatabaseSnapshot,
}

impl TableChanges {
    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Structured feedback attached to a verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Feedback {
    /// No feedback
    None,

    /// Free text
    Message {
        /// Text shown to the student
        text: String,
    },

    /// Different number of columns
    ColumnCount {
        /// Expected header
        expected: Vec<Column>,
        /// Obtained header
        obtained: Vec<Column>,
    },

    /// First column whose name differs
    ColumnName {
        /// 0-based column position
        position: usize,
        /// Expected name
        expected: String,
        /// Obtained name
        obtained: String,
    },

    /// First same-named column whose type differs
    ColumnType {
        /// 0-based column position
        position: usize,
        /// Column name
        column: String,
        /// Expected type tag
        expected: String,
        /// Obtained type tag
        obtained: String,
    },

    /// Obtained rows that are not expected
    UnexpectedRows {
        /// Full obtained result
        obtained: ResultTable,
        /// 0-based positions of the unexpected rows in `obtained`
        flagged: Vec<usize>,
    },

    /// Expected rows that were not obtained
    MissingRows {
        /// Header of the expected result
        header: Vec<Column>,
        /// Missing rows
        missing: Vec<Row>,
    },

    /// Same rows in a different order
    RowOrder {
        /// Expected result
        expected: ResultTable,
        /// Obtained result
        obtained: ResultTable,
    },

    /// Different sets of tables in the database
    TableSet {
        /// Expected table names
        expected: Vec<String>,
        /// Obtained table names
        obtained: Vec<String>,
    },

    /// A table whose contents differ
    Table {
        /// Table name
        table: String,
        /// Difference found in that table
        detail: Box<Feedback>,
    },

    /// A function call returned a value of a different type
    FunctionType {
        /// The call expression
        call: String,
        /// Expected type tag
        expected: String,
        /// Obtained type tag
        obtained: String,
    },

    /// A function call returned a different value
    FunctionValue {
        /// The call expression
        call: String,
        /// Expected value
        expected: Cell,
        /// Obtained value
        obtained: Cell,
    },

    /// The submitted data did not make the buggy query fail
    NotDiscriminated {
        /// Result of the buggy query on the submitted data
        result: ResultTable,
    },

    /// Compile errors of the submitted objects
    CompileErrors {
        /// One entry per reported error
        errors: Vec<CompileError>,
    },
}

impl Feedback {
    /// Free-text feedback
    pub fn message(text: impl Into<String>) -> Self {
        Feedback::Message { text: text.into() }
    }

    /// Whether there is no feedback
    pub fn is_none(&self) -> bool {
        matches!(self, Feedback::None)
    }
}

impl Display for Feedback {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Feedback::None => Ok(()),
            Feedback::Message { text } => write!(f, "{}", text),
            Feedback::ColumnCount { expected, obtained } => write!(
                f,
                "Expected {} columns, obtained {}",
                expected.len(),
                obtained.len()
            ),
            Feedback::ColumnName { position, expected, obtained } => write!(
                f,
                "Column {} should be named {} but is named {}",
                position + 1,
                expected,
                obtained
            ),
            Feedback::ColumnType { column, expected, obtained, .. } => write!(
                f,
                "Column {} should have type {} but has type {}",
                column, expected, obtained
            ),
            Feedback::UnexpectedRows { flagged, .. } => {
                write!(f, "{} obtained row(s) are not expected", flagged.len())
            }
            Feedback::MissingRows { missing, .. } => {
                write!(f, "{} expected row(s) are missing", missing.len())
            }
            Feedback::RowOrder { .. } => write!(f, "Rows are correct but in the wrong order"),
            Feedback::TableSet { expected, obtained } => write!(
                f,
                "Expected tables [{}], obtained [{}]",
                expected.join(", "),
                obtained.join(", ")
            ),
            Feedback::Table { table, detail } => write!(f, "Table {} is incorrect: {}", table, detail),
            Feedback::FunctionType { call, expected, obtained } => write!(
                f,
                "{} should return {} but returns {}",
                call, expected, obtained
            ),
            Feedback::FunctionValue { call, expected, obtained } => write!(
                f,
                "{} should return {} but returns {}",
                call, expected, obtained
            ),
            Feedback::NotDiscriminated { .. } => {
                write!(f, "Both queries return the same result on the submitted data")
            }
            Feedback::CompileErrors { errors } => {
                for (i, error) in errors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    if let Some(object) = &error.object {
                        write!(f, "{}: ", object)?;
                    }
                    write!(f, "{} {}", error.severity, error.message)?;
                    if let Some(position) = error.position {
                        write!(f, " ({})", position)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Final outcome of a judging call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Verdict code
    pub code: VerdictCode,

    /// Feedback for the student
    pub feedback: Feedback,

    /// Location of the failure in the submitted source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    /// Initial database of the seed variant that failed, after the first one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_database: Option<DatabaseSnapshot>,

    /// Tables the reference changed, shown with wrong DML-like answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_changes: Option<TableChanges>,
}

impl Verdict {
    fn with_code(code: VerdictCode, feedback: Feedback) -> Self {
        Verdict {
            code,
            feedback,
            position: None,
            initial_database: None,
            table_changes: None,
        }
    }

    /// Accepted
    pub fn accepted() -> Self {
        Self::with_code(VerdictCode::AC, Feedback::None)
    }

    /// Wrong answer with a diff
    pub fn wrong_answer(feedback: Feedback) -> Self {
        Self::with_code(VerdictCode::WA, feedback)
    }

    /// Runtime error with the engine message and its location
    pub fn runtime_error(message: impl Into<String>, position: Option<Position>) -> Self {
        let mut verdict = Self::with_code(VerdictCode::RE, Feedback::message(message));
        verdict.position = position;
        verdict
    }

    /// Time limit exceeded; no further detail is given
    pub fn time_limit_exceeded() -> Self {
        Self::with_code(VerdictCode::TLE, Feedback::None)
    }

    /// Validation error
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::with_code(VerdictCode::VE, Feedback::message(message))
    }

    /// Compilation error with the compile-error table
    pub fn compile_error(errors: Vec<CompileError>) -> Self {
        Self::with_code(VerdictCode::CE, Feedback::CompileErrors { errors })
    }

    /// Internal error; the cause is for operators and never shown here
    pub fn internal_error() -> Self {
        Self::with_code(VerdictCode::IE, Feedback::None)
    }

    /// Attach the initial database of a failing seed variant
    pub fn with_initial_database(mut self, db: DatabaseSnapshot) -> Self {
        self.initial_database = Some(db);
        self
    }

    /// Attach the reference's table changes
    pub fn with_table_changes(mut self, changes: TableChanges) -> Self {
        self.table_changes = Some(changes);
        self
    }

    /// Whether the verdict is `AC`
    pub fn is_accepted(&self) -> bool {
        self.code == VerdictCode::AC
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.code)?;
        if !self.feedback.is_none() {
            write!(f, ": {}", self.feedback)?;
        }
        if let Some(position) = self.position {
            write!(f, " at {}", position)?;
        }
        Ok(())
    }
}
