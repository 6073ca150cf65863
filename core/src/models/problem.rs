//! Problem definitions
//!
//! A problem is authored elsewhere and handed to the judge as data. The fields
//! shared by every kind sit on [`Problem`]; the kind and its reference solution
//! sit on [`ProblemDetails`], flattened into the same JSON object.

use std::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Serialize, Deserialize};

use crate::error::{to_invalid_problem, CoreError};
use crate::sql::{split_variants, StatementBounds};

/// Problem kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemKind {
    /// A single SELECT query
    Select,
    /// One or more INSERT, UPDATE or DELETE statements
    Dml,
    /// A stored function
    Function,
    /// A stored procedure
    Procedure,
    /// A trigger and its trigger function
    Trigger,
    /// Seed rows that expose a buggy query
    Discriminant,
}

impl ProblemKind {
    /// Kind name for logs and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemKind::Select => "SELECT",
            ProblemKind::Dml => "DML",
            ProblemKind::Function => "FUNCTION",
            ProblemKind::Procedure => "PROCEDURE",
            ProblemKind::Trigger => "TRIGGER",
            ProblemKind::Discriminant => "DISCRIMINANT",
        }
    }
}

impl Display for ProblemKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Kind-specific part of a problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemDetails {
    /// SELECT problem
    Select {
        /// Reference query
        reference_query: String,
    },

    /// DML problem
    Dml {
        /// Reference statements
        reference_dml: String,
    },

    /// FUNCTION problem
    Function {
        /// `CREATE FUNCTION` script of the reference
        reference_function_body: String,
        /// Scalar expressions evaluated after creating the function
        calls: Vec<String>,
    },

    /// PROCEDURE problem
    Procedure {
        /// `CREATE PROCEDURE` script of the reference
        reference_procedure_body: String,
        /// Statement that invokes the procedure
        call_statement: String,
    },

    /// TRIGGER problem
    Trigger {
        /// Trigger function and `CREATE TRIGGER` script of the reference
        reference_trigger_body: String,
        /// Statements that fire the trigger
        test_dml: String,
    },

    /// DISCRIMINANT problem
    Discriminant {
        /// Data loaded before the submitted rows
        base_seed_sql: String,
        /// Query with the intended semantics
        correct_query: String,
        /// Query with a bug the submitted rows must expose
        buggy_query: String,
    },
}

/// A problem definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Optional title, used only in logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// DDL that builds the tables
    pub schema_sql: String,

    /// DML that seeds the tables, possibly several variants
    #[serde(default)]
    pub seed_sql: String,

    /// Minimum number of submitted statements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_stmt: Option<usize>,

    /// Maximum number of submitted statements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stmt: Option<usize>,

    /// Whether row order matters
    #[serde(default)]
    pub check_order: bool,

    /// Kind and reference solution
    #[serde(flatten)]
    pub details: ProblemDetails,
}

impl Problem {
    /// Create a problem with empty seed and no statement bounds
    pub fn new(schema_sql: impl Into<String>, details: ProblemDetails) -> Self {
        Problem {
            title: None,
            schema_sql: schema_sql.into(),
            seed_sql: String::new(),
            min_stmt: None,
            max_stmt: None,
            check_order: false,
            details,
        }
    }

    /// Set the seed script
    pub fn with_seed(mut self, seed_sql: impl Into<String>) -> Self {
        self.seed_sql = seed_sql.into();
        self
    }

    /// Set the statement bounds
    pub fn with_statement_bounds(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_stmt = min;
        self.max_stmt = max;
        self
    }

    /// Make row order significant
    pub fn with_check_order(mut self, check_order: bool) -> Self {
        self.check_order = check_order;
        self
    }

    /// Problem kind
    pub fn kind(&self) -> ProblemKind {
        match &self.details {
            ProblemDetails::Select { .. } => ProblemKind::Select,
            ProblemDetails::Dml { .. } => ProblemKind::Dml,
            ProblemDetails::Function { .. } => ProblemKind::Function,
            ProblemDetails::Procedure { .. } => ProblemKind::Procedure,
            ProblemDetails::Trigger { .. } => ProblemKind::Trigger,
            ProblemDetails::Discriminant { .. } => ProblemKind::Discriminant,
        }
    }

    /// Seed scripts, one per database variant.
    ///
    /// Only SELECT problems judge against every variant; the other kinds use
    /// the first one.
    pub fn seed_variants(&self) -> Vec<String> {
        split_variants(&self.seed_sql)
    }

    /// Seed script of the first variant
    pub fn first_seed(&self) -> String {
        self.seed_variants().into_iter().next().unwrap_or_default()
    }

    /// Statement bounds for the submitted code.
    ///
    /// SELECT always takes exactly one statement. Procedural kinds ignore the
    /// configured bounds because their bodies contain inner statements, but a
    /// submission must still contain something.
    pub fn statement_bounds(&self) -> StatementBounds {
        match self.kind() {
            ProblemKind::Select => StatementBounds::exactly(1),
            ProblemKind::Function | ProblemKind::Procedure | ProblemKind::Trigger => {
                StatementBounds::at_least(1)
            }
            ProblemKind::Dml | ProblemKind::Discriminant => StatementBounds::new(
                Some(self.min_stmt.unwrap_or(1).max(1)),
                self.max_stmt,
            ),
        }
    }

    /// Label for logs
    pub fn label(&self) -> String {
        match &self.title {
            Some(title) => format!("{} '{}'", self.kind(), title),
            None => self.kind().to_string(),
        }
    }

    /// Check that the definition is usable before any workspace is opened
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.schema_sql.trim().is_empty() {
            return Err(to_invalid_problem("schema_sql is empty"));
        }
        if let (Some(min), Some(max)) = (self.min_stmt, self.max_stmt) {
            if min > max {
                return Err(to_invalid_problem(format!("min_stmt {} is greater than max_stmt {}", min, max)));
            }
        }
        let reference_missing = match &self.details {
            ProblemDetails::Select { reference_query } => reference_query.trim().is_empty(),
            ProblemDetails::Dml { reference_dml } => reference_dml.trim().is_empty(),
            ProblemDetails::Function { reference_function_body, calls } => {
                if calls.iter().all(|c| c.trim().is_empty()) {
                    return Err(to_invalid_problem("FUNCTION problem has no calls"));
                }
                reference_function_body.trim().is_empty()
            }
            ProblemDetails::Procedure { reference_procedure_body, call_statement } => {
                if call_statement.trim().is_empty() {
                    return Err(to_invalid_problem("PROCEDURE problem has no call statement"));
                }
                reference_procedure_body.trim().is_empty()
            }
            ProblemDetails::Trigger { reference_trigger_body, test_dml } => {
                if test_dml.trim().is_empty() {
                    return Err(to_invalid_problem("TRIGGER problem has no test statements"));
                }
                reference_trigger_body.trim().is_empty()
            }
            ProblemDetails::Discriminant { correct_query, buggy_query, .. } => {
                correct_query.trim().is_empty() || buggy_query.trim().is_empty()
            }
        };
        if reference_missing {
            return Err(to_invalid_problem(format!("{} problem has no reference solution", self.kind())));
        }
        Ok(())
    }

    /// Parse a problem from JSON
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let problem: Problem = serde_json::from_str(json)?;
        problem.validate()?;
        Ok(problem)
    }
}
