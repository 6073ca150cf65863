//! Execution failures
//!
//! The executor attributes every failure to exactly one [`Phase`]. The phase and
//! the [`FailureKind`] together decide the verdict, so the mapping lives here in
//! one place instead of being repeated by every problem kind.

use std::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Serialize, Deserialize};

use super::verdict::{CompileError, Position, Verdict};

/// Pipeline phase in which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Acquiring a privileged connection
    AcquireAdmin,

    /// Creating the workspace account
    CreateWorkspace,

    /// Connecting as the workspace account
    OpenUser,

    /// Running the problem's schema script
    RunSchema,

    /// Running the problem's seed script
    RunSeed,

    /// Creating submitted functions, procedures or triggers
    Compile,

    /// Running submitted code or the statements that exercise it
    RunUser,

    /// Reading every table of the workspace
    Snapshot,

    /// Dropping the workspace
    DropWorkspace,
}

impl Phase {
    /// Phase name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::AcquireAdmin => "acquire_admin",
            Phase::CreateWorkspace => "create_workspace",
            Phase::OpenUser => "open_user",
            Phase::RunSchema => "run_schema",
            Phase::RunSeed => "run_seed",
            Phase::Compile => "compile",
            Phase::RunUser => "run_user",
            Phase::Snapshot => "snapshot",
            Phase::DropWorkspace => "drop_workspace",
        }
    }

    /// Whether the phase runs student-controlled work
    pub fn is_user_phase(&self) -> bool {
        matches!(self, Phase::Compile | Phase::RunUser | Phase::Snapshot)
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The engine rejected a statement
    Engine,

    /// A statement ran out of wall-clock time
    Timeout,

    /// A result exceeded the row, column or table caps
    LimitExceeded,

    /// A stored object failed to compile, possibly only when first used
    Compile,
}

/// A classified execution failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Phase in which the failure happened
    pub phase: Phase,

    /// Kind of failure
    pub kind: FailureKind,

    /// Engine or infrastructure message
    pub message: String,

    /// Offending statement, trimmed
    pub statement: Option<String>,

    /// Location in the submitted source
    pub position: Option<Position>,

    /// Compile errors, for `Compile` failures
    pub compile_errors: Vec<CompileError>,
}

impl Failure {
    /// Create a failure without statement context
    pub fn new(phase: Phase, kind: FailureKind, message: impl Into<String>) -> Self {
        Failure {
            phase,
            kind,
            message: message.into(),
            statement: None,
            position: None,
            compile_errors: Vec::new(),
        }
    }

    /// Engine error in a phase
    pub fn engine(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(phase, FailureKind::Engine, message)
    }

    /// Timeout in a phase
    pub fn timeout(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(phase, FailureKind::Timeout, message)
    }

    /// Cap violation in a phase
    pub fn limit_exceeded(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(phase, FailureKind::LimitExceeded, message)
    }

    /// Attach the offending statement
    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    /// Attach a source position
    pub fn with_position(mut self, position: Option<Position>) -> Self {
        self.position = position;
        self
    }

    /// Move the failure to another phase, keeping everything else
    pub fn in_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Mark as a compile failure with its error table
    pub fn into_compile(mut self, errors: Vec<CompileError>) -> Self {
        self.kind = FailureKind::Compile;
        self.compile_errors = errors;
        self
    }

    /// Demote a compile failure raised while user code ran back to an engine error.
    ///
    /// Only submissions that define a stored body can fail to compile; for the
    /// other kinds a PL/pgSQL error met at run time is a runtime error. The
    /// position of the first compile error is kept.
    pub fn into_runtime(mut self) -> Self {
        if self.kind == FailureKind::Compile && self.phase == Phase::RunUser {
            self.kind = FailureKind::Engine;
            if self.position.is_none() {
                self.position = self.compile_errors.first().and_then(|e| e.position);
            }
            self.compile_errors.clear();
        }
        self
    }

    /// Map the failure of a student run to a verdict.
    ///
    /// Timeouts and cap violations in user phases are `TLE`, compile problems
    /// are `CE`, engine errors while running user code are `RE`. Everything
    /// else is infrastructure and becomes `IE`.
    pub fn into_verdict(self) -> Verdict {
        match (self.kind, self.phase) {
            (FailureKind::Timeout, phase) if phase.is_user_phase() => Verdict::time_limit_exceeded(),
            (FailureKind::LimitExceeded, Phase::RunUser | Phase::Snapshot) => {
                Verdict::time_limit_exceeded()
            }
            (FailureKind::Compile, phase) if phase.is_user_phase() => {
                Verdict::compile_error(self.compile_errors_or_message())
            }
            (FailureKind::Engine, Phase::Compile) => Verdict::compile_error(self.compile_errors_or_message()),
            (FailureKind::Engine, Phase::RunUser) => Verdict::runtime_error(self.message, self.position),
            _ => Verdict::internal_error(),
        }
    }

    fn compile_errors_or_message(self) -> Vec<CompileError> {
        if !self.compile_errors.is_empty() {
            return self.compile_errors;
        }
        vec![CompileError {
            object: None,
            position: self.position,
            message: self.message,
            severity: "ERROR".to_string(),
        }]
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:?} failure during {}: {}", self.kind, self.phase, self.message)?;
        if let Some(statement) = &self.statement {
            write!(f, " [{}]", statement)?;
        }
        Ok(())
    }
}
