//! Data models for the judge
//!
//! Problem definitions as handed to the judge, canonicalized result tables,
//! database snapshots, execution failures and verdicts.

mod failure;
mod problem;
mod snapshot;
mod table;
mod verdict;

pub use failure::{Failure, FailureKind, Phase};
pub use problem::{Problem, ProblemDetails, ProblemKind};
pub use snapshot::DatabaseSnapshot;
pub use table::{canonical_decimal, Cell, Column, ResultTable, Row};
pub use verdict::{CompileError, Feedback, Position, TableChanges, Verdict, VerdictCode};
