//! # SQL Judge Core
//!
//! Database-independent building blocks of the SQL judge: problem and verdict
//! models, statement preparation, result comparison and the static checker
//! protocol. Nothing in this crate opens a connection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod checker;
pub mod compare;
pub mod config;
pub mod error;
pub mod models;
pub mod sql;
pub mod utils;

/// Re-export common types for ease of use
pub use config::ResourceCaps;
pub use error::{CoreError, Result};
pub use models::{
    Cell, Column, CompileError, DatabaseSnapshot, Failure, FailureKind, Feedback, Phase, Position, Problem,
    ProblemDetails, ProblemKind, ResultTable, Row, TableChanges, Verdict, VerdictCode,
};

/// Version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
