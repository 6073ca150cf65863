//! Error types for the judging engine
//!
//! These cover infrastructure problems: configuration, the admin pool, the
//! checker process. A student's code failing is never an `EngineError`; it is
//! a `Failure` that the judge turns into a verdict.

use std::io;
use thiserror::Error;

use sql_judge_core::CoreError;

/// Result type for the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error type for the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from the core crate
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Admin pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Workspace creation or removal error
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// A workspace drop did not finish in time
    #[error("Dropping workspace {user} did not finish within {after:?}")]
    DropTimedOut {
        /// Workspace role
        user: String,
        /// Bound that was exceeded
        after: std::time::Duration,
    },

    /// Static checker error
    #[error("Checker error: {0}")]
    Checker(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Convert any displayable error into a configuration error
pub fn to_config_error<E: ToString>(err: E) -> EngineError {
    EngineError::Config(err.to_string())
}

/// Convert any displayable error into a pool error
pub fn to_pool_error<E: ToString>(err: E) -> EngineError {
    EngineError::Pool(err.to_string())
}

/// Convert any displayable error into a workspace error
pub fn to_workspace_error<E: ToString>(err: E) -> EngineError {
    EngineError::Workspace(err.to_string())
}

/// Convert any displayable error into a checker error
pub fn to_checker_error<E: ToString>(err: E) -> EngineError {
    EngineError::Checker(err.to_string())
}
