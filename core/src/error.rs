//! Error types for the core crate
//!
//! Infrastructure-level errors only. Judging outcomes such as wrong answers or
//! runtime errors in student code are values (`Verdict`, `Failure`), never errors.

use std::io;
use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed problem definition
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// Checker protocol error
    #[error("Checker protocol error: {0}")]
    ProtocolError(String),

    /// General error
    #[error("General error: {0}")]
    GeneralError(String),
}

/// Result type for the core crate
pub type Result<T> = std::result::Result<T, CoreError>;

/// Convert a string error to a ConfigError
pub fn to_config_error<E: std::fmt::Display>(err: E) -> CoreError {
    CoreError::ConfigError(err.to_string())
}

/// Convert a string error to an InvalidProblem
pub fn to_invalid_problem<E: std::fmt::Display>(err: E) -> CoreError {
    CoreError::InvalidProblem(err.to_string())
}

/// Convert a string error to a ProtocolError
pub fn to_protocol_error<E: std::fmt::Display>(err: E) -> CoreError {
    CoreError::ProtocolError(err.to_string())
}
