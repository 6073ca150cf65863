//! SQL Judge Engine
//!
//! Runs SQL submissions in disposable PostgreSQL workspaces and judges them
//! against a reference solution.

// Error types and result
pub mod error;
pub use error::{EngineError, Result};

// Configuration
pub mod config;
pub use config::{CheckerConfig, DatabaseConfig, JudgeConfig};

// Admin connections
pub mod pool;
pub use pool::{AdminHandle, AdminPool};

// Workspace lifecycle
pub mod workspace;
pub use workspace::{Workspace, WorkspaceLease, WorkspaceManager};

// Statement execution
pub mod executor;
pub use executor::Session;

// Static checker process
pub mod checker;
pub use checker::StaticChecker;

// Judging pipeline
pub mod judge;
pub use judge::{Judge, JudgeOutcome, Reference, SelectVariant};

// Stale workspace cleanup
pub mod reaper;
pub use reaper::Reaper;
