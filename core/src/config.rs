//! Resource caps for judging
//!
//! Limits applied to every statement and result the judge materializes. The
//! engine crate embeds these in its process configuration; they live here so
//! the comparator and the executor agree on one definition.

use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::error::{to_config_error, CoreError};

/// Per-call resource caps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceCaps {
    /// Wall-clock cap for a single user statement, in milliseconds
    pub stmt_timeout_ms: u64,

    /// Maximum number of rows in any materialized result
    pub max_rows: usize,

    /// Maximum number of columns in any materialized result
    pub max_cols: usize,

    /// Maximum number of tables owned by a workspace when snapshotting
    pub max_tables: usize,
}

impl Default for ResourceCaps {
    fn default() -> Self {
        ResourceCaps {
            stmt_timeout_ms: 3_000,
            max_rows: 1_000,
            max_cols: 100,
            max_tables: 100,
        }
    }
}

impl ResourceCaps {
    /// Create caps with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Small caps that keep test runs fast
    pub fn for_testing() -> Self {
        ResourceCaps {
            stmt_timeout_ms: 1_000,
            max_rows: 1_000,
            max_cols: 20,
            max_tables: 20,
        }
    }

    /// Statement timeout as a `Duration`
    pub fn stmt_timeout(&self) -> Duration {
        Duration::from_millis(self.stmt_timeout_ms)
    }

    /// Reject caps that would make every submission fail
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.stmt_timeout_ms == 0 {
            return Err(to_config_error("stmt_timeout_ms must be positive"));
        }
        if self.max_rows == 0 || self.max_cols == 0 || self.max_tables == 0 {
            return Err(to_config_error("max_rows, max_cols and max_tables must be positive"));
        }
        Ok(())
    }

    /// Load caps from a JSON file
    pub fn from_file(path: &str) -> Result<Self, CoreError> {
        let file = std::fs::File::open(path)?;
        let caps: ResourceCaps = serde_json::from_reader(file)?;
        caps.validate()?;
        Ok(caps)
    }

    /// Save caps to a JSON file
    pub fn to_file(&self, path: &str) -> Result<(), CoreError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
