//! External static checker
//!
//! Runs the checker binary once per request with a generated stdin script and
//! returns annotations for the submitted code only. The checker is advisory:
//! a crash, timeout or unparseable output yields no annotations.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use chrono::Utc;
use log::{debug, error, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use sql_judge_core::checker::{build_input, parse_output, partition_unrecognized, Annotation, CheckMode};
use sql_judge_core::sql::split_script;
use crate::config::CheckerConfig;
use crate::error::{to_checker_error, Result};

const UNRECOGNIZED_LOG: &str = "checker_unrecognized.log";

/// Handle to the checker binary
#[derive(Debug, Clone)]
pub struct StaticChecker {
    config: CheckerConfig,
}

impl StaticChecker {
    /// Create a checker from its configuration
    pub fn new(config: CheckerConfig) -> Self {
        StaticChecker { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// File receiving reports of syntax the checker does not understand
    pub fn unrecognized_log(&self) -> PathBuf {
        self.config.log_dir.join(UNRECOGNIZED_LOG)
    }

    async fn run(&self, input: &str) -> Result<String> {
        let mut command = Command::new(&self.config.binary);
        if let Some(dir) = self.config.binary.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        // Input is fed while output is collected, both under the deadline
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes()).await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let exchange = async move { tokio::join!(feed, child.wait_with_output()) };

        let (fed, output) = tokio::time::timeout(self.timeout(), exchange)
            .await
            .map_err(|_| to_checker_error(format!("no answer within {:?}", self.timeout())))?;
        if let Err(e) = fed {
            debug!("Checker stopped reading its input: {}", e);
        }
        let output = output?;

        if !output.status.success() {
            return Err(to_checker_error(format!("exited with {}", output.status)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Annotate `code` after loading `schema` and `seed`.
    ///
    /// Only annotations for the submitted code are returned; schema and seed
    /// problems are the author's business.
    pub async fn check(&self, schema: &str, seed: &str, code: &str, mode: CheckMode) -> Vec<Annotation> {
        let (input, commands) = build_input(schema, seed, code, mode);
        let user_commands = match mode {
            CheckMode::Query => 1,
            CheckMode::Statements => split_script(code).len(),
        };

        let output = match self.run(&input).await {
            Ok(output) => output,
            Err(e) => {
                error!("Static checker failed: {}", e);
                return Vec::new();
            }
        };

        let parsed = match parse_output(&output, commands) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Unable to parse static checker output: {}\n{}", e, output);
                return Vec::new();
            }
        };

        let user_annotations: Vec<Annotation> = parsed
            .into_iter()
            .skip(commands.saturating_sub(user_commands))
            .flatten()
            .collect();

        let (kept, unrecognized) = partition_unrecognized(user_annotations);
        if !unrecognized.is_empty() {
            self.log_unrecognized(code, &unrecognized).await;
        }
        debug!("Static checker produced {} annotation(s)", kept.len());
        kept
    }

    async fn log_unrecognized(&self, code: &str, annotations: &[Annotation]) {
        let mut entry = format!("----- {}\n{}\n", Utc::now().to_rfc3339(), code.trim());
        for annotation in annotations {
            entry.push_str(&format!("{}: {}\n", annotation.severity, annotation.message));
        }

        let path = self.unrecognized_log();
        let result = async {
            tokio::fs::create_dir_all(&self.config.log_dir).await?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(entry.as_bytes()).await
        }
        .await;

        if let Err(e) = result {
            warn!("Could not write checker report to {}: {}", path.display(), e);
        }
    }
}
