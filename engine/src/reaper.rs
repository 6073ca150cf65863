//! Periodic sweep of stale workspaces
//!
//! Teardown can lose a race with a session that is still being cancelled.
//! The reaper drops such leftovers once they are older than any judging call
//! could be.

use std::time::Duration;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::JudgeConfig;
use crate::error::Result;
use crate::workspace::WorkspaceManager;

/// Background workspace reaper
#[derive(Clone)]
pub struct Reaper {
    manager: WorkspaceManager,
    interval: Duration,
    min_age: Duration,
}

impl Reaper {
    /// Create a reaper sweeping every `interval` for workspaces older than `min_age`
    pub fn new(manager: WorkspaceManager, interval: Duration, min_age: Duration) -> Self {
        Reaper { manager, interval, min_age }
    }

    /// Create a reaper with the configured interval and age
    pub fn from_config(manager: WorkspaceManager, config: &JudgeConfig) -> Self {
        Self::new(manager, config.reaper_interval(), config.reaper_min_age())
    }

    /// Run one sweep
    pub async fn sweep(&self) -> Result<usize> {
        let reaped = self.manager.reap_stale(self.min_age).await?;
        if reaped > 0 {
            info!("Reaper dropped {} stale workspace(s)", reaped);
        } else {
            debug!("Reaper found no stale workspaces");
        }
        Ok(reaped)
    }

    /// Sweep on every tick until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Reaper started: every {:?}, dropping workspaces older than {:?}",
            self.interval, self.min_age
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!("Reaper sweep failed: {}", e);
                    }
                }
            }
        }
        info!("Reaper stopped");
    }

    /// Run on a background task
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
