//! Bounded pool of admin connections
//!
//! Every workspace creation and teardown borrows one admin handle. Acquiring
//! waits at most the configured timeout; running out is an infrastructure
//! failure, never a student's fault.

use std::time::Duration;
use deadpool_postgres::{
    Config, ManagerConfig, Object, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use log::{debug, warn};
use tokio_postgres::NoTls;

use sql_judge_core::{Failure, Phase};
use crate::config::JudgeConfig;
use crate::error::{to_pool_error, Result};

/// A borrowed admin connection, returned to the pool on drop
pub type AdminHandle = Object;

/// Session options of every admin connection.
///
/// Lock waits are bounded so a workspace drop blocked by a lock held
/// elsewhere fails instead of hanging.
fn admin_options(config: &JudgeConfig) -> String {
    format!("-c lock_timeout={}", config.workspace.drop_timeout_ms)
}

/// Pool of privileged connections
#[derive(Clone)]
pub struct AdminPool {
    pool: Pool,
    acquire_timeout: Duration,
}

impl AdminPool {
    /// Build the pool; connections are opened lazily
    pub fn new(config: &JudgeConfig) -> Result<Self> {
        let db = &config.database;
        let acquire_timeout = config.acquire_timeout();
        let connect_timeout = Duration::from_millis(db.connect_timeout_ms);

        let mut cfg = Config::new();
        cfg.host = Some(db.host.clone());
        cfg.port = Some(db.port);
        cfg.dbname = Some(db.dbname.clone());
        cfg.user = Some(db.admin_user.clone());
        cfg.password = Some(db.admin_password.clone());
        cfg.application_name = Some("sqljudge-admin".to_string());
        cfg.options = Some(admin_options(config));
        cfg.connect_timeout = Some(connect_timeout);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(config.admin_pool.size_max);
        pool_config.timeouts = Timeouts {
            wait: Some(acquire_timeout),
            create: Some(connect_timeout),
            recycle: Some(connect_timeout),
        };
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(to_pool_error)?;

        debug!(
            "Admin pool ready for {}@{}:{}/{} (max {})",
            db.admin_user, db.host, db.port, db.dbname, config.admin_pool.size_max
        );

        Ok(AdminPool { pool, acquire_timeout })
    }

    /// Borrow an admin handle, waiting at most the configured timeout
    pub async fn acquire(&self) -> std::result::Result<AdminHandle, Failure> {
        match self.pool.get().await {
            Ok(handle) => Ok(handle),
            Err(PoolError::Timeout(kind)) => {
                warn!("Admin pool exhausted after {:?} ({:?})", self.acquire_timeout, kind);
                metrics::increment_counter!("admin_pool_timeouts_total");
                Err(Failure::timeout(
                    Phase::AcquireAdmin,
                    format!("no admin connection available within {:?}", self.acquire_timeout),
                ))
            }
            Err(e) => Err(Failure::engine(Phase::AcquireAdmin, e.to_string())),
        }
    }

    /// Current pool size and number of idle handles
    pub fn status(&self) -> (usize, usize) {
        let status = self.pool.status();
        (status.size, status.available.max(0) as usize)
    }

    /// Close the pool; pending and future acquisitions fail
    pub fn close(&self) {
        self.pool.close();
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
