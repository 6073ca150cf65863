//! Disposable database workspaces
//!
//! A workspace is a `LOGIN` role with its own schema, created for exactly one
//! judging call. Creation runs as a single batch so it is atomic; the role
//! comment records the creation time for the reaper.

use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::{distributions::Alphanumeric, Rng};
use tokio_postgres::NoTls;

use sql_judge_core::{Failure, Phase};
use crate::config::{DatabaseConfig, JudgeConfig};
use crate::error::{to_workspace_error, EngineError, Result};
use crate::pool::{AdminHandle, AdminPool};

const COMMENT_PREFIX: &str = "sqljudge workspace created at ";
const DROP_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Credentials of one workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Role name, also the schema name
    pub user: String,

    /// Role password
    pub password: String,

    /// Tablespace the role writes to
    pub tablespace: String,

    /// When the role was created
    pub created_at: DateTime<Utc>,
}

/// Quote a string literal for DDL that cannot take bind parameters
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote an identifier
pub(crate) fn quote_ident(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Parse the creation time back out of a role comment
pub(crate) fn parse_created_at(comment: &str) -> Option<DateTime<Utc>> {
    let stamp = comment.strip_prefix(COMMENT_PREFIX)?;
    DateTime::parse_from_rfc3339(stamp.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

struct Inner {
    pool: AdminPool,
    database: DatabaseConfig,
    prefix: String,
    tablespace: String,
    connection_limit: i32,
    stmt_timeout_ms: u64,
    drop_timeout: Duration,
}

/// Creates, drops and reaps workspaces through the admin pool
#[derive(Clone)]
pub struct WorkspaceManager {
    inner: Arc<Inner>,
}

impl WorkspaceManager {
    /// Create a manager drawing admin handles from `pool`
    pub fn new(pool: AdminPool, config: &JudgeConfig) -> Self {
        WorkspaceManager {
            inner: Arc::new(Inner {
                pool,
                database: config.database.clone(),
                prefix: config.workspace.prefix.clone(),
                tablespace: config.tablespace_name.clone(),
                connection_limit: config.workspace.connection_limit,
                stmt_timeout_ms: config.limits.stmt_timeout_ms,
                drop_timeout: config.drop_timeout(),
            }),
        }
    }

    /// Role name prefix shared by every workspace
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Connection settings for a session as the workspace role
    pub fn connect_config(&self, workspace: &Workspace) -> tokio_postgres::Config {
        self.inner.database.pg_config(&workspace.user, &workspace.password)
    }

    fn fresh_user(&self) -> String {
        let suffix: [u8; 8] = rand::thread_rng().gen();
        format!("{}{}", self.inner.prefix, hex::encode(suffix))
    }

    fn fresh_password() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect()
    }

    fn creation_script(&self, workspace: &Workspace) -> String {
        let user = quote_ident(&workspace.user);
        let tablespace = quote_ident(&workspace.tablespace);
        format!(
            "CREATE ROLE {user} LOGIN NOSUPERUSER NOCREATEDB NOCREATEROLE NOINHERIT \
                 PASSWORD {password} CONNECTION LIMIT {limit};\n\
             CREATE SCHEMA AUTHORIZATION {user};\n\
             GRANT CREATE ON TABLESPACE {tablespace} TO {user};\n\
             ALTER ROLE {user} SET search_path = {user};\n\
             ALTER ROLE {user} SET default_tablespace = {tablespace};\n\
             ALTER ROLE {user} SET statement_timeout = {timeout};\n\
             COMMENT ON ROLE {user} IS {comment};",
            user = user,
            tablespace = tablespace,
            password = quote_literal(&workspace.password),
            limit = self.inner.connection_limit,
            timeout = self.inner.stmt_timeout_ms,
            comment = quote_literal(&format!("{}{}", COMMENT_PREFIX, workspace.created_at.to_rfc3339())),
        )
    }

    /// Create a fresh workspace and return a lease that drops it
    pub async fn new_workspace(&self) -> std::result::Result<WorkspaceLease, Failure> {
        let admin = self.inner.pool.acquire().await?;

        let workspace = Workspace {
            user: self.fresh_user(),
            password: Self::fresh_password(),
            tablespace: self.inner.tablespace.clone(),
            created_at: Utc::now(),
        };

        // A multi-statement simple query runs in one implicit transaction
        admin
            .batch_execute(&self.creation_script(&workspace))
            .await
            .map_err(|e| {
                error!("Failed to create workspace {}: {}", workspace.user, e);
                Failure::engine(Phase::CreateWorkspace, e.to_string())
            })?;
        drop(admin);

        metrics::increment_counter!("workspaces_created_total");
        debug!("Created workspace {}", workspace.user);

        Ok(WorkspaceLease {
            workspace,
            manager: self.clone(),
            released: false,
        })
    }

    async fn admin(&self) -> Result<AdminHandle> {
        self.inner
            .pool
            .acquire()
            .await
            .map_err(to_workspace_error)
    }

    async fn drop_with(&self, admin: &AdminHandle, user: &str) -> Result<bool> {
        let exists = admin
            .query_opt("SELECT 1 FROM pg_roles WHERE rolname = $1", &[&user])
            .await?
            .is_some();
        if !exists {
            return Ok(false);
        }

        let terminated = admin
            .query(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                 WHERE usename = $1 AND pid <> pg_backend_pid()",
                &[&user],
            )
            .await?
            .len();
        if terminated > 0 {
            debug!("Terminated {} session(s) of {}", terminated, user);
        }

        let ident = quote_ident(user);
        let ddl = format!("DROP OWNED BY {ident} CASCADE;\nDROP ROLE {ident};", ident = ident);
        match tokio::time::timeout(self.inner.drop_timeout, admin.batch_execute(&ddl)).await {
            Ok(result) => result?,
            Err(_) => {
                if let Err(e) = admin.cancel_token().cancel_query(NoTls).await {
                    warn!("Failed to cancel the drop of {}: {}", user, e);
                }
                return Err(EngineError::DropTimedOut {
                    user: user.to_string(),
                    after: self.inner.drop_timeout,
                });
            }
        }
        Ok(true)
    }

    /// Terminate the role's sessions and drop it with everything it owns.
    ///
    /// A failed drop is retried once; the role may still be connected right
    /// after a cancelled statement. Each attempt waits at most the configured
    /// drop timeout, and a timed out drop is not retried.
    pub async fn drop_workspace(&self, user: &str) -> Result<()> {
        let admin = self.admin().await?;
        let dropped = match self.drop_with(&admin, user).await {
            Ok(dropped) => dropped,
            Err(e @ EngineError::DropTimedOut { .. }) => return Err(e),
            Err(e) => {
                debug!("Dropping {} failed, retrying once: {}", user, e);
                tokio::time::sleep(DROP_RETRY_BACKOFF).await;
                self.drop_with(&admin, user).await?
            }
        };
        if dropped {
            metrics::increment_counter!("workspaces_dropped_total");
            debug!("Dropped workspace {}", user);
        }
        Ok(())
    }

    async fn list_workspaces(&self, admin: &AdminHandle) -> Result<Vec<(String, Option<DateTime<Utc>>)>> {
        let rows = admin
            .query(
                "SELECT rolname::text, shobj_description(oid, 'pg_authid') \
                 FROM pg_roles WHERE starts_with(rolname::text, $1)",
                &[&self.inner.prefix],
            )
            .await?;

        let mut workspaces = Vec::with_capacity(rows.len());
        for row in &rows {
            let user: String = row.try_get(0)?;
            let comment: Option<String> = row.try_get(1)?;
            workspaces.push((user, comment.as_deref().and_then(parse_created_at)));
        }
        Ok(workspaces)
    }

    fn stale_users(workspaces: Vec<(String, Option<DateTime<Utc>>)>, min_age: Duration) -> Vec<String> {
        let now = Utc::now();
        let min_age = chrono::Duration::from_std(min_age).unwrap_or_else(|_| chrono::Duration::max_value());
        workspaces
            .into_iter()
            .filter_map(|(user, created_at)| match created_at {
                Some(t) if now - t >= min_age => Some(user),
                Some(_) => None,
                None => {
                    warn!("Role {} carries the workspace prefix but no creation time; leaving it", user);
                    None
                }
            })
            .collect()
    }

    /// Number of workspace roles currently present
    pub async fn count_workspaces(&self) -> Result<usize> {
        let admin = self.admin().await?;
        Ok(self.list_workspaces(&admin).await?.len())
    }

    /// Number of workspaces older than `min_age`
    pub async fn count_stale(&self, min_age: Duration) -> Result<usize> {
        let admin = self.admin().await?;
        let workspaces = self.list_workspaces(&admin).await?;
        Ok(Self::stale_users(workspaces, min_age).len())
    }

    /// Drop every workspace older than `min_age`; returns how many were dropped
    pub async fn reap_stale(&self, min_age: Duration) -> Result<usize> {
        let admin = self.admin().await?;
        let stale = Self::stale_users(self.list_workspaces(&admin).await?, min_age);

        let mut reaped = 0;
        for user in stale {
            match self.drop_with(&admin, &user).await {
                Ok(true) => {
                    reaped += 1;
                    metrics::increment_counter!("workspaces_reaped_total");
                    info!("Reaped stale workspace {}", user);
                }
                Ok(false) => {}
                Err(e) => warn!("Could not reap workspace {}: {}", user, e),
            }
        }
        Ok(reaped)
    }
}

/// Scoped ownership of a workspace.
///
/// Call [`WorkspaceLease::release`] to drop the workspace and wait for it.
/// A lease dropped without release schedules the teardown on the runtime.
pub struct WorkspaceLease {
    workspace: Workspace,
    manager: WorkspaceManager,
    released: bool,
}

impl WorkspaceLease {
    /// Credentials of the leased workspace
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Role name of the leased workspace
    pub fn user(&self) -> &str {
        &self.workspace.user
    }

    /// Connection settings for a session as the workspace role
    pub fn connect_config(&self) -> tokio_postgres::Config {
        self.manager.connect_config(&self.workspace)
    }

    /// Drop the workspace now. Failures are logged and left to the reaper.
    pub async fn release(mut self) {
        self.released = true;
        teardown(&self.manager, &self.workspace.user).await;
    }
}

async fn teardown(manager: &WorkspaceManager, user: &str) {
    match manager.drop_workspace(user).await {
        Ok(()) => {}
        Err(e @ EngineError::DropTimedOut { .. }) => {
            metrics::increment_counter!("workspace_drop_failures_total");
            warn!("{}, leaving it to the reaper", e);
        }
        Err(e) => {
            metrics::increment_counter!("workspace_drop_failures_total");
            error!("Failed to drop workspace {}, leaving it to the reaper: {}", user, e);
        }
    }
}

impl Drop for WorkspaceLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let user = self.workspace.user.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Workspace {} was not released, dropping it in the background", user);
                let manager = self.manager.clone();
                handle.spawn(async move {
                    teardown(&manager, &user).await;
                });
            }
            Err(_) => {
                metrics::increment_counter!("workspace_drop_failures_total");
                error!("No runtime to drop workspace {}, leaving it to the reaper", user);
            }
        }
    }
}

impl std::fmt::Debug for WorkspaceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceLease")
            .field("user", &self.workspace.user)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> WorkspaceManager {
        let config = JudgeConfig::default();
        WorkspaceManager::new(AdminPool::new(&config).unwrap(), &config)
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn test_fresh_user_shape() {
        let m = manager();
        let user = m.fresh_user();
        assert!(user.starts_with("sqljudge_"));
        let suffix = &user["sqljudge_".len()..];
        assert_eq!(suffix.len(), 16);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(user, m.fresh_user());
    }

    #[tokio::test]
    async fn test_creation_script() {
        let m = manager();
        let workspace = Workspace {
            user: "sqljudge_00ff".to_string(),
            password: "pw".to_string(),
            tablespace: "pg_default".to_string(),
            created_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z").unwrap().with_timezone(&Utc),
        };
        let script = m.creation_script(&workspace);
        assert!(script.starts_with("CREATE ROLE \"sqljudge_00ff\" LOGIN"));
        assert!(script.contains("PASSWORD 'pw' CONNECTION LIMIT 2;"));
        assert!(script.contains("GRANT CREATE ON TABLESPACE \"pg_default\" TO \"sqljudge_00ff\";"));
        assert!(script.contains("SET statement_timeout = 3000;"));
        assert!(script.contains("IS 'sqljudge workspace created at 2026-01-02T03:04:05+00:00';"));
    }

    #[test]
    fn test_parse_created_at() {
        let t = parse_created_at("sqljudge workspace created at 2026-01-02T03:04:05+00:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2026-01-02T03:04:05+00:00");
        assert!(parse_created_at("created by hand").is_none());
        assert!(parse_created_at("sqljudge workspace created at yesterday").is_none());
    }

    proptest::proptest! {
        #[test]
        fn test_quote_literal_is_reversible(value in ".*") {
            let quoted = quote_literal(&value);
            let inner = &quoted[1..quoted.len() - 1];
            proptest::prop_assert_eq!(inner.replace("''", "'"), value);
            proptest::prop_assert!(!inner.replace("''", "").contains('\''));
        }
    }

    #[test]
    fn test_stale_users() {
        let now = Utc::now();
        let workspaces = vec![
            ("old".to_string(), Some(now - chrono::Duration::hours(2))),
            ("young".to_string(), Some(now - chrono::Duration::seconds(5))),
            ("unknown".to_string(), None),
        ];
        let stale = WorkspaceManager::stale_users(workspaces, Duration::from_secs(3600));
        assert_eq!(stale, vec!["old".to_string()]);
    }
}
