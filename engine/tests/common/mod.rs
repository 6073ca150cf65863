//! Shared setup for database-backed tests.
//!
//! These tests need a PostgreSQL admin connection string in
//! `SQLJUDGE_TEST_DATABASE_URL`; without it every test returns early.

#![allow(dead_code)]

use sql_judge_engine::{AdminPool, Judge, JudgeConfig, WorkspaceManager};

pub const DATABASE_URL_ENV: &str = "SQLJUDGE_TEST_DATABASE_URL";

pub struct TestEnv {
    pub config: JudgeConfig,
    pub pool: AdminPool,
    pub manager: WorkspaceManager,
    pub judge: Judge,
}

/// Build a judge whose workspaces carry their own prefix, so tests running
/// in parallel can count their workspaces independently
pub fn setup(tag: &str) -> Option<TestEnv> {
    let url = match std::env::var(DATABASE_URL_ENV) {
        Ok(url) => url,
        Err(_) => {
            eprintln!("{} is not set, skipping", DATABASE_URL_ENV);
            return None;
        }
    };

    let mut config = JudgeConfig::for_testing(&url).unwrap();
    config.workspace.prefix = format!("sqljudge_test_{}_", tag);
    config.validate().unwrap();

    let pool = AdminPool::new(&config).unwrap();
    let manager = WorkspaceManager::new(pool.clone(), &config);
    let judge = Judge::new(manager.clone(), config.limits.clone());
    Some(TestEnv { config, pool, manager, judge })
}
