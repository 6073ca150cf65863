use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use tokio_util::sync::CancellationToken;

use sql_judge_core::Problem;
use sql_judge_engine::{AdminPool, Judge, JudgeConfig, Reaper, Reference, StaticChecker, WorkspaceManager};

#[derive(Parser, Debug)]
#[command(author, version, about = "SQL Judge - judge SQL exercises in disposable PostgreSQL workspaces")]
struct Args {
    /// Config file path
    #[arg(short, long, env = "SQLJUDGE_CONFIG", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Judge a submission and print the verdict as JSON
    Judge {
        /// Problem definition (JSON)
        #[arg(long)]
        problem: PathBuf,
        /// Submitted SQL source
        #[arg(long)]
        source: PathBuf,
        /// Reference built earlier with `reference`; built on the fly when absent
        #[arg(long)]
        reference: Option<PathBuf>,
    },
    /// Run the reference solution and print the expected results as JSON
    Reference {
        /// Problem definition (JSON)
        #[arg(long)]
        problem: PathBuf,
    },
    /// Drop stale workspaces once
    Reap {
        /// Minimum age in seconds; defaults to the configured value
        #[arg(long)]
        min_age_secs: Option<u64>,
    },
    /// Print the number of stale workspaces
    Stale {
        /// Minimum age in seconds; defaults to the configured value
        #[arg(long)]
        min_age_secs: Option<u64>,
    },
    /// Run the periodic reaper until Ctrl+C
    Daemon,
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

fn load_problem(path: &Path) -> Result<Problem> {
    Problem::from_json(&read(path)?).with_context(|| format!("invalid problem in {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();
    let config = JudgeConfig::load(args.config.as_deref())?;

    let pool = AdminPool::new(&config)?;
    let manager = WorkspaceManager::new(pool.clone(), &config);
    let mut judge = Judge::new(manager.clone(), config.limits.clone());
    if let Some(checker) = &config.checker {
        judge = judge.with_checker(StaticChecker::new(checker.clone()));
    }

    let min_age = |secs: Option<u64>| secs.map(Duration::from_secs).unwrap_or_else(|| config.reaper_min_age());

    match args.command {
        Command::Judge { problem, source, reference } => {
            let problem = load_problem(&problem)?;
            let code = read(&source)?;
            let outcome = match reference {
                Some(path) => {
                    let reference: Reference = serde_json::from_str(&read(&path)?)
                        .with_context(|| format!("invalid reference in {}", path.display()))?;
                    judge.judge_with_reference(&problem, &reference, &code).await
                }
                None => judge.judge(&problem, &code).await,
            };
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Reference { problem } => {
            let problem = load_problem(&problem)?;
            let reference = match judge.build_reference(&problem).await {
                Ok(reference) => reference,
                Err(failure) => bail!("reference solution failed: {}", failure),
            };
            println!("{}", serde_json::to_string_pretty(&reference)?);
        }
        Command::Reap { min_age_secs } => {
            let reaped = manager.reap_stale(min_age(min_age_secs)).await?;
            println!("{}", reaped);
        }
        Command::Stale { min_age_secs } => {
            let stale = manager.count_stale(min_age(min_age_secs)).await?;
            println!("{}", stale);
        }
        Command::Daemon => {
            let shutdown = CancellationToken::new();
            let reaper = Reaper::from_config(manager.clone(), &config).spawn(shutdown.clone());

            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            shutdown.cancel();
            reaper.await?;
        }
    }

    pool.close();
    Ok(())
}
