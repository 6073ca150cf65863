//! Judging pipeline
//!
//! For every problem kind the reference solution and the submission run in
//! separate fresh workspaces: create workspace, open a session as its role,
//! run schema and seed, run the code, snapshot, compare, tear down. Any
//! failure short-circuits to a classified verdict and teardown still runs.

use log::{debug, error, info, warn};
use serde::{Serialize, Deserialize};

use sql_judge_core::checker::{Annotation, CheckMode};
use sql_judge_core::compare::{
    compare_discriminant, compare_function_results, compare_select_variant, compare_snapshots, diff_snapshots,
    CallResult,
};
use sql_judge_core::sql::{split, split_script, Statement};
use sql_judge_core::utils::Timer;
use sql_judge_core::{
    DatabaseSnapshot, Failure, FailureKind, Phase, Problem, ProblemDetails, ProblemKind, ResourceCaps, ResultTable,
    Verdict, VerdictCode,
};

use crate::checker::StaticChecker;
use crate::executor::Session;
use crate::workspace::{WorkspaceLease, WorkspaceManager};

/// Expected result on one seed variant of a SELECT problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectVariant {
    /// Tables right after seeding
    pub initial_database: DatabaseSnapshot,

    /// Result of the reference query
    pub expected: ResultTable,
}

/// Precomputed outcome of a reference solution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reference {
    /// One expected result per seed variant
    Select {
        /// Variants in seed order
        variants: Vec<SelectVariant>,
    },

    /// Database before and after the reference statements
    Dml {
        /// Tables right after seeding
        initial_database: DatabaseSnapshot,
        /// Tables after the reference ran
        expected: DatabaseSnapshot,
    },

    /// Value of every call expression
    Function {
        /// Results in call order
        expected: Vec<CallResult>,
    },

    /// Database before and after calling the reference procedure
    Procedure {
        /// Tables right after seeding
        initial_database: DatabaseSnapshot,
        /// Tables after the call
        expected: DatabaseSnapshot,
    },

    /// Database before and after the test statements fired the reference trigger
    Trigger {
        /// Tables right after seeding
        initial_database: DatabaseSnapshot,
        /// Tables after the test statements
        expected: DatabaseSnapshot,
    },

    /// Base data both queries are evaluated on before submitted rows are added
    Discriminant {
        /// Tables after seeding with the base data
        initial_database: DatabaseSnapshot,
    },
}

impl Reference {
    /// Problem kind this reference belongs to
    pub fn kind(&self) -> ProblemKind {
        match self {
            Reference::Select { .. } => ProblemKind::Select,
            Reference::Dml { .. } => ProblemKind::Dml,
            Reference::Function { .. } => ProblemKind::Function,
            Reference::Procedure { .. } => ProblemKind::Procedure,
            Reference::Trigger { .. } => ProblemKind::Trigger,
            Reference::Discriminant { .. } => ProblemKind::Discriminant,
        }
    }
}

/// Verdict plus advisory checker annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeOutcome {
    /// The verdict
    pub verdict: Verdict,

    /// Static checker annotations on the submitted code
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl From<Verdict> for JudgeOutcome {
    fn from(verdict: Verdict) -> Self {
        JudgeOutcome {
            verdict,
            annotations: Vec::new(),
        }
    }
}

/// A workspace with an open session, torn down by `close`
struct Sandbox {
    lease: WorkspaceLease,
    session: Session,
}

impl Sandbox {
    async fn close(self) {
        self.session.close().await;
        self.lease.release().await;
    }
}

/// Runs the reference solution and submissions of every problem kind
#[derive(Clone)]
pub struct Judge {
    manager: WorkspaceManager,
    caps: ResourceCaps,
    checker: Option<StaticChecker>,
}

impl Judge {
    /// Create a judge
    pub fn new(manager: WorkspaceManager, caps: ResourceCaps) -> Self {
        Judge {
            manager,
            caps,
            checker: None,
        }
    }

    /// Annotate SELECT and DML submissions with a static checker
    pub fn with_checker(mut self, checker: StaticChecker) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Workspace manager in use
    pub fn manager(&self) -> &WorkspaceManager {
        &self.manager
    }

    async fn open_sandbox(&self) -> Result<Sandbox, Failure> {
        let lease = self.manager.new_workspace().await?;
        match Session::open(&lease.connect_config(), self.caps.clone()).await {
            Ok(session) => Ok(Sandbox { lease, session }),
            Err(failure) => {
                lease.release().await;
                Err(failure)
            }
        }
    }

    /// Open a sandbox and load the schema followed by the given seed scripts
    async fn seeded_sandbox(&self, schema: &str, seeds: &[&str]) -> Result<Sandbox, Failure> {
        let sandbox = self.open_sandbox().await?;
        let setup = async {
            sandbox.session.run_script(Phase::RunSchema, schema).await?;
            for seed in seeds {
                sandbox.session.run_script(Phase::RunSeed, seed).await?;
            }
            Ok::<(), Failure>(())
        }
        .await;

        match setup {
            Ok(()) => Ok(sandbox),
            Err(failure) => {
                sandbox.close().await;
                Err(failure)
            }
        }
    }

    fn single_statement(text: &str) -> Result<Statement, Failure> {
        let mut statements = split_script(text);
        if statements.len() != 1 {
            return Err(Failure::engine(
                Phase::RunSeed,
                format!("expected one statement, found {}", statements.len()),
            ));
        }
        Ok(statements.remove(0))
    }

    async fn run_step(session: &Session, step: &Step<'_>) -> Result<(), Failure> {
        match *step {
            Step::Transaction { source, statements } => {
                session.run_transaction(Phase::RunUser, source, statements).await
            }
            Step::CompileThenRun { body_source, body, run_source, run } => {
                session.compile(body_source, body).await?;
                // Positions would point into the problem's statements, not the submission
                session
                    .run_statements(Phase::RunUser, run_source, run)
                    .await
                    .map_err(|failure| failure.with_position(None))
            }
        }
    }

    /// Seed a sandbox, run `step` and snapshot, optionally also before the step
    async fn snapshots(
        &self,
        schema: &str,
        seed: &str,
        step: Step<'_>,
        capture_initial: bool,
    ) -> Result<(DatabaseSnapshot, DatabaseSnapshot), Failure> {
        let sandbox = self.seeded_sandbox(schema, &[seed]).await?;
        let result = async {
            let initial = if capture_initial {
                sandbox.session.snapshot(Phase::Snapshot).await?
            } else {
                DatabaseSnapshot::new()
            };
            Self::run_step(&sandbox.session, &step).await?;
            let after = sandbox.session.snapshot(Phase::Snapshot).await?;
            Ok::<_, Failure>((initial, after))
        }
        .await;
        sandbox.close().await;
        result
    }

    /// Run the reference solution of `problem` and record what it produced.
    ///
    /// Any failure here is a problem-definition bug and surfaces as `IE`.
    pub async fn build_reference(&self, problem: &Problem) -> Result<Reference, Failure> {
        problem
            .validate()
            .map_err(|e| Failure::engine(Phase::RunSchema, e.to_string()))?;

        let mut timer = Timer::new(format!("reference {}", problem.label()));
        let schema = problem.schema_sql.as_str();
        let first_seed = problem.first_seed();

        let reference = match &problem.details {
            ProblemDetails::Select { reference_query } => {
                let query = Self::single_statement(reference_query)?;
                let mut variants = Vec::new();
                for seed in problem.seed_variants() {
                    let sandbox = self.seeded_sandbox(schema, &[seed.as_str()]).await?;
                    let result = async {
                        let initial_database = sandbox.session.snapshot(Phase::Snapshot).await?;
                        let expected = sandbox.session.query_table(Phase::RunUser, reference_query, &query).await?;
                        Ok::<_, Failure>(SelectVariant { initial_database, expected })
                    }
                    .await;
                    sandbox.close().await;
                    variants.push(result?);
                    timer.checkpoint(format!("variant {}", variants.len()));
                }
                Reference::Select { variants }
            }

            ProblemDetails::Dml { reference_dml } => {
                let statements = split_script(reference_dml);
                let step = Step::Transaction {
                    source: reference_dml,
                    statements: &statements,
                };
                let (initial_database, expected) = self.snapshots(schema, &first_seed, step, true).await?;
                Reference::Dml { initial_database, expected }
            }

            ProblemDetails::Function { reference_function_body, calls } => {
                let body = split_script(reference_function_body);
                let sandbox = self.seeded_sandbox(schema, &[first_seed.as_str()]).await?;
                let result = async {
                    sandbox.session.compile(reference_function_body, &body).await?;
                    let mut expected = Vec::with_capacity(calls.len());
                    for call in calls.iter().filter(|c| !c.trim().is_empty()) {
                        expected.push(sandbox.session.call_function(Phase::RunUser, call).await?);
                    }
                    Ok::<_, Failure>(expected)
                }
                .await;
                sandbox.close().await;
                Reference::Function { expected: result? }
            }

            ProblemDetails::Procedure { reference_procedure_body, call_statement } => {
                let body = split_script(reference_procedure_body);
                let call = split_script(call_statement);
                let step = Step::CompileThenRun {
                    body_source: reference_procedure_body,
                    body: &body,
                    run_source: call_statement,
                    run: &call,
                };
                let (initial_database, expected) = self.snapshots(schema, &first_seed, step, true).await?;
                Reference::Procedure { initial_database, expected }
            }

            ProblemDetails::Trigger { reference_trigger_body, test_dml } => {
                let body = split_script(reference_trigger_body);
                let dml = split_script(test_dml);
                let step = Step::CompileThenRun {
                    body_source: reference_trigger_body,
                    body: &body,
                    run_source: test_dml,
                    run: &dml,
                };
                let (initial_database, expected) = self.snapshots(schema, &first_seed, step, true).await?;
                Reference::Trigger { initial_database, expected }
            }

            ProblemDetails::Discriminant { base_seed_sql, correct_query, buggy_query } => {
                let correct = Self::single_statement(correct_query)?;
                let buggy = Self::single_statement(buggy_query)?;
                let sandbox = self.seeded_sandbox(schema, &[first_seed.as_str(), base_seed_sql.as_str()]).await?;
                let result = async {
                    let initial_database = sandbox.session.snapshot(Phase::Snapshot).await?;
                    sandbox.session.query_table(Phase::RunUser, correct_query, &correct).await?;
                    sandbox.session.query_table(Phase::RunUser, buggy_query, &buggy).await?;
                    Ok::<_, Failure>(initial_database)
                }
                .await;
                sandbox.close().await;
                Reference::Discriminant { initial_database: result? }
            }
        };

        timer.finish(format!("built reference for {}", problem.label()));
        Ok(reference)
    }

    /// Judge `code`, running the reference solution first
    pub async fn judge(&self, problem: &Problem, code: &str) -> JudgeOutcome {
        let mut timer = Timer::new(format!("judge {}", problem.label()));

        let statements = match split(code, problem.statement_bounds()) {
            Ok(statements) => statements,
            Err(e) => return self.finish(problem, Verdict::from(e).into(), &timer),
        };

        let reference = match self.build_reference(problem).await {
            Ok(reference) => reference,
            Err(failure) => {
                error!("Reference solution of {} failed: {}", problem.label(), failure);
                return self.finish(problem, Verdict::internal_error().into(), &timer);
            }
        };
        timer.checkpoint("reference");

        self.judge_statements(problem, &reference, code, &statements, &mut timer).await
    }

    /// Judge `code` against a reference built earlier with [`Judge::build_reference`]
    pub async fn judge_with_reference(&self, problem: &Problem, reference: &Reference, code: &str) -> JudgeOutcome {
        let mut timer = Timer::new(format!("judge {}", problem.label()));

        let statements = match split(code, problem.statement_bounds()) {
            Ok(statements) => statements,
            Err(e) => return self.finish(problem, Verdict::from(e).into(), &timer),
        };

        if reference.kind() != problem.kind() {
            error!(
                "Reference of kind {} given for {}",
                reference.kind(),
                problem.label()
            );
            return self.finish(problem, Verdict::internal_error().into(), &timer);
        }

        self.judge_statements(problem, reference, code, &statements, &mut timer).await
    }

    async fn judge_statements(
        &self,
        problem: &Problem,
        reference: &Reference,
        code: &str,
        statements: &[Statement],
        timer: &mut Timer,
    ) -> JudgeOutcome {
        let verdict = match self.run_submission(problem, reference, code, statements).await {
            Ok(verdict) => verdict,
            Err(failure) => {
                let description = failure.to_string();
                let verdict = failure.into_verdict();
                if verdict.code == VerdictCode::IE {
                    warn!("Internal error judging {}: {}", problem.label(), description);
                } else {
                    debug!("Submission for {} failed: {}", problem.label(), description);
                }
                verdict
            }
        };
        timer.checkpoint("submission");

        let annotations = self.annotate(problem, code).await;
        timer.checkpoint("checker");

        self.finish(problem, JudgeOutcome { verdict, annotations }, timer)
    }

    fn with_changes(verdict: Verdict, initial: &DatabaseSnapshot, expected: &DatabaseSnapshot) -> Verdict {
        if verdict.code != VerdictCode::WA {
            return verdict;
        }
        let changes = diff_snapshots(initial, expected);
        if changes.is_empty() {
            verdict
        } else {
            verdict.with_table_changes(changes)
        }
    }

    async fn run_submission(
        &self,
        problem: &Problem,
        reference: &Reference,
        code: &str,
        statements: &[Statement],
    ) -> Result<Verdict, Failure> {
        let schema = problem.schema_sql.as_str();
        let first_seed = problem.first_seed();

        match (&problem.details, reference) {
            (ProblemDetails::Select { .. }, Reference::Select { variants }) => {
                let seeds = problem.seed_variants();
                if seeds.len() != variants.len() {
                    return Err(Failure::engine(
                        Phase::RunSeed,
                        format!("reference has {} variants, problem has {}", variants.len(), seeds.len()),
                    ));
                }

                for (index, (seed, variant)) in seeds.iter().zip(variants).enumerate() {
                    let sandbox = self.seeded_sandbox(schema, &[seed.as_str()]).await?;
                    let obtained = sandbox
                        .session
                        .query_table(Phase::RunUser, code, &statements[0])
                        .await
                        .map_err(Failure::into_runtime);
                    sandbox.close().await;

                    let verdict = compare_select_variant(
                        &variant.expected,
                        &obtained?,
                        problem.check_order,
                        index,
                        &variant.initial_database,
                    );
                    if !verdict.is_accepted() {
                        return Ok(verdict);
                    }
                }
                Ok(Verdict::accepted())
            }

            (ProblemDetails::Dml { .. }, Reference::Dml { initial_database, expected }) => {
                let step = Step::Transaction { source: code, statements };
                let (_, obtained) = self
                    .snapshots(schema, &first_seed, step, false)
                    .await
                    .map_err(Failure::into_runtime)?;
                Ok(Self::with_changes(compare_snapshots(expected, &obtained), initial_database, expected))
            }

            (ProblemDetails::Function { calls, .. }, Reference::Function { expected }) => {
                let sandbox = self.seeded_sandbox(schema, &[first_seed.as_str()]).await?;
                let result = async {
                    sandbox.session.compile(code, statements).await?;
                    let mut obtained = Vec::with_capacity(calls.len());
                    for call in calls.iter().filter(|c| !c.trim().is_empty()) {
                        match sandbox.session.call_function(Phase::RunUser, call).await {
                            Ok(result) => obtained.push(result),
                            Err(failure) if failure.kind == FailureKind::Engine => {
                                return Err(Failure::engine(
                                    Phase::RunUser,
                                    format!("{} --> {}", call.trim(), failure.message),
                                ));
                            }
                            Err(failure) => return Err(failure.with_position(None)),
                        }
                    }
                    Ok::<_, Failure>(obtained)
                }
                .await;
                sandbox.close().await;
                Ok(compare_function_results(expected, &result?))
            }

            (
                ProblemDetails::Procedure { call_statement, .. },
                Reference::Procedure { initial_database, expected },
            ) => {
                let call = split_script(call_statement);
                let step = Step::CompileThenRun {
                    body_source: code,
                    body: statements,
                    run_source: call_statement,
                    run: &call,
                };
                let (_, obtained) = self.snapshots(schema, &first_seed, step, false).await?;
                Ok(Self::with_changes(compare_snapshots(expected, &obtained), initial_database, expected))
            }

            (ProblemDetails::Trigger { test_dml, .. }, Reference::Trigger { initial_database, expected }) => {
                let dml = split_script(test_dml);
                let step = Step::CompileThenRun {
                    body_source: code,
                    body: statements,
                    run_source: test_dml,
                    run: &dml,
                };
                let (_, obtained) = self.snapshots(schema, &first_seed, step, false).await?;
                Ok(Self::with_changes(compare_snapshots(expected, &obtained), initial_database, expected))
            }

            (
                ProblemDetails::Discriminant { base_seed_sql, correct_query, buggy_query },
                Reference::Discriminant { .. },
            ) => {
                let correct = Self::single_statement(correct_query)?;
                let buggy = Self::single_statement(buggy_query)?;
                let sandbox = self.seeded_sandbox(schema, &[first_seed.as_str(), base_seed_sql.as_str()]).await?;
                let result = async {
                    sandbox
                        .session
                        .run_statements(Phase::RunUser, code, statements)
                        .await
                        .map_err(Failure::into_runtime)?;
                    let correct_result = sandbox
                        .session
                        .query_table(Phase::RunUser, correct_query, &correct)
                        .await
                        .map_err(|f| f.with_position(None))?;
                    let buggy_result = sandbox
                        .session
                        .query_table(Phase::RunUser, buggy_query, &buggy)
                        .await
                        .map_err(|f| f.with_position(None))?;
                    Ok::<_, Failure>(compare_discriminant(&correct_result, &buggy_result, problem.check_order))
                }
                .await;
                sandbox.close().await;
                result
            }

            (_, reference) => Err(Failure::engine(
                Phase::RunSchema,
                format!("reference of kind {} does not match {}", reference.kind(), problem.kind()),
            )),
        }
    }

    async fn annotate(&self, problem: &Problem, code: &str) -> Vec<Annotation> {
        let Some(checker) = &self.checker else {
            return Vec::new();
        };
        let mode = match problem.kind() {
            ProblemKind::Select => CheckMode::Query,
            ProblemKind::Dml => CheckMode::Statements,
            _ => return Vec::new(),
        };
        checker.check(&problem.schema_sql, &problem.first_seed(), code, mode).await
    }

    fn finish(&self, problem: &Problem, outcome: JudgeOutcome, timer: &Timer) -> JudgeOutcome {
        let kind = problem.kind().as_str();
        let verdict = outcome.verdict.code.as_str();
        let elapsed = timer.finish(format!("{} -> {}", problem.label(), verdict));

        metrics::increment_counter!("judge_verdicts_total", "kind" => kind, "verdict" => verdict);
        metrics::histogram!("judge_duration_ms", elapsed.as_millis() as f64, "kind" => kind);
        info!("Judged {}: {}", problem.label(), outcome.verdict);
        outcome
    }
}

/// Code run between seeding and the final snapshot
#[derive(Debug, Clone, Copy)]
enum Step<'a> {
    /// Statements in one transaction
    Transaction {
        source: &'a str,
        statements: &'a [Statement],
    },

    /// Stored objects, then statements that use them
    CompileThenRun {
        body_source: &'a str,
        body: &'a [Statement],
        run_source: &'a str,
        run: &'a [Statement],
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JudgeConfig;
    use crate::pool::AdminPool;
    use sql_judge_core::Cell;
    use sql_judge_core::Column;

    fn judge() -> Judge {
        let config = JudgeConfig::default();
        let pool = AdminPool::new(&config).unwrap();
        Judge::new(WorkspaceManager::new(pool, &config), config.limits.clone())
    }

    fn select_problem() -> Problem {
        Problem::new(
            "CREATE TABLE t(n NUMERIC);",
            ProblemDetails::Select {
                reference_query: "SELECT * FROM t".into(),
            },
        )
        .with_seed("INSERT INTO t VALUES (901);")
    }

    #[tokio::test]
    async fn test_validation_error_needs_no_database() {
        let outcome = judge()
            .judge(&select_problem(), "SELECT * FROM t; SELECT * FROM t;")
            .await;
        assert_eq!(outcome.verdict.code, VerdictCode::VE);

        let outcome = judge().judge(&select_problem(), "  -- nothing here
").await;
        assert_eq!(outcome.verdict.code, VerdictCode::VE);
    }

    #[tokio::test]
    async fn test_mismatched_reference_is_internal_error() {
        let reference = Reference::Function { expected: Vec::new() };
        let outcome = judge()
            .judge_with_reference(&select_problem(), &reference, "SELECT * FROM t")
            .await;
        assert_eq!(outcome.verdict.code, VerdictCode::IE);
        assert!(outcome.verdict.feedback.is_none());
    }

    #[test]
    fn test_single_statement() {
        assert!(Judge::single_statement("SELECT 1;").is_ok());
        let failure = Judge::single_statement("SELECT 1; SELECT 2").unwrap_err();
        assert_eq!(failure.into_verdict().code, VerdictCode::IE);
    }

    #[test]
    fn test_reference_round_trips_through_json() {
        let mut initial = DatabaseSnapshot::new();
        initial.insert("t", ResultTable::new(vec![Column::new("n", "numeric")], vec![vec![Cell::decimal("901")]]));
        let reference = Reference::Select {
            variants: vec![SelectVariant {
                initial_database: initial.clone(),
                expected: ResultTable::new(vec![Column::new("n", "numeric")], vec![vec![Cell::decimal("901")]]),
            }],
        };

        let json = serde_json::to_string(&reference).unwrap();
        assert!(json.contains("\"kind\":\"SELECT\""));
        let back: Reference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reference);
        assert_eq!(back.kind(), ProblemKind::Select);
    }

    #[test]
    fn test_changes_only_on_wrong_answer() {
        let initial = DatabaseSnapshot::new();
        let mut expected = DatabaseSnapshot::new();
        expected.insert("t", ResultTable::new(vec![Column::new("n", "INT4")], vec![vec![Cell::Int(1)]]));

        let accepted = Judge::with_changes(Verdict::accepted(), &initial, &expected);
        assert!(accepted.table_changes.is_none());

        let wrong = Judge::with_changes(
            Verdict::wrong_answer(sql_judge_core::Feedback::message("differs")),
            &initial,
            &expected,
        );
        let changes = wrong.table_changes.unwrap();
        assert_eq!(changes.added.table_names(), vec!["t".to_string()]);
    }
}
