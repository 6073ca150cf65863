//! End-to-end judging scenarios against a live PostgreSQL server

mod common;

use sql_judge_core::{Cell, Feedback, Position, Problem, ProblemDetails, VerdictCode};

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
async fn test_select_accepted() {
    let Some(env) = common::setup("sel_ac") else { return };
    let outcome = env.judge.judge(&select_problem(), "SELECT * FROM t").await;
    assert_eq!(outcome.verdict.code, VerdictCode::AC, "{}", outcome.verdict);
}

#[tokio::test]
async fn test_select_extra_row_is_flagged() {
    let Some(env) = common::setup("sel_wa") else { return };
    let outcome = env
        .judge
        .judge(&select_problem(), "(SELECT * FROM t) UNION ALL SELECT 42")
        .await;

    assert_eq!(outcome.verdict.code, VerdictCode::WA);
    match outcome.verdict.feedback {
        Feedback::UnexpectedRows { obtained, flagged } => {
            assert_eq!(flagged, vec![1]);
            assert_eq!(obtained.rows[1], vec![Cell::decimal("42")]);
        }
        other => panic!("unexpected feedback {:?}", other),
    }
}

#[tokio::test]
async fn test_select_too_many_rows() {
    let Some(env) = common::setup("sel_tle") else { return };
    let problem = Problem::new(
        "CREATE TABLE t(n INTEGER);",
        ProblemDetails::Select {
            reference_query: "SELECT generate_series(1, 1000) AS n".into(),
        },
    );

    let at_cap = env.judge.judge(&problem, "SELECT generate_series(1, 1000) AS n").await;
    assert_eq!(at_cap.verdict.code, VerdictCode::AC, "{}", at_cap.verdict);

    let over_cap = env.judge.judge(&problem, "SELECT generate_series(1, 1001) AS n").await;
    assert_eq!(over_cap.verdict.code, VerdictCode::TLE);
}

#[tokio::test]
async fn test_select_too_many_columns() {
    let Some(env) = common::setup("sel_cols") else { return };
    let max_cols = env.config.limits.max_cols;
    let columns = |n: usize| (1..=n).map(|i| format!("{} AS c{}", i, i)).collect::<Vec<_>>().join(", ");
    let problem = Problem::new(
        "CREATE TABLE t(n INTEGER);",
        ProblemDetails::Select {
            reference_query: format!("SELECT {}", columns(max_cols)),
        },
    );

    let at_cap = env.judge.judge(&problem, &format!("SELECT {}", columns(max_cols))).await;
    assert_eq!(at_cap.verdict.code, VerdictCode::AC, "{}", at_cap.verdict);

    let over_cap = env.judge.judge(&problem, &format!("SELECT {}", columns(max_cols + 1))).await;
    assert_eq!(over_cap.verdict.code, VerdictCode::TLE);
}

#[tokio::test]
async fn test_select_statement_timeout() {
    let Some(env) = common::setup("sel_sleep") else { return };
    let outcome = env
        .judge
        .judge(&select_problem(), "SELECT n FROM t, pg_sleep(5)")
        .await;
    assert_eq!(outcome.verdict.code, VerdictCode::TLE);
}

#[tokio::test]
async fn test_select_runtime_error_position() {
    let Some(env) = common::setup("sel_re") else { return };
    let outcome = env.judge.judge(&select_problem(), "SELECT *\nFROM missing_table").await;

    assert_eq!(outcome.verdict.code, VerdictCode::RE);
    assert_eq!(outcome.verdict.position, Some(Position::new(1, 5)));
}

#[tokio::test]
async fn test_select_wrong_on_second_variant() {
    let Some(env) = common::setup("sel_var") else { return };
    let problem = Problem::new(
        "CREATE TABLE t(n INTEGER);",
        ProblemDetails::Select {
            reference_query: "SELECT * FROM t WHERE n > 0".into(),
        },
    )
    .with_seed("INSERT INTO t VALUES (1);\n-- @new data base@\nINSERT INTO t VALUES (2);\n");

    let outcome = env.judge.judge(&problem, "SELECT * FROM t WHERE n = 1").await;
    assert_eq!(outcome.verdict.code, VerdictCode::WA);
    let initial = outcome.verdict.initial_database.expect("second variant database");
    assert_eq!(initial.table("t").unwrap().rows, vec![vec![Cell::Int(2)]]);
}

fn function_problem() -> Problem {
    Problem::new(
        "CREATE TABLE t(n INTEGER);",
        ProblemDetails::Function {
            reference_function_body: "CREATE FUNCTION position_of(s TEXT, c TEXT) RETURNS INTEGER AS $$\n\
                 BEGIN\n  RETURN strpos(s, c);\nEND;\n$$ LANGUAGE plpgsql;"
                .into(),
            calls: vec!["position_of('hello', 'l')".into(), "position_of('abc', 'z')".into()],
        },
    )
}

#[tokio::test]
async fn test_function_compile_error() {
    let Some(env) = common::setup("fn_ce") else { return };
    let code = "CREATE FUNCTION position_of(s TEXT, c TEXT) RETURNS INTEGER AS $$\n\
                BEGIN\n  RETURN strpos(s, c)\nEND;\n$$ LANGUAGE plpgsql;";
    let outcome = env.judge.judge(&function_problem(), code).await;

    assert_eq!(outcome.verdict.code, VerdictCode::CE);
    match outcome.verdict.feedback {
        Feedback::CompileErrors { errors } => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].object.as_deref(), Some("position_of"));
        }
        other => panic!("unexpected feedback {:?}", other),
    }
}

#[tokio::test]
async fn test_function_wrong_value() {
    let Some(env) = common::setup("fn_wa") else { return };
    let code = "CREATE FUNCTION position_of(s TEXT, c TEXT) RETURNS INTEGER AS $$\n\
                BEGIN\n  RETURN strpos(s, c) + 1;\nEND;\n$$ LANGUAGE plpgsql;";
    let outcome = env.judge.judge(&function_problem(), code).await;

    assert_eq!(outcome.verdict.code, VerdictCode::WA);
    assert_eq!(
        outcome.verdict.feedback,
        Feedback::FunctionValue {
            call: "position_of('hello', 'l')".into(),
            expected: Cell::Int(3),
            obtained: Cell::Int(4),
        }
    );
}

#[tokio::test]
async fn test_function_runtime_error_names_the_call() {
    let Some(env) = common::setup("fn_re") else { return };
    let code = "CREATE FUNCTION position_of(s TEXT, c TEXT) RETURNS INTEGER AS $$\n\
                BEGIN\n  RETURN strpos(s, c) / 0;\nEND;\n$$ LANGUAGE plpgsql;";
    let outcome = env.judge.judge(&function_problem(), code).await;

    assert_eq!(outcome.verdict.code, VerdictCode::RE);
    assert!(outcome.verdict.feedback.to_string().starts_with("position_of('hello', 'l') --> "));
    assert_eq!(outcome.verdict.position, None);
}

fn dml_problem() -> Problem {
    Problem::new(
        "CREATE TABLE t(n INTEGER PRIMARY KEY);",
        ProblemDetails::Dml {
            reference_dml: "INSERT INTO t VALUES (1);\nINSERT INTO t VALUES (2);\nINSERT INTO t VALUES (3);".into(),
        },
    )
    .with_statement_bounds(Some(2), Some(3))
}

#[tokio::test]
async fn test_dml_accepted_in_any_order() {
    let Some(env) = common::setup("dml_ac") else { return };
    let outcome = env
        .judge
        .judge(&dml_problem(), "INSERT INTO t VALUES (3);\nINSERT INTO t VALUES (1);\nINSERT INTO t VALUES (2);")
        .await;
    assert_eq!(outcome.verdict.code, VerdictCode::AC, "{}", outcome.verdict);
}

#[tokio::test]
async fn test_dml_statement_count() {
    let Some(env) = common::setup("dml_ve") else { return };
    let count_before = env.manager.count_workspaces().await.unwrap();
    let outcome = env
        .judge
        .judge(
            &dml_problem(),
            "INSERT INTO t VALUES (1);\nINSERT INTO t VALUES (2);\nINSERT INTO t VALUES (3);\nINSERT INTO t VALUES (4);",
        )
        .await;
    assert_eq!(outcome.verdict.code, VerdictCode::VE);
    assert_eq!(env.manager.count_workspaces().await.unwrap(), count_before);
}

#[tokio::test]
async fn test_dml_duplicate_key_is_runtime_error() {
    let Some(env) = common::setup("dml_re") else { return };
    let outcome = env
        .judge
        .judge(&dml_problem(), "INSERT INTO t VALUES (1);\nINSERT INTO t VALUES (1);")
        .await;
    assert_eq!(outcome.verdict.code, VerdictCode::RE);
    assert_eq!(outcome.verdict.position, None);
    assert!(outcome.verdict.table_changes.is_none());
}

#[tokio::test]
async fn test_dml_runtime_error_points_into_later_statement() {
    let Some(env) = common::setup("dml_pos") else { return };
    let outcome = env
        .judge
        .judge(&dml_problem(), "INSERT INTO t VALUES (1);\nSELECT * FROM nope;")
        .await;

    assert_eq!(outcome.verdict.code, VerdictCode::RE, "{}", outcome.verdict);
    assert_eq!(outcome.verdict.position, Some(Position::new(1, 14)));
    assert!(outcome.verdict.table_changes.is_none());
}

#[tokio::test]
async fn test_dml_plpgsql_block_error_is_runtime_error() {
    let Some(env) = common::setup("dml_do") else { return };
    let outcome = env
        .judge
        .judge(
            &dml_problem(),
            "INSERT INTO t VALUES (1);\nDO $$ BEGIN PERFORM * FROM missing_table; END $$;",
        )
        .await;

    assert_eq!(outcome.verdict.code, VerdictCode::RE, "{}", outcome.verdict);
    assert!(outcome.verdict.feedback.to_string().contains("missing_table"));
}

#[tokio::test]
async fn test_dml_wrong_answer_lists_changes() {
    let Some(env) = common::setup("dml_wa") else { return };
    let outcome = env
        .judge
        .judge(&dml_problem(), "INSERT INTO t VALUES (1);\nINSERT INTO t VALUES (2);")
        .await;

    assert_eq!(outcome.verdict.code, VerdictCode::WA);
    assert!(matches!(outcome.verdict.feedback, Feedback::Table { ref table, .. } if table == "t"));
    let changes = outcome.verdict.table_changes.expect("table changes");
    assert_eq!(changes.modified.table_names(), vec!["t".to_string()]);
}

#[tokio::test]
async fn test_procedure() {
    let Some(env) = common::setup("proc") else { return };
    let problem = Problem::new(
        "CREATE TABLE t(n INTEGER);",
        ProblemDetails::Procedure {
            reference_procedure_body: "CREATE PROCEDURE double_all() LANGUAGE plpgsql AS $$\n\
                 BEGIN\n  UPDATE t SET n = n * 2;\nEND;\n$$;"
                .into(),
            call_statement: "CALL double_all()".into(),
        },
    )
    .with_seed("INSERT INTO t VALUES (1), (5);");

    let accepted = env
        .judge
        .judge(
            &problem,
            "CREATE PROCEDURE double_all() LANGUAGE plpgsql AS $$\nBEGIN\n  UPDATE t SET n = n + n;\nEND;\n$$;",
        )
        .await;
    assert_eq!(accepted.verdict.code, VerdictCode::AC, "{}", accepted.verdict);

    let wrong = env
        .judge
        .judge(
            &problem,
            "CREATE PROCEDURE double_all() LANGUAGE plpgsql AS $$\nBEGIN\n  UPDATE t SET n = n * 3;\nEND;\n$$;",
        )
        .await;
    assert_eq!(wrong.verdict.code, VerdictCode::WA);
}

#[tokio::test]
async fn test_trigger_unresolved_table_is_compile_error() {
    let Some(env) = common::setup("trg") else { return };
    let reference = "CREATE FUNCTION log_insert() RETURNS trigger LANGUAGE plpgsql AS $$\n\
         BEGIN\n  INSERT INTO audit VALUES (NEW.n);\n  RETURN NEW;\nEND;\n$$;\n\
         CREATE TRIGGER t_log AFTER INSERT ON t FOR EACH ROW EXECUTE FUNCTION log_insert();";
    let problem = Problem::new(
        "CREATE TABLE t(n INTEGER);\nCREATE TABLE audit(n INTEGER);",
        ProblemDetails::Trigger {
            reference_trigger_body: reference.into(),
            test_dml: "INSERT INTO t VALUES (5);".into(),
        },
    );

    let accepted = env.judge.judge(&problem, reference).await;
    assert_eq!(accepted.verdict.code, VerdictCode::AC, "{}", accepted.verdict);

    let broken = reference.replace("INSERT INTO audit", "INSERT INTO audit_log");
    let outcome = env.judge.judge(&problem, &broken).await;
    assert_eq!(outcome.verdict.code, VerdictCode::CE, "{}", outcome.verdict);
}

fn discriminant_problem() -> Problem {
    Problem::new(
        "CREATE TABLE t(n INTEGER);",
        ProblemDetails::Discriminant {
            base_seed_sql: "INSERT INTO t VALUES (1997);".into(),
            correct_query: "SELECT * FROM t WHERE n > 1000".into(),
            buggy_query: "SELECT * FROM t".into(),
        },
    )
}

#[tokio::test]
async fn test_discriminant() {
    let Some(env) = common::setup("disc") else { return };
    let problem = discriminant_problem();

    let discriminates = env.judge.judge(&problem, "INSERT INTO t VALUES (500);").await;
    assert_eq!(discriminates.verdict.code, VerdictCode::AC, "{}", discriminates.verdict);

    let agrees = env.judge.judge(&problem, "INSERT INTO t VALUES (3000);").await;
    assert_eq!(agrees.verdict.code, VerdictCode::WA);
    assert!(matches!(agrees.verdict.feedback, Feedback::NotDiscriminated { .. }));

    let broken = env.judge.judge(&problem, "INSERT INTO t VALUES (a);").await;
    assert_eq!(broken.verdict.code, VerdictCode::RE);
}

#[tokio::test]
async fn test_discriminant_plpgsql_block_error_is_runtime_error() {
    let Some(env) = common::setup("disc_do") else { return };
    let outcome = env
        .judge
        .judge(&discriminant_problem(), "DO $$ BEGIN INSERT INTO tt VALUES (5); END $$;")
        .await;
    assert_eq!(outcome.verdict.code, VerdictCode::RE, "{}", outcome.verdict);
}

#[tokio::test]
async fn test_prebuilt_reference() {
    let Some(env) = common::setup("prebuilt") else { return };
    let problem = select_problem();
    let reference = env.judge.build_reference(&problem).await.unwrap();

    let json = serde_json::to_string(&reference).unwrap();
    let reference = serde_json::from_str(&json).unwrap();

    let outcome = env.judge.judge_with_reference(&problem, &reference, "SELECT n FROM t").await;
    assert_eq!(outcome.verdict.code, VerdictCode::AC, "{}", outcome.verdict);
}

#[tokio::test]
async fn test_broken_reference_is_internal_error() {
    let Some(env) = common::setup("ref_ie") else { return };
    let problem = Problem::new(
        "CREATE TABLE t(n INTEGER);",
        ProblemDetails::Select {
            reference_query: "SELECT missing FROM t".into(),
        },
    );

    let outcome = env.judge.judge(&problem, "SELECT n FROM t").await;
    assert_eq!(outcome.verdict.code, VerdictCode::IE);
    assert!(outcome.verdict.feedback.is_none());
}
