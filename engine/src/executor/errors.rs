//! Engine error classification
//!
//! Every `tokio_postgres::Error` raised while a workspace runs code passes
//! through [`classify`], which is the single place deciding what counts as a
//! timeout or a compile problem.

use std::sync::OnceLock;
use regex::Regex;
use tokio_postgres::error::{DbError, ErrorPosition, SqlState};

use sql_judge_core::sql::{engine_position_to_line_col, Statement};
use sql_judge_core::{CompileError, Failure, Phase, Position};

/// SQLSTATE codes that mean the statement ran out of time or its session was
/// killed after running out of time
const TIMEOUT_STATES: &[&str] = &["57014", "57P01", "57P05"];

fn is_timeout(code: &SqlState) -> bool {
    TIMEOUT_STATES.contains(&code.code())
}

/// Syntax errors and access rule violations, e.g. an unknown column
fn is_syntax_class(code: &SqlState) -> bool {
    code.code().starts_with("42")
}

fn plpgsql_context() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"PL/pgSQL function (\S+?)(?:\([^)]*\))? line (\d+)").ok())
        .as_ref()
}

fn created_object() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)^\s*CREATE\s+(?:OR\s+REPLACE\s+)?(?:CONSTRAINT\s+)?(?:FUNCTION|PROCEDURE|TRIGGER)\s+("[^"]+"|[\w.$]+)"#).ok()
    })
    .as_ref()
}

/// Name of the function, procedure or trigger a statement creates
pub(crate) fn created_object_name(statement: &str) -> Option<String> {
    created_object()?
        .captures(statement)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches('"').to_string())
}

/// PL/pgSQL function and body line named in an error context
pub(crate) fn plpgsql_location(context: &str) -> Option<(String, usize)> {
    let captures = plpgsql_context()?.captures(context)?;
    let function = captures.get(1)?.as_str().to_string();
    let line = captures.get(2)?.as_str().parse().ok()?;
    Some((function, line))
}

fn position_in(db: &DbError, source: &str) -> Option<Position> {
    match db.position() {
        Some(ErrorPosition::Original(position)) => Some(engine_position_to_line_col(source, *position)),
        _ => None,
    }
}

fn compile_error_for(db: &DbError, source: &str, statement: Option<&Statement>) -> CompileError {
    let object = statement
        .and_then(|s| created_object_name(s.trimmed()))
        .or_else(|| db.where_().and_then(plpgsql_location).map(|(function, _)| function));
    CompileError {
        object,
        position: position_in(db, source),
        message: db.message().to_string(),
        severity: db.severity().to_string(),
    }
}

/// Turn an engine error raised in `phase` into a failure.
///
/// `source` is the text positions refer to: the user's original code for
/// user phases, the script itself otherwise.
pub fn classify(err: &tokio_postgres::Error, phase: Phase, source: &str, statement: Option<&Statement>) -> Failure {
    let Some(db) = err.as_db_error() else {
        let failure = Failure::engine(phase, err.to_string());
        return match statement {
            Some(s) => failure.with_statement(s.trimmed()),
            None => failure,
        };
    };

    let mut failure = if is_timeout(db.code()) {
        Failure::timeout(phase, db.message())
    } else if phase == Phase::Compile {
        Failure::engine(phase, db.message()).into_compile(vec![compile_error_for(db, source, statement)])
    } else if phase == Phase::RunUser
        && is_syntax_class(db.code())
        && db.where_().map_or(false, |w| plpgsql_location(w).is_some())
    {
        // A stored body that only fails to resolve names once it runs.
        // Kinds without stored bodies turn this back into RE in the judge.
        let mut error = compile_error_for(db, source, None);
        if let Some((_, line)) = db.where_().and_then(plpgsql_location) {
            error.message = format!("{} (body line {})", error.message, line);
        }
        Failure::engine(phase, db.message()).into_compile(vec![error])
    } else {
        Failure::engine(phase, db.message()).with_position(position_in(db, source))
    };

    if let Some(s) = statement {
        failure = failure.with_statement(s.trimmed());
    }
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("CREATE FUNCTION f(x int) RETURNS int AS $$ BEGIN RETURN x; END $$ LANGUAGE plpgsql", Some("f"))]
    #[case("create or replace procedure app.p() as $$ begin end $$ language plpgsql", Some("app.p"))]
    #[case("CREATE TRIGGER \"Audit\" AFTER INSERT ON t FOR EACH ROW EXECUTE FUNCTION a()", Some("Audit"))]
    #[case("CREATE CONSTRAINT TRIGGER chk AFTER INSERT ON t FOR EACH ROW EXECUTE FUNCTION a()", Some("chk"))]
    #[case("CREATE TABLE t(n int)", None)]
    fn test_created_object_name(#[case] statement: &str, #[case] expected: Option<&str>) {
        assert_eq!(created_object_name(statement).as_deref(), expected);
    }

    #[test]
    fn test_plpgsql_location() {
        assert_eq!(
            plpgsql_location("PL/pgSQL function audit_fn() line 3 at SQL statement"),
            Some(("audit_fn".to_string(), 3))
        );
        assert_eq!(
            plpgsql_location("SQL statement \"SELECT x FROM missing\"\nPL/pgSQL function tax(numeric) line 5 at RETURN"),
            Some(("tax".to_string(), 5))
        );
        assert_eq!(plpgsql_location("SQL function \"f\" statement 1"), None);
    }

    #[rstest]
    #[case(SqlState::QUERY_CANCELED, true)]
    #[case(SqlState::ADMIN_SHUTDOWN, true)]
    #[case(SqlState::DIVISION_BY_ZERO, false)]
    #[case(SqlState::UNDEFINED_COLUMN, false)]
    fn test_timeout_states(#[case] code: SqlState, #[case] expected: bool) {
        assert_eq!(is_timeout(&code), expected);
    }

    #[test]
    fn test_syntax_class() {
        assert!(is_syntax_class(&SqlState::SYNTAX_ERROR));
        assert!(is_syntax_class(&SqlState::UNDEFINED_TABLE));
        assert!(!is_syntax_class(&SqlState::UNIQUE_VIOLATION));
    }
}
