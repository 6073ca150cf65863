/// SQL Judge - automated judging of SQL exercises
///
/// This is the root crate that provides workspace-level documentation.
/// The implementation lives in the subcrates:
/// - `sql-judge-core`: problem and verdict models, statement preparation,
///   result comparison and the static checker protocol
/// - `sql-judge-engine`: PostgreSQL workspaces, execution, the judging
///   pipeline and the `sqljudge` binary

/// Returns the version of the package.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
