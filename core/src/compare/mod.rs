//! Result comparison
//!
//! Pure functions from canonicalized results to verdicts. Every problem kind
//! reduces to [`compare_results`] on one or more result tables, with a
//! kind-specific wrapper deciding which tables and how failures are reported.

mod db;
mod discriminant;
mod function;
mod headers;
mod rows;

pub use db::{compare_snapshots, diff_snapshots};
pub use discriminant::compare_discriminant;
pub use function::{compare_function_results, CallResult};
pub use headers::compare_headers;
pub use rows::compare_rows;

use crate::models::{DatabaseSnapshot, ResultTable, Verdict};

/// Compare two results: headers first, then rows
pub fn compare_results(expected: &ResultTable, obtained: &ResultTable, check_order: bool) -> Verdict {
    if let Some(feedback) = compare_headers(&expected.header, &obtained.header) {
        return Verdict::wrong_answer(feedback);
    }
    match compare_rows(expected, obtained, check_order) {
        Some(feedback) => Verdict::wrong_answer(feedback),
        None => Verdict::accepted(),
    }
}

/// Compare the result of a SELECT on one seed variant.
///
/// A wrong answer on any variant after the first carries that variant's
/// initial database, since the student cannot see it in the statement.
pub fn compare_select_variant(
    expected: &ResultTable,
    obtained: &ResultTable,
    check_order: bool,
    variant: usize,
    initial_database: &DatabaseSnapshot,
) -> Verdict {
    let verdict = compare_results(expected, obtained, check_order);
    if !verdict.is_accepted() && variant > 0 {
        verdict.with_initial_database(initial_database.clone())
    } else {
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cell, Column, Feedback, VerdictCode};
    use proptest::prelude::*;

    fn two_column(rows: &[(i64, &str)]) -> ResultTable {
        ResultTable::new(
            vec![Column::new("id", "INT4"), Column::new("name", "TEXT")],
            rows.iter().map(|(id, name)| vec![Cell::Int(*id), Cell::text(*name)]).collect(),
        )
    }

    #[test]
    fn test_headers_before_rows() {
        let expected = two_column(&[(1, "a")]);
        let mut obtained = two_column(&[(2, "b")]);
        obtained.header[1] = Column::new("title", "TEXT");

        let verdict = compare_results(&expected, &obtained, false);
        assert!(matches!(verdict.feedback, Feedback::ColumnName { position: 1, .. }));
    }

    #[test]
    fn test_accepted() {
        let table = two_column(&[(1, "a"), (2, "b")]);
        assert_eq!(compare_results(&table, &table.clone(), true).code, VerdictCode::AC);
    }

    #[test]
    fn test_select_variant_attaches_initial_database() {
        let expected = two_column(&[(1, "a")]);
        let obtained = two_column(&[]);
        let mut initial = DatabaseSnapshot::new();
        initial.insert("people", expected.clone());

        let first = compare_select_variant(&expected, &obtained, false, 0, &initial);
        assert_eq!(first.code, VerdictCode::WA);
        assert!(first.initial_database.is_none());

        let second = compare_select_variant(&expected, &obtained, false, 1, &initial);
        assert_eq!(second.initial_database, Some(initial.clone()));

        let accepted = compare_select_variant(&expected, &expected, false, 1, &initial);
        assert!(accepted.initial_database.is_none());
    }

    fn rows_strategy() -> impl Strategy<Value = Vec<(i64, String)>> {
        prop::collection::vec((0i64..5, "[ab]"), 0..8)
    }

    fn build(rows: &[(i64, String)]) -> ResultTable {
        ResultTable::new(
            vec![Column::new("id", "INT4"), Column::new("name", "TEXT")],
            rows.iter().map(|(id, name)| vec![Cell::Int(*id), Cell::text(name.clone())]).collect(),
        )
    }

    proptest! {
        #[test]
        fn prop_permutation_preserves_verdict(
            expected in rows_strategy(),
            obtained in rows_strategy(),
            seed in any::<u64>(),
        ) {
            let mut permuted = expected.clone();
            // deterministic shuffle driven by the generated seed
            let mut state = seed;
            for i in (1..permuted.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = ((state >> 33) % (i as u64 + 1)) as usize;
                permuted.swap(i, j);
            }
            let original = compare_results(&build(&expected), &build(&obtained), false);
            let shuffled = compare_results(&build(&permuted), &build(&obtained), false);
            prop_assert_eq!(original.code, shuffled.code);
        }

        #[test]
        fn prop_reversal_breaks_ordered_accept(rows in rows_strategy()) {
            let reversed: Vec<_> = rows.iter().rev().cloned().collect();
            let table = build(&rows);
            prop_assert!(compare_results(&table, &table, true).is_accepted());
            let verdict = compare_results(&table, &build(&reversed), true);
            prop_assert_eq!(verdict.is_accepted(), rows == reversed);
        }

        #[test]
        fn prop_accept_iff_equal_multisets(expected in rows_strategy(), obtained in rows_strategy()) {
            let mut sorted_expected = expected.clone();
            let mut sorted_obtained = obtained.clone();
            sorted_expected.sort();
            sorted_obtained.sort();
            let verdict = compare_results(&build(&expected), &build(&obtained), false);
            prop_assert_eq!(verdict.is_accepted(), sorted_expected == sorted_obtained);
        }
    }
}
