//! Row comparison as multisets

use std::collections::HashMap;

use crate::models::{Feedback, ResultTable, Row};

fn counts(rows: &[Row]) -> HashMap<&Row, usize> {
    let mut counts = HashMap::with_capacity(rows.len());
    for row in rows {
        *counts.entry(row).or_insert(0) += 1;
    }
    counts
}

/// Rows of `left` not matched by a row of `right`, one occurrence at a time
fn difference<'a>(left: &'a [Row], right: &[Row]) -> HashMap<&'a Row, usize> {
    let right_counts = counts(right);
    counts(left)
        .into_iter()
        .filter_map(|(row, n)| {
            let extra = n.saturating_sub(right_counts.get(row).copied().unwrap_or(0));
            (extra > 0).then_some((row, extra))
        })
        .collect()
}

/// Compare rows of two results with identical headers.
///
/// Unexpected obtained rows are reported before missing expected rows; the
/// order is only checked once both multisets agree.
pub fn compare_rows(expected: &ResultTable, obtained: &ResultTable, check_order: bool) -> Option<Feedback> {
    let mut unexpected = difference(&obtained.rows, &expected.rows);
    if !unexpected.is_empty() {
        let mut flagged = Vec::new();
        for (position, row) in obtained.rows.iter().enumerate() {
            if let Some(remaining) = unexpected.get_mut(row) {
                if *remaining > 0 {
                    *remaining -= 1;
                    flagged.push(position);
                }
            }
        }
        return Some(Feedback::UnexpectedRows { obtained: obtained.clone(), flagged });
    }

    let mut missing_counts = difference(&expected.rows, &obtained.rows);
    if !missing_counts.is_empty() {
        let mut missing = Vec::new();
        for row in &expected.rows {
            if let Some(remaining) = missing_counts.get_mut(row) {
                if *remaining > 0 {
                    *remaining -= 1;
                    missing.push(row.clone());
                }
            }
        }
        return Some(Feedback::MissingRows { header: expected.header.clone(), missing });
    }

    if check_order && expected.rows != obtained.rows {
        return Some(Feedback::RowOrder { expected: expected.clone(), obtained: obtained.clone() });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cell, Column};

    fn table(values: &[i64]) -> ResultTable {
        ResultTable::new(
            vec![Column::new("n", "INT4")],
            values.iter().map(|v| vec![Cell::Int(*v)]).collect(),
        )
    }

    #[test]
    fn test_equal_multisets() {
        assert_eq!(compare_rows(&table(&[1, 2, 2]), &table(&[2, 1, 2]), false), None);
    }

    #[test]
    fn test_unexpected_row_flagged_once() {
        match compare_rows(&table(&[901]), &table(&[901, 42]), false) {
            Some(Feedback::UnexpectedRows { flagged, obtained }) => {
                assert_eq!(flagged, vec![1]);
                assert_eq!(obtained.rows[1], vec![Cell::Int(42)]);
            }
            other => panic!("Expected unexpected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicates_removed_one_at_a_time() {
        // a single spurious copy flags a single row
        match compare_rows(&table(&[7, 7]), &table(&[7, 7, 7]), false) {
            Some(Feedback::UnexpectedRows { flagged, .. }) => assert_eq!(flagged, vec![0]),
            other => panic!("Expected unexpected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_rows() {
        match compare_rows(&table(&[1, 2, 2, 3]), &table(&[2, 1]), false) {
            Some(Feedback::MissingRows { missing, header }) => {
                assert_eq!(header.len(), 1);
                assert_eq!(missing, vec![vec![Cell::Int(2)], vec![Cell::Int(3)]]);
            }
            other => panic!("Expected missing rows, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_reported_before_missing() {
        assert!(matches!(
            compare_rows(&table(&[1]), &table(&[2]), false),
            Some(Feedback::UnexpectedRows { .. })
        ));
    }

    #[test]
    fn test_order() {
        assert_eq!(compare_rows(&table(&[1, 2]), &table(&[2, 1]), false), None);
        assert!(matches!(
            compare_rows(&table(&[1, 2]), &table(&[2, 1]), true),
            Some(Feedback::RowOrder { .. })
        ));
        assert_eq!(compare_rows(&table(&[1, 2]), &table(&[1, 2]), true), None);
    }
}
