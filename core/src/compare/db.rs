//! Snapshot comparison for DML, PROCEDURE and TRIGGER problems

use log::debug;

use crate::models::{DatabaseSnapshot, Feedback, TableChanges, Verdict};
use super::compare_results;

/// Compare two database snapshots.
///
/// The table names must match exactly; tables are then compared in name order
/// ignoring row order, and the first failing table is reported.
pub fn compare_snapshots(expected: &DatabaseSnapshot, obtained: &DatabaseSnapshot) -> Verdict {
    let expected_names = expected.table_names();
    let obtained_names = obtained.table_names();
    if expected_names != obtained_names {
        return Verdict::wrong_answer(Feedback::TableSet {
            expected: expected_names,
            obtained: obtained_names,
        });
    }

    for (name, expected_table) in expected.iter() {
        let Some(obtained_table) = obtained.table(name) else {
            continue;
        };
        let verdict = compare_results(expected_table, obtained_table, false);
        if !verdict.is_accepted() {
            debug!("Table {} differs from the expected contents", name);
            return Verdict::wrong_answer(Feedback::Table {
                table: name.clone(),
                detail: Box::new(verdict.feedback),
            });
        }
    }
    Verdict::accepted()
}

/// Tables the reference added, modified or removed relative to the seeded database
pub fn diff_snapshots(initial: &DatabaseSnapshot, expected: &DatabaseSnapshot) -> TableChanges {
    let mut changes = TableChanges::default();
    for (name, table) in expected.iter() {
        match initial.table(name) {
            None => changes.added.insert(name.clone(), table.clone()),
            Some(before) if !compare_results(table, before, false).is_accepted() => {
                changes.modified.insert(name.clone(), table.clone())
            }
            Some(_) => {}
        }
    }
    for (name, table) in initial.iter() {
        if expected.table(name).is_none() {
            changes.removed.insert(name.clone(), table.clone());
        }
    }
    changes
}
