//! Header comparison

use crate::models::{Column, Feedback};

/// Compare two headers.
///
/// Column counts first, then position by position: a name mismatch
/// (case-insensitive) wins over a type mismatch at the same position, and a
/// type is only compared when the names agree.
pub fn compare_headers(expected: &[Column], obtained: &[Column]) -> Option<Feedback> {
    if expected.len() != obtained.len() {
        return Some(Feedback::ColumnCount {
            expected: expected.to_vec(),
            obtained: obtained.to_vec(),
        });
    }

    for (position, (exp, obt)) in expected.iter().zip(obtained).enumerate() {
        if !exp.name.eq_ignore_ascii_case(&obt.name) {
            return Some(Feedback::ColumnName {
                position,
                expected: exp.name.clone(),
                obtained: obt.name.clone(),
            });
        }
        if !exp.type_tag.eq_ignore_ascii_case(&obt.type_tag) {
            return Some(Feedback::ColumnType {
                position,
                column: exp.name.clone(),
                expected: exp.type_tag.clone(),
                obtained: obt.type_tag.clone(),
            });
        }
    }
    None
}
