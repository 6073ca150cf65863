//! Discriminant comparison

use crate::models::{Feedback, ResultTable, Verdict};
use super::compare_results;

/// Accept iff the correct and buggy queries disagree on the submitted data
pub fn compare_discriminant(correct: &ResultTable, buggy: &ResultTable, check_order: bool) -> Verdict {
    if compare_results(correct, buggy, check_order).is_accepted() {
        Verdict::wrong_answer(Feedback::NotDiscriminated { result: buggy.clone() })
    } else {
        Verdict::accepted()
    }
}
