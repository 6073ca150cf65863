//! Function call comparison

use serde::{Serialize, Deserialize};

use crate::models::{Cell, Feedback, Verdict};

/// Value returned by one call expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    /// The call expression, e.g. `f(3)`
    pub call: String,

    /// Returned value
    pub value: Cell,

    /// Upper-cased type of the returned value
    pub type_tag: String,
}

impl CallResult {
    /// Create a call result
    pub fn new(call: impl Into<String>, value: Cell, type_tag: impl Into<String>) -> Self {
        CallResult {
            call: call.into(),
            value,
            type_tag: type_tag.into().to_uppercase(),
        }
    }
}

/// Compare call results in the expected order; types are compared before values
pub fn compare_function_results(expected: &[CallResult], obtained: &[CallResult]) -> Verdict {
    for exp in expected {
        let Some(obt) = obtained.iter().find(|o| o.call == exp.call) else {
            return Verdict::wrong_answer(Feedback::message(format!("{} was not evaluated", exp.call)));
        };
        if !exp.type_tag.eq_ignore_ascii_case(&obt.type_tag) {
            return Verdict::wrong_answer(Feedback::FunctionType {
                call: exp.call.clone(),
                expected: exp.type_tag.clone(),
                obtained: obt.type_tag.clone(),
            });
        }
        if exp.value != obt.value {
            return Verdict::wrong_answer(Feedback::FunctionValue {
                call: exp.call.clone(),
                expected: exp.value.clone(),
                obtained: obt.value.clone(),
            });
        }
    }
    Verdict::accepted()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_results() {
        let expected = vec![CallResult::new("f(1)", Cell::Int(2), "int4"), CallResult::new("f(2)", Cell::Int(4), "int4")];
        assert!(compare_function_results(&expected, &expected.clone()).is_accepted());
    }

    #[test]
    fn test_type_checked_before_value() {
        let expected = vec![CallResult::new("f(1)", Cell::Int(2), "INT4")];
        let obtained = vec![CallResult::new("f(1)", Cell::decimal("3"), "NUMERIC")];
        assert_eq!(
            compare_function_results(&expected, &obtained).feedback,
            Feedback::FunctionType { call: "f(1)".into(), expected: "INT4".into(), obtained: "NUMERIC".into() }
        );
    }

    #[test]
    fn test_first_differing_call() {
        let expected = vec![
            CallResult::new("f(1)", Cell::Int(2), "INT4"),
            CallResult::new("f(2)", Cell::Int(4), "INT4"),
            CallResult::new("f(3)", Cell::Int(6), "INT4"),
        ];
        let obtained = vec![
            CallResult::new("f(1)", Cell::Int(2), "INT4"),
            CallResult::new("f(2)", Cell::Int(5), "INT4"),
            CallResult::new("f(3)", Cell::Null, "INT4"),
        ];
        assert_eq!(
            compare_function_results(&expected, &obtained).feedback,
            Feedback::FunctionValue { call: "f(2)".into(), expected: Cell::Int(4), obtained: Cell::Int(5) }
        );
    }
}
