//! Typed comparison operators evaluated against a field-path extraction.
//!
//! Pure and total: a comparison that cannot be carried out (e.g. ordering
//! incompatible types) degrades the single assertion to failed with a
//! message rather than propagating — the caller never has to catch
//! anything here.

use crate::field_path::{resolve, response_tree};
use crate::model::{AssertOperator, Assertion, AssertionRecord};
use regex::Regex;
use serde_json::Value;

/// Outcome of a batch of assertions against one response.
pub struct AssertionBatch {
    pub passed_count: usize,
    pub failed_count: usize,
    pub records: Vec<AssertionRecord>,
}

impl AssertionBatch {
    pub fn all_passed(&self) -> bool {
        self.failed_count == 0
    }
}

/// Run every assertion against `status`/`body`, returning per-assertion
/// records plus pass/fail totals.
pub fn run_assertions(assertions: &[Assertion], status: u16, body: Option<&Value>) -> AssertionBatch {
    let tree = response_tree(status, body);
    let mut records = Vec::with_capacity(assertions.len());
    let mut passed_count = 0;
    let mut failed_count = 0;

    for assertion in assertions {
        let record = evaluate(assertion, &tree);
        if record.passed {
            passed_count += 1;
        } else {
            failed_count += 1;
        }
        records.push(record);
    }

    AssertionBatch {
        passed_count,
        failed_count,
        records,
    }
}

const ABSENT: Value = Value::Null;

fn evaluate(assertion: &Assertion, tree: &Value) -> AssertionRecord {
    let actual = resolve(tree, &assertion.field);
    let expected = assertion.value.clone();

    let (passed, message) = match assertion.operator {
        AssertOperator::Exists => (actual.is_some(), None),
        AssertOperator::Eq => (matches_or_absent(actual, expected.as_ref(), |a, e| a == e), None),
        AssertOperator::Ne => (matches_or_absent(actual, expected.as_ref(), |a, e| a != e), None),
        AssertOperator::Gt => compare_ordered(actual, expected.as_ref(), |o| o == std::cmp::Ordering::Greater),
        AssertOperator::Lt => compare_ordered(actual, expected.as_ref(), |o| o == std::cmp::Ordering::Less),
        AssertOperator::Gte => compare_ordered(actual, expected.as_ref(), |o| o != std::cmp::Ordering::Less),
        AssertOperator::Lte => compare_ordered(actual, expected.as_ref(), |o| o != std::cmp::Ordering::Greater),
        AssertOperator::Contains => (contains(actual, expected.as_ref()), None),
        AssertOperator::NotContains => (!contains(actual, expected.as_ref()), None),
        AssertOperator::In => (membership(actual, expected.as_ref()), None),
        AssertOperator::NotIn => (!membership(actual, expected.as_ref()), None),
        AssertOperator::Regex => (regex_match(actual, expected.as_ref()), None),
    };

    AssertionRecord {
        field: assertion.field.clone(),
        operator: assertion.operator,
        passed,
        actual: actual.cloned().unwrap_or(ABSENT),
        expected,
        message: message.or_else(|| assertion.message.clone()),
    }
}

fn matches_or_absent(
    actual: Option<&Value>,
    expected: Option<&Value>,
    cmp: impl Fn(&Value, &Value) -> bool,
) -> bool {
    match (actual, expected) {
        (Some(a), Some(e)) => cmp(a, e),
        (None, None) => true,
        _ => false,
    }
}

/// Numeric or lexicographic ordering. Returns `(false, Some(message))`
/// when operands aren't both numbers or both strings, rather than
/// panicking on an incomparable pair.
fn compare_ordered(
    actual: Option<&Value>,
    expected: Option<&Value>,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> (bool, Option<String>) {
    let (Some(a), Some(e)) = (actual, expected) else {
        return (false, Some("operand absent, cannot order-compare".to_string()));
    };

    if let (Some(an), Some(en)) = (a.as_f64(), e.as_f64()) {
        return match an.partial_cmp(&en) {
            Some(ord) => (accept(ord), None),
            None => (false, Some("numeric comparison produced no ordering (NaN)".to_string())),
        };
    }

    if let (Some(astr), Some(estr)) = (a.as_str(), e.as_str()) {
        return (accept(astr.cmp(estr)), None);
    }

    (
        false,
        Some(format!(
            "operands not ordered-comparable: {} vs {}",
            a, e
        )),
    )
}

fn contains(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    match (actual, expected) {
        (Some(Value::String(s)), Some(Value::String(needle))) => s.contains(needle.as_str()),
        (Some(Value::Array(items)), Some(e)) => items.contains(e),
        _ => false,
    }
}

/// `in` / `not_in`: membership of the actual value inside the expected
/// array — the reverse direction from `contains`.
fn membership(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    match (actual, expected) {
        (Some(a), Some(Value::Array(items))) => items.contains(a),
        _ => false,
    }
}

fn regex_match(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    match (actual, expected) {
        (Some(Value::String(s)), Some(Value::String(pattern))) => {
            match Regex::new(pattern) {
                Ok(re) => re
                    .find(s)
                    .map(|m| m.start() == 0)
                    .unwrap_or(false),
                Err(_) => false,
            }
        }
        _ => false,
    }
}
