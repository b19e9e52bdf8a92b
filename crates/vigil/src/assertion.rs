//! User-declared pass/fail rules evaluated against probe result fields.
//!
//! Rules run in declaration order over path-addressed fields of the result
//! payload; evaluation stops at the first failing rule, which is attached to
//! the run. A failing rule is data, never an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Comparison applied by an assertion rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Regex match on a string field
    Matches,
    /// Array contains the expected value
    Includes,
    LengthEq,
    LengthGt,
    LengthLt,
    Empty,
    NotEmpty,
}

impl std::fmt::Display for AssertionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssertionOperator::Eq => "eq",
            AssertionOperator::Ne => "ne",
            AssertionOperator::Gt => "gt",
            AssertionOperator::Gte => "gte",
            AssertionOperator::Lt => "lt",
            AssertionOperator::Lte => "lte",
            AssertionOperator::Matches => "matches",
            AssertionOperator::Includes => "includes",
            AssertionOperator::LengthEq => "length_eq",
            AssertionOperator::LengthGt => "length_gt",
            AssertionOperator::LengthLt => "length_lt",
            AssertionOperator::Empty => "empty",
            AssertionOperator::NotEmpty => "not_empty",
        };
        write!(f, "{name}")
    }
}

/// One user-declared rule against a result field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionRule {
    /// Dot-separated path into the result payload (`tls.days_left`, `hops.0`)
    pub field: String,

    pub operator: AssertionOperator,

    /// Expected value; unused by `empty`/`not_empty`
    #[serde(default)]
    pub value: Option<Value>,
}

/// The first rule that failed, attached to the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedAssertion {
    pub field: String,
    pub operator: AssertionOperator,
    pub expected: Value,
    pub actual: Value,
}

/// A rule that can never evaluate meaningfully, caught at config-save time
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule on `{field}`: operator `{operator}` requires an expected value")]
    MissingValue { field: String, operator: AssertionOperator },
    #[error("rule on `{field}`: invalid regex: {source}")]
    BadPattern {
        field: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule on `{field}`: operator `{operator}` requires a numeric expected value")]
    NotNumeric { field: String, operator: AssertionOperator },
}

/// Reject rules that cannot evaluate, before they are saved.
///
/// Runtime evaluation treats a broken rule as a plain failure; this keeps
/// that from ever happening for stored configurations.
pub fn validate_rules(rules: &[AssertionRule]) -> Result<(), RuleError> {
    use AssertionOperator::*;
    for rule in rules {
        match rule.operator {
            Empty | NotEmpty => {}
            Matches => {
                let pattern = rule.value.as_ref().and_then(Value::as_str).ok_or_else(|| {
                    RuleError::MissingValue { field: rule.field.clone(), operator: rule.operator }
                })?;
                Regex::new(pattern).map_err(|source| RuleError::BadPattern {
                    field: rule.field.clone(),
                    source,
                })?;
            }
            Gt | Gte | Lt | Lte | LengthEq | LengthGt | LengthLt => {
                let value = rule.value.as_ref().ok_or_else(|| RuleError::MissingValue {
                    field: rule.field.clone(),
                    operator: rule.operator,
                })?;
                if !value.is_number() {
                    return Err(RuleError::NotNumeric {
                        field: rule.field.clone(),
                        operator: rule.operator,
                    });
                }
            }
            Eq | Ne | Includes => {
                if rule.value.is_none() {
                    return Err(RuleError::MissingValue {
                        field: rule.field.clone(),
                        operator: rule.operator,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Evaluate rules in declaration order; return the first failure
pub fn evaluate(rules: &[AssertionRule], result: &Value) -> Option<FailedAssertion> {
    rules.iter().find_map(|rule| check_rule(rule, result))
}

fn check_rule(rule: &AssertionRule, result: &Value) -> Option<FailedAssertion> {
    let actual = lookup_path(result, &rule.field).cloned().unwrap_or(Value::Null);
    let expected = rule.value.clone().unwrap_or(Value::Null);

    let passed = match rule.operator {
        AssertionOperator::Eq => values_equal(&actual, &expected),
        AssertionOperator::Ne => !values_equal(&actual, &expected),
        AssertionOperator::Gt => compare(&actual, &expected).is_some_and(|o| o.is_gt()),
        AssertionOperator::Gte => compare(&actual, &expected).is_some_and(|o| !o.is_lt()),
        AssertionOperator::Lt => compare(&actual, &expected).is_some_and(|o| o.is_lt()),
        AssertionOperator::Lte => compare(&actual, &expected).is_some_and(|o| !o.is_gt()),
        AssertionOperator::Matches => match (actual.as_str(), expected.as_str()) {
            (Some(haystack), Some(pattern)) => {
                Regex::new(pattern).map(|re| re.is_match(haystack)).unwrap_or(false)
            }
            _ => false,
        },
        AssertionOperator::Includes => actual
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(item, &expected))),
        AssertionOperator::LengthEq => {
            matches_length(&actual, &expected, |len, want| len == want)
        }
        AssertionOperator::LengthGt => {
            matches_length(&actual, &expected, |len, want| len > want)
        }
        AssertionOperator::LengthLt => {
            matches_length(&actual, &expected, |len, want| len < want)
        }
        AssertionOperator::Empty => length_of(&actual).is_some_and(|len| len == 0),
        AssertionOperator::NotEmpty => length_of(&actual).is_some_and(|len| len > 0),
    };

    (!passed).then(|| FailedAssertion {
        field: rule.field.clone(),
        operator: rule.operator,
        expected,
        actual,
    })
}

/// Walk a dot-separated path through objects and arrays
fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Equality that treats `1` and `1.0` as the same value
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn compare(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
    actual.as_f64().zip(expected.as_f64()).and_then(|(a, e)| a.partial_cmp(&e))
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::Array(items) => Some(items.len()),
        Value::String(s) => Some(s.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn matches_length(actual: &Value, expected: &Value, cmp: impl Fn(usize, usize) -> bool) -> bool {
    match (length_of(actual), expected.as_u64()) {
        (Some(len), Some(want)) => cmp(len, want as usize),
        _ => false,
    }
}
