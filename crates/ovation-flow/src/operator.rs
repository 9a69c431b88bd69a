//! Built-in condition operators.
//!
//! [`ConditionOperator`] is a closed enum with a pure evaluator per variant;
//! there is no stringly-typed dispatch inside the evaluators themselves.
//! The condition registry seeds one entry per variant, so the engine resolves
//! built-in and extension-contributed operators through the same lookup.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::ConditionError;

/// The built-in comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
}

impl ConditionOperator {
    /// Every built-in operator, in registry seeding order.
    pub const ALL: &'static [ConditionOperator] = &[
        ConditionOperator::Eq,
        ConditionOperator::Ne,
        ConditionOperator::Gt,
        ConditionOperator::Gte,
        ConditionOperator::Lt,
        ConditionOperator::Lte,
        ConditionOperator::Contains,
        ConditionOperator::StartsWith,
        ConditionOperator::EndsWith,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Eq => "eq",
            ConditionOperator::Ne => "ne",
            ConditionOperator::Gt => "gt",
            ConditionOperator::Gte => "gte",
            ConditionOperator::Lt => "lt",
            ConditionOperator::Lte => "lte",
            ConditionOperator::Contains => "contains",
            ConditionOperator::StartsWith => "starts_with",
            ConditionOperator::EndsWith => "ends_with",
        }
    }

    /// Human-readable label for the management UI.
    pub fn label(&self) -> &'static str {
        match self {
            ConditionOperator::Eq => "equals",
            ConditionOperator::Ne => "does not equal",
            ConditionOperator::Gt => "greater than",
            ConditionOperator::Gte => "greater than or equal",
            ConditionOperator::Lt => "less than",
            ConditionOperator::Lte => "less than or equal",
            ConditionOperator::Contains => "contains",
            ConditionOperator::StartsWith => "starts with",
            ConditionOperator::EndsWith => "ends with",
        }
    }

    /// Applies the operator to `actual <op> expected`.
    ///
    /// Numbers compare numerically, strings lexicographically; anything else
    /// under an ordering operator is a [`ConditionError::TypeMismatch`],
    /// which the engine logs and treats as a non-match.
    pub fn evaluate(&self, actual: &Value, expected: &Value) -> Result<bool, ConditionError> {
        match self {
            ConditionOperator::Eq => Ok(loose_eq(actual, expected)),
            ConditionOperator::Ne => Ok(!loose_eq(actual, expected)),
            ConditionOperator::Gt => ordering(self, actual, expected).map(|o| o.is_gt()),
            ConditionOperator::Gte => ordering(self, actual, expected).map(|o| o.is_ge()),
            ConditionOperator::Lt => ordering(self, actual, expected).map(|o| o.is_lt()),
            ConditionOperator::Lte => ordering(self, actual, expected).map(|o| o.is_le()),
            ConditionOperator::Contains => match actual {
                Value::String(s) => Ok(s.contains(&stringify(expected))),
                Value::Array(items) => Ok(items.iter().any(|item| loose_eq(item, expected))),
                other => Err(type_mismatch(self, other)),
            },
            ConditionOperator::StartsWith => match actual {
                Value::String(s) => Ok(s.starts_with(&stringify(expected))),
                other => Err(type_mismatch(self, other)),
            },
            ConditionOperator::EndsWith => match actual {
                Value::String(s) => Ok(s.ends_with(&stringify(expected))),
                other => Err(type_mismatch(self, other)),
            },
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionOperator {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|op| op.as_str() == s)
            .copied()
            .ok_or_else(|| ConditionError::UnknownOperator(s.to_string()))
    }
}

/// Equality with numeric normalization: `1` and `1.0` are equal, and a
/// numeric string on either side is compared as a number when the other
/// side is a number (live platforms are not consistent about this).
fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    a == b
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn ordering(
    op: &ConditionOperator,
    actual: &Value,
    expected: &Value,
) -> Result<std::cmp::Ordering, ConditionError> {
    if let (Some(x), Some(y)) = (as_number(actual), as_number(expected)) {
        return x
            .partial_cmp(&y)
            .ok_or_else(|| type_mismatch(op, actual));
    }
    if let (Value::String(x), Value::String(y)) = (actual, expected) {
        return Ok(x.as_str().cmp(y.as_str()));
    }
    Err(type_mismatch(op, actual))
}

fn type_mismatch(op: &ConditionOperator, actual: &Value) -> ConditionError {
    ConditionError::TypeMismatch {
        operator: op.as_str().to_string(),
        actual: type_name(actual).to_string(),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_ordering() {
        let op = ConditionOperator::Gte;
        assert!(op.evaluate(&json!(100), &json!(100)).unwrap());
        assert!(op.evaluate(&json!(101), &json!(100)).unwrap());
        assert!(!op.evaluate(&json!(99), &json!(100)).unwrap());
    }

    #[test]
    fn numeric_strings_compare_as_numbers() {
        assert!(
            ConditionOperator::Gt
                .evaluate(&json!("250"), &json!(100))
                .unwrap()
        );
        assert!(
            ConditionOperator::Eq
                .evaluate(&json!("1"), &json!(1.0))
                .unwrap()
        );
    }

    #[test]
    fn string_operators() {
        assert!(
            ConditionOperator::Contains
                .evaluate(&json!("hello world"), &json!("world"))
                .unwrap()
        );
        assert!(
            ConditionOperator::StartsWith
                .evaluate(&json!("!cmd arg"), &json!("!cmd"))
                .unwrap()
        );
        assert!(
            ConditionOperator::EndsWith
                .evaluate(&json!("file.png"), &json!(".png"))
                .unwrap()
        );
    }

    #[test]
    fn contains_on_arrays() {
        assert!(
            ConditionOperator::Contains
                .evaluate(&json!(["a", "b"]), &json!("b"))
                .unwrap()
        );
        assert!(
            !ConditionOperator::Contains
                .evaluate(&json!(["a", "b"]), &json!("c"))
                .unwrap()
        );
    }

    #[test]
    fn ordering_on_object_is_a_type_mismatch() {
        let err = ConditionOperator::Gt
            .evaluate(&json!({"a": 1}), &json!(1))
            .unwrap_err();
        assert!(matches!(err, ConditionError::TypeMismatch { .. }));
    }

    #[test]
    fn all_tags_parse_back() {
        for op in ConditionOperator::ALL {
            assert_eq!(op.as_str().parse::<ConditionOperator>().unwrap(), *op);
        }
        assert!("regex".parse::<ConditionOperator>().is_err());
    }
}
