//! Clause evaluation.
//!
//! Rules:
//! 1. All clauses are ANDed; an empty list always matches.
//! 2. A clause whose field is absent from the record fails the whole predicate.
//! 3. Equality is loose: `"1"` equals `1`, `"true"` equals `true`, `null`
//!    equals `""`.
//! 4. `in` / `not_in` coerce the clause value to a list (scalars are wrapped).
//! 5. `greater_than` / `less_than` compare numerically when both sides are
//!    numeric, lexically otherwise.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CriteriaError, Operator};

/// One `{field, operator, value}` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Criterion {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Evaluate this clause alone against `record`.
    pub fn evaluate(&self, record: &Map<String, Value>) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };

        match self.operator {
            Operator::Equals => loose_eq(actual, &self.value),
            Operator::NotEquals => !loose_eq(actual, &self.value),
            Operator::In => as_list(&self.value).iter().any(|v| loose_eq(actual, v)),
            Operator::NotIn => !as_list(&self.value).iter().any(|v| loose_eq(actual, v)),
            Operator::GreaterThan => compare(actual, &self.value) == Some(Ordering::Greater),
            Operator::LessThan => compare(actual, &self.value) == Some(Ordering::Less),
        }
    }
}

/// `true` iff every clause holds for `record`.
pub fn matches(record: &Map<String, Value>, criteria: &[Criterion]) -> bool {
    criteria.iter().all(|criterion| criterion.evaluate(record))
}

/// Parse raw JSON criteria and evaluate them.
///
/// # Errors
/// Returns [`CriteriaError`] when the payload is malformed or names an
/// unsupported operator. A bad configuration never degrades to `false`.
pub fn matches_value(record: &Map<String, Value>, criteria: &Value) -> Result<bool, CriteriaError> {
    let parsed = parse_criteria(criteria)?;
    Ok(matches(record, &parsed))
}

/// Parse a JSON array of clauses. `null` is treated as the empty list.
pub fn parse_criteria(raw: &Value) -> Result<Vec<Criterion>, CriteriaError> {
    let items = match raw {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => {
            return Err(CriteriaError::Malformed(format!(
                "expected an array of clauses, got {other}"
            )))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let obj = item.as_object().ok_or_else(|| {
                CriteriaError::Malformed(format!("clause {index} is not an object"))
            })?;
            let field = obj.get("field").and_then(Value::as_str).ok_or_else(|| {
                CriteriaError::Malformed(format!("clause {index} has no string 'field'"))
            })?;
            let operator = obj.get("operator").and_then(Value::as_str).ok_or_else(|| {
                CriteriaError::Malformed(format!("clause {index} has no string 'operator'"))
            })?;

            Ok(Criterion {
                field: field.to_owned(),
                operator: operator.parse()?,
                value: obj.get("value").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}

/// Return the first candidate whose criteria match `record`.
///
/// Used for ordered rule tables (fee schedules, renewal rules) where the
/// most specific entry is listed first.
pub fn first_match<'a, T, F>(
    candidates: &'a [T],
    record: &Map<String, Value>,
    criteria_of: F,
) -> Option<&'a T>
where
    F: Fn(&T) -> &[Criterion],
{
    candidates
        .iter()
        .find(|candidate| matches(record, criteria_of(*candidate)))
}

// ---------------------------------------------------------------------------
// Loose comparison helpers
// ---------------------------------------------------------------------------

fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        scalar => vec![scalar.clone()],
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), other) | (other, Value::Bool(x)) => *x == truthy(other),
        (Value::Null, other) | (other, Value::Null) => !truthy(other) && !other.is_number(),
        (Value::Array(_), _) | (_, Value::Array(_)) | (Value::Object(_), _) | (_, Value::Object(_)) => {
            a == b
        }
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => scalar_text(a) == scalar_text(b),
        },
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("test record is an object")
    }

    #[test]
    fn empty_criteria_always_match() {
        assert!(matches(&record(json!({})), &[]));
        assert!(matches(&record(json!({ "a": 1 })), &[]));
    }

    #[test]
    fn equality_is_loose() {
        let rec = record(json!({ "age": "21", "active": "true", "note": null }));
        assert!(Criterion::new("age", Operator::Equals, json!(21)).evaluate(&rec));
        assert!(Criterion::new("active", Operator::Equals, json!(true)).evaluate(&rec));
        assert!(Criterion::new("note", Operator::Equals, json!("")).evaluate(&rec));
        assert!(Criterion::new("age", Operator::NotEquals, json!("22")).evaluate(&rec));
    }

    #[test]
    fn absent_field_fails_the_whole_predicate() {
        let rec = record(json!({ "kind": "renewal" }));
        let criteria = vec![
            Criterion::new("kind", Operator::Equals, json!("renewal")),
            Criterion::new("missing", Operator::NotEquals, json!("x")),
        ];
        assert!(!matches(&rec, &criteria));
    }

    #[test]
    fn membership_coerces_scalars_to_lists() {
        let rec = record(json!({ "licence": "nurse" }));
        assert!(Criterion::new("licence", Operator::In, json!(["doctor", "nurse"])).evaluate(&rec));
        assert!(Criterion::new("licence", Operator::In, json!("nurse")).evaluate(&rec));
        assert!(Criterion::new("licence", Operator::NotIn, json!(["doctor"])).evaluate(&rec));
    }

    #[test]
    fn ordering_is_numeric_when_possible() {
        let rec = record(json!({ "years": "10", "since": "2024-03-01" }));
        assert!(Criterion::new("years", Operator::GreaterThan, json!(9)).evaluate(&rec));
        assert!(Criterion::new("years", Operator::LessThan, json!("100")).evaluate(&rec));
        assert!(Criterion::new("since", Operator::LessThan, json!("2025-01-01")).evaluate(&rec));
        assert!(!Criterion::new("years", Operator::GreaterThan, json!([1])).evaluate(&rec));
    }

    #[test]
    fn all_clauses_must_hold() {
        let rec = record(json!({ "type": "new", "fee": 150 }));
        let ok = vec![
            Criterion::new("type", Operator::Equals, json!("new")),
            Criterion::new("fee", Operator::GreaterThan, json!(100)),
        ];
        let not_ok = vec![
            Criterion::new("type", Operator::Equals, json!("new")),
            Criterion::new("fee", Operator::LessThan, json!(100)),
        ];
        assert!(matches(&rec, &ok));
        assert!(!matches(&rec, &not_ok));
    }

    #[test]
    fn unsupported_operator_is_a_configuration_error() {
        let rec = record(json!({ "a": 1 }));
        let raw = json!([{ "field": "a", "operator": "contains", "value": 1 }]);
        assert_eq!(
            matches_value(&rec, &raw),
            Err(CriteriaError::UnsupportedOperator("contains".into()))
        );

        let deserialized: Result<Vec<Criterion>, _> = serde_json::from_value(raw);
        assert!(deserialized.is_err());
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let rec = record(json!({}));
        assert!(matches!(
            matches_value(&rec, &json!({ "field": "a" })),
            Err(CriteriaError::Malformed(_))
        ));
        assert!(matches!(
            matches_value(&rec, &json!([{ "operator": "equals" }])),
            Err(CriteriaError::Malformed(_))
        ));
        assert_eq!(matches_value(&rec, &Value::Null), Ok(true));
    }

    #[test]
    fn first_match_picks_the_first_satisfied_rule() {
        struct Fee {
            amount: u32,
            criteria: Vec<Criterion>,
        }

        let fees = vec![
            Fee {
                amount: 300,
                criteria: vec![Criterion::new("type", Operator::Equals, json!("late"))],
            },
            Fee {
                amount: 100,
                criteria: vec![Criterion::new("type", Operator::In, json!(["new", "renewal"]))],
            },
            Fee { amount: 50, criteria: vec![] },
        ];

        let pick = |rec: Value| first_match(&fees, &record(rec), |f| f.criteria.as_slice()).map(|f| f.amount);
        assert_eq!(pick(json!({ "type": "late" })), Some(300));
        assert_eq!(pick(json!({ "type": "renewal" })), Some(100));
        assert_eq!(pick(json!({ "type": "other" })), Some(50));
    }
}
