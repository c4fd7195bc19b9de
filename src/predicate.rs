use crate::dates::{local_calendar_date, parse_date};
use crate::models::{Operator, Predicate};
use chrono::Local;
use serde_json::Value;

/// Evaluates one field/operator/value condition against a record snapshot.
/// Total: malformed values and operator/value mismatches resolve to
/// "no match", never an error.
pub fn matches(record: &Value, predicate: &Predicate) -> bool {
    let field_value = field_of(record, &predicate.field);
    let expected = predicate.value.as_ref().unwrap_or(&Value::Null);

    match predicate.operator {
        Operator::Equals => field_value == expected,
        Operator::NotEquals => field_value != expected,
        Operator::OneOf => match expected {
            Value::Array(options) => options.iter().any(|option| option == field_value),
            _ => false,
        },
        Operator::Contains => {
            let haystack = coerce_string(field_value).to_lowercase();
            let needle = coerce_string(expected).to_lowercase();
            haystack.contains(&needle)
        }
        Operator::IsNull => is_blank(field_value),
        Operator::IsNotNull => !is_blank(field_value),
        Operator::IsToday => {
            local_calendar_date(field_value) == Some(Local::now().date_naive())
        }
        Operator::Between => matches_between(field_value, expected),
        Operator::GreaterThan => match (as_number(field_value), as_number(expected)) {
            (Some(actual), Some(threshold)) => actual > threshold,
            _ => false,
        },
    }
}

/// A predicate list is AND-combined; the empty list matches everything.
/// There is no OR or grouping in this model.
pub fn matches_all(record: &Value, predicates: &[Predicate]) -> bool {
    predicates.iter().all(|predicate| matches(record, predicate))
}

fn field_of<'a>(record: &'a Value, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&Value::Null)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn matches_between(field_value: &Value, expected: &Value) -> bool {
    let Some(actual) = parse_date(field_value) else {
        return false;
    };
    let Value::Object(range) = expected else {
        return false;
    };

    // A bound that is present but unparseable invalidates the predicate.
    if let Some(from) = range.get("from").filter(|bound| !is_blank(bound)) {
        match parse_date(from) {
            Some(from) if actual >= from => {}
            _ => return false,
        }
    }
    if let Some(to) = range.get("to").filter(|bound| !is_blank(bound)) {
        match parse_date(to) {
            Some(to) if actual <= to => {}
            _ => return false,
        }
    }
    true
}
