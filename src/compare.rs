use crate::dates::parse_date;
use crate::models::{SavedView, SortDirection, SortSpec};
use crate::predicate;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

const UNKNOWN_PRIORITY_RANK: i64 = 99;

static PRIORITY_RANKS: Lazy<HashMap<&'static str, i64>> =
    Lazy::new(|| HashMap::from([("P0", 0), ("P1", 1), ("P2", 2), ("P3", 3)]));

/// Comparable primitive a field value collapses to. Numbers (including
/// dates as epoch millis and booleans as 0/1) order before text.
#[derive(Debug, PartialEq)]
enum SortKey {
    Number(f64),
    Text(String),
}

impl SortKey {
    fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

/// Orders two records under one sort spec. `priority` and `overdue` carry
/// bespoke orderings; everything else goes through the default coercion.
pub fn compare(a: &Value, b: &Value, spec: &SortSpec) -> Ordering {
    let ordering = match spec.field.as_str() {
        "priority" => priority_rank(field_of(a, &spec.field)).cmp(&priority_rank(field_of(b, &spec.field))),
        "overdue" => overdue_rank(field_of(a, &spec.field)).cmp(&overdue_rank(field_of(b, &spec.field))),
        field => sort_key(field_of(a, field)).compare(&sort_key(field_of(b, field))),
    };
    match spec.direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

/// Applies sort specs in declared order; the first non-equal result wins.
pub fn compare_all(a: &Value, b: &Value, specs: &[SortSpec]) -> Ordering {
    for spec in specs {
        let ordering = compare(a, b, spec);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Turns a view plus a record snapshot into the filtered, ordered sequence
/// the console renders. Inputs are never mutated.
pub fn apply_view(view: &SavedView, records: &[Value]) -> Vec<Value> {
    let mut selected: Vec<Value> = records
        .iter()
        .filter(|record| predicate::matches_all(record, &view.predicates))
        .cloned()
        .collect();
    selected.sort_by(|a, b| compare_all(a, b, &view.sort));
    selected
}

fn field_of<'a>(record: &'a Value, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&Value::Null)
}

fn priority_rank(value: &Value) -> i64 {
    value
        .as_str()
        .and_then(|label| PRIORITY_RANKS.get(label).copied())
        .unwrap_or(UNKNOWN_PRIORITY_RANK)
}

// "Ascending" on the overdue flag means urgent first.
fn overdue_rank(value: &Value) -> i64 {
    match value {
        Value::Bool(true) => 0,
        _ => 1,
    }
}

fn sort_key(value: &Value) -> SortKey {
    if let Some(parsed) = parse_date(value) {
        return SortKey::Number(parsed.timestamp_millis() as f64);
    }
    match value {
        Value::Number(number) => SortKey::Number(number.as_f64().unwrap_or(0.0)),
        Value::Bool(flag) => SortKey::Number(if *flag { 1.0 } else { 0.0 }),
        Value::String(text) => SortKey::Text(text.to_lowercase()),
        Value::Null => SortKey::Text(String::new()),
        other => SortKey::Text(other.to_string().to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_view, compare, compare_all};
    use crate::models::{Operator, Predicate, SavedView, SortDirection, SortSpec, ViewScope};
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::cmp::Ordering;

    fn spec(field: &str, direction: SortDirection) -> SortSpec {
        SortSpec {
            field: field.to_string(),
            direction,
        }
    }

    fn sorted_by(mut records: Vec<Value>, specs: &[SortSpec]) -> Vec<Value> {
        records.sort_by(|a, b| compare_all(a, b, specs));
        records
    }

    #[test]
    fn priority_ranks_p0_first_and_unknown_last() {
        let records = vec![
            json!({"id": "a", "priority": "P3"}),
            json!({"id": "b"}),
            json!({"id": "c", "priority": "P0"}),
            json!({"id": "d", "priority": "URGENTE"}),
            json!({"id": "e", "priority": "P1"}),
            json!({"id": "f", "priority": "P2"}),
        ];
        let ordered = sorted_by(records, &[spec("priority", SortDirection::Ascending)]);
        let ids: Vec<&str> = ordered.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(&ids[..4], &["c", "e", "f", "a"]);
        // unknown and missing both rank last, original order preserved
        assert_eq!(&ids[4..], &["b", "d"]);
    }

    #[test]
    fn overdue_ascending_puts_urgent_first() {
        let a = json!({"overdue": true});
        let b = json!({"overdue": false});
        assert_eq!(compare(&a, &b, &spec("overdue", SortDirection::Ascending)), Ordering::Less);
        assert_eq!(compare(&a, &b, &spec("overdue", SortDirection::Descending)), Ordering::Greater);
    }

    #[test]
    fn date_strings_compare_chronologically() {
        let older = json!({"created": "2026-01-05"});
        let newer = json!({"created": "2026-01-20T08:00:00Z"});
        assert_eq!(
            compare(&older, &newer, &spec("created", SortDirection::Ascending)),
            Ordering::Less
        );
    }

    #[test]
    fn non_date_strings_fall_back_to_case_insensitive_lexical() {
        let a = json!({"name": "alpha"});
        let b = json!({"name": "Bravo"});
        assert_eq!(compare(&a, &b, &spec("name", SortDirection::Ascending)), Ordering::Less);
    }

    #[test]
    fn later_specs_break_ties() {
        let specs = [
            spec("priority", SortDirection::Ascending),
            spec("name", SortDirection::Ascending),
        ];
        let a = json!({"priority": "P1", "name": "zeta"});
        let b = json!({"priority": "P1", "name": "alpha"});
        assert_eq!(compare_all(&a, &b, &specs), Ordering::Greater);
    }

    #[test]
    fn apply_view_filters_then_orders() {
        let view = SavedView {
            id: "v".to_string(),
            scope: ViewScope::Tickets,
            name: "waiting".to_string(),
            description: None,
            predicates: vec![Predicate {
                field: "status".to_string(),
                operator: Operator::Equals,
                value: Some(json!("Aguardando terceiros")),
            }],
            sort: vec![spec("priority", SortDirection::Ascending)],
            columns: vec![],
            is_pinned: false,
            is_default: false,
            updated_at: Utc::now(),
        };

        let statuses = [
            ("1", "Aberto", "P0"),
            ("2", "Aguardando terceiros", "P2"),
            ("3", "Fechado", "P1"),
            ("4", "Aguardando terceiros", "P0"),
            ("5", "Aberto", "P3"),
            ("6", "Aguardando terceiros", "P3"),
            ("7", "Fechado", "P0"),
            ("8", "Aguardando terceiros", "P1"),
            ("9", "Aberto", "P2"),
            ("10", "Fechado", "P3"),
        ];
        let records: Vec<Value> = statuses
            .iter()
            .map(|(id, status, priority)| json!({"id": id, "status": status, "priority": priority}))
            .collect();

        let result = apply_view(&view, &records);
        let ids: Vec<&str> = result.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["4", "8", "2", "6"]);
    }
}
