use crate::models::{
    Operator, Predicate, SavedView, SortDirection, SortSpec, ViewScope, ViewStoreState,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use serde_json::json;
use std::collections::BTreeMap;

pub const STORE_VERSION: u32 = 1;

// Shipped ids are stable forever: activeByScope pointers and import payloads
// reference them by id.
pub const DEMANDS_OVERDUE_VIEW_ID: &str = "default-demands-overdue";
pub const DEMANDS_DUE_TODAY_VIEW_ID: &str = "default-demands-due-today";
pub const TICKETS_OPEN_VIEW_ID: &str = "default-tickets-open";
pub const TICKETS_WAITING_VIEW_ID: &str = "default-tickets-waiting";

pub fn fallback_view_id(scope: ViewScope) -> &'static str {
    match scope {
        ViewScope::Demands => DEMANDS_OVERDUE_VIEW_ID,
        ViewScope::Tickets => TICKETS_OPEN_VIEW_ID,
    }
}

pub fn is_default_id(id: &str) -> bool {
    DEFAULT_VIEWS.iter().any(|view| view.id == id)
}

pub static DEFAULT_VIEWS: Lazy<Vec<SavedView>> = Lazy::new(|| {
    vec![
        SavedView {
            id: DEMANDS_OVERDUE_VIEW_ID.to_string(),
            scope: ViewScope::Demands,
            name: "Overdue demands".to_string(),
            description: Some("Demands past their due date, most urgent first".to_string()),
            predicates: vec![Predicate {
                field: "overdue".to_string(),
                operator: Operator::Equals,
                value: Some(json!(true)),
            }],
            sort: vec![
                sort("overdue", SortDirection::Ascending),
                sort("priority", SortDirection::Ascending),
            ],
            columns: columns(&["code", "title", "priority", "dueDate", "assignee"]),
            is_pinned: true,
            is_default: true,
            updated_at: Utc::now(),
        },
        SavedView {
            id: DEMANDS_DUE_TODAY_VIEW_ID.to_string(),
            scope: ViewScope::Demands,
            name: "Due today".to_string(),
            description: None,
            predicates: vec![Predicate {
                field: "dueDate".to_string(),
                operator: Operator::IsToday,
                value: None,
            }],
            sort: vec![sort("priority", SortDirection::Ascending)],
            columns: columns(&["code", "title", "priority", "assignee"]),
            is_pinned: false,
            is_default: true,
            updated_at: Utc::now(),
        },
        SavedView {
            id: TICKETS_OPEN_VIEW_ID.to_string(),
            scope: ViewScope::Tickets,
            name: "Open tickets".to_string(),
            description: Some("Everything not yet closed".to_string()),
            predicates: vec![Predicate {
                field: "status".to_string(),
                operator: Operator::NotEquals,
                value: Some(json!("Fechado")),
            }],
            sort: vec![
                sort("priority", SortDirection::Ascending),
                sort("createdAt", SortDirection::Ascending),
            ],
            columns: columns(&["code", "title", "status", "priority", "createdAt"]),
            is_pinned: true,
            is_default: true,
            updated_at: Utc::now(),
        },
        SavedView {
            id: TICKETS_WAITING_VIEW_ID.to_string(),
            scope: ViewScope::Tickets,
            name: "Waiting on third parties".to_string(),
            description: None,
            predicates: vec![Predicate {
                field: "status".to_string(),
                operator: Operator::Equals,
                value: Some(json!("Aguardando terceiros")),
            }],
            sort: vec![sort("updatedAt", SortDirection::Descending)],
            columns: columns(&["code", "title", "priority", "updatedAt"]),
            is_pinned: false,
            is_default: true,
            updated_at: Utc::now(),
        },
    ]
});

pub fn seeded_state() -> ViewStoreState {
    let mut active_by_scope = BTreeMap::new();
    for scope in ViewScope::all() {
        active_by_scope.insert(scope, Some(fallback_view_id(scope).to_string()));
    }
    ViewStoreState {
        version: STORE_VERSION,
        views: DEFAULT_VIEWS.clone(),
        active_by_scope,
    }
}

fn sort(field: &str, direction: SortDirection) -> SortSpec {
    SortSpec {
        field: field.to_string(),
        direction,
    }
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::{fallback_view_id, is_default_id, seeded_state, DEFAULT_VIEWS};
    use crate::models::ViewScope;

    #[test]
    fn default_ids_are_unique_and_marked_default() {
        let mut ids: Vec<&str> = DEFAULT_VIEWS.iter().map(|view| view.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), DEFAULT_VIEWS.len());
        assert!(DEFAULT_VIEWS.iter().all(|view| view.is_default));
    }

    #[test]
    fn every_scope_has_a_fallback_that_exists() {
        for scope in ViewScope::all() {
            assert!(is_default_id(fallback_view_id(scope)));
        }
    }

    #[test]
    fn seeded_state_points_every_scope_at_its_fallback() {
        let state = seeded_state();
        for scope in ViewScope::all() {
            assert_eq!(
                state.active_by_scope.get(&scope),
                Some(&Some(fallback_view_id(scope).to_string()))
            );
        }
    }
}
