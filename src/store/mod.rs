pub mod defaults;
pub mod import;

use crate::errors::AppResult;
use crate::models::{SavedView, ViewScope, ViewStoreState};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const STATE_KEY: &str = "saved_views_state_v1";

/// Narrow persistence seam: a synchronous string key-value store. Missing or
/// corrupt values are treated as "no prior state" by the view store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self.entries.lock().expect("memory kv lock");
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().expect("memory kv lock");
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Id-keyed view collection preserving insertion order. The array form only
/// exists at the persistence boundary.
#[derive(Debug, Default)]
struct ViewIndex {
    order: Vec<String>,
    by_id: HashMap<String, SavedView>,
}

impl ViewIndex {
    fn from_views(views: Vec<SavedView>) -> Self {
        let mut index = Self::default();
        for view in views {
            index.insert(view);
        }
        index
    }

    fn insert(&mut self, view: SavedView) {
        if !self.by_id.contains_key(&view.id) {
            self.order.push(view.id.clone());
        }
        self.by_id.insert(view.id.clone(), view);
    }

    fn remove(&mut self, id: &str) -> Option<SavedView> {
        let removed = self.by_id.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    fn into_views(mut self) -> Vec<SavedView> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.remove(id))
            .collect()
    }
}

/// Canonical owner of persisted saved-view state. One instance per process,
/// persistence injected; every operation is read-modify-write against the
/// backing store (single interactive session, last writer wins).
pub struct ViewStore {
    kv: Arc<dyn KvStore>,
}

impl ViewStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Loads persisted state, always structurally valid: missing or corrupt
    /// blobs fall back to the seeded defaults, built-in defaults are
    /// re-applied over any stored copy, and dangling active pointers are
    /// healed to the scope's fallback view.
    pub fn load(&self) -> ViewStoreState {
        let stored = match self.kv.get(STATE_KEY) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(error = %error, "view state read failed; using defaults");
                None
            }
        };
        let parsed: Option<ViewStoreState> = stored.and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|error| {
                    tracing::warn!(error = %error, "stored view state is corrupt; reseeding");
                })
                .ok()
        });
        let Some(state) = parsed else {
            return defaults::seeded_state();
        };

        let mut index = ViewIndex::from_views(state.views);
        for default in defaults::DEFAULT_VIEWS.iter() {
            index.insert(default.clone());
        }

        let mut active_by_scope = BTreeMap::new();
        for scope in ViewScope::all() {
            let pointer = match state.active_by_scope.get(&scope) {
                Some(Some(id)) if index.contains(id) => Some(id.clone()),
                Some(Some(_)) => Some(defaults::fallback_view_id(scope).to_string()),
                Some(None) => None,
                None => Some(defaults::fallback_view_id(scope).to_string()),
            };
            active_by_scope.insert(scope, pointer);
        }

        ViewStoreState {
            version: defaults::STORE_VERSION,
            views: index.into_views(),
            active_by_scope,
        }
    }

    /// Sets the active pointer without validating existence; a deliberately
    /// dangling id is repaired on the next load.
    pub fn set_active_view(&self, scope: ViewScope, view_id: Option<String>) -> AppResult<()> {
        let mut state = self.load();
        state.active_by_scope.insert(scope, view_id);
        self.persist(&state)
    }

    /// Insert-or-replace by id, stamping `updated_at`. Edits addressed at a
    /// built-in default are redirected to a fresh non-default clone.
    pub fn upsert_view(&self, mut view: SavedView) -> AppResult<SavedView> {
        let state = self.load();
        let mut index = ViewIndex::from_views(state.views);

        if defaults::is_default_id(&view.id) {
            view.id = Uuid::new_v4().to_string();
        }
        view.is_default = false;
        view.updated_at = Utc::now();
        index.insert(view.clone());

        self.persist(&ViewStoreState {
            version: state.version,
            views: index.into_views(),
            active_by_scope: state.active_by_scope,
        })?;
        Ok(view)
    }

    /// Removes a custom view and nulls any active pointer at it. Deleting a
    /// default is a silent no-op, not an error.
    pub fn delete_view(&self, id: &str) -> AppResult<bool> {
        if defaults::is_default_id(id) {
            return Ok(false);
        }
        let state = self.load();
        let mut index = ViewIndex::from_views(state.views);
        if index.remove(id).is_none() {
            return Ok(false);
        }

        let mut active_by_scope = state.active_by_scope;
        for pointer in active_by_scope.values_mut() {
            if pointer.as_deref() == Some(id) {
                *pointer = None;
            }
        }

        self.persist(&ViewStoreState {
            version: state.version,
            views: index.into_views(),
            active_by_scope,
        })?;
        Ok(true)
    }

    pub fn export_state(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(&self.load())?)
    }

    /// Merges an exported payload into this store. Incoming views arrive as
    /// non-default; ids colliding with a built-in default are skipped so
    /// defaults are never overwritten. Fails loudly on invalid payloads,
    /// leaving state untouched.
    pub fn import_state(&self, serialized: &str) -> AppResult<usize> {
        let payload = import::parse_import_payload(serialized)?;

        let state = self.load();
        let mut index = ViewIndex::from_views(state.views);
        let mut imported = 0usize;
        for mut view in payload.views {
            if defaults::is_default_id(&view.id) {
                continue;
            }
            view.is_default = false;
            index.insert(view);
            imported += 1;
        }

        self.persist(&ViewStoreState {
            version: state.version,
            views: index.into_views(),
            active_by_scope: state.active_by_scope,
        })?;
        Ok(imported)
    }

    /// Discards all custom views and restores the seeded state.
    pub fn reset_to_defaults(&self) -> AppResult<ViewStoreState> {
        let state = defaults::seeded_state();
        self.persist(&state)?;
        Ok(state)
    }

    fn persist(&self, state: &ViewStoreState) -> AppResult<()> {
        self.kv.set(STATE_KEY, &serde_json::to_string(state)?)
    }
}

#[cfg(test)]
mod tests {
    use super::defaults::{self, DEMANDS_OVERDUE_VIEW_ID, TICKETS_OPEN_VIEW_ID};
    use super::{KvStore, MemoryKv, ViewStore, STATE_KEY};
    use crate::models::{SavedView, ViewScope};
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn store() -> ViewStore {
        ViewStore::new(Arc::new(MemoryKv::default()))
    }

    fn custom_view(id: &str, scope: ViewScope) -> SavedView {
        SavedView {
            id: id.to_string(),
            scope,
            name: format!("custom {id}"),
            description: None,
            predicates: vec![],
            sort: vec![],
            columns: vec!["code".to_string()],
            is_pinned: false,
            is_default: false,
            updated_at: Utc::now() - Duration::days(1),
        }
    }

    #[test]
    fn empty_store_seeds_defaults() {
        let store = store();
        let state = store.load();
        assert_eq!(state.views.len(), defaults::DEFAULT_VIEWS.len());
        assert_eq!(
            state.active_by_scope[&ViewScope::Demands],
            Some(DEMANDS_OVERDUE_VIEW_ID.to_string())
        );
    }

    #[test]
    fn corrupt_blob_falls_back_to_seeded_state() {
        let kv = Arc::new(MemoryKv::default());
        kv.set(STATE_KEY, "{ definitely not json").expect("set");
        let store = ViewStore::new(kv);
        let state = store.load();
        assert_eq!(state.views.len(), defaults::DEFAULT_VIEWS.len());
    }

    #[test]
    fn defaults_are_reapplied_over_stored_copies() {
        let kv = Arc::new(MemoryKv::default());
        let store = ViewStore::new(kv.clone());
        let mut state = store.load();
        for view in &mut state.views {
            if view.id == TICKETS_OPEN_VIEW_ID {
                view.name = "tampered".to_string();
                view.is_default = false;
            }
        }
        kv.set(STATE_KEY, &serde_json::to_string(&state).unwrap())
            .expect("set");

        let reloaded = store.load();
        let open = reloaded
            .views
            .iter()
            .find(|view| view.id == TICKETS_OPEN_VIEW_ID)
            .expect("built-in present");
        assert_eq!(open.name, "Open tickets");
        assert!(open.is_default);
    }

    #[test]
    fn dangling_active_pointer_heals_to_scope_fallback() {
        let store = store();
        store
            .set_active_view(ViewScope::Tickets, Some("no-such-view".to_string()))
            .expect("set active");
        let state = store.load();
        assert_eq!(
            state.active_by_scope[&ViewScope::Tickets],
            Some(TICKETS_OPEN_VIEW_ID.to_string())
        );
    }

    #[test]
    fn explicit_null_active_pointer_is_preserved() {
        let store = store();
        store
            .set_active_view(ViewScope::Demands, None)
            .expect("set active");
        assert_eq!(store.load().active_by_scope[&ViewScope::Demands], None);
    }

    #[test]
    fn upsert_stamps_updated_at() {
        let store = store();
        let before = Utc::now() - Duration::hours(1);
        let saved = store
            .upsert_view(custom_view("custom-1", ViewScope::Tickets))
            .expect("upsert");
        assert!(saved.updated_at > before);
        assert!(!saved.is_default);
    }

    #[test]
    fn editing_a_default_becomes_a_clone() {
        let store = store();
        let mut edited = defaults::DEFAULT_VIEWS[0].clone();
        edited.name = "my overdue".to_string();
        let saved = store.upsert_view(edited).expect("upsert");

        assert_ne!(saved.id, defaults::DEFAULT_VIEWS[0].id);
        assert!(!saved.is_default);

        let state = store.load();
        assert_eq!(state.views.len(), defaults::DEFAULT_VIEWS.len() + 1);
        let original = state
            .views
            .iter()
            .find(|view| view.id == defaults::DEFAULT_VIEWS[0].id)
            .expect("original default");
        assert_eq!(original.name, defaults::DEFAULT_VIEWS[0].name);
    }

    #[test]
    fn deleting_a_default_is_a_no_op() {
        let store = store();
        let before = store.load();
        let deleted = store.delete_view(DEMANDS_OVERDUE_VIEW_ID).expect("delete");
        assert!(!deleted);

        let after = store.load();
        assert_eq!(after.views.len(), before.views.len());
        assert!(after.views.iter().any(|view| view.id == DEMANDS_OVERDUE_VIEW_ID));
    }

    #[test]
    fn deleting_a_custom_view_nulls_its_active_pointer() {
        let store = store();
        let saved = store
            .upsert_view(custom_view("custom-del", ViewScope::Demands))
            .expect("upsert");
        store
            .set_active_view(ViewScope::Demands, Some(saved.id.clone()))
            .expect("set active");

        assert!(store.delete_view(&saved.id).expect("delete"));
        let state = store.load();
        assert!(!state.views.iter().any(|view| view.id == saved.id));
        assert_eq!(state.active_by_scope[&ViewScope::Demands], None);
    }

    #[test]
    fn export_import_round_trip_preserves_custom_views() {
        let source = store();
        let saved = source
            .upsert_view(custom_view("custom-rt", ViewScope::Tickets))
            .expect("upsert");
        let exported = source.export_state().expect("export");

        let fresh = store();
        let imported = fresh.import_state(&exported).expect("import");
        assert_eq!(imported, 1);

        let state = fresh.load();
        let round_tripped = state
            .views
            .iter()
            .find(|view| view.id == saved.id)
            .expect("imported view");
        assert_eq!(round_tripped, &saved);
        // defaults remain the fresh store's own built-ins
        for default in defaults::DEFAULT_VIEWS.iter() {
            let found = state.views.iter().find(|view| view.id == default.id).unwrap();
            assert_eq!(found.name, default.name);
            assert!(found.is_default);
        }
    }

    #[test]
    fn import_never_overwrites_default_ids() {
        let store = store();
        let payload = serde_json::json!({
            "version": 1,
            "views": [
                {"id": TICKETS_OPEN_VIEW_ID, "scope": "tickets", "name": "hijacked"},
                {"id": "legit", "scope": "tickets", "name": "legit", "isDefault": true}
            ]
        });
        let imported = store.import_state(&payload.to_string()).expect("import");
        assert_eq!(imported, 1);

        let state = store.load();
        let open = state
            .views
            .iter()
            .find(|view| view.id == TICKETS_OPEN_VIEW_ID)
            .unwrap();
        assert_eq!(open.name, "Open tickets");
        // imported views are always demoted to non-default
        let legit = state.views.iter().find(|view| view.id == "legit").unwrap();
        assert!(!legit.is_default);
    }

    #[test]
    fn failed_import_leaves_state_unchanged() {
        let store = store();
        store
            .upsert_view(custom_view("keep-me", ViewScope::Demands))
            .expect("upsert");
        let before = store.load();

        assert!(store.import_state("{\"views\": []}").is_err());
        let after = store.load();
        assert_eq!(after.views.len(), before.views.len());
        assert!(after.views.iter().any(|view| view.id == "keep-me"));
    }

    #[test]
    fn reset_discards_custom_views() {
        let store = store();
        store
            .upsert_view(custom_view("ephemeral", ViewScope::Tickets))
            .expect("upsert");
        let state = store.reset_to_defaults().expect("reset");
        assert_eq!(state.views.len(), defaults::DEFAULT_VIEWS.len());
        assert_eq!(store.load().views.len(), defaults::DEFAULT_VIEWS.len());
    }
}
