use crate::automation::{AutomationEngine, MailSender, RecordUpdater};
use crate::compare;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AutomationRule, BooleanResponse, DispatchReport, SaveRulePayload, SaveViewPayload, SavedView,
    TicketEvent, ViewScope, ViewStoreState,
};
use crate::store::ViewStore;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Core service the console shell talks to: the view store, the rule CRUD
/// surface, and the event dispatcher behind one handle. Constructed once at
/// startup with the host's network-bound collaborators injected.
pub struct OpsCore {
    db: Arc<Database>,
    views: ViewStore,
    automation: AutomationEngine,
}

impl OpsCore {
    pub fn new(
        data_dir: &Path,
        mail: Arc<dyn MailSender>,
        records: Arc<dyn RecordUpdater>,
    ) -> AppResult<Arc<Self>> {
        let db = Arc::new(Database::new(&data_dir.join("opsdesk.sqlite3"))?);
        let views = ViewStore::new(db.clone());
        let automation = AutomationEngine::new(mail, records);
        Ok(Arc::new(Self {
            db,
            views,
            automation,
        }))
    }

    // ─── Saved views ────────────────────────────────────────────────────

    pub fn view_state(&self) -> ViewStoreState {
        self.views.load()
    }

    pub fn list_views(&self, scope: Option<ViewScope>) -> Vec<SavedView> {
        self.views
            .load()
            .views
            .into_iter()
            .filter(|view| scope.map_or(true, |scope| view.scope == scope))
            .collect()
    }

    pub fn save_view(&self, payload: SaveViewPayload) -> AppResult<SavedView> {
        let view = SavedView {
            id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            scope: payload.scope,
            name: payload.name,
            description: payload.description,
            predicates: payload.predicates,
            sort: payload.sort,
            columns: payload.columns,
            is_pinned: payload.is_pinned,
            is_default: false,
            updated_at: chrono::Utc::now(),
        };
        self.views.upsert_view(view)
    }

    pub fn delete_view(&self, id: &str) -> AppResult<BooleanResponse> {
        Ok(BooleanResponse {
            success: self.views.delete_view(id)?,
        })
    }

    pub fn set_active_view(&self, scope: ViewScope, view_id: Option<String>) -> AppResult<()> {
        self.views.set_active_view(scope, view_id)
    }

    /// Filters and orders a record snapshot through a stored view.
    pub fn apply_view(&self, view_id: &str, records: &[Value]) -> AppResult<Vec<Value>> {
        let state = self.views.load();
        let view = state
            .views
            .iter()
            .find(|view| view.id == view_id)
            .ok_or_else(|| AppError::NotFound(format!("saved view '{view_id}'")))?;
        Ok(compare::apply_view(view, records))
    }

    pub fn export_views(&self) -> AppResult<String> {
        self.views.export_state()
    }

    pub fn import_views(&self, serialized: &str) -> AppResult<usize> {
        self.views.import_state(serialized)
    }

    pub fn reset_views(&self) -> AppResult<ViewStoreState> {
        self.views.reset_to_defaults()
    }

    // ─── Automation rules ───────────────────────────────────────────────

    pub fn list_rules(&self) -> AppResult<Vec<AutomationRule>> {
        self.db.list_rules()
    }

    pub fn get_rule(&self, id: &str) -> AppResult<Option<AutomationRule>> {
        self.db.get_rule(id)
    }

    pub fn save_rule(&self, payload: SaveRulePayload) -> AppResult<AutomationRule> {
        self.db.save_rule(payload)
    }

    pub fn delete_rule(&self, id: &str) -> AppResult<BooleanResponse> {
        Ok(BooleanResponse {
            success: self.db.delete_rule(id)?,
        })
    }

    pub fn set_rule_active(&self, id: &str, active: bool) -> AppResult<AutomationRule> {
        self.db.set_rule_active(id, active)
    }

    /// Entry point for the domain-event source: loads the active rules for
    /// the event's trigger and dispatches. Action failures come back inside
    /// the report, never as an error.
    pub async fn handle_ticket_event(&self, event: TicketEvent) -> AppResult<DispatchReport> {
        let rules = self.db.list_active_rules(event.kind)?;
        Ok(self.automation.dispatch(&event, &rules).await)
    }
}
