use crate::errors::{AppError, AppResult};
use crate::models::{Action, AutomationRule, Predicate, SaveRulePayload, TriggerKind};
use crate::store::KvStore;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const RULE_COLUMNS: &str =
    "id, title, is_active, trigger_kind, conditions_json, actions_json, created_at, updated_at";

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

#[derive(Debug)]
struct RawRule {
    id: String,
    title: String,
    is_active: bool,
    trigger_kind: String,
    conditions_json: String,
    actions_json: String,
    created_at: String,
    updated_at: String,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    pub fn list_rules(&self) -> AppResult<Vec<AutomationRule>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM automation_rules ORDER BY created_at ASC, id ASC"
        ))?;
        let raw_rules = stmt
            .query_map([], row_to_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        raw_rules.into_iter().map(raw_to_rule).collect()
    }

    /// Rules the dispatcher should consider for one trigger kind.
    pub fn list_active_rules(&self, trigger: TriggerKind) -> AppResult<Vec<AutomationRule>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM automation_rules
             WHERE trigger_kind = ?1 AND is_active = 1
             ORDER BY created_at ASC, id ASC"
        ))?;
        let raw_rules = stmt
            .query_map([trigger.as_str()], row_to_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        raw_rules.into_iter().map(raw_to_rule).collect()
    }

    pub fn get_rule(&self, id: &str) -> AppResult<Option<AutomationRule>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {RULE_COLUMNS} FROM automation_rules WHERE id = ?1"),
                [id],
                row_to_raw,
            )
            .optional()?;
        raw.map(raw_to_rule).transpose()
    }

    pub fn save_rule(&self, payload: SaveRulePayload) -> AppResult<AutomationRule> {
        validate_rule_payload(&payload)?;
        let now = Utc::now();

        if let Some(id) = payload.id.clone() {
            let existing = self
                .get_rule(&id)?
                .ok_or_else(|| AppError::NotFound(format!("automation rule '{id}'")))?;
            let rule = AutomationRule {
                id,
                title: payload.title,
                is_active: payload.is_active.unwrap_or(existing.is_active),
                trigger: payload.trigger,
                conditions: payload.conditions,
                actions: payload.actions,
                created_at: existing.created_at,
                updated_at: now,
            };
            let conn = self.lock()?;
            conn.execute(
                "UPDATE automation_rules
                 SET title = ?1, is_active = ?2, trigger_kind = ?3,
                     conditions_json = ?4, actions_json = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    rule.title,
                    rule.is_active,
                    rule.trigger.as_str(),
                    serde_json::to_string(&rule.conditions)?,
                    serde_json::to_string(&rule.actions)?,
                    rule.updated_at.to_rfc3339(),
                    rule.id,
                ],
            )?;
            return Ok(rule);
        }

        let rule = AutomationRule {
            id: Uuid::new_v4().to_string(),
            title: payload.title,
            is_active: payload.is_active.unwrap_or(true),
            trigger: payload.trigger,
            conditions: payload.conditions,
            actions: payload.actions,
            created_at: now,
            updated_at: now,
        };
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO automation_rules (id, title, is_active, trigger_kind, conditions_json, actions_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                rule.id,
                rule.title,
                rule.is_active,
                rule.trigger.as_str(),
                serde_json::to_string(&rule.conditions)?,
                serde_json::to_string(&rule.actions)?,
                rule.created_at.to_rfc3339(),
                rule.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(rule)
    }

    pub fn delete_rule(&self, id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM automation_rules WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    pub fn set_rule_active(&self, id: &str, active: bool) -> AppResult<AutomationRule> {
        {
            let conn = self.lock()?;
            let affected = conn.execute(
                "UPDATE automation_rules SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
                params![active, Utc::now().to_rfc3339(), id],
            )?;
            if affected == 0 {
                return Err(AppError::NotFound(format!("automation rule '{id}'")));
            }
        }
        self.get_rule(id)?
            .ok_or_else(|| AppError::NotFound(format!("automation rule '{id}'")))
    }
}

impl KvStore for Database {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        conn.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(AppError::from)
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn validate_rule_payload(payload: &SaveRulePayload) -> AppResult<()> {
    if payload.title.trim().is_empty() {
        return Err(AppError::Validation(
            "automation rule title cannot be empty".to_string(),
        ));
    }
    if payload.actions.is_empty() {
        return Err(AppError::Validation(
            "automation rule must declare at least one action".to_string(),
        ));
    }
    for condition in &payload.conditions {
        if !condition.operator.allowed_in_automation() {
            return Err(AppError::Validation(format!(
                "operator '{}' is not allowed in automation conditions",
                condition.operator.as_str()
            )));
        }
    }
    for action in &payload.actions {
        if let Action::SendEmail { to, .. } = action {
            if to.trim().is_empty() {
                return Err(AppError::Validation(
                    "sendEmail action requires a recipient".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawRule> {
    Ok(RawRule {
        id: row.get(0)?,
        title: row.get(1)?,
        is_active: row.get(2)?,
        trigger_kind: row.get(3)?,
        conditions_json: row.get(4)?,
        actions_json: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn raw_to_rule(raw: RawRule) -> AppResult<AutomationRule> {
    let conditions: Vec<Predicate> = serde_json::from_str(&raw.conditions_json)?;
    let actions: Vec<Action> = serde_json::from_str(&raw.actions_json)?;
    Ok(AutomationRule {
        id: raw.id,
        title: raw.title,
        is_active: raw.is_active,
        trigger: trigger_from_str(&raw.trigger_kind)?,
        conditions,
        actions,
        created_at: parse_timestamp(&raw.created_at)?,
        updated_at: parse_timestamp(&raw.updated_at)?,
    })
}

fn trigger_from_str(raw: &str) -> AppResult<TriggerKind> {
    match raw {
        "ticketCreated" => Ok(TriggerKind::TicketCreated),
        "ticketUpdated" => Ok(TriggerKind::TicketUpdated),
        other => Err(AppError::Internal(format!("unknown trigger kind '{other}'"))),
    }
}

fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| AppError::Internal(format!("invalid stored timestamp '{raw}': {error}")))
}
