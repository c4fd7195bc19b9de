pub mod template;

use crate::errors::{AppError, AppResult};
use crate::models::{
    Action, ActionFailure, AutomationRule, DispatchReport, OutboundEmail, TicketEvent,
};
use crate::predicate;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Mail-sending collaborator (network-bound; supplies its own timeouts).
pub trait MailSender: Send + Sync {
    fn send(&self, message: OutboundEmail) -> BoxFuture<AppResult<()>>;
}

/// Record-update collaborator backing the ticket-patching actions.
pub trait RecordUpdater: Send + Sync {
    fn update(&self, record_id: String, patch: Map<String, Value>) -> BoxFuture<AppResult<Value>>;
}

/// Matches triggered events against automation rules and runs their actions
/// sequentially. Rules can fire repeatedly for equivalent events; the source
/// stream is not deduplicated upstream.
pub struct AutomationEngine {
    mail: Arc<dyn MailSender>,
    records: Arc<dyn RecordUpdater>,
}

impl AutomationEngine {
    pub fn new(mail: Arc<dyn MailSender>, records: Arc<dyn RecordUpdater>) -> Self {
        Self { mail, records }
    }

    /// Evaluates every rule against the event. A rule matches when its
    /// trigger and all of its conditions match (empty conditions always
    /// match). Action failures are collected into the report, never
    /// propagated; one failing action does not stop its siblings or
    /// subsequent rules.
    pub async fn dispatch(&self, event: &TicketEvent, rules: &[AutomationRule]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for rule in rules {
            if !rule.is_active || rule.trigger != event.kind {
                continue;
            }
            if !predicate::matches_all(&event.record, &rule.conditions) {
                continue;
            }
            report.matched_rules.push(rule.id.clone());

            for (index, action) in rule.actions.iter().enumerate() {
                match self.execute(action, &event.record).await {
                    Ok(()) => report.executed_actions += 1,
                    Err(error) => {
                        tracing::warn!(
                            rule_id = %rule.id,
                            action_index = index,
                            error = %error,
                            "automation action failed"
                        );
                        report.failures.push(ActionFailure {
                            rule_id: rule.id.clone(),
                            action_index: index,
                            message: error.to_string(),
                        });
                    }
                }
            }
        }

        report
    }

    async fn execute(&self, action: &Action, record: &Value) -> AppResult<()> {
        match action {
            Action::SendEmail { to, subject, body } => {
                self.mail
                    .send(OutboundEmail {
                        to: template::render(to, record),
                        subject: template::render(subject, record),
                        body: template::render(body, record),
                    })
                    .await
            }
            Action::UpdateTicket { field, value } => {
                let id = record_id(record)?;
                let mut patch = Map::new();
                patch.insert(field.as_str().to_string(), value.clone());
                self.records.update(id, patch).await.map(|_| ())
            }
            Action::AssignAgent { agent_email } => {
                let id = record_id(record)?;
                let mut patch = Map::new();
                patch.insert("assignee".to_string(), Value::String(agent_email.clone()));
                self.records.update(id, patch).await.map(|_| ())
            }
        }
    }
}

fn record_id(record: &Value) -> AppResult<String> {
    match record.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(AppError::Validation(
            "event record carries no id to patch".to_string(),
        )),
    }
}
