use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    OneOf,
    Contains,
    IsNull,
    IsNotNull,
    IsToday,
    Between,
    GreaterThan,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::OneOf => "oneOf",
            Self::Contains => "contains",
            Self::IsNull => "isNull",
            Self::IsNotNull => "isNotNull",
            Self::IsToday => "isToday",
            Self::Between => "between",
            Self::GreaterThan => "greaterThan",
        }
    }

    /// Automation conditions use a reduced operator vocabulary.
    pub fn allowed_in_automation(self) -> bool {
        matches!(
            self,
            Self::Equals | Self::NotEquals | Self::Contains | Self::GreaterThan
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    pub field: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewScope {
    Demands,
    Tickets,
}

impl ViewScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Demands => "demands",
            Self::Tickets => "tickets",
        }
    }

    pub fn all() -> [ViewScope; 2] {
        [Self::Demands, Self::Tickets]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedView {
    pub id: String,
    pub scope: ViewScope,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewStoreState {
    pub version: u32,
    pub views: Vec<SavedView>,
    pub active_by_scope: BTreeMap<ViewScope, Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveViewPayload {
    pub id: Option<String>,
    pub scope: ViewScope,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub is_pinned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
    TicketCreated,
    TicketUpdated,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TicketCreated => "ticketCreated",
            Self::TicketUpdated => "ticketUpdated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketEvent {
    pub kind: TriggerKind,
    pub record: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketField {
    Priority,
    Status,
    Category,
}

impl TicketField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::Status => "status",
            Self::Category => "category",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    #[serde(rename_all = "camelCase")]
    SendEmail {
        to: String,
        subject: String,
        body: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateTicket { field: TicketField, value: Value },
    #[serde(rename_all = "camelCase")]
    AssignAgent { agent_email: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    pub id: String,
    pub title: String,
    pub is_active: bool,
    pub trigger: TriggerKind,
    #[serde(default)]
    pub conditions: Vec<Predicate>,
    pub actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRulePayload {
    pub id: Option<String>,
    pub title: String,
    pub is_active: Option<bool>,
    pub trigger: TriggerKind,
    #[serde(default)]
    pub conditions: Vec<Predicate>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFailure {
    pub rule_id: String,
    pub action_index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub matched_rules: Vec<String>,
    pub executed_actions: usize,
    pub failures: Vec<ActionFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanResponse {
    pub success: bool,
}
