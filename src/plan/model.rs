//! Content plan model and materialization from tool-call arguments

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::table::ContentTable;
use crate::error::PlanError;

/// Name of the tool whose arguments carry a content plan
pub const CONTENT_PLAN_TOOL: &str = "content_plan";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, PlanError> {
        match s.trim() {
            "create" => Ok(ActionKind::Create),
            "update" => Ok(ActionKind::Update),
            "delete" => Ok(ActionKind::Delete),
            other => Err(PlanError::UnknownActionType(other.to_string())),
        }
    }
}

/// Action as it appears on the wire, before validation
#[derive(Debug, Clone, Deserialize)]
struct RawAction {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    table: String,
    #[serde(default, alias = "id")]
    record_id: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

/// One validated create/update/delete against an allow-listed table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction")]
pub struct ContentAction {
    #[serde(rename = "type")]
    kind: ActionKind,
    table: ContentTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, Value>>,
    description: String,
}

impl TryFrom<RawAction> for ContentAction {
    type Error = PlanError;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let kind = ActionKind::from_str(&raw.kind)?;
        let table = ContentTable::from_str(&raw.table)?;
        let record_id = raw.record_id.filter(|id| !id.trim().is_empty());
        let description = raw.description.unwrap_or_default();

        let data = match raw.data {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                return Err(PlanError::TypeMismatch {
                    table: table.as_str().to_string(),
                    column: "data".to_string(),
                    expected: "object",
                    got: super::table::json_type_name(&other),
                })
            }
        };

        match kind {
            ActionKind::Create => {
                if record_id.is_some() {
                    return Err(invalid("create actions must not carry a record id"));
                }
                let data = data.ok_or_else(|| invalid("create actions need a data payload"))?;
                Self::create(table, data, description)
            }
            ActionKind::Update => {
                let id = record_id.ok_or_else(|| invalid("update actions need a record id"))?;
                let data = data.ok_or_else(|| invalid("update actions need a data payload"))?;
                Self::update(table, id, data, description)
            }
            ActionKind::Delete => {
                if data.as_ref().map_or(false, |d| !d.is_empty()) {
                    return Err(invalid("delete actions must not carry a data payload"));
                }
                let id = record_id.ok_or_else(|| invalid("delete actions need a record id"))?;
                Ok(Self::delete(table, id, description))
            }
        }
    }
}

fn invalid(reason: &str) -> PlanError {
    PlanError::InvalidAction {
        index: 0,
        reason: reason.to_string(),
    }
}

impl ContentAction {
    pub fn create(
        table: ContentTable,
        data: Map<String, Value>,
        description: impl Into<String>,
    ) -> Result<Self, PlanError> {
        table.validate_fields(&data, true)?;
        Ok(Self {
            kind: ActionKind::Create,
            table,
            record_id: None,
            data: Some(data),
            description: description.into(),
        })
    }

    pub fn update(
        table: ContentTable,
        record_id: impl Into<String>,
        data: Map<String, Value>,
        description: impl Into<String>,
    ) -> Result<Self, PlanError> {
        if data.is_empty() {
            return Err(invalid("update actions need at least one field"));
        }
        table.validate_fields(&data, false)?;
        Ok(Self {
            kind: ActionKind::Update,
            table,
            record_id: Some(record_id.into()),
            data: Some(data),
            description: description.into(),
        })
    }

    pub fn delete(table: ContentTable, record_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Delete,
            table,
            record_id: Some(record_id.into()),
            data: None,
            description: description.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn table(&self) -> ContentTable {
        self.table
    }

    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Replace one payload field from a text input, coercing it to the column kind
    pub fn set_field(&mut self, column: &str, raw: &str) -> Result<(), PlanError> {
        let table = self.table;
        let data = self.data.as_mut().ok_or(PlanError::NoPayload)?;
        let def = table.column(column).ok_or_else(|| PlanError::UnknownColumn {
            table: table.as_str().to_string(),
            column: column.to_string(),
        })?;

        let value = def.kind.coerce(raw).ok_or_else(|| PlanError::TypeMismatch {
            table: table.as_str().to_string(),
            column: column.to_string(),
            expected: def.kind.as_str(),
            got: format!("{:?}", raw),
        })?;

        if value.is_null() && def.required {
            return Err(PlanError::MissingColumn {
                table: table.as_str().to_string(),
                column: column.to_string(),
            });
        }

        data.insert(column.to_string(), value);
        Ok(())
    }

    /// Drop one field from the payload
    pub fn clear_field(&mut self, column: &str) -> Result<(), PlanError> {
        let (table, kind) = (self.table, self.kind);
        let data = self.data.as_mut().ok_or(PlanError::NoPayload)?;

        if kind == ActionKind::Create && table.column(column).map_or(false, |c| c.required) {
            return Err(PlanError::MissingColumn {
                table: table.as_str().to_string(),
                column: column.to_string(),
            });
        }
        if kind == ActionKind::Update && data.len() == 1 && data.contains_key(column) {
            return Err(invalid("update actions need at least one field"));
        }

        data.remove(column);
        Ok(())
    }
}

/// A titled, ordered list of content actions proposed by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPlan {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub actions: Vec<ContentAction>,
}

impl ContentPlan {
    /// Materialize a plan from the accumulated arguments of a `content_plan` tool call
    pub fn from_tool_arguments(arguments: &str) -> Result<Self, PlanError> {
        let value: Value = serde_json::from_str(arguments)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, PlanError> {
        let mut object = match value {
            Value::Object(map) => map,
            _ => return Err(PlanError::NotAnObject),
        };

        let title = take_string(&mut object, "title");
        let summary = take_string(&mut object, "summary");

        let raw_actions = match object.remove("actions") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(PlanError::ActionsNotArray),
        };

        let actions = raw_actions
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value::<RawAction>(item)
                    .map_err(PlanError::from)
                    .and_then(ContentAction::try_from)
                    .map_err(|e| PlanError::InvalidAction {
                        index,
                        reason: match e {
                            PlanError::InvalidAction { reason, .. } => reason,
                            other => other.to_string(),
                        },
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { title, summary, actions })
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> String {
    match object.remove(key) {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
