//! Before/after review of a plan against the current store contents

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::model::{ActionKind, ContentAction, ContentPlan};
use super::table::ContentTable;
use crate::store::{ContentStore, Record};

/// Placeholder shown for missing or null values
pub const EMPTY: &str = "(empty)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldChange {
    /// New value on a record being created
    Added,
    Changed,
    Unchanged,
    /// Current value on a record being deleted
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub column: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub change: FieldChange,
}

impl FieldDiff {
    pub fn render(&self) -> String {
        let old = render_value(self.old.as_ref());
        let new = render_value(self.new.as_ref());
        match self.change {
            FieldChange::Added => format!("{}: {}", self.column, new),
            FieldChange::Changed => format!("{}: ~~{}~~ -> {}", self.column, old, new),
            FieldChange::Unchanged => format!("{}: {} (unchanged)", self.column, new),
            FieldChange::Removed => format!("{}: ~~{}~~", self.column, old),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionDiff {
    pub index: usize,
    pub kind: ActionKind,
    pub table: ContentTable,
    pub record_id: Option<String>,
    pub description: String,
    /// Whether the targeted record was found (always true for creates)
    pub found: bool,
    pub fields: Vec<FieldDiff>,
}

impl ActionDiff {
    pub fn changed_fields(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.change != FieldChange::Unchanged)
            .count()
    }

    pub fn render(&self) -> String {
        let target = match &self.record_id {
            Some(id) => format!("{}/{}", self.table, id),
            None => self.table.to_string(),
        };
        let mut out = format!("#{} {} {}", self.index + 1, self.kind.as_str(), target);
        if !self.description.is_empty() {
            out.push_str(&format!(" - {}", self.description));
        }
        if !self.found {
            out.push_str(&format!("\n    {}", EMPTY));
        }
        for field in &self.fields {
            out.push_str("\n    ");
            out.push_str(&field.render());
        }
        out
    }
}

/// Display form of a value: strings as-is, everything else as JSON
pub fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => EMPTY.to_string(),
        Some(Value::String(s)) if s.is_empty() => EMPTY.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Compare one action with the current row it targets
pub fn diff_action(index: usize, action: &ContentAction, current: Option<&Record>) -> ActionDiff {
    let table = action.table();
    let payload = action.data();

    let fields = match action.kind() {
        ActionKind::Create => payload
            .map(|data| {
                ordered(table, data.keys())
                    .into_iter()
                    .map(|column| FieldDiff {
                        new: data.get(column).cloned(),
                        column: column.to_string(),
                        old: None,
                        change: FieldChange::Added,
                    })
                    .collect()
            })
            .unwrap_or_default(),
        ActionKind::Update => payload
            .map(|data| {
                ordered(table, data.keys())
                    .into_iter()
                    .map(|column| {
                        let old = current.and_then(|r| r.get(column)).cloned();
                        let new = data.get(column).filter(|v| !v.is_null()).cloned();
                        let change = if same_value(old.as_ref(), new.as_ref()) {
                            FieldChange::Unchanged
                        } else {
                            FieldChange::Changed
                        };
                        FieldDiff {
                            column: column.to_string(),
                            old,
                            new,
                            change,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default(),
        ActionKind::Delete => current
            .map(|record| {
                table
                    .columns()
                    .iter()
                    .filter_map(|c| record.get(c.name).map(|v| (c.name, v)))
                    .map(|(column, value)| FieldDiff {
                        column: column.to_string(),
                        old: Some(value.clone()),
                        new: None,
                        change: FieldChange::Removed,
                    })
                    .collect()
            })
            .unwrap_or_default(),
    };

    ActionDiff {
        index,
        kind: action.kind(),
        table,
        record_id: action.record_id().map(str::to_string),
        description: action.description().to_string(),
        found: action.kind() == ActionKind::Create || current.is_some(),
        fields,
    }
}

/// Equality as the rendered JSON would see it: `1` and `1.0` are the same
fn same_value(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Payload columns in schema order
fn ordered<'a>(table: ContentTable, keys: impl Iterator<Item = &'a String>) -> Vec<&'a str> {
    let mut keys: Vec<&str> = keys.map(String::as_str).collect();
    keys.sort_by_key(|k| {
        table
            .columns()
            .iter()
            .position(|c| c.name == *k)
            .unwrap_or(usize::MAX)
    });
    keys
}

/// Review state for one plan: fetched current rows, loaded once
#[derive(Debug, Default)]
pub struct PlanReview {
    open: bool,
    loaded: bool,
    current: BTreeMap<usize, Option<Record>>,
}

impl PlanReview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Flip the review open or closed; opening fetches current rows the first time.
    /// Closing keeps what was fetched.
    pub async fn toggle(&mut self, plan: &ContentPlan, store: &dyn ContentStore) -> bool {
        self.open = !self.open;
        if self.open {
            self.load(plan, store).await;
        }
        self.open
    }

    /// Fetch the current row for every update/delete action, one at a time.
    /// Lookup failures are treated as missing rows.
    pub async fn load(&mut self, plan: &ContentPlan, store: &dyn ContentStore) {
        if self.loaded {
            return;
        }

        for (index, action) in plan.actions.iter().enumerate() {
            if action.kind() == ActionKind::Create {
                continue;
            }
            let Some(id) = action.record_id() else {
                continue;
            };

            let record = match store.select_one(action.table(), id).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Review lookup for {}/{} failed: {}", action.table(), id, e);
                    None
                }
            };
            debug!(
                "Review lookup {}/{}: {}",
                action.table(),
                id,
                if record.is_some() { "found" } else { "missing" }
            );
            self.current.insert(index, record);
        }

        self.loaded = true;
    }

    pub fn current(&self, index: usize) -> Option<&Record> {
        self.current.get(&index).and_then(Option::as_ref)
    }

    pub fn diffs(&self, plan: &ContentPlan) -> Vec<ActionDiff> {
        plan.actions
            .iter()
            .enumerate()
            .map(|(index, action)| diff_action(index, action, self.current(index)))
            .collect()
    }
}
