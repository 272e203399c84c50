//! Generic data access over the allow-listed content tables

pub mod memory;
pub mod sqlite;

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::plan::ContentTable;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// One row of a content table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub table: ContentTable,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        match self.fields.get(column) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    /// Short human label for listings
    pub fn label(&self) -> String {
        match self.get(self.table.label_column()) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => self.id.clone(),
        }
    }

    /// Flat JSON row: system columns plus fields
    pub fn to_row(&self) -> Value {
        let mut row = Map::new();
        row.insert("id".to_string(), Value::String(self.id.clone()));
        for column in self.table.columns() {
            row.insert(
                column.name.to_string(),
                self.fields.get(column.name).cloned().unwrap_or(Value::Null),
            );
        }
        row.insert("created_at".to_string(), Value::String(self.created_at.to_rfc3339()));
        row.insert("updated_at".to_string(), Value::String(self.updated_at.to_rfc3339()));
        Value::Object(row)
    }

    /// Value of any column, system columns included
    pub fn column_value(&self, column: &str) -> Value {
        match column {
            "id" => Value::String(self.id.clone()),
            "created_at" => Value::String(self.created_at.to_rfc3339()),
            "updated_at" => Value::String(self.updated_at.to_rfc3339()),
            other => self.fields.get(other).cloned().unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Equality filters, optional ordering and limit for `select_many`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject columns outside the table's schema
    pub fn validate(&self, table: ContentTable) -> Result<(), StoreError> {
        let columns = self
            .filters
            .iter()
            .map(|(c, _)| c.as_str())
            .chain(self.order.iter().map(|o| o.column.as_str()));
        for column in columns {
            if !table.is_queryable(column) {
                return Err(StoreError::InvalidQuery(format!(
                    "unknown column {} on {}",
                    column, table
                )));
            }
        }
        Ok(())
    }
}

/// Data access collaborator shared by the plan executor, review and editors
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a row and return it with its generated id
    async fn insert(&self, table: ContentTable, fields: Map<String, Value>) -> Result<Record, StoreError>;

    /// Apply a patch to the row with the given id
    async fn update(&self, table: ContentTable, id: &str, patch: Map<String, Value>) -> Result<Record, StoreError>;

    /// Delete the row with the given id, returning what was removed
    async fn delete(&self, table: ContentTable, id: &str) -> Result<Record, StoreError>;

    /// Point lookup by id
    async fn select_one(&self, table: ContentTable, id: &str) -> Result<Option<Record>, StoreError>;

    async fn select_many(&self, table: ContentTable, query: &Query) -> Result<Vec<Record>, StoreError>;

    /// Re-insert a previously deleted row with its original id and timestamps
    async fn restore(&self, record: &Record) -> Result<(), StoreError>;
}

fn check_fields(table: ContentTable, fields: &Map<String, Value>, require_all: bool) -> Result<(), StoreError> {
    table
        .validate_fields(fields, require_all)
        .map_err(|e| StoreError::InvalidQuery(e.to_string()))
}

/// Total order over JSON values used for in-memory sorting (null first)
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)).then_with(|| a.to_string().cmp(&b.to_string())),
    }
}
