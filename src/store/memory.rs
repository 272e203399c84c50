//! In-memory content store

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{check_fields, compare_values, ContentStore, Query, Record};
use crate::error::StoreError;
use crate::plan::ContentTable;

/// Content store kept entirely in memory, rows in insertion order
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<ContentTable, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in a table
    pub async fn count(&self, table: ContentTable) -> usize {
        self.tables.read().await.get(&table).map_or(0, Vec::len)
    }
}

fn not_found(table: ContentTable, id: &str) -> StoreError {
    StoreError::NotFound {
        table: table.as_str().to_string(),
        id: id.to_string(),
    }
}

/// Fill every schema column, null when absent
fn normalize(table: ContentTable, mut fields: Map<String, Value>) -> Map<String, Value> {
    let mut row = Map::new();
    for column in table.columns() {
        row.insert(
            column.name.to_string(),
            fields.remove(column.name).unwrap_or(Value::Null),
        );
    }
    row
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert(&self, table: ContentTable, fields: Map<String, Value>) -> Result<Record, StoreError> {
        check_fields(table, &fields, true)?;
        let now = Utc::now();
        let record = Record {
            id: Uuid::new_v4().to_string(),
            table,
            fields: normalize(table, fields),
            created_at: now,
            updated_at: now,
        };

        self.tables
            .write()
            .await
            .entry(table)
            .or_default()
            .push(record.clone());

        tracing::debug!("Inserted {}/{}", table, record.id);
        Ok(record)
    }

    async fn update(&self, table: ContentTable, id: &str, patch: Map<String, Value>) -> Result<Record, StoreError> {
        check_fields(table, &patch, false)?;
        let mut tables = self.tables.write().await;
        let record = tables
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| not_found(table, id))?;

        for (column, value) in patch {
            record.fields.insert(column, value);
        }
        record.updated_at = Utc::now();

        tracing::debug!("Updated {}/{}", table, id);
        Ok(record.clone())
    }

    async fn delete(&self, table: ContentTable, id: &str) -> Result<Record, StoreError> {
        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(&table).ok_or_else(|| not_found(table, id))?;
        let position = rows
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| not_found(table, id))?;

        tracing::debug!("Deleted {}/{}", table, id);
        Ok(rows.remove(position))
    }

    async fn select_one(&self, table: ContentTable, id: &str) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table)
            .and_then(|rows| rows.iter().find(|r| r.id == id))
            .cloned())
    }

    async fn select_many(&self, table: ContentTable, query: &Query) -> Result<Vec<Record>, StoreError> {
        query.validate(table)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<(usize, Record)> = tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .filter(|(_, r)| {
                        query
                            .filters
                            .iter()
                            .all(|(column, value)| &r.column_value(column) == value)
                    })
                    .map(|(position, r)| (position, r.clone()))
                    .collect()
            })
            .unwrap_or_default();

        // ties fall back to insertion position, in the same direction
        if let Some(order) = &query.order {
            rows.sort_by(|(ia, a), (ib, b)| {
                let ordering = compare_values(&a.column_value(&order.column), &b.column_value(&order.column))
                    .then_with(|| ia.cmp(ib));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows.into_iter().map(|(_, record)| record).collect())
    }

    async fn restore(&self, record: &Record) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(record.table).or_default();
        if rows.iter().any(|r| r.id == record.id) {
            return Err(StoreError::Other(format!(
                "{}/{} already exists",
                record.table, record.id
            )));
        }
        rows.push(record.clone());
        Ok(())
    }
}
