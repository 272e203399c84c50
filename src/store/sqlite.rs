//! SQLite-backed content store

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use super::{check_fields, ContentStore, Query, Record};
use crate::db::connection::parse_timestamp;
use crate::db::Database;
use crate::error::StoreError;
use crate::plan::table::{ColumnKind, SYSTEM_COLUMNS};
use crate::plan::ContentTable;

/// Content store over the generated content tables of a [`Database`]
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get the database reference
    pub fn db(&self) -> &Database {
        &self.db
    }
}

fn to_sql(kind: ColumnKind, value: &Value) -> SqlValue {
    if value.is_null() {
        return SqlValue::Null;
    }
    match kind {
        ColumnKind::Text | ColumnKind::Date => match value {
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        },
        ColumnKind::Integer => value.as_i64().map(SqlValue::Integer).unwrap_or(SqlValue::Null),
        ColumnKind::Real => value.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        ColumnKind::Bool => value
            .as_bool()
            .map(|b| SqlValue::Integer(b as i64))
            .unwrap_or(SqlValue::Null),
        ColumnKind::Json => SqlValue::Text(value.to_string()),
    }
}

fn from_sql(kind: ColumnKind, value: SqlValue) -> Value {
    match (kind, value) {
        (_, SqlValue::Null) | (_, SqlValue::Blob(_)) => Value::Null,
        (ColumnKind::Bool, SqlValue::Integer(i)) => Value::Bool(i != 0),
        (_, SqlValue::Integer(i)) => Value::from(i),
        (_, SqlValue::Real(f)) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        (ColumnKind::Json, SqlValue::Text(s)) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        (_, SqlValue::Text(s)) => Value::String(s),
    }
}

/// SQL value for a filter on any queryable column
fn filter_value(table: ContentTable, column: &str, value: &Value) -> SqlValue {
    match table.column(column) {
        Some(def) => to_sql(def.kind, value),
        None => to_sql(ColumnKind::Text, value),
    }
}

/// Resolve a column name to its static identifier so no caller text reaches SQL
fn static_column(table: ContentTable, name: &str) -> Option<&'static str> {
    SYSTEM_COLUMNS
        .iter()
        .copied()
        .find(|c| *c == name)
        .or_else(|| table.column(name).map(|c| c.name))
}

fn select_list(table: ContentTable) -> String {
    let mut columns = vec!["id", "created_at", "updated_at"];
    columns.extend(table.columns().iter().map(|c| c.name));
    columns.join(", ")
}

fn read_record(table: ContentTable, row: &rusqlite::Row) -> rusqlite::Result<Record> {
    let mut fields = Map::new();
    for (i, column) in table.columns().iter().enumerate() {
        let raw: SqlValue = row.get(i + 3)?;
        fields.insert(column.name.to_string(), from_sql(column.kind, raw));
    }

    Ok(Record {
        id: row.get(0)?,
        table,
        fields,
        created_at: parse_timestamp(&row.get::<_, String>(1)?),
        updated_at: parse_timestamp(&row.get::<_, String>(2)?),
    })
}

fn fetch(conn: &Connection, table: ContentTable, id: &str) -> Result<Option<Record>, StoreError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        select_list(table),
        table.as_str()
    );
    let record = conn
        .query_row(&sql, [id], |row| read_record(table, row))
        .optional()?;
    Ok(record)
}

fn insert_row(
    conn: &Connection,
    table: ContentTable,
    id: &str,
    created_at: &str,
    updated_at: &str,
    fields: &Map<String, Value>,
) -> Result<(), StoreError> {
    let mut names = vec!["id", "created_at", "updated_at"];
    let mut values = vec![
        SqlValue::Text(id.to_string()),
        SqlValue::Text(created_at.to_string()),
        SqlValue::Text(updated_at.to_string()),
    ];

    for column in table.columns() {
        if let Some(value) = fields.get(column.name) {
            names.push(column.name);
            values.push(to_sql(column.kind, value));
        }
    }

    let placeholders = (1..=values.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.as_str(),
        names.join(", "),
        placeholders
    );

    conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(())
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn insert(&self, table: ContentTable, fields: Map<String, Value>) -> Result<Record, StoreError> {
        check_fields(table, &fields, true)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let conn = self.db.lock().await;
        insert_row(&conn, table, &id, &now, &now, &fields)?;
        tracing::debug!("Inserted {}/{}", table, id);

        fetch(&conn, table, &id)?.ok_or_else(|| StoreError::Other(format!("{}/{} vanished after insert", table, id)))
    }

    async fn update(&self, table: ContentTable, id: &str, patch: Map<String, Value>) -> Result<Record, StoreError> {
        check_fields(table, &patch, false)?;

        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for column in table.columns() {
            if let Some(value) = patch.get(column.name) {
                values.push(to_sql(column.kind, value));
                assignments.push(format!("{} = ?{}", column.name, values.len()));
            }
        }
        values.push(SqlValue::Text(Utc::now().to_rfc3339()));
        assignments.push(format!("updated_at = ?{}", values.len()));
        values.push(SqlValue::Text(id.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table.as_str(),
            assignments.join(", "),
            values.len()
        );

        let conn = self.db.lock().await;
        let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                table: table.as_str().to_string(),
                id: id.to_string(),
            });
        }
        tracing::debug!("Updated {}/{}", table, id);

        fetch(&conn, table, id)?.ok_or_else(|| StoreError::NotFound {
            table: table.as_str().to_string(),
            id: id.to_string(),
        })
    }

    async fn delete(&self, table: ContentTable, id: &str) -> Result<Record, StoreError> {
        let conn = self.db.lock().await;
        let record = fetch(&conn, table, id)?.ok_or_else(|| StoreError::NotFound {
            table: table.as_str().to_string(),
            id: id.to_string(),
        })?;

        conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table.as_str()), [id])?;
        tracing::debug!("Deleted {}/{}", table, id);
        Ok(record)
    }

    async fn select_one(&self, table: ContentTable, id: &str) -> Result<Option<Record>, StoreError> {
        let conn = self.db.lock().await;
        fetch(&conn, table, id)
    }

    async fn select_many(&self, table: ContentTable, query: &Query) -> Result<Vec<Record>, StoreError> {
        query.validate(table)?;

        let mut sql = format!("SELECT {} FROM {} WHERE 1=1", select_list(table), table.as_str());
        let mut values = Vec::new();

        for (name, value) in &query.filters {
            let column = static_column(table, name)
                .ok_or_else(|| StoreError::InvalidQuery(format!("unknown column {}", name)))?;
            if value.is_null() {
                sql.push_str(&format!(" AND {} IS NULL", column));
            } else {
                values.push(filter_value(table, column, value));
                sql.push_str(&format!(" AND {} = ?{}", column, values.len()));
            }
        }

        if let Some(order) = &query.order {
            let column = static_column(table, &order.column)
                .ok_or_else(|| StoreError::InvalidQuery(format!("unknown column {}", order.column)))?;
            let direction = if order.descending { "DESC" } else { "ASC" };
            sql.push_str(&format!(" ORDER BY {} {}, rowid {}", column, direction, direction));
        } else {
            sql.push_str(" ORDER BY rowid ASC");
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), |row| read_record(table, row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    async fn restore(&self, record: &Record) -> Result<(), StoreError> {
        let conn = self.db.lock().await;
        insert_row(
            &conn,
            record.table,
            &record.id,
            &record.created_at.to_rfc3339(),
            &record.updated_at.to_rfc3339(),
            &record.fields,
        )?;
        tracing::debug!("Restored {}/{}", record.table, record.id);
        Ok(())
    }
}
