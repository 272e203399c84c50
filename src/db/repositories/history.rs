//! Plan execution history and change history

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::connection::parse_timestamp;
use crate::db::Database;
use crate::plan::executor::{ActionResult, ExecutionStatus};
use crate::plan::{ContentAction, ContentPlan, ContentTable};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
    /// Compensating write that undid an earlier change
    Revert,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Create => "create",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
            ChangeOperation::Revert => "revert",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(ChangeOperation::Create),
            "update" => Ok(ChangeOperation::Update),
            "delete" => Ok(ChangeOperation::Delete),
            "revert" => Ok(ChangeOperation::Revert),
            _ => anyhow::bail!("Unknown change operation: {}", s),
        }
    }
}

/// One row-level change applied by an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub table: ContentTable,
    pub record_id: String,
    pub operation: ChangeOperation,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub id: String,
    pub plan_id: Option<String>,
    #[serde(flatten)]
    pub change: Change,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanHistoryEntry {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub actions: Vec<ContentAction>,
    pub results: Vec<ActionResult>,
    pub status: ExecutionStatus,
    pub conversation_id: Option<String>,
    pub executed_at: DateTime<Utc>,
}

pub struct HistoryRepository {
    db: Database,
}

impl HistoryRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record an execution attempt and its row changes in one transaction.
    /// Returns the plan history id.
    pub async fn record_execution(
        &self,
        plan: &ContentPlan,
        conversation_id: Option<&str>,
        status: ExecutionStatus,
        results: &[ActionResult],
        changes: &[Change],
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let actions = serde_json::to_string(&plan.actions)?;
        let results = serde_json::to_string(results)?;

        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO plan_history (id, title, summary, actions, results, status, conversation_id, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                plan.title,
                plan.summary,
                actions,
                results,
                status.as_str(),
                conversation_id,
                now,
            ],
        )
        .context("Failed to insert plan history")?;

        for change in changes {
            tx.execute(
                "INSERT INTO change_history (id, plan_id, table_name, record_id, operation, before_data, after_data, changed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    Uuid::new_v4().to_string(),
                    id,
                    change.table.as_str(),
                    change.record_id,
                    change.operation.as_str(),
                    change.before.as_ref().map(Value::to_string),
                    change.after.as_ref().map(Value::to_string),
                    now,
                ],
            )
            .context("Failed to insert change history")?;
        }
        tx.commit()?;

        tracing::debug!(
            "Recorded execution {} ({}, {} changes)",
            id,
            status.as_str(),
            changes.len()
        );
        Ok(id)
    }

    /// Most recent execution attempts first
    pub async fn list_executions(&self, limit: usize) -> Result<Vec<PlanHistoryEntry>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, title, summary, actions, results, status, conversation_id, executed_at
             FROM plan_history ORDER BY executed_at DESC, rowid DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, title, summary, actions, results, status, conversation_id, executed_at)| -> Result<PlanHistoryEntry> {
                Ok(PlanHistoryEntry {
                    actions: serde_json::from_str(&actions)
                        .with_context(|| format!("Invalid actions in plan history {}", id))?,
                    results: serde_json::from_str(&results)
                        .with_context(|| format!("Invalid results in plan history {}", id))?,
                    status: ExecutionStatus::from_str(&status)?,
                    id,
                    title,
                    summary,
                    conversation_id,
                    executed_at: parse_timestamp(&executed_at),
                })
            })
            .collect()
    }

    /// Most recent changes first, optionally for one record
    pub async fn list_changes(
        &self,
        limit: usize,
        record: Option<(ContentTable, &str)>,
    ) -> Result<Vec<ChangeEntry>> {
        let conn = self.db.lock().await;
        let mut query = String::from(
            "SELECT id, plan_id, table_name, record_id, operation, before_data, after_data, changed_at
             FROM change_history",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some((table, record_id)) = record {
            query.push_str(" WHERE table_name = ?1 AND record_id = ?2");
            params.push(Box::new(table.as_str().to_string()));
            params.push(Box::new(record_id.to_string()));
        }
        query.push_str(&format!(" ORDER BY changed_at DESC, rowid DESC LIMIT ?{}", params.len() + 1));
        params.push(Box::new(limit as i64));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to collect changes")?;

        rows.into_iter()
            .map(|(id, plan_id, table, record_id, operation, before, after, changed_at)| -> Result<ChangeEntry> {
                Ok(ChangeEntry {
                    id,
                    plan_id,
                    change: Change {
                        table: ContentTable::from_str(&table)?,
                        record_id,
                        operation: ChangeOperation::from_str(&operation)?,
                        before: before.and_then(|s| serde_json::from_str(&s).ok()),
                        after: after.and_then(|s| serde_json::from_str(&s).ok()),
                    },
                    changed_at: parse_timestamp(&changed_at),
                })
            })
            .collect()
    }
}
