//! Saved plan repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::connection::parse_timestamp;
use crate::db::Database;
use crate::plan::{ContentAction, ContentPlan};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SavedPlanStatus {
    Saved,
    Executed,
}

impl SavedPlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavedPlanStatus::Saved => "saved",
            SavedPlanStatus::Executed => "executed",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "saved" => Ok(SavedPlanStatus::Saved),
            "executed" => Ok(SavedPlanStatus::Executed),
            _ => anyhow::bail!("Unknown saved plan status: {}", s),
        }
    }
}

/// A plan stored for later review and execution, decoupled from chat state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPlan {
    pub id: String,
    pub title: String,
    pub description: String,
    pub actions: Vec<ContentAction>,
    pub conversation_id: Option<String>,
    pub status: SavedPlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedPlan {
    pub fn to_plan(&self) -> ContentPlan {
        ContentPlan {
            title: self.title.clone(),
            summary: self.description.clone(),
            actions: self.actions.clone(),
        }
    }
}

type SavedPlanRow = (String, String, String, String, Option<String>, String, String, String);

pub struct SavedPlanRepository {
    db: Database,
}

impl SavedPlanRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a plan (with any edits) without executing it
    pub async fn save(&self, plan: &ContentPlan, conversation_id: Option<&str>) -> Result<SavedPlan> {
        let now = Utc::now();
        let saved = SavedPlan {
            id: Uuid::new_v4().to_string(),
            title: plan.title.clone(),
            description: plan.summary.clone(),
            actions: plan.actions.clone(),
            conversation_id: conversation_id.map(str::to_string),
            status: SavedPlanStatus::Saved,
            created_at: now,
            updated_at: now,
        };

        let actions = serde_json::to_string(&saved.actions).context("Failed to serialize actions")?;
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO saved_plans (id, title, description, actions, conversation_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                saved.id,
                saved.title,
                saved.description,
                actions,
                saved.conversation_id,
                saved.status.as_str(),
                saved.created_at.to_rfc3339(),
                saved.updated_at.to_rfc3339(),
            ],
        )
        .context("Failed to insert saved plan")?;

        tracing::debug!("Saved plan {} ({} actions)", saved.id, saved.actions.len());
        Ok(saved)
    }

    /// Get a saved plan by ID
    pub async fn get(&self, id: &str) -> Result<Option<SavedPlan>> {
        let conn = self.db.lock().await;
        let row = conn
            .query_row(
                "SELECT id, title, description, actions, conversation_id, status, created_at, updated_at
                 FROM saved_plans WHERE id = ?1",
                params![id],
                Self::read_row,
            )
            .optional()
            .context("Failed to get saved plan")?;

        row.map(Self::from_row).transpose()
    }

    /// List saved plans, newest first, optionally filtered by status
    pub async fn list(&self, status: Option<SavedPlanStatus>) -> Result<Vec<SavedPlan>> {
        let conn = self.db.lock().await;
        let rows = match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT id, title, description, actions, conversation_id, status, created_at, updated_at
                     FROM saved_plans WHERE status = ?1 ORDER BY created_at DESC, rowid DESC",
                )?;
                let rows = stmt
                    .query_map(params![status.as_str()], Self::read_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, title, description, actions, conversation_id, status, created_at, updated_at
                     FROM saved_plans ORDER BY created_at DESC, rowid DESC",
                )?;
                let rows = stmt
                    .query_map([], Self::read_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };

        rows.into_iter().map(Self::from_row).collect()
    }

    /// Replace a saved plan's actions after editing
    pub async fn update_actions(&self, id: &str, actions: &[ContentAction]) -> Result<()> {
        let actions = serde_json::to_string(actions).context("Failed to serialize actions")?;
        let conn = self.db.lock().await;
        let changed = conn.execute(
            "UPDATE saved_plans SET actions = ?1, updated_at = ?2 WHERE id = ?3",
            params![actions, Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            anyhow::bail!("Saved plan not found: {}", id);
        }
        Ok(())
    }

    pub async fn mark_executed(&self, id: &str) -> Result<()> {
        let conn = self.db.lock().await;
        let changed = conn.execute(
            "UPDATE saved_plans SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![SavedPlanStatus::Executed.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            anyhow::bail!("Saved plan not found: {}", id);
        }
        tracing::debug!("Saved plan {} marked executed", id);
        Ok(())
    }

    /// Delete one saved plan, returning whether it existed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.db.lock().await;
        let changed = conn.execute("DELETE FROM saved_plans WHERE id = ?1", params![id])?;
        tracing::debug!("Deleted saved plan: {}", id);
        Ok(changed > 0)
    }

    fn read_row(row: &rusqlite::Row) -> rusqlite::Result<SavedPlanRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn from_row(row: SavedPlanRow) -> Result<SavedPlan> {
        let (id, title, description, actions, conversation_id, status, created_at, updated_at) = row;
        let actions: Vec<ContentAction> = serde_json::from_str(&actions)
            .with_context(|| format!("Invalid actions in saved plan {}", id))?;

        Ok(SavedPlan {
            id,
            title,
            description,
            actions,
            conversation_id,
            status: SavedPlanStatus::from_str(&status)?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}
