//! Conversation repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::{ChatMessage, Role};
use crate::db::connection::parse_timestamp;
use crate::db::Database;

/// Characters of the first user message used as a conversation title
pub const TITLE_CHARS: usize = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Title derived from the first user message
pub fn derive_title(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::User && !m.content.trim().is_empty())
        .map(|m| m.content.trim().chars().take(TITLE_CHARS).collect())
        .unwrap_or_else(|| "New conversation".to_string())
}

pub struct ConversationRepository {
    db: Database,
}

impl ConversationRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Write the whole transcript.
    ///
    /// Without an active id a new conversation is inserted; with one, its
    /// messages and `updated_at` are replaced (last write wins).
    pub async fn upsert(&self, active_id: Option<&str>, messages: &[ChatMessage]) -> Result<Conversation> {
        let now = Utc::now();
        let messages_json = serde_json::to_string(messages).context("Failed to serialize messages")?;
        let conn = self.db.lock().await;

        if let Some(id) = active_id {
            let changed = conn
                .execute(
                    "UPDATE conversations SET messages = ?1, updated_at = ?2 WHERE id = ?3",
                    params![messages_json, now.to_rfc3339(), id],
                )
                .context("Failed to update conversation")?;

            if changed > 0 {
                let (title, created_at): (String, String) = conn.query_row(
                    "SELECT title, created_at FROM conversations WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                tracing::debug!("Updated conversation {} ({} messages)", id, messages.len());
                return Ok(Conversation {
                    id: id.to_string(),
                    title,
                    messages: messages.to_vec(),
                    created_at: parse_timestamp(&created_at),
                    updated_at: now,
                });
            }
        }

        let conversation = Conversation {
            id: active_id
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            title: derive_title(messages),
            messages: messages.to_vec(),
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO conversations (id, title, messages, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation.id,
                conversation.title,
                messages_json,
                conversation.created_at.to_rfc3339(),
                conversation.updated_at.to_rfc3339(),
            ],
        )
        .context("Failed to insert conversation")?;

        tracing::debug!("Created conversation: {}", conversation.id);
        Ok(conversation)
    }

    /// Get a conversation by ID
    pub async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.db.lock().await;
        let row = conn
            .query_row(
                "SELECT id, title, messages, created_at, updated_at FROM conversations WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to get conversation")?;

        row.map(Self::from_parts).transpose()
    }

    /// List conversations, most recently updated first
    pub async fn list(&self) -> Result<Vec<Conversation>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, title, messages, created_at, updated_at
             FROM conversations ORDER BY updated_at DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to collect conversations")?;

        rows.into_iter().map(Self::from_parts).collect()
    }

    /// Delete a conversation, returning whether it existed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.db.lock().await;
        let changed = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        tracing::debug!("Deleted conversation: {}", id);
        Ok(changed > 0)
    }

    fn from_parts(
        (id, title, messages, created_at, updated_at): (String, String, String, String, String),
    ) -> Result<Conversation> {
        let messages: Vec<ChatMessage> = serde_json::from_str(&messages)
            .with_context(|| format!("Corrupt transcript in conversation {}", id))?;
        Ok(Conversation {
            id,
            title,
            messages,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}
