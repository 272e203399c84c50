//! Error types for the plan, store, chat and storage seams

use thiserror::Error;

/// Errors raised while materializing, validating or editing a content plan
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Malformed plan JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Plan arguments must be a JSON object")]
    NotAnObject,

    #[error("Plan actions must be an array")]
    ActionsNotArray,

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Invalid action #{index}: {reason}")]
    InvalidAction { index: usize, reason: String },

    #[error("Unknown column {column} on table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Column {table}.{column} expects {expected}, got {got}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: &'static str,
        got: String,
    },

    #[error("Missing required column {table}.{column}")]
    MissingColumn { table: String, column: String },

    #[error("Action has no payload to edit")]
    NoPayload,
}

/// Errors raised by a content store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {table}/{id}")]
    NotFound { table: String, id: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Other(String),
}

/// Errors raised while talking to the chat endpoint
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat endpoint is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream read failed: {0}")]
    Stream(String),
}

/// Errors raised by a blob store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
