//! Blob storage for media uploads

pub mod fs;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StorageError;

pub use fs::FsBlobStore;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BlobEntry {
    pub name: String,
    /// Path inside the bucket
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Storage collaborator used by media uploads and the media library
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `bucket/path`, returning the storage path
    async fn upload(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// Public URL for an object
    fn public_url(&self, bucket: &str, path: &str) -> Result<String, StorageError>;

    /// Entries directly under a prefix, sorted by name
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<BlobEntry>, StorageError>;
}
