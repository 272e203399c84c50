//! Local filesystem blob store

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{BlobEntry, BlobStore};
use crate::error::StorageError;

/// Stores objects as files under `<root>/<bucket>/<path>`
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a bucket-relative path, refusing anything that escapes the bucket
    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(bucket_dir(bucket)?).join(clean_relative(path)?))
    }
}

/// A bucket is exactly one plain path component
fn bucket_dir(bucket: &str) -> Result<PathBuf, StorageError> {
    let dir = clean_relative(bucket)?;
    if dir.as_os_str().is_empty() || dir.components().count() != 1 {
        return Err(StorageError::InvalidPath(format!("bad bucket name: {}", bucket)));
    }
    Ok(dir)
}

fn clean_relative(path: &str) -> Result<PathBuf, StorageError> {
    let mut clean = PathBuf::new();
    for component in Path::new(path.trim_matches('/')).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(StorageError::InvalidPath(path.to_string())),
        }
    }
    Ok(clean)
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let relative = clean_relative(path)?;
        if relative.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }

        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;

        let stored = format!("{}/{}", bucket, relative.to_string_lossy().replace('\\', "/"));
        debug!("Uploaded {} bytes to {}", bytes.len(), stored);
        Ok(stored)
    }

    fn public_url(&self, bucket: &str, path: &str) -> Result<String, StorageError> {
        let bucket = bucket_dir(bucket)?;
        let relative = clean_relative(path)?;
        Ok(format!(
            "{}/{}/{}",
            self.public_base_url.trim_end_matches('/'),
            bucket.to_string_lossy(),
            relative.to_string_lossy().replace('\\', "/")
        ))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<BlobEntry>, StorageError> {
        let dir = self.resolve(bucket, prefix)?;
        let base = clean_relative(prefix)?;

        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().to_string();
            entries.push(BlobEntry {
                path: base.join(&name).to_string_lossy().replace('\\', "/"),
                name,
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
