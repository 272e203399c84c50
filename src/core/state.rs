//! Application state

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::db::{ConversationRepository, Database, HistoryRepository, SavedPlanRepository};
use crate::plan::PlanExecutor;
use crate::storage::FsBlobStore;
use crate::store::SqliteStore;

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub store: Arc<SqliteStore>,
    pub blobs: FsBlobStore,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let blobs = FsBlobStore::new(
            config.resolve_storage_root()?,
            config.storage.public_base_url.clone(),
        );
        Ok(Self {
            store: Arc::new(SqliteStore::new(db.clone())),
            blobs,
            config,
            db,
        })
    }

    pub fn conversations(&self) -> ConversationRepository {
        ConversationRepository::new(self.db.clone())
    }

    pub fn saved_plans(&self) -> SavedPlanRepository {
        SavedPlanRepository::new(self.db.clone())
    }

    pub fn history(&self) -> HistoryRepository {
        HistoryRepository::new(self.db.clone())
    }

    /// Executor over the SQLite store, recording history, using the configured failure policy
    pub fn executor(&self) -> PlanExecutor {
        PlanExecutor::new(self.store.clone())
            .with_history(self.history())
            .with_policy(self.config.execution.on_failure)
    }
}
