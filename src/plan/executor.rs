//! Sequential plan execution with per-action results and compensation

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::model::{ActionKind, ContentAction, ContentPlan};
use super::table::ContentTable;
use crate::db::repositories::history::{Change, ChangeOperation, HistoryRepository};
use crate::error::StoreError;
use crate::store::{ContentStore, Record};

/// What to do once an action fails
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop, then undo already-applied actions in reverse order
    #[default]
    Compensate,
    /// Stop and leave applied actions in place
    Halt,
    /// Keep going with the remaining actions
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded { record_id: String },
    Failed { error: String },
    Skipped,
    /// Applied, then undone after a later failure
    Compensated { record_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub index: usize,
    pub kind: ActionKind,
    pub table: ContentTable,
    pub outcome: ActionOutcome,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every action succeeded
    Executed,
    /// Some actions are applied, some are not
    Partial,
    /// Nothing was applied
    Failed,
    /// Applied actions were all undone after a failure
    RolledBack,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Executed => "executed",
            ExecutionStatus::Partial => "partial",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::RolledBack => "rolled_back",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "executed" => Ok(ExecutionStatus::Executed),
            "partial" => Ok(ExecutionStatus::Partial),
            "failed" => Ok(ExecutionStatus::Failed),
            "rolled_back" => Ok(ExecutionStatus::RolledBack),
            _ => anyhow::bail!("Unknown execution status: {}", s),
        }
    }
}

/// Deep link into the admin editor for a record touched by a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorLink {
    pub table: ContentTable,
    pub id: String,
    pub kind: ActionKind,
}

impl EditorLink {
    pub fn url(&self) -> String {
        format!("{}?edit={}", self.table.editor_route(), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total) as u8
    }
}

/// Views that must refresh after an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    ChangeHistory,
    PlanHistory,
    Table(ContentTable),
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// Plan history id, when history is recorded
    pub plan_id: Option<String>,
    pub status: ExecutionStatus,
    pub results: Vec<ActionResult>,
    pub links: Vec<EditorLink>,
    pub compensation_errors: Vec<String>,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        self.status == ExecutionStatus::Executed
    }

    pub fn count(&self, pred: impl Fn(&ActionOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActionResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ActionOutcome::Failed { .. }))
    }
}

enum Undo {
    Delete { table: ContentTable, id: String },
    Restore { table: ContentTable, id: String, prior: Map<String, Value> },
    Reinsert(Record),
}

struct Applied {
    index: usize,
    record_id: String,
    undo: Undo,
}

pub struct PlanExecutor {
    store: Arc<dyn ContentStore>,
    history: Option<HistoryRepository>,
    policy: FailurePolicy,
    notifier: broadcast::Sender<Invalidation>,
}

impl PlanExecutor {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        let (notifier, _) = broadcast::channel(64);
        Self {
            store,
            history: None,
            policy: FailurePolicy::default(),
            notifier,
        }
    }

    pub fn with_history(mut self, history: HistoryRepository) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Listen for views to refresh after executions
    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.notifier.subscribe()
    }

    pub async fn execute(&self, plan: &ContentPlan, conversation_id: Option<&str>) -> ExecutionReport {
        self.execute_with_progress(plan, conversation_id, |_| {}).await
    }

    /// Run every action in order, reporting progress after each one
    pub async fn execute_with_progress<F>(
        &self,
        plan: &ContentPlan,
        conversation_id: Option<&str>,
        mut on_progress: F,
    ) -> ExecutionReport
    where
        F: FnMut(Progress),
    {
        let total = plan.actions.len();
        info!("Executing plan \"{}\" ({} actions)", plan.title, total);

        let mut results = Vec::with_capacity(total);
        let mut applied: Vec<Applied> = Vec::new();
        let mut changes: Vec<Change> = Vec::new();
        let mut failed = false;

        for (index, action) in plan.actions.iter().enumerate() {
            let outcome = if failed && self.policy != FailurePolicy::Continue {
                ActionOutcome::Skipped
            } else {
                match self.apply(index, action).await {
                    Ok((step, change)) => {
                        let record_id = step.record_id.clone();
                        changes.push(change);
                        applied.push(step);
                        ActionOutcome::Succeeded { record_id }
                    }
                    Err(e) => {
                        warn!(
                            "Action #{} ({} {}) failed: {}",
                            index + 1,
                            action.kind().as_str(),
                            action.table(),
                            e
                        );
                        failed = true;
                        ActionOutcome::Failed { error: e.to_string() }
                    }
                }
            };

            results.push(ActionResult {
                index,
                kind: action.kind(),
                table: action.table(),
                outcome,
            });
            on_progress(Progress {
                completed: index + 1,
                total,
            });
        }

        let mut compensation_errors = Vec::new();
        if failed && self.policy == FailurePolicy::Compensate {
            for step in applied.iter().rev() {
                match self.revert(&step.undo).await {
                    Ok(change) => {
                        changes.push(change);
                        results[step.index].outcome = ActionOutcome::Compensated {
                            record_id: step.record_id.clone(),
                        };
                    }
                    Err(e) => {
                        warn!("Compensation for action #{} failed: {}", step.index + 1, e);
                        compensation_errors.push(format!("action #{}: {}", step.index + 1, e));
                    }
                }
            }
        }

        let status = Self::status(failed, &results, &compensation_errors);
        let links = results
            .iter()
            .filter(|r| r.kind != ActionKind::Delete)
            .filter_map(|r| match &r.outcome {
                ActionOutcome::Succeeded { record_id } => Some(EditorLink {
                    table: r.table,
                    id: record_id.clone(),
                    kind: r.kind,
                }),
                _ => None,
            })
            .collect();

        let plan_id = match &self.history {
            Some(history) => match history
                .record_execution(plan, conversation_id, status, &results, &changes)
                .await
            {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Failed to record plan history: {:#}", e);
                    None
                }
            },
            None => None,
        };

        self.notify(&changes, plan_id.is_some());
        info!("Plan \"{}\" finished: {}", plan.title, status.as_str());

        ExecutionReport {
            plan_id,
            status,
            results,
            links,
            compensation_errors,
        }
    }

    async fn apply(&self, index: usize, action: &ContentAction) -> Result<(Applied, Change), StoreError> {
        let table = action.table();
        let payload = action.data().cloned().unwrap_or_default();

        match action.kind() {
            ActionKind::Create => {
                let record = self.store.insert(table, payload).await?;
                debug!("Created {}/{}", table, record.id);
                Ok((
                    Applied {
                        index,
                        record_id: record.id.clone(),
                        undo: Undo::Delete {
                            table,
                            id: record.id.clone(),
                        },
                    },
                    Change {
                        table,
                        record_id: record.id.clone(),
                        operation: ChangeOperation::Create,
                        before: None,
                        after: Some(record.to_row()),
                    },
                ))
            }
            ActionKind::Update => {
                let id = required_id(action)?;
                let before = self
                    .store
                    .select_one(table, id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        table: table.as_str().to_string(),
                        id: id.to_string(),
                    })?;
                let prior = payload
                    .keys()
                    .map(|k| (k.clone(), before.fields.get(k).cloned().unwrap_or(Value::Null)))
                    .collect();
                let after = self.store.update(table, id, payload).await?;
                debug!("Updated {}/{}", table, id);
                Ok((
                    Applied {
                        index,
                        record_id: id.to_string(),
                        undo: Undo::Restore {
                            table,
                            id: id.to_string(),
                            prior,
                        },
                    },
                    Change {
                        table,
                        record_id: id.to_string(),
                        operation: ChangeOperation::Update,
                        before: Some(before.to_row()),
                        after: Some(after.to_row()),
                    },
                ))
            }
            ActionKind::Delete => {
                let id = required_id(action)?;
                let removed = self.store.delete(table, id).await?;
                debug!("Deleted {}/{}", table, id);
                let before = removed.to_row();
                Ok((
                    Applied {
                        index,
                        record_id: id.to_string(),
                        undo: Undo::Reinsert(removed),
                    },
                    Change {
                        table,
                        record_id: id.to_string(),
                        operation: ChangeOperation::Delete,
                        before: Some(before),
                        after: None,
                    },
                ))
            }
        }
    }

    async fn revert(&self, undo: &Undo) -> Result<Change, StoreError> {
        match undo {
            Undo::Delete { table, id } => {
                let removed = self.store.delete(*table, id).await?;
                Ok(Change {
                    table: *table,
                    record_id: id.clone(),
                    operation: ChangeOperation::Revert,
                    before: Some(removed.to_row()),
                    after: None,
                })
            }
            Undo::Restore { table, id, prior } => {
                let restored = self.store.update(*table, id, prior.clone()).await?;
                Ok(Change {
                    table: *table,
                    record_id: id.clone(),
                    operation: ChangeOperation::Revert,
                    before: None,
                    after: Some(restored.to_row()),
                })
            }
            Undo::Reinsert(record) => {
                self.store.restore(record).await?;
                Ok(Change {
                    table: record.table,
                    record_id: record.id.clone(),
                    operation: ChangeOperation::Revert,
                    before: None,
                    after: Some(record.to_row()),
                })
            }
        }
    }

    fn status(failed: bool, results: &[ActionResult], compensation_errors: &[String]) -> ExecutionStatus {
        if !failed {
            return ExecutionStatus::Executed;
        }
        let still_applied = results
            .iter()
            .any(|r| matches!(r.outcome, ActionOutcome::Succeeded { .. }));
        let compensated = results
            .iter()
            .any(|r| matches!(r.outcome, ActionOutcome::Compensated { .. }));

        if still_applied || !compensation_errors.is_empty() {
            ExecutionStatus::Partial
        } else if compensated {
            ExecutionStatus::RolledBack
        } else {
            ExecutionStatus::Failed
        }
    }

    fn notify(&self, changes: &[Change], recorded: bool) {
        // send only fails when nobody is subscribed
        let tables: BTreeSet<ContentTable> = changes.iter().map(|c| c.table).collect();
        for table in tables {
            let _ = self.notifier.send(Invalidation::Table(table));
        }
        if !changes.is_empty() {
            let _ = self.notifier.send(Invalidation::ChangeHistory);
        }
        if recorded {
            let _ = self.notifier.send(Invalidation::PlanHistory);
        }
    }
}

fn required_id(action: &ContentAction) -> Result<&str, StoreError> {
    action
        .record_id()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} action without record id", action.kind().as_str())))
}
