// Tests for plan execution

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use folio::db::{Database, HistoryRepository};
use folio::error::StoreError;
use folio::plan::{
    ActionOutcome, ContentAction, ContentPlan, ContentTable, ExecutionStatus, FailurePolicy,
    Invalidation, PlanExecutor, Progress,
};
use folio::store::{ContentStore, MemoryStore, Query, Record, SqliteStore};
use serde_json::{json, Map, Value};

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

/// Memory store that logs every write and refuses writes to one table
struct FlakyStore {
    inner: MemoryStore,
    broken: Option<ContentTable>,
    log: Mutex<Vec<String>>,
}

impl FlakyStore {
    fn new(broken: Option<ContentTable>) -> Self {
        Self {
            inner: MemoryStore::new(),
            broken,
            log: Mutex::new(Vec::new()),
        }
    }

    fn check(&self, op: &str, table: ContentTable) -> Result<(), StoreError> {
        self.log.lock().unwrap().push(format!("{} {}", op, table));
        if self.broken == Some(table) {
            return Err(StoreError::Other(format!("{} is read-only", table)));
        }
        Ok(())
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn insert(&self, table: ContentTable, fields: Map<String, Value>) -> Result<Record, StoreError> {
        self.check("insert", table)?;
        self.inner.insert(table, fields).await
    }

    async fn update(&self, table: ContentTable, id: &str, patch: Map<String, Value>) -> Result<Record, StoreError> {
        self.check("update", table)?;
        self.inner.update(table, id, patch).await
    }

    async fn delete(&self, table: ContentTable, id: &str) -> Result<Record, StoreError> {
        self.check("delete", table)?;
        self.inner.delete(table, id).await
    }

    async fn select_one(&self, table: ContentTable, id: &str) -> Result<Option<Record>, StoreError> {
        self.inner.select_one(table, id).await
    }

    async fn select_many(&self, table: ContentTable, query: &Query) -> Result<Vec<Record>, StoreError> {
        self.inner.select_many(table, query).await
    }

    async fn restore(&self, record: &Record) -> Result<(), StoreError> {
        self.check("restore", record.table)?;
        self.inner.restore(record).await
    }
}

async fn seed_project(store: &FlakyStore, title: &str) -> Record {
    store
        .inner
        .insert(ContentTable::Projects, fields(json!({"title": title})))
        .await
        .unwrap()
}

/// create project, retitle the seed, create a skill, create an article
fn four_step_plan(seed_id: &str) -> ContentPlan {
    ContentPlan {
        title: "Refresh".to_string(),
        summary: String::new(),
        actions: vec![
            ContentAction::create(ContentTable::Projects, fields(json!({"title": "New"})), "").unwrap(),
            ContentAction::update(ContentTable::Projects, seed_id, fields(json!({"title": "Renamed"})), "").unwrap(),
            ContentAction::create(ContentTable::Skills, fields(json!({"name": "Rust"})), "").unwrap(),
            ContentAction::create(ContentTable::Articles, fields(json!({"title": "Post"})), "").unwrap(),
        ],
    }
}

fn outcomes(results: &[folio::plan::ActionResult]) -> Vec<&'static str> {
    results
        .iter()
        .map(|r| match r.outcome {
            ActionOutcome::Succeeded { .. } => "succeeded",
            ActionOutcome::Failed { .. } => "failed",
            ActionOutcome::Skipped => "skipped",
            ActionOutcome::Compensated { .. } => "compensated",
        })
        .collect()
}

#[tokio::test]
async fn test_actions_run_in_order() {
    let store = Arc::new(FlakyStore::new(None));
    let seed = seed_project(&store, "Seed").await;
    let executor = PlanExecutor::new(store.clone());

    let report = executor.execute(&four_step_plan(&seed.id), None).await;

    assert!(report.success());
    assert_eq!(report.status, ExecutionStatus::Executed);
    assert_eq!(
        store.log(),
        vec!["insert projects", "update projects", "insert skills", "insert articles"]
    );
    assert_eq!(outcomes(&report.results), vec!["succeeded"; 4]);

    let seed_now = store.select_one(ContentTable::Projects, &seed.id).await.unwrap().unwrap();
    assert_eq!(seed_now.get("title"), Some(&json!("Renamed")));
    assert_eq!(store.inner.count(ContentTable::Projects).await, 2);
}

#[tokio::test]
async fn test_links_for_touched_records() {
    let store = Arc::new(FlakyStore::new(None));
    let seed = seed_project(&store, "Seed").await;
    let plan = ContentPlan {
        title: "Links".to_string(),
        summary: String::new(),
        actions: vec![
            ContentAction::update(ContentTable::Projects, seed.id.clone(), fields(json!({"featured": true})), "").unwrap(),
            ContentAction::create(ContentTable::LifePeriods, fields(json!({"title": "College"})), "").unwrap(),
            ContentAction::delete(ContentTable::Projects, seed.id.clone(), ""),
        ],
    };

    let report = PlanExecutor::new(store.clone()).execute(&plan, None).await;
    assert!(report.success());

    let urls: Vec<String> = report.links.iter().map(|l| l.url()).collect();
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[0], format!("/admin/projects?edit={}", seed.id));
    assert!(urls[1].starts_with("/admin/life-periods?edit="));
}

#[tokio::test]
async fn test_failure_compensates_by_default() {
    let store = Arc::new(FlakyStore::new(Some(ContentTable::Skills)));
    let seed = seed_project(&store, "Seed").await;
    let executor = PlanExecutor::new(store.clone());

    let report = executor.execute(&four_step_plan(&seed.id), None).await;

    assert!(!report.success());
    assert_eq!(report.status, ExecutionStatus::RolledBack);
    assert_eq!(
        outcomes(&report.results),
        vec!["compensated", "compensated", "failed", "skipped"]
    );
    assert!(report.links.is_empty());
    assert!(report.compensation_errors.is_empty());

    // undo runs newest first
    let log = store.log();
    assert_eq!(&log[3..], &["update projects", "delete projects"]);

    let seed_now = store.select_one(ContentTable::Projects, &seed.id).await.unwrap().unwrap();
    assert_eq!(seed_now.get("title"), Some(&json!("Seed")));
    assert_eq!(store.inner.count(ContentTable::Projects).await, 1);
    assert_eq!(store.inner.count(ContentTable::Articles).await, 0);
}

#[tokio::test]
async fn test_failure_with_halt_leaves_applied_actions() {
    let store = Arc::new(FlakyStore::new(Some(ContentTable::Skills)));
    let seed = seed_project(&store, "Seed").await;
    let executor = PlanExecutor::new(store.clone()).with_policy(FailurePolicy::Halt);

    let report = executor.execute(&four_step_plan(&seed.id), None).await;

    assert_eq!(report.status, ExecutionStatus::Partial);
    assert_eq!(
        outcomes(&report.results),
        vec!["succeeded", "succeeded", "failed", "skipped"]
    );
    assert_eq!(report.failures().count(), 1);
    assert_eq!(report.links.len(), 2);
    assert_eq!(store.inner.count(ContentTable::Projects).await, 2);
}

#[tokio::test]
async fn test_failure_with_continue_runs_the_rest() {
    let store = Arc::new(FlakyStore::new(Some(ContentTable::Skills)));
    let seed = seed_project(&store, "Seed").await;
    let executor = PlanExecutor::new(store.clone()).with_policy(FailurePolicy::Continue);

    let report = executor.execute(&four_step_plan(&seed.id), None).await;

    assert_eq!(report.status, ExecutionStatus::Partial);
    assert_eq!(
        outcomes(&report.results),
        vec!["succeeded", "succeeded", "failed", "succeeded"]
    );
    assert_eq!(store.inner.count(ContentTable::Articles).await, 1);
}

#[tokio::test]
async fn test_first_action_failing_applies_nothing() {
    let store = Arc::new(FlakyStore::new(None));
    let plan = ContentPlan {
        title: "Missing".to_string(),
        summary: String::new(),
        actions: vec![
            ContentAction::update(ContentTable::Leads, "nope", fields(json!({"status": "won"})), "").unwrap(),
            ContentAction::create(ContentTable::Leads, fields(json!({"name": "Ada"})), "").unwrap(),
        ],
    };

    let report = PlanExecutor::new(store.clone()).execute(&plan, None).await;
    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(outcomes(&report.results), vec!["failed", "skipped"]);
    match &report.results[0].outcome {
        ActionOutcome::Failed { error } => assert!(error.contains("nope"), "{}", error),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_deleted_row_restored_on_compensation() {
    let store = Arc::new(FlakyStore::new(Some(ContentTable::Skills)));
    let seed = seed_project(&store, "Keep me").await;
    let plan = ContentPlan {
        title: "Delete then fail".to_string(),
        summary: String::new(),
        actions: vec![
            ContentAction::delete(ContentTable::Projects, seed.id.clone(), ""),
            ContentAction::create(ContentTable::Skills, fields(json!({"name": "Go"})), "").unwrap(),
        ],
    };

    let report = PlanExecutor::new(store.clone()).execute(&plan, None).await;
    assert_eq!(report.status, ExecutionStatus::RolledBack);

    let restored = store.select_one(ContentTable::Projects, &seed.id).await.unwrap().unwrap();
    assert_eq!(restored, seed);
}

#[tokio::test]
async fn test_progress_reported_per_action() {
    let store = Arc::new(FlakyStore::new(None));
    let seed = seed_project(&store, "Seed").await;
    let executor = PlanExecutor::new(store.clone());

    let mut seen: Vec<Progress> = Vec::new();
    executor
        .execute_with_progress(&four_step_plan(&seed.id), None, |p| seen.push(p))
        .await;

    let percents: Vec<u8> = seen.iter().map(|p| p.percent()).collect();
    assert_eq!(percents, vec![25, 50, 75, 100]);
    assert!(seen.iter().all(|p| p.total == 4));
}

#[tokio::test]
async fn test_empty_plan_executes() {
    let store = Arc::new(FlakyStore::new(None));
    let plan = ContentPlan::from_tool_arguments(r#"{"title": "Nothing"}"#).unwrap();
    let report = PlanExecutor::new(store).execute(&plan, None).await;
    assert_eq!(report.status, ExecutionStatus::Executed);
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn test_invalidations_sent_for_touched_tables() {
    let store = Arc::new(FlakyStore::new(None));
    let seed = seed_project(&store, "Seed").await;
    let executor = PlanExecutor::new(store.clone());
    let mut rx = executor.subscribe();

    executor.execute(&four_step_plan(&seed.id), None).await;

    let mut received = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        received.push(notice);
    }
    assert!(received.contains(&Invalidation::Table(ContentTable::Projects)));
    assert!(received.contains(&Invalidation::Table(ContentTable::Skills)));
    assert!(received.contains(&Invalidation::Table(ContentTable::Articles)));
    assert!(received.contains(&Invalidation::ChangeHistory));
    // nothing recorded without a history repository
    assert!(!received.contains(&Invalidation::PlanHistory));
}

#[tokio::test]
async fn test_execution_recorded_in_history() {
    let db = Database::in_memory().unwrap();
    let store = Arc::new(SqliteStore::new(db.clone()));
    let history = HistoryRepository::new(db.clone());
    let seed = store
        .insert(ContentTable::Projects, fields(json!({"title": "Seed"})))
        .await
        .unwrap();

    let executor = PlanExecutor::new(store.clone()).with_history(HistoryRepository::new(db));
    let mut rx = executor.subscribe();
    let plan = ContentPlan {
        title: "Tracked".to_string(),
        summary: "Two steps".to_string(),
        actions: vec![
            ContentAction::update(ContentTable::Projects, seed.id.clone(), fields(json!({"title": "Tracked"})), "").unwrap(),
            ContentAction::create(ContentTable::Skills, fields(json!({"name": "SQL"})), "").unwrap(),
        ],
    };

    let report = executor.execute(&plan, Some("conv-1")).await;
    assert!(report.success());
    let plan_id = report.plan_id.clone().expect("history id");

    let executions = history.list_executions(10).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].id, plan_id);
    assert_eq!(executions[0].status, ExecutionStatus::Executed);
    assert_eq!(executions[0].conversation_id.as_deref(), Some("conv-1"));
    assert_eq!(executions[0].results.len(), 2);

    let changes = history
        .list_changes(10, Some((ContentTable::Projects, seed.id.as_str())))
        .await
        .unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].plan_id.as_deref(), Some(plan_id.as_str()));
    assert_eq!(changes[0].change.before.as_ref().unwrap()["title"], json!("Seed"));
    assert_eq!(changes[0].change.after.as_ref().unwrap()["title"], json!("Tracked"));

    let mut received = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        received.push(notice);
    }
    assert!(received.contains(&Invalidation::PlanHistory));
}

#[tokio::test]
async fn test_create_then_update_against_known_record() {
    let store = Arc::new(FlakyStore::new(None));
    let now = chrono::Utc::now();
    store
        .inner
        .restore(&Record {
            id: "X".to_string(),
            table: ContentTable::Articles,
            fields: fields(json!({"title": "Old"})),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    let plan = ContentPlan::from_tool_arguments(
        r#"{"title": "Articles", "actions": [
            {"type": "create", "table": "articles", "data": {"title": "A"}},
            {"type": "update", "table": "articles", "record_id": "X", "data": {"title": "B"}}
        ]}"#,
    )
    .unwrap();

    let report = PlanExecutor::new(store.clone()).execute(&plan, None).await;
    assert!(report.success());
    assert_eq!(store.log(), vec!["insert articles", "update articles"]);

    let x = store.select_one(ContentTable::Articles, "X").await.unwrap().unwrap();
    assert_eq!(x.get("title"), Some(&json!("B")));
}
