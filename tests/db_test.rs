// Tests for Folio persistence

use folio::chat::{ChatMessage, Role};
use folio::db::repositories::conversation::derive_title;
use folio::db::repositories::saved_plan::SavedPlanStatus;
use folio::db::{ConversationRepository, Database, SavedPlanRepository};
use folio::plan::{ContentAction, ContentPlan, ContentTable};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(db_path).unwrap();
    (db, temp_dir)
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

fn sample_plan(title: &str) -> ContentPlan {
    ContentPlan {
        title: title.to_string(),
        summary: "Adds a certification".to_string(),
        actions: vec![
            ContentAction::create(
                ContentTable::Certifications,
                fields(json!({"name": "AWS", "issued_at": "2023-05-01"})),
                "New cert",
            )
            .unwrap(),
            ContentAction::delete(ContentTable::Certifications, "c-old", "Expired"),
        ],
    }
}

#[tokio::test]
async fn test_database_initialization() {
    let (db, _temp) = create_test_db();
    assert!(db.path().contains("test.db"));
    db.health_check().await.unwrap();
}

#[tokio::test]
async fn test_reopen_keeps_data() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("folio.db");

    let id = {
        let db = Database::new(&db_path).unwrap();
        let repo = ConversationRepository::new(db);
        repo.upsert(None, &[ChatMessage::user("hello")]).await.unwrap().id
    };

    let db = Database::new(&db_path).unwrap();
    let repo = ConversationRepository::new(db);
    assert!(repo.get(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_conversation_upsert_keeps_one_row() {
    let (db, _temp) = create_test_db();
    let repo = ConversationRepository::new(db);

    let mut messages = vec![ChatMessage::user("Add my new painting"), ChatMessage::assistant("Sure.")];
    let first = repo.upsert(None, &messages).await.unwrap();
    assert_eq!(first.title, "Add my new painting");

    messages.push(ChatMessage::user("Also feature it"));
    messages.push(ChatMessage::assistant("Done."));
    let second = repo.upsert(Some(&first.id), &messages).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.title, first.title);

    let all = repo.list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].messages.len(), 4);
    assert_eq!(all[0].messages[3].role, Role::Assistant);
    assert_eq!(all[0].messages[3].content, "Done.");
}

#[tokio::test]
async fn test_conversation_upsert_with_unknown_id_inserts() {
    let (db, _temp) = create_test_db();
    let repo = ConversationRepository::new(db);

    let conversation = repo
        .upsert(Some("client-chosen"), &[ChatMessage::user("hi")])
        .await
        .unwrap();
    assert_eq!(conversation.id, "client-chosen");
    assert!(repo.get("client-chosen").await.unwrap().is_some());
}

#[tokio::test]
async fn test_conversation_list_and_delete() {
    let (db, _temp) = create_test_db();
    let repo = ConversationRepository::new(db);

    let a = repo.upsert(None, &[ChatMessage::user("first")]).await.unwrap();
    let b = repo.upsert(None, &[ChatMessage::user("second")]).await.unwrap();
    repo.upsert(Some(&a.id), &[ChatMessage::user("first"), ChatMessage::assistant("again")])
        .await
        .unwrap();

    let listed = repo.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, a.id);

    assert!(repo.delete(&b.id).await.unwrap());
    assert!(!repo.delete(&b.id).await.unwrap());
    assert!(repo.get(&b.id).await.unwrap().is_none());
    assert_eq!(repo.list().await.unwrap().len(), 1);
}

#[test]
fn test_title_derivation() {
    let long = "x".repeat(100);
    assert_eq!(derive_title(&[ChatMessage::user(long)]).chars().count(), 60);
    assert_eq!(derive_title(&[ChatMessage::assistant("hi")]), "New conversation");
    assert_eq!(derive_title(&[]), "New conversation");
    assert_eq!(
        derive_title(&[ChatMessage::user("  "), ChatMessage::user(" Portfolio ideas ")]),
        "Portfolio ideas"
    );
    assert_eq!(derive_title(&[ChatMessage::user("ünïcödé ".repeat(10))]).chars().count(), 60);
}

#[tokio::test]
async fn test_saved_plan_round_trip() {
    let (db, _temp) = create_test_db();
    let repo = SavedPlanRepository::new(db);

    let plan = sample_plan("Certs");
    let saved = repo.save(&plan, Some("conv-1")).await.unwrap();
    assert_eq!(saved.status, SavedPlanStatus::Saved);

    let loaded = repo.get(&saved.id).await.unwrap().unwrap();
    assert_eq!(loaded.title, "Certs");
    assert_eq!(loaded.description, "Adds a certification");
    assert_eq!(loaded.conversation_id.as_deref(), Some("conv-1"));
    assert_eq!(loaded.to_plan(), plan);
}

#[tokio::test]
async fn test_saved_plan_edit_and_execute() {
    let (db, _temp) = create_test_db();
    let repo = SavedPlanRepository::new(db);
    let saved = repo.save(&sample_plan("Certs"), None).await.unwrap();

    let mut plan = saved.to_plan();
    plan.actions[0].set_field("issuer", "Amazon").unwrap();
    repo.update_actions(&saved.id, &plan.actions).await.unwrap();

    let loaded = repo.get(&saved.id).await.unwrap().unwrap();
    assert_eq!(loaded.actions[0].data().unwrap()["issuer"], json!("Amazon"));

    repo.mark_executed(&saved.id).await.unwrap();
    assert!(repo.list(Some(SavedPlanStatus::Saved)).await.unwrap().is_empty());
    assert_eq!(repo.list(Some(SavedPlanStatus::Executed)).await.unwrap().len(), 1);

    assert!(repo.update_actions("missing", &plan.actions).await.is_err());
}

#[tokio::test]
async fn test_saved_plan_delete_only_touches_target() {
    let (db, _temp) = create_test_db();
    let repo = SavedPlanRepository::new(db.clone());
    let conversations = ConversationRepository::new(db);

    let conv = conversations
        .upsert(
            None,
            &[ChatMessage::user("Add my AWS cert"), ChatMessage::assistant("Here is a plan.")],
        )
        .await
        .unwrap();

    let keep = repo.save(&sample_plan("Keep"), Some(&conv.id)).await.unwrap();
    let drop = repo.save(&sample_plan("Drop"), Some(&conv.id)).await.unwrap();

    assert!(repo.delete(&drop.id).await.unwrap());
    assert!(!repo.delete(&drop.id).await.unwrap());

    let remaining = repo.list(None).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, keep.id);

    // the conversation the plans came from is left as it was
    let stored = conversations.get(&conv.id).await.unwrap().unwrap();
    assert_eq!(stored.title, conv.title);
    assert_eq!(stored.updated_at, conv.updated_at);
    let transcript: Vec<(Role, String)> = stored
        .messages
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect();
    assert_eq!(
        transcript,
        vec![
            (Role::User, "Add my AWS cert".to_string()),
            (Role::Assistant, "Here is a plan.".to_string()),
        ]
    );
    assert_eq!(conversations.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mark_executed_missing_plan_fails() {
    let (db, _temp) = create_test_db();
    let repo = SavedPlanRepository::new(db);
    assert!(repo.mark_executed("missing").await.is_err());
}

#[tokio::test]
async fn test_corrupt_saved_plan_status_is_an_error() {
    let (db, _temp) = create_test_db();
    let repo = SavedPlanRepository::new(db.clone());
    let saved = repo.save(&sample_plan("Certs"), None).await.unwrap();

    db.lock()
        .await
        .execute(
            "UPDATE saved_plans SET status = 'archived' WHERE id = ?1",
            [&saved.id],
        )
        .unwrap();

    assert!(repo.get(&saved.id).await.is_err());
}

#[test]
fn test_saved_plan_status_strings() {
    assert_eq!(SavedPlanStatus::from_str("executed").unwrap(), SavedPlanStatus::Executed);
    assert_eq!(SavedPlanStatus::Saved.as_str(), "saved");
    assert!(SavedPlanStatus::from_str("archived").is_err());
}
