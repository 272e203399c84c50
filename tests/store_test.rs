// Tests for the content stores

use folio::db::Database;
use folio::error::{PlanError, StoreError};
use folio::plan::{ContentAction, ContentTable};
use folio::store::{ContentStore, MemoryStore, Query, SqliteStore};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

fn create_test_store() -> (SqliteStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(temp_dir.path().join("content.db")).unwrap();
    (SqliteStore::new(db), temp_dir)
}

async fn seed_artwork(store: &dyn ContentStore) {
    for (title, year, for_sale) in [("Dawn", 2019, true), ("Dusk", 2021, false), ("Noon", 2020, true)] {
        store
            .insert(
                ContentTable::Artwork,
                fields(json!({"title": title, "year": year, "for_sale": for_sale})),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_sqlite_insert_keeps_value_kinds() {
    let (store, _temp) = create_test_store();

    let record = store
        .insert(
            ContentTable::Projects,
            fields(json!({
                "title": "Folio",
                "tags": ["rust", "cms"],
                "featured": true,
                "sort_order": 3
            })),
        )
        .await
        .unwrap();

    assert!(!record.id.is_empty());
    assert_eq!(record.get("title"), Some(&json!("Folio")));
    assert_eq!(record.get("tags"), Some(&json!(["rust", "cms"])));
    assert_eq!(record.get("featured"), Some(&json!(true)));
    assert_eq!(record.get("sort_order"), Some(&json!(3)));
    assert_eq!(record.get("description"), None);
    assert_eq!(record.label(), "Folio");

    let product = store
        .insert(ContentTable::Products, fields(json!({"name": "Print", "price": 25})))
        .await
        .unwrap();
    assert_eq!(product.get("price").and_then(Value::as_f64), Some(25.0));
}

#[tokio::test]
async fn test_sqlite_insert_validates_payload() {
    let (store, _temp) = create_test_store();

    let missing = store
        .insert(ContentTable::Projects, fields(json!({"description": "no title"})))
        .await;
    assert!(matches!(missing, Err(StoreError::InvalidQuery(_))));

    let unknown = store
        .insert(ContentTable::Projects, fields(json!({"title": "x", "; DROP TABLE projects": 1})))
        .await;
    assert!(matches!(unknown, Err(StoreError::InvalidQuery(_))));
}

#[tokio::test]
async fn test_sqlite_update_and_delete() {
    let (store, _temp) = create_test_store();
    let record = store
        .insert(ContentTable::Skills, fields(json!({"name": "Rust", "proficiency": 3})))
        .await
        .unwrap();

    let updated = store
        .update(ContentTable::Skills, &record.id, fields(json!({"proficiency": 5, "category": null})))
        .await
        .unwrap();
    assert_eq!(updated.get("proficiency"), Some(&json!(5)));
    assert_eq!(updated.get("name"), Some(&json!("Rust")));
    assert!(updated.updated_at >= record.updated_at);

    let missing = store
        .update(ContentTable::Skills, "nope", fields(json!({"name": "Go"})))
        .await;
    assert!(matches!(missing, Err(StoreError::NotFound { .. })));

    let removed = store.delete(ContentTable::Skills, &record.id).await.unwrap();
    assert_eq!(removed.id, record.id);
    assert!(store.select_one(ContentTable::Skills, &record.id).await.unwrap().is_none());
    assert!(matches!(
        store.delete(ContentTable::Skills, &record.id).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_sqlite_restore_keeps_id_and_timestamps() {
    let (store, _temp) = create_test_store();
    let record = store
        .insert(ContentTable::Leads, fields(json!({"name": "Ada", "status": "new"})))
        .await
        .unwrap();

    let removed = store.delete(ContentTable::Leads, &record.id).await.unwrap();
    store.restore(&removed).await.unwrap();

    let back = store.select_one(ContentTable::Leads, &record.id).await.unwrap().unwrap();
    assert_eq!(back, record);
    assert!(store.restore(&removed).await.is_err());
}

#[tokio::test]
async fn test_sqlite_query_filters_order_limit() {
    let (store, _temp) = create_test_store();
    seed_artwork(&store).await;

    let all = store
        .select_many(ContentTable::Artwork, &Query::new())
        .await
        .unwrap();
    let titles: Vec<String> = all.iter().map(|r| r.label()).collect();
    assert_eq!(titles, vec!["Dawn", "Dusk", "Noon"]);

    let for_sale = store
        .select_many(
            ContentTable::Artwork,
            &Query::new().eq("for_sale", true).order_by("year", true),
        )
        .await
        .unwrap();
    let titles: Vec<String> = for_sale.iter().map(|r| r.label()).collect();
    assert_eq!(titles, vec!["Noon", "Dawn"]);

    let newest = store
        .select_many(ContentTable::Artwork, &Query::new().order_by("year", true).limit(1))
        .await
        .unwrap();
    assert_eq!(newest.len(), 1);
    assert_eq!(newest[0].label(), "Dusk");

    let no_medium = store
        .select_many(ContentTable::Artwork, &Query::new().eq("medium", Value::Null))
        .await
        .unwrap();
    assert_eq!(no_medium.len(), 3);
}

#[tokio::test]
async fn test_query_rejects_unknown_columns() {
    let (store, _temp) = create_test_store();
    let bad_filter = store
        .select_many(ContentTable::Artwork, &Query::new().eq("1=1 OR title", "x"))
        .await;
    assert!(matches!(bad_filter, Err(StoreError::InvalidQuery(_))));

    let bad_order = store
        .select_many(ContentTable::Artwork, &Query::new().order_by("password", false))
        .await;
    assert!(matches!(bad_order, Err(StoreError::InvalidQuery(_))));
}

#[tokio::test]
async fn test_memory_store_matches_sqlite_queries() {
    let store = MemoryStore::new();
    seed_artwork(&store).await;

    let for_sale = store
        .select_many(
            ContentTable::Artwork,
            &Query::new().eq("for_sale", true).order_by("year", true),
        )
        .await
        .unwrap();
    let titles: Vec<String> = for_sale.iter().map(|r| r.label()).collect();
    assert_eq!(titles, vec!["Noon", "Dawn"]);

    let by_year = store
        .select_many(ContentTable::Artwork, &Query::new().eq("year", 2021))
        .await
        .unwrap();
    assert_eq!(by_year.len(), 1);
    assert_eq!(store.count(ContentTable::Artwork).await, 3);
}

#[tokio::test]
async fn test_memory_store_delete_and_restore() {
    let store = MemoryStore::new();
    let record = store
        .insert(ContentTable::Favorites, fields(json!({"title": "Book", "category": "reading"})))
        .await
        .unwrap();

    let removed = store.delete(ContentTable::Favorites, &record.id).await.unwrap();
    assert_eq!(store.count(ContentTable::Favorites).await, 0);

    store.restore(&removed).await.unwrap();
    assert_eq!(
        store.select_one(ContentTable::Favorites, &record.id).await.unwrap(),
        Some(record)
    );
    assert!(store.restore(&removed).await.is_err());
}

#[tokio::test]
async fn test_integer_out_of_range_rejected() {
    let (store, _temp) = create_test_store();

    let too_big = fields(json!({"title": "A", "year": u64::MAX}));
    let inserted = store.insert(ContentTable::Artwork, too_big.clone()).await;
    assert!(matches!(inserted, Err(StoreError::InvalidQuery(_))));
    assert!(store
        .select_many(ContentTable::Artwork, &Query::new())
        .await
        .unwrap()
        .is_empty());

    assert!(matches!(
        ContentAction::create(ContentTable::Artwork, too_big, "Too big"),
        Err(PlanError::TypeMismatch { .. })
    ));

    let max = store
        .insert(ContentTable::Artwork, fields(json!({"title": "B", "year": i64::MAX})))
        .await
        .unwrap();
    assert_eq!(max.get("year"), Some(&json!(i64::MAX)));
}

#[tokio::test]
async fn test_descending_ties_match_across_stores() {
    let (sqlite, _temp) = create_test_store();
    let memory = MemoryStore::new();

    for title in ["First", "Second", "Third"] {
        for store in [&sqlite as &dyn ContentStore, &memory as &dyn ContentStore] {
            store
                .insert(ContentTable::Artwork, fields(json!({"title": title, "year": 2020})))
                .await
                .unwrap();
        }
    }

    let query = Query::new().order_by("year", true);
    let from_sqlite: Vec<String> = sqlite
        .select_many(ContentTable::Artwork, &query)
        .await
        .unwrap()
        .iter()
        .map(|r| r.label())
        .collect();
    let from_memory: Vec<String> = memory
        .select_many(ContentTable::Artwork, &query)
        .await
        .unwrap()
        .iter()
        .map(|r| r.label())
        .collect();

    assert_eq!(from_sqlite, vec!["Third", "Second", "First"]);
    assert_eq!(from_memory, from_sqlite);

    let ascending: Vec<String> = memory
        .select_many(ContentTable::Artwork, &Query::new().order_by("year", false))
        .await
        .unwrap()
        .iter()
        .map(|r| r.label())
        .collect();
    assert_eq!(ascending, vec!["First", "Second", "Third"]);
}
