use anyhow::Result;
use trolley::{
    apply_migrations, open_memory_pool, LegacyImporter, MigrationOutcome, ShopCategory,
    ShoppingRepository, SqliteRepository, StoreHandle,
};

const LISTS_JSON: &str = r#"[
    {"id":"l1","name":"groceries","isActive":true,"createdAt":100,"updatedAt":100},
    {"id":"l2","name":"hardware","isActive":false,"createdAt":200,"updatedAt":200}
]"#;

const SHOPS_JSON: &str = r#"[
    {"id":"s1","name":"corner market","category":"SUPERMARKET","isFavorite":true,
     "location":{"latitude":51.5,"longitude":-0.12},"createdAt":100,"updatedAt":100},
    {"id":"s2","name":"late night","category":"CONVENIENCE_STORE","createdAt":150,"updatedAt":150}
]"#;

const ITEMS_JSON: &str = r#"[
    {"id":"i1","listId":"l1","name":"milk","quantity":2,"priority":"HIGH",
     "category":"FOOD","shopId":"s1","createdAt":110,"updatedAt":110},
    {"id":"i2","listId":"l1","name":"bread","isCompleted":true,"completedAt":130,
     "createdAt":120,"updatedAt":130},
    {"id":"i3","listId":"l2","name":"screws","createdAt":210,"updatedAt":210}
]"#;

const TEMPLATES_JSON: &str = r#"[
    {"id":"t1","name":"milk","category":"FOOD","useCount":7,"lastUsedAt":500,"createdAt":90}
]"#;

fn seeded_store() -> StoreHandle {
    let store = StoreHandle::in_memory();
    store.set("lists", LISTS_JSON);
    store.set("shops", SHOPS_JSON);
    store.set("items", ITEMS_JSON);
    store.set("templates", TEMPLATES_JSON);
    store
}

#[tokio::test]
async fn migrates_every_collection_and_sets_the_flag() -> Result<()> {
    let pool = open_memory_pool().await?;
    apply_migrations(&pool).await?;
    let store = seeded_store();
    let importer = LegacyImporter::new(store.clone());

    assert_eq!(importer.run(&pool).await, MigrationOutcome::Migrated);

    let repo = SqliteRepository::new(pool);
    assert_eq!(repo.all_lists().current().await?.len(), 2);
    assert_eq!(repo.all_items().current().await?.len(), 3);
    assert_eq!(repo.all_templates().current().await?.len(), 1);

    // Legacy shop category tokens fold into the current ones.
    let shops = repo.all_shops().current().await?;
    assert_eq!(shops.len(), 2);
    assert_eq!(shops[0].category, ShopCategory::Grocery);
    assert_eq!(shops[1].category, ShopCategory::Convenience);
    assert!(shops[0].is_favorite);
    assert_eq!(shops[0].location.map(|l| l.latitude), Some(51.5));

    let items = repo.items_by_list("l1").current().await?;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "i1");
    assert_eq!(items[0].shop_id.as_deref(), Some("s1"));
    assert!(items[1].is_completed);
    assert_eq!(items[1].completed_at, Some(130));

    assert!(store.get("migration_to_sqlite_done").is_some());
    assert!(store.get("migration_timestamp").is_some());
    // Source collections are kept; cleanup is a separate explicit step.
    assert!(store.get("lists").is_some());
    Ok(())
}

#[tokio::test]
async fn second_run_is_a_no_op() -> Result<()> {
    let pool = open_memory_pool().await?;
    apply_migrations(&pool).await?;
    let importer = LegacyImporter::new(seeded_store());

    assert_eq!(importer.run(&pool).await, MigrationOutcome::Migrated);
    assert_eq!(importer.run(&pool).await, MigrationOutcome::AlreadyDone);

    // Nothing doubled.
    let repo = SqliteRepository::new(pool);
    assert_eq!(repo.all_lists().current().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn corrupt_collection_is_skipped_but_the_rest_migrates() -> Result<()> {
    let pool = open_memory_pool().await?;
    apply_migrations(&pool).await?;
    let store = StoreHandle::in_memory();
    store.set("lists", LISTS_JSON);
    store.set("shops", "{definitely not a json array");
    // Items without shop references so the skipped shops leave nothing dangling.
    store.set(
        "items",
        r#"[{"id":"i1","listId":"l1","name":"milk","createdAt":110,"updatedAt":110}]"#,
    );
    let importer = LegacyImporter::new(store);

    assert_eq!(importer.run(&pool).await, MigrationOutcome::Migrated);

    let repo = SqliteRepository::new(pool);
    assert_eq!(repo.all_lists().current().await?.len(), 2);
    assert_eq!(repo.all_items().current().await?.len(), 1);
    assert!(repo.all_shops().current().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_store_marks_done_without_copying() -> Result<()> {
    let pool = open_memory_pool().await?;
    apply_migrations(&pool).await?;
    let store = StoreHandle::in_memory();
    let importer = LegacyImporter::new(store.clone());

    assert_eq!(importer.run(&pool).await, MigrationOutcome::NothingToMigrate);
    assert!(store.get("migration_to_sqlite_done").is_some());
    assert_eq!(importer.run(&pool).await, MigrationOutcome::AlreadyDone);
    Ok(())
}

#[tokio::test]
async fn clear_legacy_data_removes_collections_but_keeps_the_flag() -> Result<()> {
    let pool = open_memory_pool().await?;
    apply_migrations(&pool).await?;
    let store = seeded_store();
    let importer = LegacyImporter::new(store.clone());
    importer.run(&pool).await;

    importer.clear_legacy_data()?;

    assert!(store.get("lists").is_none());
    assert!(store.get("shops").is_none());
    assert!(store.get("items").is_none());
    assert!(store.get("templates").is_none());
    assert!(store.get("migration_to_sqlite_done").is_some());
    Ok(())
}
