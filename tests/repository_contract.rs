use std::sync::Arc;

use anyhow::Result;
use trolley::{
    apply_migrations, open_memory_pool, ItemCategory, ItemTemplate, KvRepository,
    MemoryRepository, Priority, RepoError, Shop, ShopCategory, ShoppingItem, ShoppingRepository,
    SqliteRepository, StoreHandle,
};

async fn memory_repo() -> Result<Arc<dyn ShoppingRepository>> {
    Ok(Arc::new(MemoryRepository::new()))
}

async fn kv_repo() -> Result<Arc<dyn ShoppingRepository>> {
    Ok(Arc::new(KvRepository::open(StoreHandle::in_memory())))
}

async fn sqlite_repo() -> Result<Arc<dyn ShoppingRepository>> {
    let pool = open_memory_pool().await?;
    apply_migrations(&pool).await?;
    Ok(Arc::new(SqliteRepository::new(pool)))
}

fn item(id: &str, list_id: &str, priority: Priority, created_at: i64) -> ShoppingItem {
    ShoppingItem {
        id: id.into(),
        list_id: list_id.into(),
        name: format!("item {id}"),
        quantity: 1,
        unit: None,
        price: None,
        priority,
        category: ItemCategory::Food,
        shop_id: None,
        is_completed: false,
        notes: None,
        created_at,
        updated_at: created_at,
        completed_at: None,
    }
}

fn shop(id: &str) -> Shop {
    Shop {
        id: id.into(),
        name: format!("shop {id}"),
        address: None,
        location: None,
        category: ShopCategory::Grocery,
        phone_number: None,
        notes: None,
        is_favorite: false,
        created_at: 1,
        updated_at: 1,
    }
}

fn template(id: &str, category: ItemCategory, use_count: i64) -> ItemTemplate {
    ItemTemplate {
        id: id.into(),
        name: format!("template {id}"),
        quantity: 1,
        unit: None,
        category,
        shop_id: None,
        notes: None,
        use_count,
        last_used_at: None,
        created_at: 1,
    }
}

async fn create_list_activates_and_deactivates_previous(
    repo: Arc<dyn ShoppingRepository>,
) -> Result<()> {
    let first = repo.create_list("weekday").await?;
    let second = repo.create_list("weekend").await?;

    let lists = repo.all_lists().current().await?;
    assert_eq!(lists.len(), 2);
    let active = repo.active_list().current().await?.expect("active list");
    assert_eq!(active.id, second.id);
    assert!(!lists.iter().find(|l| l.id == first.id).unwrap().is_active);
    Ok(())
}

async fn set_active_list_switches_exclusively(repo: Arc<dyn ShoppingRepository>) -> Result<()> {
    let first = repo.create_list("a").await?;
    let _second = repo.create_list("b").await?;

    repo.set_active_list(&first.id).await?;
    let lists = repo.all_lists().current().await?;
    assert_eq!(lists.iter().filter(|l| l.is_active).count(), 1);
    assert_eq!(
        repo.active_list().current().await?.map(|l| l.id),
        Some(first.id)
    );

    let err = repo.set_active_list("missing").await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
    Ok(())
}

async fn added_item_round_trips_every_field(repo: Arc<dyn ShoppingRepository>) -> Result<()> {
    let list = repo.create_list("l").await?;
    repo.add_shop(shop("s1")).await?;
    let full = ShoppingItem {
        id: "full".into(),
        list_id: list.id.clone(),
        name: "oat milk".into(),
        quantity: 3,
        unit: Some("litre".into()),
        price: Some(2.5),
        priority: Priority::High,
        category: ItemCategory::DailyGoods,
        shop_id: Some("s1".into()),
        is_completed: false,
        notes: Some("the barista one".into()),
        created_at: 42,
        updated_at: 42,
        completed_at: None,
    };
    repo.add_item(full.clone()).await?;

    let items = repo.items_by_list(&list.id).current().await?;
    assert_eq!(items.len(), 1);
    let mut stored = items[0].clone();
    stored.updated_at = full.updated_at;
    assert_eq!(stored, full);

    // Edits round-trip the same field set.
    let mut edited = full.clone();
    edited.name = "soy milk".into();
    edited.quantity = 2;
    edited.unit = Some("carton".into());
    edited.price = Some(1.75);
    edited.notes = None;
    repo.update_item(edited.clone()).await?;
    let mut stored = repo.items_by_list(&list.id).current().await?[0].clone();
    stored.updated_at = edited.updated_at;
    assert_eq!(stored, edited);
    Ok(())
}

async fn items_by_list_sorted_by_completion_priority_age(
    repo: Arc<dyn ShoppingRepository>,
) -> Result<()> {
    let list = repo.create_list("l").await?;
    repo.add_item(item("old_low", &list.id, Priority::Low, 10))
        .await?;
    repo.add_item(item("urgent", &list.id, Priority::Urgent, 30))
        .await?;
    repo.add_item(item("old_high", &list.id, Priority::High, 5))
        .await?;
    repo.add_item(item("new_high", &list.id, Priority::High, 20))
        .await?;
    repo.add_item(item("done", &list.id, Priority::Urgent, 1))
        .await?;
    repo.toggle_item_complete("done").await?;

    let items = repo.items_by_list(&list.id).current().await?;
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["urgent", "old_high", "new_high", "old_low", "done"]);
    Ok(())
}

async fn toggle_keeps_completed_at_in_step(repo: Arc<dyn ShoppingRepository>) -> Result<()> {
    let list = repo.create_list("l").await?;
    repo.add_item(item("i1", &list.id, Priority::Normal, 1))
        .await?;

    repo.toggle_item_complete("i1").await?;
    let toggled = &repo.items_by_list(&list.id).current().await?[0];
    assert!(toggled.is_completed);
    assert!(toggled.completed_at.is_some());

    repo.toggle_item_complete("i1").await?;
    let untoggled = &repo.items_by_list(&list.id).current().await?[0];
    assert!(!untoggled.is_completed);
    assert!(untoggled.completed_at.is_none());

    let err = repo.toggle_item_complete("missing").await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
    Ok(())
}

async fn delete_list_cascades_owned_items(repo: Arc<dyn ShoppingRepository>) -> Result<()> {
    let doomed = repo.create_list("doomed").await?;
    let kept = repo.create_list("kept").await?;
    repo.add_item(item("d1", &doomed.id, Priority::Normal, 1))
        .await?;
    repo.add_item(item("d2", &doomed.id, Priority::Normal, 2))
        .await?;
    repo.add_item(item("k1", &kept.id, Priority::Normal, 3))
        .await?;

    repo.delete_list(&doomed.id).await?;

    assert!(repo.items_by_list(&doomed.id).current().await?.is_empty());
    assert_eq!(repo.items_by_list(&kept.id).current().await?.len(), 1);
    assert_eq!(repo.all_lists().current().await?.len(), 1);
    Ok(())
}

async fn delete_shop_clears_references_without_deleting_rows(
    repo: Arc<dyn ShoppingRepository>,
) -> Result<()> {
    let list = repo.create_list("l").await?;
    repo.add_shop(shop("s1")).await?;
    let mut linked = item("i1", &list.id, Priority::Normal, 1);
    linked.shop_id = Some("s1".into());
    repo.add_item(linked).await?;
    let mut tmpl = template("t1", ItemCategory::Food, 0);
    tmpl.shop_id = Some("s1".into());
    repo.add_template(tmpl).await?;

    repo.delete_shop("s1").await?;

    assert!(repo.all_shops().current().await?.is_empty());
    let items = repo.items_by_list(&list.id).current().await?;
    assert_eq!(items.len(), 1);
    assert!(items[0].shop_id.is_none());
    let templates = repo.all_templates().current().await?;
    assert_eq!(templates.len(), 1);
    assert!(templates[0].shop_id.is_none());
    Ok(())
}

async fn favorite_shops_filters_on_flag(repo: Arc<dyn ShoppingRepository>) -> Result<()> {
    repo.add_shop(shop("plain")).await?;
    let mut fav = shop("fav");
    fav.is_favorite = true;
    repo.add_shop(fav).await?;

    let favorites = repo.favorite_shops().current().await?;
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].id, "fav");
    Ok(())
}

async fn templates_rank_by_usage_within_category(
    repo: Arc<dyn ShoppingRepository>,
) -> Result<()> {
    repo.add_template(template("rare", ItemCategory::Food, 1))
        .await?;
    repo.add_template(template("common", ItemCategory::Food, 5))
        .await?;
    repo.add_template(template("other", ItemCategory::Medicine, 9))
        .await?;

    let food = repo.templates_by_category(ItemCategory::Food).current().await?;
    let ids: Vec<&str> = food.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["common", "rare"]);

    repo.update_template_usage("rare").await?;
    repo.update_template_usage("rare").await?;
    repo.update_template_usage("rare").await?;
    repo.update_template_usage("rare").await?;
    repo.update_template_usage("rare").await?;

    let food = repo.templates_by_category(ItemCategory::Food).current().await?;
    assert_eq!(food[0].id, "rare");
    assert_eq!(food[0].use_count, 6);
    assert!(food[0].last_used_at.is_some());
    Ok(())
}

async fn delete_completed_scoped_to_one_list(repo: Arc<dyn ShoppingRepository>) -> Result<()> {
    let a = repo.create_list("a").await?;
    let b = repo.create_list("b").await?;
    repo.add_item(item("a_done", &a.id, Priority::Normal, 1))
        .await?;
    repo.add_item(item("a_todo", &a.id, Priority::Normal, 2))
        .await?;
    repo.add_item(item("b_done", &b.id, Priority::Normal, 3))
        .await?;
    repo.toggle_item_complete("a_done").await?;
    repo.toggle_item_complete("b_done").await?;

    repo.delete_completed_items(&a.id).await?;

    let a_items = repo.items_by_list(&a.id).current().await?;
    assert_eq!(a_items.len(), 1);
    assert_eq!(a_items[0].id, "a_todo");
    assert_eq!(repo.items_by_list(&b.id).current().await?.len(), 1);

    // Idempotent: a second sweep with nothing to do still succeeds.
    repo.delete_completed_items(&a.id).await?;
    Ok(())
}

async fn single_row_ops_on_missing_ids_fail(repo: Arc<dyn ShoppingRepository>) -> Result<()> {
    assert!(matches!(
        repo.delete_item("nope").await.unwrap_err(),
        RepoError::NotFound { .. }
    ));
    assert!(matches!(
        repo.delete_list("nope").await.unwrap_err(),
        RepoError::NotFound { .. }
    ));
    assert!(matches!(
        repo.delete_shop("nope").await.unwrap_err(),
        RepoError::NotFound { .. }
    ));
    assert!(matches!(
        repo.update_template_usage("nope").await.unwrap_err(),
        RepoError::NotFound { .. }
    ));
    Ok(())
}

async fn add_item_rejects_invalid_rows(repo: Arc<dyn ShoppingRepository>) -> Result<()> {
    let list = repo.create_list("l").await?;
    let mut zero = item("zero", &list.id, Priority::Normal, 1);
    zero.quantity = 0;
    assert!(matches!(
        repo.add_item(zero).await.unwrap_err(),
        RepoError::ConstraintViolation(_)
    ));

    let orphan = item("orphan", "missing_list", Priority::Normal, 1);
    assert!(matches!(
        repo.add_item(orphan).await.unwrap_err(),
        RepoError::ConstraintViolation(_)
    ));
    Ok(())
}

async fn live_query_reemits_after_mutation(repo: Arc<dyn ShoppingRepository>) -> Result<()> {
    let list = repo.create_list("l").await?;
    let mut live = repo.items_by_list(&list.id);
    assert!(live.current().await?.is_empty());

    repo.add_item(item("i1", &list.id, Priority::Normal, 1))
        .await?;
    let next = live.changed().await?.expect("feed still open");
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].id, "i1");
    Ok(())
}

macro_rules! contract_suite {
    ($backend:ident, $make:path) => {
        mod $backend {
            use super::*;

            #[tokio::test]
            async fn create_list_activates_and_deactivates_previous() -> Result<()> {
                super::create_list_activates_and_deactivates_previous($make().await?).await
            }

            #[tokio::test]
            async fn set_active_list_switches_exclusively() -> Result<()> {
                super::set_active_list_switches_exclusively($make().await?).await
            }

            #[tokio::test]
            async fn added_item_round_trips_every_field() -> Result<()> {
                super::added_item_round_trips_every_field($make().await?).await
            }

            #[tokio::test]
            async fn items_by_list_sorted_by_completion_priority_age() -> Result<()> {
                super::items_by_list_sorted_by_completion_priority_age($make().await?).await
            }

            #[tokio::test]
            async fn toggle_keeps_completed_at_in_step() -> Result<()> {
                super::toggle_keeps_completed_at_in_step($make().await?).await
            }

            #[tokio::test]
            async fn delete_list_cascades_owned_items() -> Result<()> {
                super::delete_list_cascades_owned_items($make().await?).await
            }

            #[tokio::test]
            async fn delete_shop_clears_references_without_deleting_rows() -> Result<()> {
                super::delete_shop_clears_references_without_deleting_rows($make().await?).await
            }

            #[tokio::test]
            async fn favorite_shops_filters_on_flag() -> Result<()> {
                super::favorite_shops_filters_on_flag($make().await?).await
            }

            #[tokio::test]
            async fn templates_rank_by_usage_within_category() -> Result<()> {
                super::templates_rank_by_usage_within_category($make().await?).await
            }

            #[tokio::test]
            async fn delete_completed_scoped_to_one_list() -> Result<()> {
                super::delete_completed_scoped_to_one_list($make().await?).await
            }

            #[tokio::test]
            async fn single_row_ops_on_missing_ids_fail() -> Result<()> {
                super::single_row_ops_on_missing_ids_fail($make().await?).await
            }

            #[tokio::test]
            async fn add_item_rejects_invalid_rows() -> Result<()> {
                super::add_item_rejects_invalid_rows($make().await?).await
            }

            #[tokio::test]
            async fn live_query_reemits_after_mutation() -> Result<()> {
                super::live_query_reemits_after_mutation($make().await?).await
            }
        }
    };
}

contract_suite!(memory_backend, super::memory_repo);
contract_suite!(kv_backend, super::kv_repo);
contract_suite!(sqlite_backend, super::sqlite_repo);
