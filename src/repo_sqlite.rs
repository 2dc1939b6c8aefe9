use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::error::{RepoError, Result};
use crate::id::generate_id;
use crate::model::{
    sort_items_for_list, sort_items_for_shop, ItemCategory, ItemTemplate, Location, Priority, Shop,
    ShoppingItem, ShoppingList,
};
use crate::repo::ShoppingRepository;
use crate::store::{ChangeFeed, LiveQuery};
use crate::time::now_ms;

/// SQLite backend. Mutations run SQL then publish on the matching change
/// feed; multi-table mutations (`delete_list`, `delete_shop`) hold one
/// transaction. Concurrency control is the database's own locking.
pub struct SqliteRepository {
    pool: SqlitePool,
    lists_feed: ChangeFeed,
    items_feed: ChangeFeed,
    shops_feed: ChangeFeed,
    templates_feed: ChangeFeed,
}

fn list_from_row(row: &SqliteRow) -> Result<ShoppingList> {
    Ok(ShoppingList {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        is_active: row.try_get::<i64, _>("is_active")? == 1,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn shop_from_row(row: &SqliteRow) -> Result<Shop> {
    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;
    let category: String = row.try_get("category")?;
    Ok(Shop {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        location: match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Location {
                latitude,
                longitude,
            }),
            _ => None,
        },
        category: crate::model::ShopCategory::parse(&category)?,
        phone_number: row.try_get("phone_number")?,
        notes: row.try_get("notes")?,
        is_favorite: row.try_get::<i64, _>("is_favorite")? == 1,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn item_from_row(row: &SqliteRow) -> Result<ShoppingItem> {
    let priority: String = row.try_get("priority")?;
    let category: String = row.try_get("category")?;
    Ok(ShoppingItem {
        id: row.try_get("id")?,
        list_id: row.try_get("list_id")?,
        name: row.try_get("name")?,
        quantity: row.try_get("quantity")?,
        unit: row.try_get("unit")?,
        price: row.try_get("price")?,
        priority: Priority::parse(&priority)?,
        category: ItemCategory::parse(&category)?,
        shop_id: row.try_get("shop_id")?,
        is_completed: row.try_get::<i64, _>("is_completed")? == 1,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn template_from_row(row: &SqliteRow) -> Result<ItemTemplate> {
    let category: String = row.try_get("category")?;
    Ok(ItemTemplate {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        quantity: row.try_get("quantity")?,
        unit: row.try_get("unit")?,
        category: ItemCategory::parse(&category)?,
        shop_id: row.try_get("shop_id")?,
        notes: row.try_get("notes")?,
        use_count: row.try_get("use_count")?,
        last_used_at: row.try_get("last_used_at")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn fetch_lists(pool: &SqlitePool) -> Result<Vec<ShoppingList>> {
    let rows = sqlx::query("SELECT * FROM shopping_lists ORDER BY created_at ASC, rowid ASC")
        .fetch_all(pool)
        .await?;
    rows.iter().map(list_from_row).collect()
}

async fn fetch_items(pool: &SqlitePool, sql: &str, bind: &str) -> Result<Vec<ShoppingItem>> {
    let rows = sqlx::query(sql).bind(bind).fetch_all(pool).await?;
    rows.iter().map(item_from_row).collect()
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            lists_feed: ChangeFeed::new(),
            items_feed: ChangeFeed::new(),
            shops_feed: ChangeFeed::new(),
            templates_feed: ChangeFeed::new(),
        }
    }
}

#[async_trait]
impl ShoppingRepository for SqliteRepository {
    fn all_lists(&self) -> LiveQuery<Vec<ShoppingList>> {
        let pool = self.pool.clone();
        LiveQuery::new(vec![self.lists_feed.subscribe()], move || {
            let pool = pool.clone();
            Box::pin(async move { fetch_lists(&pool).await })
        })
    }

    fn active_list(&self) -> LiveQuery<Option<ShoppingList>> {
        let pool = self.pool.clone();
        LiveQuery::new(vec![self.lists_feed.subscribe()], move || {
            let pool = pool.clone();
            Box::pin(async move {
                let row = sqlx::query(
                    "SELECT * FROM shopping_lists WHERE is_active = 1 \
                     ORDER BY created_at ASC, rowid ASC LIMIT 1",
                )
                .fetch_optional(&pool)
                .await?;
                row.as_ref().map(list_from_row).transpose()
            })
        })
    }

    async fn create_list(&self, name: &str) -> Result<ShoppingList> {
        let now = now_ms();
        let list = ShoppingList {
            id: generate_id(),
            name: name.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE shopping_lists SET is_active = 0 WHERE is_active = 1")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO shopping_lists (id, name, is_active, created_at, updated_at) \
             VALUES (?, ?, 1, ?, ?)",
        )
        .bind(&list.id)
        .bind(&list.name)
        .bind(list.created_at)
        .bind(list.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.lists_feed.publish();
        info!(target: "trolley", event = "list_created", id = %list.id);
        Ok(list)
    }

    async fn update_list(&self, list: ShoppingList) -> Result<()> {
        let res = sqlx::query(
            "UPDATE shopping_lists SET name = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&list.name)
        .bind(if list.is_active { 1_i64 } else { 0 })
        .bind(now_ms())
        .bind(&list.id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::not_found("shopping_list", &list.id));
        }
        self.lists_feed.publish();
        Ok(())
    }

    async fn set_active_list(&self, list_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query("UPDATE shopping_lists SET is_active = 1 WHERE id = ?")
            .bind(list_id)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::not_found("shopping_list", list_id));
        }
        sqlx::query("UPDATE shopping_lists SET is_active = 0 WHERE id != ?")
            .bind(list_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.lists_feed.publish();
        Ok(())
    }

    async fn delete_list(&self, list_id: &str) -> Result<()> {
        // FK cascade removes the owned items inside the same transaction.
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query("DELETE FROM shopping_lists WHERE id = ?")
            .bind(list_id)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::not_found("shopping_list", list_id));
        }
        tx.commit().await?;
        self.lists_feed.publish();
        self.items_feed.publish();
        Ok(())
    }

    fn all_items(&self) -> LiveQuery<Vec<ShoppingItem>> {
        let pool = self.pool.clone();
        LiveQuery::new(vec![self.items_feed.subscribe()], move || {
            let pool = pool.clone();
            Box::pin(async move {
                let rows = sqlx::query("SELECT * FROM shopping_items ORDER BY rowid ASC")
                    .fetch_all(&pool)
                    .await?;
                rows.iter().map(item_from_row).collect()
            })
        })
    }

    fn items_by_list(&self, list_id: &str) -> LiveQuery<Vec<ShoppingItem>> {
        let pool = self.pool.clone();
        let list_id = list_id.to_string();
        LiveQuery::new(vec![self.items_feed.subscribe()], move || {
            let pool = pool.clone();
            let list_id = list_id.clone();
            Box::pin(async move {
                let mut items = fetch_items(
                    &pool,
                    "SELECT * FROM shopping_items WHERE list_id = ? ORDER BY rowid ASC",
                    &list_id,
                )
                .await?;
                sort_items_for_list(&mut items);
                Ok(items)
            })
        })
    }

    fn incomplete_items_by_shop(&self, shop_id: &str) -> LiveQuery<Vec<ShoppingItem>> {
        let pool = self.pool.clone();
        let shop_id = shop_id.to_string();
        LiveQuery::new(vec![self.items_feed.subscribe()], move || {
            let pool = pool.clone();
            let shop_id = shop_id.clone();
            Box::pin(async move {
                let mut items = fetch_items(
                    &pool,
                    "SELECT * FROM shopping_items \
                     WHERE shop_id = ? AND is_completed = 0 ORDER BY rowid ASC",
                    &shop_id,
                )
                .await?;
                sort_items_for_shop(&mut items);
                Ok(items)
            })
        })
    }

    async fn add_item(&self, item: ShoppingItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO shopping_items (id, list_id, name, quantity, unit, price, priority, \
             category, shop_id, is_completed, notes, created_at, updated_at, completed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(&item.list_id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(&item.unit)
        .bind(item.price)
        .bind(item.priority.as_str())
        .bind(item.category.as_str())
        .bind(&item.shop_id)
        .bind(if item.is_completed { 1_i64 } else { 0 })
        .bind(&item.notes)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.completed_at)
        .execute(&self.pool)
        .await?;
        self.items_feed.publish();
        Ok(())
    }

    async fn update_item(&self, item: ShoppingItem) -> Result<()> {
        let res = sqlx::query(
            "UPDATE shopping_items SET list_id = ?, name = ?, quantity = ?, unit = ?, \
             price = ?, priority = ?, category = ?, shop_id = ?, is_completed = ?, notes = ?, \
             updated_at = ?, completed_at = ? WHERE id = ?",
        )
        .bind(&item.list_id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(&item.unit)
        .bind(item.price)
        .bind(item.priority.as_str())
        .bind(item.category.as_str())
        .bind(&item.shop_id)
        .bind(if item.is_completed { 1_i64 } else { 0 })
        .bind(&item.notes)
        .bind(now_ms())
        .bind(item.completed_at)
        .bind(&item.id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::not_found("shopping_item", &item.id));
        }
        self.items_feed.publish();
        Ok(())
    }

    async fn toggle_item_complete(&self, item_id: &str) -> Result<()> {
        // Column references in SET read the pre-update row, so the flip and
        // the completed_at stamp stay consistent in one statement.
        let now = now_ms();
        let res = sqlx::query(
            "UPDATE shopping_items SET \
               is_completed = 1 - is_completed, \
               completed_at = CASE WHEN is_completed = 0 THEN ? ELSE NULL END, \
               updated_at = ? \
             WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::not_found("shopping_item", item_id));
        }
        self.items_feed.publish();
        Ok(())
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        let res = sqlx::query("DELETE FROM shopping_items WHERE id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::not_found("shopping_item", item_id));
        }
        self.items_feed.publish();
        Ok(())
    }

    async fn delete_completed_items(&self, list_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM shopping_items WHERE list_id = ? AND is_completed = 1")
            .bind(list_id)
            .execute(&self.pool)
            .await?;
        self.items_feed.publish();
        Ok(())
    }

    fn all_shops(&self) -> LiveQuery<Vec<Shop>> {
        let pool = self.pool.clone();
        LiveQuery::new(vec![self.shops_feed.subscribe()], move || {
            let pool = pool.clone();
            Box::pin(async move {
                let rows = sqlx::query("SELECT * FROM shops ORDER BY created_at ASC, rowid ASC")
                    .fetch_all(&pool)
                    .await?;
                rows.iter().map(shop_from_row).collect()
            })
        })
    }

    fn favorite_shops(&self) -> LiveQuery<Vec<Shop>> {
        let pool = self.pool.clone();
        LiveQuery::new(vec![self.shops_feed.subscribe()], move || {
            let pool = pool.clone();
            Box::pin(async move {
                let rows = sqlx::query(
                    "SELECT * FROM shops WHERE is_favorite = 1 ORDER BY created_at ASC, rowid ASC",
                )
                .fetch_all(&pool)
                .await?;
                rows.iter().map(shop_from_row).collect()
            })
        })
    }

    async fn add_shop(&self, shop: Shop) -> Result<()> {
        sqlx::query(
            "INSERT INTO shops (id, name, address, latitude, longitude, category, phone_number, \
             notes, is_favorite, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&shop.id)
        .bind(&shop.name)
        .bind(&shop.address)
        .bind(shop.location.map(|l| l.latitude))
        .bind(shop.location.map(|l| l.longitude))
        .bind(shop.category.as_str())
        .bind(&shop.phone_number)
        .bind(&shop.notes)
        .bind(if shop.is_favorite { 1_i64 } else { 0 })
        .bind(shop.created_at)
        .bind(shop.updated_at)
        .execute(&self.pool)
        .await?;
        self.shops_feed.publish();
        Ok(())
    }

    async fn update_shop(&self, shop: Shop) -> Result<()> {
        let res = sqlx::query(
            "UPDATE shops SET name = ?, address = ?, latitude = ?, longitude = ?, category = ?, \
             phone_number = ?, notes = ?, is_favorite = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&shop.name)
        .bind(&shop.address)
        .bind(shop.location.map(|l| l.latitude))
        .bind(shop.location.map(|l| l.longitude))
        .bind(shop.category.as_str())
        .bind(&shop.phone_number)
        .bind(&shop.notes)
        .bind(if shop.is_favorite { 1_i64 } else { 0 })
        .bind(now_ms())
        .bind(&shop.id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::not_found("shop", &shop.id));
        }
        self.shops_feed.publish();
        Ok(())
    }

    async fn delete_shop(&self, shop_id: &str) -> Result<()> {
        // Clear references by hand so the touched items get a fresh
        // updated_at; the FK's SET NULL alone would not stamp them.
        let now = now_ms();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE shopping_items SET shop_id = NULL, updated_at = ? WHERE shop_id = ?",
        )
        .bind(now)
        .bind(shop_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE item_templates SET shop_id = NULL WHERE shop_id = ?")
            .bind(shop_id)
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query("DELETE FROM shops WHERE id = ?")
            .bind(shop_id)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::not_found("shop", shop_id));
        }
        tx.commit().await?;
        self.shops_feed.publish();
        self.items_feed.publish();
        self.templates_feed.publish();
        Ok(())
    }

    fn all_templates(&self) -> LiveQuery<Vec<ItemTemplate>> {
        let pool = self.pool.clone();
        LiveQuery::new(vec![self.templates_feed.subscribe()], move || {
            let pool = pool.clone();
            Box::pin(async move {
                let rows =
                    sqlx::query("SELECT * FROM item_templates ORDER BY created_at ASC, rowid ASC")
                        .fetch_all(&pool)
                        .await?;
                rows.iter().map(template_from_row).collect()
            })
        })
    }

    fn templates_by_category(&self, category: ItemCategory) -> LiveQuery<Vec<ItemTemplate>> {
        let pool = self.pool.clone();
        LiveQuery::new(vec![self.templates_feed.subscribe()], move || {
            let pool = pool.clone();
            Box::pin(async move {
                let rows = sqlx::query(
                    "SELECT * FROM item_templates WHERE category = ? \
                     ORDER BY use_count DESC, rowid ASC",
                )
                .bind(category.as_str())
                .fetch_all(&pool)
                .await?;
                rows.iter().map(template_from_row).collect()
            })
        })
    }

    async fn add_template(&self, template: ItemTemplate) -> Result<()> {
        sqlx::query(
            "INSERT INTO item_templates (id, name, quantity, unit, category, shop_id, notes, \
             use_count, last_used_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&template.id)
        .bind(&template.name)
        .bind(template.quantity)
        .bind(&template.unit)
        .bind(template.category.as_str())
        .bind(&template.shop_id)
        .bind(&template.notes)
        .bind(template.use_count)
        .bind(template.last_used_at)
        .bind(template.created_at)
        .execute(&self.pool)
        .await?;
        self.templates_feed.publish();
        Ok(())
    }

    async fn update_template_usage(&self, template_id: &str) -> Result<()> {
        let res = sqlx::query(
            "UPDATE item_templates SET use_count = use_count + 1, last_used_at = ? WHERE id = ?",
        )
        .bind(now_ms())
        .bind(template_id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::not_found("item_template", template_id));
        }
        self.templates_feed.publish();
        Ok(())
    }

    async fn delete_template(&self, template_id: &str) -> Result<()> {
        let res = sqlx::query("DELETE FROM item_templates WHERE id = ?")
            .bind(template_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::not_found("item_template", template_id));
        }
        self.templates_feed.publish();
        Ok(())
    }

    fn lists_changes(&self) -> tokio::sync::watch::Receiver<u64> {
        self.lists_feed.subscribe()
    }

    fn items_changes(&self) -> tokio::sync::watch::Receiver<u64> {
        self.items_feed.subscribe()
    }

    fn shops_changes(&self) -> tokio::sync::watch::Receiver<u64> {
        self.shops_feed.subscribe()
    }

    fn templates_changes(&self) -> tokio::sync::watch::Receiver<u64> {
        self.templates_feed.subscribe()
    }
}
