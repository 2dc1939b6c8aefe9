use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::kv::{
    StoreHandle, ITEMS_KEY, LISTS_KEY, MIGRATION_DONE_KEY, MIGRATION_TIMESTAMP_KEY, SHOPS_KEY,
    TEMPLATES_KEY,
};
use crate::model::{ItemTemplate, Shop, ShoppingItem, ShoppingList};
use crate::time::now_ms;

/// One-time copy of legacy key-value JSON collections into the structured
/// store. Runs before the repository is first read; consumers gate on the
/// returned outcome.
pub struct LegacyImporter {
    store: StoreHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The done-flag was already set; nothing happened.
    AlreadyDone,
    /// No legacy collection had data; flag set, nothing copied.
    NothingToMigrate,
    /// Legacy data copied and the done-flag persisted.
    Migrated,
    /// The transaction failed; flag left unset so the next startup retries.
    Failed,
}

impl LegacyImporter {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub async fn run(&self, pool: &SqlitePool) -> MigrationOutcome {
        if self.store.get(MIGRATION_DONE_KEY).is_some() {
            return MigrationOutcome::AlreadyDone;
        }

        let has_data = [LISTS_KEY, SHOPS_KEY, ITEMS_KEY, TEMPLATES_KEY]
            .iter()
            .any(|key| self.store.get(key).is_some());
        if !has_data {
            self.mark_done();
            return MigrationOutcome::NothingToMigrate;
        }

        match self.copy_all(pool).await {
            Ok(()) => {
                self.mark_done();
                info!(target: "trolley", event = "legacy_migration_done");
                MigrationOutcome::Migrated
            }
            Err(err) => {
                error!(target: "trolley", event = "legacy_migration_failed", error = %err);
                MigrationOutcome::Failed
            }
        }
    }

    /// One exclusive transaction across all four collections. A collection
    /// that fails to parse or insert is logged and skipped wholesale; the
    /// remaining collections still migrate. Only a transaction-level
    /// failure aborts the whole run.
    async fn copy_all(&self, pool: &SqlitePool) -> Result<()> {
        let mut tx = pool.begin().await?;

        let result = self.copy_lists(&mut tx).await;
        log_collection(LISTS_KEY, result);
        let result = self.copy_shops(&mut tx).await;
        log_collection(SHOPS_KEY, result);
        let result = self.copy_items(&mut tx).await;
        log_collection(ITEMS_KEY, result);
        let result = self.copy_templates(&mut tx).await;
        log_collection(TEMPLATES_KEY, result);

        tx.commit().await?;
        Ok(())
    }

    async fn copy_lists(&self, tx: &mut Transaction<'_, Sqlite>) -> Result<usize> {
        let raw = self.store.get(LISTS_KEY).unwrap_or_else(|| "[]".into());
        let lists: Vec<ShoppingList> = serde_json::from_str(&raw)?;
        for list in &lists {
            sqlx::query(
                "INSERT INTO shopping_lists (id, name, is_active, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&list.id)
            .bind(&list.name)
            .bind(if list.is_active { 1_i64 } else { 0 })
            .bind(list.created_at)
            .bind(list.updated_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(lists.len())
    }

    async fn copy_shops(&self, tx: &mut Transaction<'_, Sqlite>) -> Result<usize> {
        let raw = self.store.get(SHOPS_KEY).unwrap_or_else(|| "[]".into());
        let shops: Vec<Shop> = serde_json::from_str(&raw)?;
        for shop in &shops {
            sqlx::query(
                "INSERT INTO shops (id, name, address, latitude, longitude, category, \
                 phone_number, notes, is_favorite, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
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
            .execute(&mut **tx)
            .await?;
        }
        Ok(shops.len())
    }

    async fn copy_items(&self, tx: &mut Transaction<'_, Sqlite>) -> Result<usize> {
        let raw = self.store.get(ITEMS_KEY).unwrap_or_else(|| "[]".into());
        let items: Vec<ShoppingItem> = serde_json::from_str(&raw)?;
        for item in &items {
            sqlx::query(
                "INSERT INTO shopping_items (id, list_id, name, quantity, unit, price, \
                 priority, category, shop_id, is_completed, notes, created_at, updated_at, \
                 completed_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
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
            .execute(&mut **tx)
            .await?;
        }
        Ok(items.len())
    }

    async fn copy_templates(&self, tx: &mut Transaction<'_, Sqlite>) -> Result<usize> {
        let raw = self.store.get(TEMPLATES_KEY).unwrap_or_else(|| "[]".into());
        let templates: Vec<ItemTemplate> = serde_json::from_str(&raw)?;
        for template in &templates {
            sqlx::query(
                "INSERT INTO item_templates (id, name, quantity, unit, category, shop_id, \
                 notes, use_count, last_used_at, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
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
            .execute(&mut **tx)
            .await?;
        }
        Ok(templates.len())
    }

    fn mark_done(&self) {
        self.store.set(MIGRATION_DONE_KEY, "true");
        self.store
            .set(MIGRATION_TIMESTAMP_KEY, &now_ms().to_string());
        if let Err(err) = self.store.save() {
            warn!(
                target: "trolley",
                event = "legacy_migration_flag_save_failed",
                error = %err
            );
        }
    }

    /// Operator-only cleanup. The importer never deletes legacy data on its
    /// own; old collections persist until this is called explicitly.
    pub fn clear_legacy_data(&self) -> Result<()> {
        for key in [LISTS_KEY, SHOPS_KEY, ITEMS_KEY, TEMPLATES_KEY] {
            self.store.remove(key);
        }
        self.store.save()
    }
}

fn log_collection(key: &str, result: Result<usize>) {
    match result {
        Ok(count) => {
            info!(
                target: "trolley",
                event = "legacy_collection_migrated",
                collection = %key,
                rows = count
            );
        }
        Err(err) => {
            warn!(
                target: "trolley",
                event = "legacy_collection_skipped",
                collection = %key,
                error = %err
            );
        }
    }
}
