use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::kv::{StoreHandle, ITEMS_KEY, LISTS_KEY, SHOPS_KEY, TEMPLATES_KEY};
use crate::model::{ItemCategory, ItemTemplate, Shop, ShoppingItem, ShoppingList};
use crate::repo::ShoppingRepository;
use crate::repo_memory::MemoryRepository;
use crate::store::LiveQuery;

/// Preferences-backed variant: in-memory snapshots with every mutation
/// written through as JSON into a [`StoreHandle`]. This is the same layout
/// the legacy importer reads, so a kv repository's data is always a valid
/// migration source.
pub struct KvRepository {
    inner: MemoryRepository,
    store: StoreHandle,
}

fn load_collection<T: DeserializeOwned>(store: &StoreHandle, key: &str) -> Vec<T> {
    let Some(raw) = store.get(key) else {
        return Vec::new();
    };
    match serde_json::from_str(&raw) {
        Ok(rows) => rows,
        Err(err) => {
            // Corrupt stored JSON loads as empty rather than failing open.
            warn!(
                target: "trolley",
                event = "kv_collection_corrupt",
                key = %key,
                error = %err
            );
            Vec::new()
        }
    }
}

impl KvRepository {
    pub fn open(store: StoreHandle) -> Self {
        let lists = load_collection(&store, LISTS_KEY);
        let items = load_collection(&store, ITEMS_KEY);
        let shops = load_collection(&store, SHOPS_KEY);
        let templates = load_collection(&store, TEMPLATES_KEY);
        Self {
            inner: MemoryRepository::with_data(lists, items, shops, templates),
            store,
        }
    }

    fn persist<T: Serialize>(&self, key: &str, rows: &[T]) -> Result<()> {
        let raw = serde_json::to_string(rows)?;
        self.store.set(key, &raw);
        self.store.save()
    }

    fn persist_lists(&self) -> Result<()> {
        self.persist(LISTS_KEY, &self.inner.lists_snapshot())
    }

    fn persist_items(&self) -> Result<()> {
        self.persist(ITEMS_KEY, &self.inner.items_snapshot())
    }

    fn persist_shops(&self) -> Result<()> {
        self.persist(SHOPS_KEY, &self.inner.shops_snapshot())
    }

    fn persist_templates(&self) -> Result<()> {
        self.persist(TEMPLATES_KEY, &self.inner.templates_snapshot())
    }
}

#[async_trait]
impl ShoppingRepository for KvRepository {
    fn all_lists(&self) -> LiveQuery<Vec<ShoppingList>> {
        self.inner.all_lists()
    }

    fn active_list(&self) -> LiveQuery<Option<ShoppingList>> {
        self.inner.active_list()
    }

    async fn create_list(&self, name: &str) -> Result<ShoppingList> {
        let list = self.inner.create_list(name).await?;
        self.persist_lists()?;
        Ok(list)
    }

    async fn update_list(&self, list: ShoppingList) -> Result<()> {
        self.inner.update_list(list).await?;
        self.persist_lists()
    }

    async fn set_active_list(&self, list_id: &str) -> Result<()> {
        self.inner.set_active_list(list_id).await?;
        self.persist_lists()
    }

    async fn delete_list(&self, list_id: &str) -> Result<()> {
        self.inner.delete_list(list_id).await?;
        self.persist_lists()?;
        self.persist_items()
    }

    fn all_items(&self) -> LiveQuery<Vec<ShoppingItem>> {
        self.inner.all_items()
    }

    fn items_by_list(&self, list_id: &str) -> LiveQuery<Vec<ShoppingItem>> {
        self.inner.items_by_list(list_id)
    }

    fn incomplete_items_by_shop(&self, shop_id: &str) -> LiveQuery<Vec<ShoppingItem>> {
        self.inner.incomplete_items_by_shop(shop_id)
    }

    async fn add_item(&self, item: ShoppingItem) -> Result<()> {
        self.inner.add_item(item).await?;
        self.persist_items()
    }

    async fn update_item(&self, item: ShoppingItem) -> Result<()> {
        self.inner.update_item(item).await?;
        self.persist_items()
    }

    async fn toggle_item_complete(&self, item_id: &str) -> Result<()> {
        self.inner.toggle_item_complete(item_id).await?;
        self.persist_items()
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        self.inner.delete_item(item_id).await?;
        self.persist_items()
    }

    async fn delete_completed_items(&self, list_id: &str) -> Result<()> {
        self.inner.delete_completed_items(list_id).await?;
        self.persist_items()
    }

    fn all_shops(&self) -> LiveQuery<Vec<Shop>> {
        self.inner.all_shops()
    }

    fn favorite_shops(&self) -> LiveQuery<Vec<Shop>> {
        self.inner.favorite_shops()
    }

    async fn add_shop(&self, shop: Shop) -> Result<()> {
        self.inner.add_shop(shop).await?;
        self.persist_shops()
    }

    async fn update_shop(&self, shop: Shop) -> Result<()> {
        self.inner.update_shop(shop).await?;
        self.persist_shops()
    }

    async fn delete_shop(&self, shop_id: &str) -> Result<()> {
        self.inner.delete_shop(shop_id).await?;
        self.persist_shops()?;
        self.persist_items()?;
        self.persist_templates()
    }

    fn all_templates(&self) -> LiveQuery<Vec<ItemTemplate>> {
        self.inner.all_templates()
    }

    fn templates_by_category(&self, category: ItemCategory) -> LiveQuery<Vec<ItemTemplate>> {
        self.inner.templates_by_category(category)
    }

    async fn add_template(&self, template: ItemTemplate) -> Result<()> {
        self.inner.add_template(template).await?;
        self.persist_templates()
    }

    async fn update_template_usage(&self, template_id: &str) -> Result<()> {
        self.inner.update_template_usage(template_id).await?;
        self.persist_templates()
    }

    async fn delete_template(&self, template_id: &str) -> Result<()> {
        self.inner.delete_template(template_id).await?;
        self.persist_templates()
    }

    fn lists_changes(&self) -> tokio::sync::watch::Receiver<u64> {
        self.inner.lists_changes()
    }

    fn items_changes(&self) -> tokio::sync::watch::Receiver<u64> {
        self.inner.items_changes()
    }

    fn shops_changes(&self) -> tokio::sync::watch::Receiver<u64> {
        self.inner.shops_changes()
    }

    fn templates_changes(&self) -> tokio::sync::watch::Receiver<u64> {
        self.inner.templates_changes()
    }
}
