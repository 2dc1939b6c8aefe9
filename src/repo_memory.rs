use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::ready;
use tracing::info;

use crate::error::{RepoError, Result};
use crate::id::generate_id;
use crate::model::{
    sort_items_for_list, sort_items_for_shop, sort_templates_by_usage, ItemCategory, ItemTemplate,
    Shop, ShoppingItem, ShoppingList,
};
use crate::repo::ShoppingRepository;
use crate::store::{ChangeFeed, LiveQuery};
use crate::time::now_ms;

type Table<T> = Arc<RwLock<Vec<T>>>;

/// In-memory backend. Each collection lives behind one lock; mutations take
/// the write lock for the whole read-modify-write, so concurrent writers
/// serialize instead of racing on `snapshot = snapshot + new`.
pub struct MemoryRepository {
    lists: Table<ShoppingList>,
    items: Table<ShoppingItem>,
    shops: Table<Shop>,
    templates: Table<ItemTemplate>,
    lists_feed: ChangeFeed,
    items_feed: ChangeFeed,
    shops_feed: ChangeFeed,
    templates_feed: ChangeFeed,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T: Clone>(table: &Table<T>) -> Vec<T> {
    table.read().map(|guard| guard.clone()).unwrap_or_default()
}

fn live<T, U, F>(table: &Table<T>, feed: &ChangeFeed, project: F) -> LiveQuery<U>
where
    T: Clone + Send + Sync + 'static,
    U: Send + 'static,
    F: Fn(Vec<T>) -> U + Send + Sync + 'static,
{
    let table = table.clone();
    LiveQuery::new(vec![feed.subscribe()], move || {
        let out = project(read(&table));
        Box::pin(ready(Ok(out)))
    })
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::with_data(Vec::new(), Vec::new(), Vec::new(), Vec::new())
    }

    pub fn with_data(
        lists: Vec<ShoppingList>,
        items: Vec<ShoppingItem>,
        shops: Vec<Shop>,
        templates: Vec<ItemTemplate>,
    ) -> Self {
        Self {
            lists: Arc::new(RwLock::new(lists)),
            items: Arc::new(RwLock::new(items)),
            shops: Arc::new(RwLock::new(shops)),
            templates: Arc::new(RwLock::new(templates)),
            lists_feed: ChangeFeed::new(),
            items_feed: ChangeFeed::new(),
            shops_feed: ChangeFeed::new(),
            templates_feed: ChangeFeed::new(),
        }
    }

    pub(crate) fn lists_snapshot(&self) -> Vec<ShoppingList> {
        read(&self.lists)
    }

    pub(crate) fn items_snapshot(&self) -> Vec<ShoppingItem> {
        read(&self.items)
    }

    pub(crate) fn shops_snapshot(&self) -> Vec<Shop> {
        read(&self.shops)
    }

    pub(crate) fn templates_snapshot(&self) -> Vec<ItemTemplate> {
        read(&self.templates)
    }

    fn with_lists<R>(&self, f: impl FnOnce(&mut Vec<ShoppingList>) -> Result<R>) -> Result<R> {
        let mut guard = self
            .lists
            .write()
            .map_err(|_| RepoError::StorageUnavailable("lists lock poisoned".into()))?;
        let out = f(&mut guard)?;
        drop(guard);
        self.lists_feed.publish();
        Ok(out)
    }

    fn with_items<R>(&self, f: impl FnOnce(&mut Vec<ShoppingItem>) -> Result<R>) -> Result<R> {
        let mut guard = self
            .items
            .write()
            .map_err(|_| RepoError::StorageUnavailable("items lock poisoned".into()))?;
        let out = f(&mut guard)?;
        drop(guard);
        self.items_feed.publish();
        Ok(out)
    }

    fn with_shops<R>(&self, f: impl FnOnce(&mut Vec<Shop>) -> Result<R>) -> Result<R> {
        let mut guard = self
            .shops
            .write()
            .map_err(|_| RepoError::StorageUnavailable("shops lock poisoned".into()))?;
        let out = f(&mut guard)?;
        drop(guard);
        self.shops_feed.publish();
        Ok(out)
    }

    fn with_templates<R>(&self, f: impl FnOnce(&mut Vec<ItemTemplate>) -> Result<R>) -> Result<R> {
        let mut guard = self
            .templates
            .write()
            .map_err(|_| RepoError::StorageUnavailable("templates lock poisoned".into()))?;
        let out = f(&mut guard)?;
        drop(guard);
        self.templates_feed.publish();
        Ok(out)
    }

    fn assert_list_exists(&self, list_id: &str) -> Result<()> {
        if self.lists_snapshot().iter().any(|l| l.id == list_id) {
            Ok(())
        } else {
            Err(RepoError::ConstraintViolation(format!(
                "item references missing list {list_id}"
            )))
        }
    }

    fn assert_shop_exists(&self, shop_id: &str) -> Result<()> {
        if self.shops_snapshot().iter().any(|s| s.id == shop_id) {
            Ok(())
        } else {
            Err(RepoError::ConstraintViolation(format!(
                "reference to missing shop {shop_id}"
            )))
        }
    }
}

#[async_trait]
impl ShoppingRepository for MemoryRepository {
    fn all_lists(&self) -> LiveQuery<Vec<ShoppingList>> {
        live(&self.lists, &self.lists_feed, |lists| lists)
    }

    fn active_list(&self) -> LiveQuery<Option<ShoppingList>> {
        live(&self.lists, &self.lists_feed, |lists| {
            lists.into_iter().find(|l| l.is_active)
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
        let created = list.clone();
        self.with_lists(move |lists| {
            for existing in lists.iter_mut() {
                existing.is_active = false;
            }
            lists.push(list);
            Ok(())
        })?;
        info!(target: "trolley", event = "list_created", id = %created.id);
        Ok(created)
    }

    async fn update_list(&self, list: ShoppingList) -> Result<()> {
        self.with_lists(|lists| {
            let slot = lists
                .iter_mut()
                .find(|l| l.id == list.id)
                .ok_or_else(|| RepoError::not_found("shopping_list", &list.id))?;
            *slot = ShoppingList {
                updated_at: now_ms(),
                ..list
            };
            Ok(())
        })
    }

    async fn set_active_list(&self, list_id: &str) -> Result<()> {
        self.with_lists(|lists| {
            if !lists.iter().any(|l| l.id == list_id) {
                return Err(RepoError::not_found("shopping_list", list_id));
            }
            for list in lists.iter_mut() {
                list.is_active = list.id == list_id;
            }
            Ok(())
        })
    }

    async fn delete_list(&self, list_id: &str) -> Result<()> {
        self.with_lists(|lists| {
            let before = lists.len();
            lists.retain(|l| l.id != list_id);
            if lists.len() == before {
                return Err(RepoError::not_found("shopping_list", list_id));
            }
            Ok(())
        })?;
        // Cascade: the list owned these items.
        self.with_items(|items| {
            items.retain(|i| i.list_id != list_id);
            Ok(())
        })
    }

    fn all_items(&self) -> LiveQuery<Vec<ShoppingItem>> {
        live(&self.items, &self.items_feed, |items| items)
    }

    fn items_by_list(&self, list_id: &str) -> LiveQuery<Vec<ShoppingItem>> {
        let list_id = list_id.to_string();
        live(&self.items, &self.items_feed, move |items| {
            let mut items: Vec<_> = items.into_iter().filter(|i| i.list_id == list_id).collect();
            sort_items_for_list(&mut items);
            items
        })
    }

    fn incomplete_items_by_shop(&self, shop_id: &str) -> LiveQuery<Vec<ShoppingItem>> {
        let shop_id = shop_id.to_string();
        live(&self.items, &self.items_feed, move |items| {
            let mut items: Vec<_> = items
                .into_iter()
                .filter(|i| !i.is_completed && i.shop_id.as_deref() == Some(shop_id.as_str()))
                .collect();
            sort_items_for_shop(&mut items);
            items
        })
    }

    async fn add_item(&self, item: ShoppingItem) -> Result<()> {
        if item.quantity < 1 {
            return Err(RepoError::ConstraintViolation(
                "quantity must be at least 1".into(),
            ));
        }
        self.assert_list_exists(&item.list_id)?;
        if let Some(shop_id) = item.shop_id.as_deref() {
            self.assert_shop_exists(shop_id)?;
        }
        self.with_items(|items| {
            if items.iter().any(|i| i.id == item.id) {
                return Err(RepoError::ConstraintViolation(format!(
                    "duplicate item id {}",
                    item.id
                )));
            }
            items.push(item);
            Ok(())
        })
    }

    async fn update_item(&self, item: ShoppingItem) -> Result<()> {
        self.with_items(|items| {
            let slot = items
                .iter_mut()
                .find(|i| i.id == item.id)
                .ok_or_else(|| RepoError::not_found("shopping_item", &item.id))?;
            *slot = ShoppingItem {
                updated_at: now_ms(),
                ..item
            };
            Ok(())
        })
    }

    async fn toggle_item_complete(&self, item_id: &str) -> Result<()> {
        let now = now_ms();
        self.with_items(|items| {
            let item = items
                .iter_mut()
                .find(|i| i.id == item_id)
                .ok_or_else(|| RepoError::not_found("shopping_item", item_id))?;
            item.is_completed = !item.is_completed;
            item.completed_at = if item.is_completed { Some(now) } else { None };
            item.updated_at = now;
            Ok(())
        })
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        self.with_items(|items| {
            let before = items.len();
            items.retain(|i| i.id != item_id);
            if items.len() == before {
                return Err(RepoError::not_found("shopping_item", item_id));
            }
            Ok(())
        })
    }

    async fn delete_completed_items(&self, list_id: &str) -> Result<()> {
        self.with_items(|items| {
            items.retain(|i| !(i.list_id == list_id && i.is_completed));
            Ok(())
        })
    }

    fn all_shops(&self) -> LiveQuery<Vec<Shop>> {
        live(&self.shops, &self.shops_feed, |shops| shops)
    }

    fn favorite_shops(&self) -> LiveQuery<Vec<Shop>> {
        live(&self.shops, &self.shops_feed, |shops| {
            shops.into_iter().filter(|s| s.is_favorite).collect()
        })
    }

    async fn add_shop(&self, shop: Shop) -> Result<()> {
        self.with_shops(|shops| {
            if shops.iter().any(|s| s.id == shop.id) {
                return Err(RepoError::ConstraintViolation(format!(
                    "duplicate shop id {}",
                    shop.id
                )));
            }
            shops.push(shop);
            Ok(())
        })
    }

    async fn update_shop(&self, shop: Shop) -> Result<()> {
        self.with_shops(|shops| {
            let slot = shops
                .iter_mut()
                .find(|s| s.id == shop.id)
                .ok_or_else(|| RepoError::not_found("shop", &shop.id))?;
            *slot = Shop {
                updated_at: now_ms(),
                ..shop
            };
            Ok(())
        })
    }

    async fn delete_shop(&self, shop_id: &str) -> Result<()> {
        self.with_shops(|shops| {
            let before = shops.len();
            shops.retain(|s| s.id != shop_id);
            if shops.len() == before {
                return Err(RepoError::not_found("shop", shop_id));
            }
            Ok(())
        })?;
        // Weak reference: items survive, only the pointer clears.
        let now = now_ms();
        self.with_items(|items| {
            for item in items.iter_mut() {
                if item.shop_id.as_deref() == Some(shop_id) {
                    item.shop_id = None;
                    item.updated_at = now;
                }
            }
            Ok(())
        })?;
        self.with_templates(|templates| {
            for template in templates.iter_mut() {
                if template.shop_id.as_deref() == Some(shop_id) {
                    template.shop_id = None;
                }
            }
            Ok(())
        })
    }

    fn all_templates(&self) -> LiveQuery<Vec<ItemTemplate>> {
        live(&self.templates, &self.templates_feed, |templates| templates)
    }

    fn templates_by_category(&self, category: ItemCategory) -> LiveQuery<Vec<ItemTemplate>> {
        live(&self.templates, &self.templates_feed, move |templates| {
            let mut templates: Vec<_> = templates
                .into_iter()
                .filter(|t| t.category == category)
                .collect();
            sort_templates_by_usage(&mut templates);
            templates
        })
    }

    async fn add_template(&self, template: ItemTemplate) -> Result<()> {
        self.with_templates(|templates| {
            if templates.iter().any(|t| t.id == template.id) {
                return Err(RepoError::ConstraintViolation(format!(
                    "duplicate template id {}",
                    template.id
                )));
            }
            templates.push(template);
            Ok(())
        })
    }

    async fn update_template_usage(&self, template_id: &str) -> Result<()> {
        let now = now_ms();
        self.with_templates(|templates| {
            let template = templates
                .iter_mut()
                .find(|t| t.id == template_id)
                .ok_or_else(|| RepoError::not_found("item_template", template_id))?;
            template.use_count += 1;
            template.last_used_at = Some(now);
            Ok(())
        })
    }

    async fn delete_template(&self, template_id: &str) -> Result<()> {
        self.with_templates(|templates| {
            let before = templates.len();
            templates.retain(|t| t.id != template_id);
            if templates.len() == before {
                return Err(RepoError::not_found("item_template", template_id));
            }
            Ok(())
        })
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
