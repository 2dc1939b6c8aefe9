use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::error::{RepoError, Result};
use crate::id::generate_id;
use crate::model::{
    ItemCategory, ItemTemplate, Location, Priority, Shop, ShopCategory, ShoppingItem,
    ShoppingList,
};
use crate::repo::ShoppingRepository;
use crate::store::{ChangeFeed, LiveQuery};
use crate::time::now_ms;

/// Item projection for consumers: the shop name is denormalized at
/// projection time by joining the latest shops snapshot, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemView {
    pub id: String,
    pub name: String,
    pub is_completed: bool,
    pub shop_name: Option<String>,
    pub shop_id: Option<String>,
    pub priority: Priority,
    pub category: ItemCategory,
}

/// Shop projection with derived item counters. The counts reflect the item
/// snapshot at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct ShopView {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub category: ShopCategory,
    pub location: Option<Location>,
    pub is_favorite: bool,
    pub pending_items_count: usize,
    pub total_items_count: usize,
}

/// Pending work for one shop; a non-empty reminder is the signal that a
/// geofence-enter notification should fire.
#[derive(Debug, Clone, PartialEq)]
pub struct ShopReminder {
    pub shop: Shop,
    pub pending: Vec<ShoppingItem>,
}

/// Input for creating or editing an item through the aggregator.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub name: String,
    pub quantity: i64,
    pub unit: Option<String>,
    pub price: Option<f64>,
    pub priority: Priority,
    pub category: ItemCategory,
    pub shop_id: Option<String>,
    pub notes: Option<String>,
}

impl ItemDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: 1,
            unit: None,
            price: None,
            priority: Priority::Normal,
            category: ItemCategory::Other,
            shop_id: None,
            notes: None,
        }
    }
}

/// Input for creating or editing a shop through the aggregator.
#[derive(Debug, Clone)]
pub struct ShopDraft {
    pub name: String,
    pub address: Option<String>,
    pub location: Option<Location>,
    pub category: ShopCategory,
    pub phone_number: Option<String>,
    pub notes: Option<String>,
}

impl ShopDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            location: None,
            category: ShopCategory::Grocery,
            phone_number: None,
            notes: None,
        }
    }
}

/// Combines the raw entity streams into consumer-ready derived views and
/// routes commands through the repository. Every command is a write-through:
/// the repository's re-emission propagates the change to all projections;
/// there is no local optimistic cache.
pub struct ShoppingAggregator {
    repo: Arc<dyn ShoppingRepository>,
    // None means "resolve via whichever list is active".
    selected_list: Arc<RwLock<Option<String>>>,
    cursor_feed: ChangeFeed,
}

impl ShoppingAggregator {
    pub fn new(repo: Arc<dyn ShoppingRepository>) -> Self {
        Self {
            repo,
            selected_list: Arc::new(RwLock::new(None)),
            cursor_feed: ChangeFeed::new(),
        }
    }

    pub fn select_list(&self, list_id: Option<String>) {
        if let Ok(mut guard) = self.selected_list.write() {
            *guard = list_id;
        }
        self.cursor_feed.publish();
    }

    pub fn selected_list(&self) -> Option<String> {
        self.selected_list
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    async fn resolve_list_id(&self) -> Result<Option<String>> {
        let selected = self.selected_list();
        if selected.is_some() {
            return Ok(selected);
        }
        Ok(self
            .repo
            .active_list()
            .current()
            .await?
            .map(|list| list.id))
    }

    // Projections

    pub fn lists(&self) -> LiveQuery<Vec<ShoppingList>> {
        self.repo.all_lists()
    }

    pub fn active_lists(&self) -> LiveQuery<Vec<ShoppingList>> {
        let repo = self.repo.clone();
        LiveQuery::new(vec![repo.lists_changes()], move || {
            let repo = repo.clone();
            Box::pin(async move {
                let lists = repo.all_lists().current().await?;
                Ok(lists.into_iter().filter(|l| l.is_active).collect())
            })
        })
    }

    pub fn templates(&self) -> LiveQuery<Vec<ItemTemplate>> {
        self.repo.all_templates()
    }

    /// Items of the selected list (or the active list when no selection),
    /// re-emitted when the cursor, the lists stream or the items stream
    /// changes. With no resolvable list the projection is empty.
    pub fn current_list_items(&self) -> LiveQuery<Vec<ItemView>> {
        let repo = self.repo.clone();
        let selected = self.selected_list.clone();
        let signals = vec![
            self.cursor_feed.subscribe(),
            repo.lists_changes(),
            repo.items_changes(),
        ];
        LiveQuery::new(signals, move || {
            let repo = repo.clone();
            let selected = selected.clone();
            Box::pin(async move {
                let list_id = {
                    let guard = selected
                        .read()
                        .map_err(|_| RepoError::StorageUnavailable("cursor lock poisoned".into()))?;
                    guard.clone()
                };
                let list_id = match list_id {
                    Some(id) => Some(id),
                    None => repo.active_list().current().await?.map(|l| l.id),
                };
                let Some(list_id) = list_id else {
                    return Ok(Vec::new());
                };
                let items = repo.items_by_list(&list_id).current().await?;
                let shops = repo.all_shops().current().await?;
                Ok(items
                    .into_iter()
                    .map(|item| {
                        let shop_name = item
                            .shop_id
                            .as_deref()
                            .and_then(|sid| shops.iter().find(|s| s.id == sid))
                            .map(|s| s.name.clone());
                        ItemView {
                            id: item.id,
                            name: item.name,
                            is_completed: item.is_completed,
                            shop_name,
                            shop_id: item.shop_id,
                            priority: item.priority,
                            category: item.category,
                        }
                    })
                    .collect())
            })
        })
    }

    /// Shops with pending/total item counters. Re-emission follows the
    /// shops stream; the counters read the item snapshot at evaluation
    /// time, so an item-only change surfaces at the next evaluation
    /// (accepted eventual-consistency window).
    pub fn shops_overview(&self) -> LiveQuery<Vec<ShopView>> {
        let repo = self.repo.clone();
        LiveQuery::new(vec![repo.shops_changes()], move || {
            let repo = repo.clone();
            Box::pin(async move {
                let shops = repo.all_shops().current().await?;
                let items = repo.all_items().current().await?;
                Ok(shops
                    .into_iter()
                    .map(|shop| {
                        let referencing =
                            items.iter().filter(|i| i.shop_id.as_deref() == Some(shop.id.as_str()));
                        let total = referencing.clone().count();
                        let pending = referencing.filter(|i| !i.is_completed).count();
                        ShopView {
                            id: shop.id,
                            name: shop.name,
                            address: shop.address,
                            category: shop.category,
                            location: shop.location,
                            is_favorite: shop.is_favorite,
                            pending_items_count: pending,
                            total_items_count: total,
                        }
                    })
                    .collect())
            })
        })
    }

    /// Reminder decision for a geofence-enter event: `Some` exactly when
    /// the shop still exists and has pending items.
    pub async fn shop_reminder(&self, shop_id: &str) -> Result<Option<ShopReminder>> {
        let pending = self
            .repo
            .incomplete_items_by_shop(shop_id)
            .current()
            .await?;
        if pending.is_empty() {
            return Ok(None);
        }
        let shops = self.repo.all_shops().current().await?;
        Ok(shops
            .into_iter()
            .find(|s| s.id == shop_id)
            .map(|shop| ShopReminder { shop, pending }))
    }

    // Commands

    /// First-run bootstrap: create an initial active list when none exists.
    pub async fn ensure_default_list(&self, name: &str) -> Result<()> {
        if self.repo.all_lists().current().await?.is_empty() {
            self.repo.create_list(name).await?;
        }
        Ok(())
    }

    pub async fn create_list(&self, name: &str) -> Result<ShoppingList> {
        self.repo.create_list(name).await
    }

    pub async fn set_active_list(&self, list_id: &str) -> Result<()> {
        self.repo.set_active_list(list_id).await
    }

    pub async fn delete_list(&self, list_id: &str) -> Result<()> {
        self.repo.delete_list(list_id).await
    }

    /// Adds an item to the active list.
    pub async fn add_item(&self, draft: ItemDraft) -> Result<ShoppingItem> {
        let active = self
            .repo
            .active_list()
            .current()
            .await?
            .ok_or_else(|| RepoError::not_found("active_list", "none"))?;
        let now = now_ms();
        let item = ShoppingItem {
            id: generate_id(),
            list_id: active.id,
            name: draft.name,
            quantity: draft.quantity,
            unit: draft.unit,
            price: draft.price,
            priority: draft.priority,
            category: draft.category,
            shop_id: draft.shop_id,
            is_completed: false,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.repo.add_item(item.clone()).await?;
        Ok(item)
    }

    /// Replaces an item's editable fields, preserving its list, completion
    /// state and creation time.
    pub async fn update_item(&self, item_id: &str, draft: ItemDraft) -> Result<()> {
        let Some(list_id) = self.resolve_list_id().await? else {
            return Err(RepoError::not_found("shopping_item", item_id));
        };
        let items = self.repo.items_by_list(&list_id).current().await?;
        let existing = items
            .into_iter()
            .find(|i| i.id == item_id)
            .ok_or_else(|| RepoError::not_found("shopping_item", item_id))?;
        let updated = ShoppingItem {
            name: draft.name,
            quantity: draft.quantity,
            unit: draft.unit,
            price: draft.price,
            priority: draft.priority,
            category: draft.category,
            shop_id: draft.shop_id,
            notes: draft.notes,
            ..existing
        };
        self.repo.update_item(updated).await
    }

    pub async fn toggle_item_complete(&self, item_id: &str) -> Result<()> {
        self.repo.toggle_item_complete(item_id).await
    }

    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        self.repo.delete_item(item_id).await
    }

    /// Clears completed items on the active list; without one there is
    /// nothing to clear.
    pub async fn delete_completed_items(&self) -> Result<()> {
        if let Some(active) = self.repo.active_list().current().await? {
            self.repo.delete_completed_items(&active.id).await?;
        }
        Ok(())
    }

    pub async fn add_shop(&self, draft: ShopDraft) -> Result<Shop> {
        let now = now_ms();
        let shop = Shop {
            id: generate_id(),
            name: draft.name,
            address: draft.address,
            location: draft.location,
            category: draft.category,
            phone_number: draft.phone_number,
            notes: draft.notes,
            is_favorite: false,
            created_at: now,
            updated_at: now,
        };
        self.repo.add_shop(shop.clone()).await?;
        Ok(shop)
    }

    /// Replaces a shop's editable fields, preserving its favorite flag and
    /// creation time.
    pub async fn update_shop(&self, shop_id: &str, draft: ShopDraft) -> Result<()> {
        let shops = self.repo.all_shops().current().await?;
        let existing = shops
            .into_iter()
            .find(|s| s.id == shop_id)
            .ok_or_else(|| RepoError::not_found("shop", shop_id))?;
        let updated = Shop {
            name: draft.name,
            address: draft.address,
            location: draft.location,
            category: draft.category,
            phone_number: draft.phone_number,
            notes: draft.notes,
            ..existing
        };
        self.repo.update_shop(updated).await
    }

    pub async fn toggle_shop_favorite(&self, shop_id: &str) -> Result<()> {
        let shops = self.repo.all_shops().current().await?;
        let mut shop = shops
            .into_iter()
            .find(|s| s.id == shop_id)
            .ok_or_else(|| RepoError::not_found("shop", shop_id))?;
        shop.is_favorite = !shop.is_favorite;
        self.repo.update_shop(shop).await
    }

    pub async fn delete_shop(&self, shop_id: &str) -> Result<()> {
        self.repo.delete_shop(shop_id).await
    }

    /// Saves an existing item as a reusable template.
    pub async fn add_template(&self, item: &ShoppingItem) -> Result<ItemTemplate> {
        let template = ItemTemplate {
            id: generate_id(),
            name: item.name.clone(),
            quantity: item.quantity,
            unit: item.unit.clone(),
            category: item.category,
            shop_id: item.shop_id.clone(),
            notes: item.notes.clone(),
            use_count: 0,
            last_used_at: None,
            created_at: now_ms(),
        };
        self.repo.add_template(template.clone()).await?;
        Ok(template)
    }

    pub async fn delete_template(&self, template_id: &str) -> Result<()> {
        self.repo.delete_template(template_id).await
    }

    /// Instantiates a template as a new item on the active list. Priority
    /// is not inherited; new items start at Normal. The usage counter is
    /// bumped as a second, independent step: it runs whether or not the
    /// item add succeeded, and its own failure only logs.
    pub async fn add_item_from_template(
        &self,
        template: &ItemTemplate,
    ) -> Result<ShoppingItem> {
        let draft = ItemDraft {
            name: template.name.clone(),
            quantity: template.quantity,
            unit: template.unit.clone(),
            price: None,
            priority: Priority::Normal,
            category: template.category,
            shop_id: template.shop_id.clone(),
            notes: template.notes.clone(),
        };
        let added = self.add_item(draft).await;

        if let Err(err) = self.repo.update_template_usage(&template.id).await {
            warn!(
                target: "trolley",
                event = "template_usage_bump_failed",
                template_id = %template.id,
                error = %err
            );
        }

        added
    }
}
