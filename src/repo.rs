use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::Result;
use crate::model::{ItemCategory, ItemTemplate, Shop, ShoppingItem, ShoppingList};
use crate::store::LiveQuery;

/// Uniform CRUD + reactive-read surface over lists, items, shops and
/// templates. Every backend multicasts its current snapshot to readers; a
/// mutation republishes and all live queries re-emit.
///
/// Error policy is uniform across backends: single-row operations against a
/// missing id fail with [`crate::RepoError::NotFound`]; only idempotent bulk
/// operations (`delete_completed_items`) may no-op.
#[async_trait]
pub trait ShoppingRepository: Send + Sync {
    // Lists
    fn all_lists(&self) -> LiveQuery<Vec<ShoppingList>>;
    /// First list flagged active, or none.
    fn active_list(&self) -> LiveQuery<Option<ShoppingList>>;
    /// Creates a list and makes it the active one; every other list is
    /// deactivated in the same operation.
    async fn create_list(&self, name: &str) -> Result<ShoppingList>;
    /// Full replace; stamps `updated_at`.
    async fn update_list(&self, list: ShoppingList) -> Result<()>;
    /// Atomically activates one list and deactivates the rest.
    async fn set_active_list(&self, list_id: &str) -> Result<()>;
    /// Deletes the list and every item it owns, atomically where the
    /// backend supports transactions.
    async fn delete_list(&self, list_id: &str) -> Result<()>;

    // Items
    /// Unfiltered snapshot, for derived aggregates (per-shop counts).
    fn all_items(&self) -> LiveQuery<Vec<ShoppingItem>>;
    /// Sorted: incomplete before complete, priority descending, created_at
    /// ascending.
    fn items_by_list(&self, list_id: &str) -> LiveQuery<Vec<ShoppingItem>>;
    /// Pending items for one shop, priority descending then created_at
    /// ascending. Non-empty means a location reminder should fire.
    fn incomplete_items_by_shop(&self, shop_id: &str) -> LiveQuery<Vec<ShoppingItem>>;
    async fn add_item(&self, item: ShoppingItem) -> Result<()>;
    async fn update_item(&self, item: ShoppingItem) -> Result<()>;
    /// Flips `is_completed` and sets/clears `completed_at` together with
    /// `updated_at`; readers never observe a partial state.
    async fn toggle_item_complete(&self, item_id: &str) -> Result<()>;
    async fn delete_item(&self, item_id: &str) -> Result<()>;
    /// Bulk delete of completed items, scoped to one list. No-ops when
    /// nothing matches.
    async fn delete_completed_items(&self, list_id: &str) -> Result<()>;

    // Shops
    fn all_shops(&self) -> LiveQuery<Vec<Shop>>;
    fn favorite_shops(&self) -> LiveQuery<Vec<Shop>>;
    async fn add_shop(&self, shop: Shop) -> Result<()>;
    async fn update_shop(&self, shop: Shop) -> Result<()>;
    /// Deletes the shop and clears `shop_id` on every referencing item and
    /// template (stamping those items' `updated_at`); deletes nothing else.
    async fn delete_shop(&self, shop_id: &str) -> Result<()>;

    // Templates
    fn all_templates(&self) -> LiveQuery<Vec<ItemTemplate>>;
    /// Templates of one category, most-used first.
    fn templates_by_category(&self, category: ItemCategory) -> LiveQuery<Vec<ItemTemplate>>;
    async fn add_template(&self, template: ItemTemplate) -> Result<()>;
    /// Atomically: `use_count += 1`, `last_used_at = now`.
    async fn update_template_usage(&self, template_id: &str) -> Result<()>;
    async fn delete_template(&self, template_id: &str) -> Result<()>;

    // Change signals, for composing derived queries on top of this
    // repository (replay-latest watch semantics, one per collection).
    fn lists_changes(&self) -> watch::Receiver<u64>;
    fn items_changes(&self) -> watch::Receiver<u64>;
    fn shops_changes(&self) -> watch::Receiver<u64>;
    fn templates_changes(&self) -> watch::Receiver<u64>;
}
