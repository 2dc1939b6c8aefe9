use serde::{Deserialize, Serialize};

use crate::error::RepoError;

/// Entity records are immutable values; a mutation is a full replace in the
/// backing store. Field names and enum tokens match the legacy JSON wire
/// format so the importer and the kv backend can read data written by
/// earlier releases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub category: ShopCategory,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    pub id: String,
    pub list_id: String,
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: ItemCategory,
    #[serde(default)]
    pub shop_id: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    // Invariant: completed_at.is_some() == is_completed.
    #[serde(default)]
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTemplate {
    pub id: String,
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: ItemCategory,
    #[serde(default)]
    pub shop_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub use_count: i64,
    #[serde(default)]
    pub last_used_at: Option<i64>,
    pub created_at: i64,
}

fn default_true() -> bool {
    true
}

fn default_quantity() -> i64 {
    1
}

/// Urgency ordering: Low < Normal < High < Urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RepoError> {
        match value {
            "LOW" => Ok(Priority::Low),
            "NORMAL" => Ok(Priority::Normal),
            "HIGH" => Ok(Priority::High),
            "URGENT" => Ok(Priority::Urgent),
            other => Err(RepoError::Serialization(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCategory {
    Food,
    DailyGoods,
    Medicine,
    Clothing,
    Electronics,
    BooksStationery,
    Cosmetics,
    Sports,
    Hobby,
    #[default]
    Other,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Food => "FOOD",
            ItemCategory::DailyGoods => "DAILY_GOODS",
            ItemCategory::Medicine => "MEDICINE",
            ItemCategory::Clothing => "CLOTHING",
            ItemCategory::Electronics => "ELECTRONICS",
            ItemCategory::BooksStationery => "BOOKS_STATIONERY",
            ItemCategory::Cosmetics => "COSMETICS",
            ItemCategory::Sports => "SPORTS",
            ItemCategory::Hobby => "HOBBY",
            ItemCategory::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RepoError> {
        match value {
            "FOOD" => Ok(ItemCategory::Food),
            "DAILY_GOODS" => Ok(ItemCategory::DailyGoods),
            "MEDICINE" => Ok(ItemCategory::Medicine),
            "CLOTHING" => Ok(ItemCategory::Clothing),
            "ELECTRONICS" => Ok(ItemCategory::Electronics),
            "BOOKS_STATIONERY" => Ok(ItemCategory::BooksStationery),
            "COSMETICS" => Ok(ItemCategory::Cosmetics),
            "SPORTS" => Ok(ItemCategory::Sports),
            "HOBBY" => Ok(ItemCategory::Hobby),
            "OTHER" => Ok(ItemCategory::Other),
            other => Err(RepoError::Serialization(format!(
                "unknown item category: {other}"
            ))),
        }
    }
}

/// Legacy data used SUPERMARKET and CONVENIENCE_STORE as separate entries;
/// they fold into GROCERY and CONVENIENCE on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShopCategory {
    #[default]
    #[serde(alias = "SUPERMARKET")]
    Grocery,
    Pharmacy,
    #[serde(alias = "CONVENIENCE_STORE")]
    Convenience,
    Bakery,
    Department,
    Electronics,
    Clothing,
    Restaurant,
    Other,
}

impl ShopCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShopCategory::Grocery => "GROCERY",
            ShopCategory::Pharmacy => "PHARMACY",
            ShopCategory::Convenience => "CONVENIENCE",
            ShopCategory::Bakery => "BAKERY",
            ShopCategory::Department => "DEPARTMENT",
            ShopCategory::Electronics => "ELECTRONICS",
            ShopCategory::Clothing => "CLOTHING",
            ShopCategory::Restaurant => "RESTAURANT",
            ShopCategory::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RepoError> {
        match value {
            "GROCERY" | "SUPERMARKET" => Ok(ShopCategory::Grocery),
            "PHARMACY" => Ok(ShopCategory::Pharmacy),
            "CONVENIENCE" | "CONVENIENCE_STORE" => Ok(ShopCategory::Convenience),
            "BAKERY" => Ok(ShopCategory::Bakery),
            "DEPARTMENT" => Ok(ShopCategory::Department),
            "ELECTRONICS" => Ok(ShopCategory::Electronics),
            "CLOTHING" => Ok(ShopCategory::Clothing),
            "RESTAURANT" => Ok(ShopCategory::Restaurant),
            "OTHER" => Ok(ShopCategory::Other),
            other => Err(RepoError::Serialization(format!(
                "unknown shop category: {other}"
            ))),
        }
    }
}

/// Canonical list order: incomplete before complete, then priority
/// descending, then created_at ascending. `sort_by` is stable, so ties keep
/// insertion order.
pub fn sort_items_for_list(items: &mut [ShoppingItem]) {
    items.sort_by(|a, b| {
        a.is_completed
            .cmp(&b.is_completed)
            .then(b.priority.cmp(&a.priority))
            .then(a.created_at.cmp(&b.created_at))
    });
}

/// Order for a shop's pending items: priority descending, created_at
/// ascending.
pub fn sort_items_for_shop(items: &mut [ShoppingItem]) {
    items.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
}

/// Templates within a category rank by how often they were used.
pub fn sort_templates_by_usage(templates: &mut [ItemTemplate]) {
    templates.sort_by(|a, b| b.use_count.cmp(&a.use_count));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn item(id: &str, priority: Priority, created_at: i64, completed: bool) -> ShoppingItem {
        ShoppingItem {
            id: id.into(),
            list_id: "list1".into(),
            name: id.into(),
            quantity: 1,
            unit: None,
            price: None,
            priority,
            category: ItemCategory::Other,
            shop_id: None,
            is_completed: completed,
            notes: None,
            created_at,
            updated_at: created_at,
            completed_at: if completed { Some(created_at) } else { None },
        }
    }

    #[test]
    fn priority_ordering_is_low_to_urgent() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Urgent);
    }

    #[test]
    fn list_sort_breaks_priority_ties_by_created_at() {
        let mut items = vec![
            item("a", Priority::High, 2, false),
            item("b", Priority::High, 1, false),
            item("c", Priority::Low, 0, false),
        ];
        sort_items_for_list(&mut items);
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn completed_items_sort_last() {
        let mut items = vec![
            item("done", Priority::Urgent, 0, true),
            item("todo", Priority::Low, 5, false),
        ];
        sort_items_for_list(&mut items);
        assert_eq!(items[0].id, "todo");
        assert_eq!(items[1].id, "done");
    }

    #[test]
    fn legacy_enum_tokens_round_trip() {
        let p: Priority = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(p, Priority::High);
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"HIGH\"");

        let c: ItemCategory = serde_json::from_str("\"DAILY_GOODS\"").unwrap();
        assert_eq!(c, ItemCategory::DailyGoods);

        // Folded legacy aliases.
        let s: ShopCategory = serde_json::from_str("\"SUPERMARKET\"").unwrap();
        assert_eq!(s, ShopCategory::Grocery);
        let s: ShopCategory = serde_json::from_str("\"CONVENIENCE_STORE\"").unwrap();
        assert_eq!(s, ShopCategory::Convenience);
    }

    #[test]
    fn legacy_item_json_parses_with_defaults() {
        let raw = r#"{"id":"i1","listId":"l1","name":"milk","createdAt":1,"updatedAt":1}"#;
        let item: ShoppingItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.quantity, 1);
        assert_eq!(item.priority, Priority::Normal);
        assert_eq!(item.category, ItemCategory::Other);
        assert!(!item.is_completed);
        assert!(item.completed_at.is_none());
    }

    proptest! {
        #[test]
        fn list_sort_orders_every_adjacent_pair(
            specs in proptest::collection::vec((0u8..4, 0i64..100, any::<bool>()), 0..40)
        ) {
            let mut items: Vec<ShoppingItem> = specs
                .iter()
                .enumerate()
                .map(|(n, (p, created, done))| {
                    let priority = match p { 0 => Priority::Low, 1 => Priority::Normal, 2 => Priority::High, _ => Priority::Urgent };
                    item(&format!("i{n}"), priority, *created, *done)
                })
                .collect();
            let before = items.len();
            sort_items_for_list(&mut items);
            prop_assert_eq!(items.len(), before);
            for pair in items.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(
                    a.is_completed < b.is_completed
                        || (a.is_completed == b.is_completed && a.priority > b.priority)
                        || (a.is_completed == b.is_completed
                            && a.priority == b.priority
                            && a.created_at <= b.created_at)
                );
            }
        }
    }
}
