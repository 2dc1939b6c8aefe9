//! Local-first shopping data core: lists, items, shops and reusable item
//! templates behind one repository trait, with live queries that re-emit
//! the latest snapshot after every mutation.
//!
//! Three interchangeable backends implement [`ShoppingRepository`]:
//! in-memory ([`MemoryRepository`]), JSON key-value write-through
//! ([`KvRepository`]) and SQLite ([`SqliteRepository`]). A one-shot
//! [`LegacyImporter`] moves data from the key-value layout into SQLite,
//! and [`ShoppingAggregator`] composes the raw streams into the derived
//! views consumers render.

pub mod aggregator;
pub mod db;
pub mod error;
pub mod id;
pub mod importer;
pub mod kv;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod repo;
pub mod repo_kv;
pub mod repo_memory;
pub mod repo_sqlite;
pub mod store;
pub mod time;

pub use aggregator::{
    ItemDraft, ItemView, ShopDraft, ShopReminder, ShopView, ShoppingAggregator,
};
pub use db::{open_memory_pool, open_sqlite_pool};
pub use error::{RepoError, Result};
pub use importer::{LegacyImporter, MigrationOutcome};
pub use kv::StoreHandle;
pub use migrate::apply_migrations;
pub use model::{
    ItemCategory, ItemTemplate, Location, Priority, Shop, ShopCategory, ShoppingItem,
    ShoppingList,
};
pub use repo::ShoppingRepository;
pub use repo_kv::KvRepository;
pub use repo_memory::MemoryRepository;
pub use repo_sqlite::SqliteRepository;
pub use store::{ChangeFeed, LiveQuery};
