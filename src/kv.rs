use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::error::{RepoError, Result};

/// Legacy collection keys, as written by earlier preferences-backed
/// releases.
pub const LISTS_KEY: &str = "lists";
pub const SHOPS_KEY: &str = "shops";
pub const ITEMS_KEY: &str = "items";
pub const TEMPLATES_KEY: &str = "templates";

pub const MIGRATION_DONE_KEY: &str = "migration_to_sqlite_done";
pub const MIGRATION_TIMESTAMP_KEY: &str = "migration_timestamp";

trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn save(&self) -> Result<()>;
}

#[derive(Default)]
struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.remove(key);
        }
    }

    fn save(&self) -> Result<()> {
        Ok(())
    }
}

/// Preferences analogue: one JSON object on disk, loaded whole at open and
/// rewritten whole on save.
struct JsonFileStore {
    path: PathBuf,
    data: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    fn open(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(err) => {
                    warn!(
                        target: "trolley",
                        event = "kv_store_corrupt",
                        path = %path.display(),
                        error = %err
                    );
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.remove(key);
        }
    }

    fn save(&self) -> Result<()> {
        let snapshot = self
            .data
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        let raw = serde_json::to_string_pretty(&snapshot)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, raw).map_err(RepoError::from)
    }
}

/// Cloneable handle over a key-value backend, selected at composition-root
/// time.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn KvStore + Send + Sync>,
}

impl StoreHandle {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(MemoryStore::default()),
        }
    }

    pub fn json_file(path: &Path) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(JsonFileStore::open(path)?),
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    pub fn set(&self, key: &str, value: &str) {
        self.inner.set(key, value);
    }

    pub fn remove(&self, key: &str) {
        self.inner.remove(key);
    }

    pub fn save(&self) -> Result<()> {
        self.inner.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let store = StoreHandle::in_memory();
        assert!(store.get("missing").is_none());
        store.set("k", "v");
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k");
        assert!(store.get("k").is_none());
    }

    #[test]
    fn json_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");

        let store = StoreHandle::json_file(&path).expect("open");
        store.set("lists", "[]");
        store.save().expect("save");

        let reopened = StoreHandle::json_file(&path).expect("reopen");
        assert_eq!(reopened.get("lists").as_deref(), Some("[]"));
    }

    #[test]
    fn corrupt_file_loads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{not json").expect("write");

        let store = StoreHandle::json_file(&path).expect("open");
        assert!(store.get("lists").is_none());
    }
}
