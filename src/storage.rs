//! Durable key-value storage
//!
//! Small preferences (notification toggle, primary system id) live in one
//! JSON document on disk. Saves go through a temp file and rename so a crash
//! mid-write never corrupts the document.

use crate::error::{HyperionError, Result};
use crate::logging::{StructuredLogger, get_logger};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Async key-value storage seam
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`
    async fn get_item(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`
    async fn set_item(&self, key: &str, value: Value) -> Result<()>;

    /// Remove `key` if present
    async fn remove_item(&self, key: &str) -> Result<()>;
}

/// File-backed store holding one JSON object
pub struct FileStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, Value>>,
    logger: StructuredLogger,
}

impl FileStore {
    /// Open a store backed by `path`, loading the document if it exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let logger = get_logger("storage");

        let items = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                HyperionError::storage(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&contents).map_err(|e| {
                HyperionError::storage(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            logger.info("No state file found, starting empty");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            items: Mutex::new(items),
            logger,
        })
    }

    fn persist(&self, items: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                HyperionError::storage(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(items)?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, &json).map_err(|e| {
            HyperionError::storage(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            HyperionError::storage(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })?;

        self.logger.debug("Saved state file");
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<()> {
        let mut items = self.items.lock().await;
        items.insert(key.to_string(), value);
        self.persist(&items)
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.items.lock().await;
        if items.remove(key).is_some() {
            self.persist(&items)?;
        }
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<()> {
        self.items.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().await.remove(key);
        Ok(())
    }
}
