use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("serialize failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// String key-value scope, the shape of browser local/session storage.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.read().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.items.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        self.items.write().remove(key);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    /// Per-tab, gone when the tab closes.
    Ephemeral,
    /// Survives restarts; used for "remember me".
    Persistent,
}

impl StorageScope {
    /// Read precedence: ephemeral first, then persistent.
    pub const READ_ORDER: [StorageScope; 2] = [StorageScope::Ephemeral, StorageScope::Persistent];

    pub fn for_remember_me(remember_me: bool) -> Self {
        if remember_me {
            StorageScope::Persistent
        } else {
            StorageScope::Ephemeral
        }
    }
}

/// The two scopes one browser tab can write sessions into.
#[derive(Clone)]
pub struct BrowserStorage {
    ephemeral: Arc<dyn KeyValueStore>,
    persistent: Arc<dyn KeyValueStore>,
}

impl BrowserStorage {
    pub fn new(ephemeral: Arc<dyn KeyValueStore>, persistent: Arc<dyn KeyValueStore>) -> Self {
        Self {
            ephemeral,
            persistent,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// Another tab of the same browser: fresh ephemeral scope, shared persistent one.
    pub fn new_tab(&self) -> Self {
        Self::new(Arc::new(MemoryStore::new()), self.persistent.clone())
    }

    pub fn scope(&self, scope: StorageScope) -> &dyn KeyValueStore {
        match scope {
            StorageScope::Ephemeral => self.ephemeral.as_ref(),
            StorageScope::Persistent => self.persistent.as_ref(),
        }
    }
}
